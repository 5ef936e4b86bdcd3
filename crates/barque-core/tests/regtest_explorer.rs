use std::env;
use std::sync::Once;

use bitcoin::hashes::Hash;
use bitcoin::{Address, Txid};
use barque_core::{CoreError, EsploraClient, Explorer};

static TRACING_INIT: Once = Once::new();

fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("barque_core=debug")),
            )
            .with_target(true)
            .try_init();
    });
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a local regtest esplora; set BARQUE_TEST_ESPLORA_URL"]
async fn regtest_explorer_serves_tip_fees_and_coins() {
    init_tracing();

    let esplora_url =
        env::var("BARQUE_TEST_ESPLORA_URL").expect("BARQUE_TEST_ESPLORA_URL must be set");
    let funded_address =
        env::var("BARQUE_TEST_FUNDED_ADDRESS").expect("BARQUE_TEST_FUNDED_ADDRESS must be set");

    let explorer =
        EsploraClient::new(&esplora_url, Some(10)).expect("explorer client must construct");

    eprintln!("[itest] checking chain tip against {esplora_url}");
    let tip = explorer
        .chain_tip()
        .await
        .expect("regtest chain tip must be available");
    assert!(
        tip.height >= 100,
        "regtest must have mined setup blocks before running checks"
    );
    assert!(tip.time > 0, "tip block must carry a timestamp");

    let fee_rate = explorer
        .fee_rate()
        .await
        .expect("regtest fee estimates must be available");
    assert!(fee_rate >= 1, "fee rate is floored at 1 sat/vb");

    let address: Address = funded_address
        .parse::<Address<_>>()
        .expect("fixture address must parse")
        .assume_checked();
    let coins = explorer
        .coins(&address)
        .await
        .expect("regtest utxo listing must succeed");
    assert!(
        !coins.is_empty(),
        "fixture address must be funded before running checks"
    );
    for coin in &coins {
        assert!(coin.value.to_sat() > 0, "utxo value must be positive");
    }

    // A txid that cannot exist maps to the typed not-found signal.
    let bogus = Txid::from_byte_array([0xab; 32]);
    let err = explorer
        .tx_status(&bogus)
        .await
        .expect_err("bogus txid must not resolve");
    assert!(matches!(err, CoreError::TxNotFound(txid) if txid == bogus));
}
