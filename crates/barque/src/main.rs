mod cli;

use std::sync::Arc;

use bitcoin::consensus::encode::serialize_hex;
use bitcoin::{Amount, TxOut};
use clap::Parser;
use eyre::WrapErr;

use barque_core::send::{build_send_tx, finalize_key_spends, plan_send};
use barque_core::unroll::UnrollSession;
use barque_core::{ArkIndexerClient, EsploraClient, Explorer, Identity, Indexer, KeyIdentity};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    let identity = KeyIdentity::from_seckey_hex(&args.secret_key).context("load wallet key")?;
    let wallet_address = identity.address(args.network);
    let explorer = EsploraClient::new(&args.esplora_url, args.requests_per_second)
        .context("create explorer client")?;

    match args.command {
        cli::Command::Address => {
            println!("{wallet_address}");
        }

        cli::Command::Coins => {
            let coins = explorer.coins(&wallet_address).await?;
            let mut total = Amount::ZERO;
            for coin in &coins {
                let height = match coin.status.block_height {
                    Some(height) => height.to_string(),
                    None => "mempool".to_owned(),
                };
                println!("{}\t{}\t{height}", coin.outpoint, coin.value);
                total += coin.value;
            }
            println!("total: {total} across {} coins", coins.len());
        }

        cli::Command::Send {
            to,
            amount,
            fee_rate,
        } => {
            let recipient = cli::parse_address(&to, args.network).context("recipient address")?;
            let amount = Amount::from_sat(amount);
            let fee_rate = match fee_rate {
                Some(rate) => rate,
                None => explorer.fee_rate().await.context("fetch fee rate")?,
            };

            let coins = explorer.coins(&wallet_address).await?;
            let plan = plan_send(&coins, amount, fee_rate, &recipient, &wallet_address)?;
            tracing::info!(
                inputs = plan.inputs.len(),
                fee = %plan.fee,
                change = %plan.change,
                "send planned"
            );

            let mut tx = build_send_tx(&plan, amount, &recipient, &wallet_address);
            let prevouts: Vec<TxOut> = plan
                .inputs
                .iter()
                .map(|coin| TxOut {
                    value: coin.value,
                    script_pubkey: wallet_address.script_pubkey(),
                })
                .collect();
            finalize_key_spends(&mut tx, &prevouts, &identity).await?;

            let txid = explorer.broadcast(&[serialize_hex(&tx)]).await?;
            println!("{txid}");
        }

        cli::Command::Unroll { outpoint } => {
            let explorer: Arc<dyn Explorer> = Arc::new(explorer);
            let indexer: Arc<dyn Indexer> = Arc::new(ArkIndexerClient::new(&args.indexer_url));
            let identity: Arc<dyn Identity> = Arc::new(identity);

            let session =
                UnrollSession::begin(outpoint, explorer, indexer, identity, wallet_address)
                    .await
                    .context("start unroll session")?;
            tracing::info!(chain_len = session.chain().len(), "unrolling vtxo");
            let vtxo_txid = session.run().await.context("run unroll session")?;
            println!("unrolled {vtxo_txid}");
        }
    }

    Ok(())
}
