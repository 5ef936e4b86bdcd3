//! Mock Explorer/Indexer backend for tests. Returns canned data from
//! maps populated via the builder pattern; statuses and broadcasts are
//! mutable so protocol tests can advance on-chain state between steps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bitcoin::consensus::encode::deserialize_hex;
use bitcoin::{Address, OutPoint, Transaction, Txid};

use crate::error::CoreError;
use crate::script::{ScriptDecoder, VtxoSpendInfo};
use crate::types::{ChainTip, ChainTx, Coin, CoinStatus};

use super::{Explorer, Indexer};

pub struct MockProvider {
    statuses: Mutex<HashMap<Txid, CoinStatus>>,
    coins: Vec<Coin>,
    fee_rate: u64,
    tip: ChainTip,
    chains: HashMap<OutPoint, Vec<ChainTx>>,
    virtual_txs: HashMap<Txid, String>,
    broadcasts: Mutex<Vec<Vec<String>>>,
    fail_broadcast: AtomicBool,
}

impl MockProvider {
    pub fn builder() -> MockProviderBuilder {
        MockProviderBuilder {
            statuses: HashMap::new(),
            coins: Vec::new(),
            fee_rate: 1,
            tip: ChainTip {
                height: 100,
                time: 1_700_000_000,
            },
            chains: HashMap::new(),
            virtual_txs: HashMap::new(),
        }
    }

    /// Update a transaction's confirmation status, e.g. to simulate a
    /// broadcast node confirming between protocol steps.
    pub fn set_status(&self, txid: Txid, status: CoinStatus) {
        self.statuses.lock().unwrap().insert(txid, status);
    }

    /// Everything submitted through `broadcast`, in submission order.
    pub fn broadcasts(&self) -> Vec<Vec<String>> {
        self.broadcasts.lock().unwrap().clone()
    }

    /// Make every subsequent `broadcast` call fail.
    pub fn fail_broadcasts(&self) {
        self.fail_broadcast.store(true, Ordering::SeqCst);
    }
}

pub struct MockProviderBuilder {
    statuses: HashMap<Txid, CoinStatus>,
    coins: Vec<Coin>,
    fee_rate: u64,
    tip: ChainTip,
    chains: HashMap<OutPoint, Vec<ChainTx>>,
    virtual_txs: HashMap<Txid, String>,
}

impl MockProviderBuilder {
    pub fn with_status(mut self, txid: Txid, status: CoinStatus) -> Self {
        self.statuses.insert(txid, status);
        self
    }

    pub fn with_coin(mut self, coin: Coin) -> Self {
        self.coins.push(coin);
        self
    }

    pub fn with_fee_rate(mut self, sat_per_vb: u64) -> Self {
        self.fee_rate = sat_per_vb;
        self
    }

    pub fn with_tip(mut self, tip: ChainTip) -> Self {
        self.tip = tip;
        self
    }

    pub fn with_chain(mut self, outpoint: OutPoint, chain: Vec<ChainTx>) -> Self {
        self.chains.insert(outpoint, chain);
        self
    }

    pub fn with_virtual_tx(mut self, txid: Txid, psbt_base64: String) -> Self {
        self.virtual_txs.insert(txid, psbt_base64);
        self
    }

    pub fn build(self) -> MockProvider {
        MockProvider {
            statuses: Mutex::new(self.statuses),
            coins: self.coins,
            fee_rate: self.fee_rate,
            tip: self.tip,
            chains: self.chains,
            virtual_txs: self.virtual_txs,
            broadcasts: Mutex::new(Vec::new()),
            fail_broadcast: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Explorer for MockProvider {
    async fn tx_status(&self, txid: &Txid) -> Result<CoinStatus, CoreError> {
        self.statuses
            .lock()
            .unwrap()
            .get(txid)
            .cloned()
            .ok_or(CoreError::TxNotFound(*txid))
    }

    async fn fee_rate(&self) -> Result<u64, CoreError> {
        Ok(self.fee_rate)
    }

    async fn broadcast(&self, txs: &[String]) -> Result<Txid, CoreError> {
        if self.fail_broadcast.load(Ordering::SeqCst) {
            return Err(CoreError::Broadcast("mock broadcast failure".to_owned()));
        }
        let last = txs
            .last()
            .ok_or_else(|| CoreError::Broadcast("empty package".to_owned()))?;
        let tx: Transaction = deserialize_hex(last)
            .map_err(|e| CoreError::Broadcast(format!("invalid transaction hex: {e}")))?;
        self.broadcasts.lock().unwrap().push(txs.to_vec());
        Ok(tx.compute_txid())
    }

    async fn coins(&self, _address: &Address) -> Result<Vec<Coin>, CoreError> {
        Ok(self.coins.clone())
    }

    async fn chain_tip(&self) -> Result<ChainTip, CoreError> {
        Ok(self.tip)
    }
}

#[async_trait]
impl Indexer for MockProvider {
    async fn vtxo_chain(&self, outpoint: &OutPoint) -> Result<Vec<ChainTx>, CoreError> {
        self.chains
            .get(outpoint)
            .cloned()
            .ok_or_else(|| CoreError::State(format!("no chain for vtxo {outpoint}")))
    }

    async fn virtual_txs(&self, txids: &[Txid]) -> Result<Vec<String>, CoreError> {
        txids
            .iter()
            .map(|txid| {
                self.virtual_txs
                    .get(txid)
                    .cloned()
                    .ok_or_else(|| CoreError::State(format!("no virtual tx for {txid}")))
            })
            .collect()
    }
}

/// A decoder returning the same canned spend info for any descriptor.
pub struct MockDecoder {
    pub info: VtxoSpendInfo,
}

impl ScriptDecoder for MockDecoder {
    fn decode(&self, _descriptor: &str) -> Result<VtxoSpendInfo, CoreError> {
        Ok(self.info.clone())
    }
}
