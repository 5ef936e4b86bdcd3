use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::consensus::encode::deserialize_hex;
use bitcoin::{Address, Transaction, Txid};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::error::{CoreError, ProviderError};
use crate::types::{ChainTip, Coin, CoinStatus};

use super::Explorer;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Esplora-style REST blockchain explorer client.
///
/// Targets the endpoint layout served by esplora/electrs and
/// mempool.space: `/tx/{txid}/status`, `/fee-estimates`,
/// `/address/{addr}/utxo`, `/blocks`, `/tx` and `/txs/package` for
/// submission.
pub struct EsploraClient {
    client: reqwest::Client,
    base_url: String,
    limiter: Option<DirectRateLimiter>,
}

impl EsploraClient {
    /// Create a client for `base_url`. If `requests_per_second` is set,
    /// calls are rate-limited per outbound HTTP request.
    pub fn new(base_url: &str, requests_per_second: Option<u32>) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .expect("reqwest client builder uses valid static config");

        let limiter = match requests_per_second {
            None => None,
            Some(limit) => {
                let limit = NonZeroU32::new(limit).ok_or_else(|| {
                    CoreError::State("requests_per_second must be at least 1".to_owned())
                })?;
                Some(RateLimiter::direct(Quota::per_second(limit)))
            }
        };

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            limiter,
        })
    }

    async fn wait_for_rate_limit(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    async fn get(&self, path: &str) -> Result<(StatusCode, String), CoreError> {
        self.wait_for_rate_limit().await;
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "explorer GET");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ProviderError::Transport)?;
        let status = response.status();
        let body = response.text().await.map_err(ProviderError::Transport)?;
        trace!(%url, %status, body = %body, "explorer response");
        Ok((status, body))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, CoreError> {
        let (status, body) = self.get(path).await?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message: body,
            }
            .into());
        }
        serde_json::from_str(&body).map_err(|e| {
            ProviderError::InvalidResponse(format!("decode {path} response: {e}; body={body}"))
                .into()
        })
    }

    async fn post(&self, path: &str, body: reqwest::Body) -> Result<String, CoreError> {
        self.wait_for_rate_limit().await;
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "explorer POST");

        let response = self
            .client
            .post(&url)
            .body(body)
            .send()
            .await
            .map_err(ProviderError::Transport)?;
        let status = response.status();
        let body = response.text().await.map_err(ProviderError::Transport)?;
        trace!(%url, %status, body = %body, "explorer response");
        if !status.is_success() {
            return Err(CoreError::Broadcast(format!("HTTP {status}: {body}")));
        }
        Ok(body)
    }
}

#[derive(Debug, Deserialize)]
struct UtxoEntry {
    txid: Txid,
    vout: u32,
    value: u64,
    status: CoinStatus,
}

#[derive(Debug, Deserialize)]
struct BlockEntry {
    height: u32,
    timestamp: u64,
}

/// Pick the next-block rate from an esplora `/fee-estimates` map
/// (confirmation target → sat/vB), rounding up to an integer rate.
fn next_block_fee_rate(estimates: &HashMap<String, f64>) -> Option<u64> {
    let rate = estimates.get("1").copied().or_else(|| {
        estimates
            .iter()
            .filter_map(|(target, rate)| target.parse::<u32>().ok().map(|t| (t, *rate)))
            .min_by_key(|(target, _)| *target)
            .map(|(_, rate)| rate)
    })?;
    Some((rate.ceil() as u64).max(1))
}

#[async_trait]
impl Explorer for EsploraClient {
    async fn tx_status(&self, txid: &Txid) -> Result<CoinStatus, CoreError> {
        let (status, body) = self.get(&format!("/tx/{txid}/status")).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(CoreError::TxNotFound(*txid));
        }
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message: body,
            }
            .into());
        }
        serde_json::from_str(&body).map_err(|e| {
            ProviderError::InvalidResponse(format!("decode tx status: {e}; body={body}")).into()
        })
    }

    async fn fee_rate(&self) -> Result<u64, CoreError> {
        let estimates: HashMap<String, f64> = self.get_json("/fee-estimates").await?;
        next_block_fee_rate(&estimates)
            .ok_or_else(|| ProviderError::InvalidResponse("empty fee-estimates map".into()).into())
    }

    async fn broadcast(&self, txs: &[String]) -> Result<Txid, CoreError> {
        let submitted_txid = |hex: &str| -> Result<Txid, CoreError> {
            let tx: Transaction = deserialize_hex(hex)
                .map_err(|e| CoreError::Broadcast(format!("invalid transaction hex: {e}")))?;
            Ok(tx.compute_txid())
        };

        match txs {
            [tx] => {
                let txid = submitted_txid(tx)?;
                self.post("/tx", tx.clone().into()).await?;
                debug!(%txid, "broadcast transaction");
                Ok(txid)
            }
            [_, child] => {
                let txid = submitted_txid(child)?;
                let body = serde_json::to_vec(txs)
                    .map_err(|e| CoreError::Broadcast(format!("encode package: {e}")))?;
                self.post("/txs/package", body.into()).await?;
                debug!(child = %txid, "broadcast fee-bump package");
                Ok(txid)
            }
            _ => Err(CoreError::Broadcast(format!(
                "expected one transaction or a parent+child package, got {}",
                txs.len()
            ))),
        }
    }

    async fn coins(&self, address: &Address) -> Result<Vec<Coin>, CoreError> {
        let utxos: Vec<UtxoEntry> = self.get_json(&format!("/address/{address}/utxo")).await?;
        Ok(utxos
            .into_iter()
            .map(|u| Coin {
                outpoint: bitcoin::OutPoint::new(u.txid, u.vout),
                value: bitcoin::Amount::from_sat(u.value),
                status: u.status,
            })
            .collect())
    }

    async fn chain_tip(&self) -> Result<ChainTip, CoreError> {
        // `/blocks` returns the most recent blocks, newest first.
        let blocks: Vec<BlockEntry> = self.get_json("/blocks").await?;
        let tip = blocks
            .first()
            .ok_or_else(|| ProviderError::InvalidResponse("empty blocks list".to_owned()))?;
        Ok(ChainTip {
            height: tip.height,
            time: tip.timestamp,
        })
    }
}
