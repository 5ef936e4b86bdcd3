use std::time::Duration;

use async_trait::async_trait;
use bitcoin::{OutPoint, Txid};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{CoreError, ProviderError};
use crate::types::ChainTx;

use super::Indexer;

/// REST client for an Ark protocol indexer.
///
/// Assumes `GET /v1/vtxos/{txid}/{vout}/chain` for ancestry chains and
/// `POST /v1/virtual-txs` (`{"txids": [...]}` → `{"txs": [base64, ...]}`)
/// for off-chain transaction content.
pub struct ArkIndexerClient {
    client: reqwest::Client,
    base_url: String,
}

impl ArkIndexerClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .expect("reqwest client builder uses valid static config");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    async fn check<T: serde::de::DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, CoreError> {
        let status = response.status();
        let body = response.text().await.map_err(ProviderError::Transport)?;
        trace!(path, %status, body = %body, "indexer response");
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
}

#[derive(Debug, Deserialize)]
struct ChainResponse {
    chain: Vec<ChainTx>,
}

#[derive(Debug, Serialize)]
struct VirtualTxsRequest<'a> {
    txids: &'a [Txid],
}

#[derive(Debug, Deserialize)]
struct VirtualTxsResponse {
    txs: Vec<String>,
}

#[async_trait]
impl Indexer for ArkIndexerClient {
    async fn vtxo_chain(&self, outpoint: &OutPoint) -> Result<Vec<ChainTx>, CoreError> {
        let path = format!("/v1/vtxos/{}/{}/chain", outpoint.txid, outpoint.vout);
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "indexer GET");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ProviderError::Transport)?;
        let decoded: ChainResponse = Self::check(&path, response).await?;
        Ok(decoded.chain)
    }

    async fn virtual_txs(&self, txids: &[Txid]) -> Result<Vec<String>, CoreError> {
        if txids.is_empty() {
            return Ok(Vec::new());
        }
        let path = "/v1/virtual-txs";
        let url = format!("{}{path}", self.base_url);
        debug!(%url, count = txids.len(), "indexer POST");

        let response = self
            .client
            .post(&url)
            .json(&VirtualTxsRequest { txids })
            .send()
            .await
            .map_err(ProviderError::Transport)?;
        let decoded: VirtualTxsResponse = Self::check(path, response).await?;

        if decoded.txs.len() != txids.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "requested {} virtual txs, got {}",
                txids.len(),
                decoded.txs.len()
            ))
            .into());
        }
        Ok(decoded.txs)
    }
}
