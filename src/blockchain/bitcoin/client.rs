//! Insight indexer client
//!
//! Speaks the Insight REST API (`/addr`, `/addr/{a}/utxo`, `/tx/send`) with one base URL per
//! network.

use super::utxo::Utxo;
use crate::blockchain::traits::{AddressInfo, BroadcastReceipt, IndexerClient};
use crate::core::config::IndexerConfig;
use crate::core::domain::WalletNetwork;
use crate::core::errors::RecoveryError;
use crate::security::redaction::truncate_for_log;
use async_trait::async_trait;
use bitcoin::{Amount, SignedAmount};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const MAX_ERROR_BODY: usize = 200;

/// Insight REST client
pub struct InsightClient {
    livenet_url: String,
    testnet_url: String,
    http_client: HttpClient,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddrResponse {
    #[serde(default)]
    balance: Option<f64>,
    #[serde(default)]
    balance_sat: Option<i64>,
    #[serde(default)]
    unconfirmed_balance: Option<f64>,
    #[serde(default)]
    unconfirmed_balance_sat: Option<i64>,
    #[serde(default)]
    tx_apperances: u64,
    #[serde(default)]
    unconfirmed_tx_apperances: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UtxoResponse {
    txid: String,
    vout: u32,
    script_pub_key: String,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    satoshis: Option<u64>,
    #[serde(default)]
    confirmations: Option<u32>,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    rawtx: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    txid: String,
}

/// BTC float to satoshis, rounded to the nearest unit.
fn btc_to_sat(btc: f64) -> i64 {
    (btc * 100_000_000.0).round() as i64
}

impl AddrResponse {
    fn into_info(self) -> Result<AddressInfo, String> {
        let confirmed = self
            .balance_sat
            .or_else(|| self.balance.map(btc_to_sat))
            .unwrap_or(0);
        let unconfirmed = self
            .unconfirmed_balance_sat
            .or_else(|| self.unconfirmed_balance.map(btc_to_sat))
            .unwrap_or(0);
        let confirmed = u64::try_from(confirmed)
            .map_err(|_| format!("negative confirmed balance {}", confirmed))?;
        Ok(AddressInfo {
            confirmed_balance: Amount::from_sat(confirmed),
            unconfirmed_balance: SignedAmount::from_sat(unconfirmed),
            confirmed_tx_count: self.tx_apperances,
            unconfirmed_tx_count: self.unconfirmed_tx_apperances,
        })
    }
}

impl UtxoResponse {
    fn into_utxo(self) -> Result<Utxo, String> {
        let amount = match (self.satoshis, self.amount) {
            (Some(sat), _) => sat,
            (None, Some(btc)) => u64::try_from(btc_to_sat(btc))
                .map_err(|_| format!("negative UTXO amount {}", btc))?,
            (None, None) => return Err(format!("UTXO {}:{} has no amount", self.txid, self.vout)),
        };
        Ok(Utxo {
            txid: self.txid,
            vout: self.vout,
            amount,
            script_pubkey: self.script_pub_key,
            confirmations: self.confirmations,
        })
    }
}

impl InsightClient {
    pub fn new(
        livenet_url: impl Into<String>,
        testnet_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RecoveryError> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecoveryError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            livenet_url: livenet_url.into().trim_end_matches('/').to_string(),
            testnet_url: testnet_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn from_config(config: &IndexerConfig) -> Result<Self, RecoveryError> {
        Self::new(
            config.livenet_url.clone(),
            config.testnet_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self, network: WalletNetwork) -> &str {
        match network {
            WalletNetwork::Livenet => &self.livenet_url,
            WalletNetwork::Testnet => &self.testnet_url,
        }
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, RecoveryError> {
        let unavailable = |reason: String| RecoveryError::IndexerUnavailable {
            endpoint: endpoint.to_string(),
            reason,
        };

        let response = request
            .send()
            .await
            .map_err(|e| unavailable(format!("request failed: {}", e)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| unavailable(format!("reading body failed: {}", e)))?;
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {}: {}", status, truncate_for_log(&body, MAX_ERROR_BODY))));
        }
        serde_json::from_str(&body).map_err(|e| unavailable(format!("undecodable response: {}", e)))
    }
}

#[async_trait]
impl IndexerClient for InsightClient {
    async fn get_address_info(
        &self,
        address: &str,
        network: WalletNetwork,
    ) -> Result<AddressInfo, RecoveryError> {
        let endpoint = format!("{}/addr/{}", self.base_url(network), address);
        debug!("GET {}", endpoint);
        let request = self.http_client.get(&endpoint).query(&[("noTxList", "1")]);
        let response: AddrResponse = self.read_json(&endpoint, request).await?;
        response
            .into_info()
            .map_err(|reason| RecoveryError::IndexerUnavailable { endpoint, reason })
    }

    async fn get_utxos(&self, address: &str, network: WalletNetwork) -> Result<Vec<Utxo>, RecoveryError> {
        let endpoint = format!("{}/addr/{}/utxo", self.base_url(network), address);
        debug!("GET {}", endpoint);
        let request = self.http_client.get(&endpoint).query(&[("noCache", "1")]);
        let response: Vec<UtxoResponse> = self.read_json(&endpoint, request).await?;
        let utxos = response
            .into_iter()
            .map(UtxoResponse::into_utxo)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| RecoveryError::IndexerUnavailable { endpoint: endpoint.clone(), reason })?;
        debug!("{} UTXO(s) at {}", utxos.len(), address);
        Ok(utxos)
    }

    async fn broadcast(
        &self,
        raw_tx_hex: &str,
        network: WalletNetwork,
    ) -> Result<BroadcastReceipt, RecoveryError> {
        let endpoint = format!("{}/tx/send", self.base_url(network));
        info!("Broadcasting transaction ({} bytes) to {}", raw_tx_hex.len() / 2, endpoint);
        let request = self.http_client.post(&endpoint).json(&SendRequest { rawtx: raw_tx_hex });
        let response: SendResponse = self.read_json(&endpoint, request).await?;
        info!("Transaction broadcast, txid: {}", response.txid);
        Ok(BroadcastReceipt { txid: response.txid })
    }
}
