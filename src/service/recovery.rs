use std::fmt;
use std::sync::Arc;

use bitcoin::{Amount, Txid};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::blockchain::bitcoin::client::InsightClient;
use crate::blockchain::bitcoin::scanner::{scan_wallet, ScanOptions, ScanResult};
use crate::blockchain::bitcoin::transaction::{BitcoinTransaction, SweepTransaction};
use crate::blockchain::traits::{BroadcastReceipt, IndexerClient};
use crate::core::config::RecoveryConfig;
use crate::core::domain::{Wallet, WalletNetwork};
use crate::core::errors::RecoveryError;
use crate::core::progress::{ProgressEvent, ProgressReporter};
use crate::core::wallet::assemble::assemble;
use crate::core::wallet::credentials::{extract, RawBackup};

/// Everything needed to recover one wallet.
pub struct RecoveryRequest {
    /// One entry per copayer, in copayer order. Blank entries are ignored.
    pub backups: Vec<RawBackup>,
    pub m: u32,
    pub n: u32,
    pub network: WalletNetwork,
    pub gap_limit: u32,
    pub destination_address: String,
    pub fee: Amount,
}

impl fmt::Debug for RecoveryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryRequest")
            .field("backups", &self.backups)
            .field("m", &self.m)
            .field("n", &self.n)
            .field("network", &self.network)
            .field("gap_limit", &self.gap_limit)
            .field("destination_address", &self.destination_address)
            .field("fee", &self.fee)
            .finish()
    }
}

/// A signed sweep and the scan that funded it. `scan` no longer holds private keys.
#[derive(Debug)]
pub struct RecoveryOutcome {
    pub raw_signed_tx: String,
    pub txid: Txid,
    /// Amount paid to the destination.
    pub total_recovered: Amount,
    pub fee: Amount,
    pub scan: ScanResult,
}

/// Recovery orchestration: backups → wallet → scan → signed sweep.
pub struct RecoveryService {
    indexer: Arc<dyn IndexerClient>,
    scan_concurrency: usize,
}

impl RecoveryService {
    pub fn new(indexer: Arc<dyn IndexerClient>) -> Self {
        Self { indexer, scan_concurrency: 1 }
    }

    pub fn with_scan_concurrency(mut self, concurrency: usize) -> Self {
        self.scan_concurrency = concurrency.max(1);
        self
    }

    /// Service backed by the configured Insight endpoints.
    pub fn from_config(config: &RecoveryConfig) -> Result<Self, RecoveryError> {
        let client = InsightClient::from_config(&config.indexer)?;
        Ok(Self::new(Arc::new(client)).with_scan_concurrency(config.scan.concurrency))
    }

    /// Decodes every backup and merges the credentials into one wallet.
    pub fn load_wallet(
        &self,
        backups: &[RawBackup],
        m: u32,
        n: u32,
        network: WalletNetwork,
    ) -> Result<Wallet, RecoveryError> {
        if m == 0 || m > n {
            return Err(RecoveryError::InvalidWalletConfig { m, n });
        }
        let credentials = backups
            .iter()
            .map(|backup| extract(backup, m, n, network))
            .collect::<Result<Vec<_>, _>>()?;
        assemble(credentials)
    }

    pub async fn scan(
        &self,
        wallet: &Wallet,
        gap_limit: u32,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<ScanResult, RecoveryError> {
        let options = ScanOptions { gap_limit, concurrency: self.scan_concurrency };
        scan_wallet(self.indexer.as_ref(), wallet, options, progress, cancel).await
    }

    /// Runs a full recovery. Nothing is broadcast; see [`RecoveryService::broadcast`].
    pub async fn recover(
        &self,
        request: RecoveryRequest,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<RecoveryOutcome, RecoveryError> {
        info!(
            m = request.m,
            n = request.n,
            network = %request.network,
            backups = request.backups.len(),
            gap_limit = request.gap_limit,
            "Starting recovery"
        );

        let wallet = self.load_wallet(&request.backups, request.m, request.n, request.network)?;
        drop(request.backups);
        progress.report(ProgressEvent::Status(format!(
            "Wallet loaded: {}-of-{} {} {} ({} copayer backups)",
            wallet.m,
            wallet.n,
            wallet.derivation_strategy,
            wallet.address_type,
            wallet.copayers.len()
        )));

        let mut scan = self.scan(&wallet, request.gap_limit, progress, cancel).await?;
        let signed = BitcoinTransaction::build_sweep(&request.destination_address, &scan, &wallet, request.fee);
        scan.erase_private_keys();
        drop(wallet);
        let SweepTransaction { raw_hex, txid, amount, fee, input_count } = signed?;

        info!(%txid, %amount, %fee, inputs = input_count, "Sweep transaction signed");
        progress.report(ProgressEvent::Status(format!(
            "Transaction ready: {} to {} (fee {})",
            amount, request.destination_address, fee
        )));

        Ok(RecoveryOutcome {
            raw_signed_tx: raw_hex,
            txid,
            total_recovered: amount,
            fee,
            scan,
        })
    }

    pub async fn broadcast(
        &self,
        raw_tx_hex: &str,
        network: WalletNetwork,
    ) -> Result<BroadcastReceipt, RecoveryError> {
        self.indexer.broadcast(raw_tx_hex.trim(), network).await
    }
}
