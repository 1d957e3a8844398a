//! Gap-limited address discovery
//!
//! Each derivation combination is walked from index 0 until more than `gap_limit` consecutive
//! addresses come back unused. Combinations are independent, so several can be in flight at
//! once; results are merged back in expansion order.

use super::address::{derive_address, DerivedAddress};
use super::utxo::{total_value, Utxo};
use crate::blockchain::traits::{AddressInfo, IndexerClient};
use crate::core::derivation::{expand, DerivationCombination, DerivationInfo};
use crate::core::domain::Wallet;
use crate::core::errors::RecoveryError;
use crate::core::progress::{ProgressEvent, ProgressReporter};
use bitcoin::secp256k1::SecretKey;
use bitcoin::{Address, Amount, PublicKey, ScriptBuf, SignedAmount};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::fmt;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    pub gap_limit: u32,
    pub concurrency: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self { gap_limit: 20, concurrency: 1 }
    }
}

/// A used address and everything needed to spend from it.
pub struct AddressRecord {
    pub address: Address,
    pub index: u32,
    pub balance: Amount,
    pub unconfirmed_balance: SignedAmount,
    pub utxos: Vec<Utxo>,
    /// Copayer order.
    pub public_keys: Vec<PublicKey>,
    pub private_keys: Vec<SecretKey>,
    pub redeem_script: Option<ScriptBuf>,
    pub derivation: Vec<DerivationInfo>,
    pub is_active: bool,
}

impl AddressRecord {
    pub(crate) fn new(mut derived: DerivedAddress, info: AddressInfo, utxos: Vec<Utxo>) -> Self {
        Self {
            address: derived.address.clone(),
            index: derived.index,
            balance: info.confirmed_balance,
            unconfirmed_balance: info.unconfirmed_balance,
            utxos,
            public_keys: std::mem::take(&mut derived.public_keys),
            private_keys: std::mem::take(&mut derived.private_keys),
            redeem_script: derived.redeem_script.take(),
            derivation: std::mem::take(&mut derived.derivation),
            is_active: info.is_active(),
        }
    }
}

impl Drop for AddressRecord {
    fn drop(&mut self) {
        for key in self.private_keys.iter_mut() {
            key.non_secure_erase();
        }
    }
}

impl fmt::Debug for AddressRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressRecord")
            .field("address", &self.address.to_string())
            .field("index", &self.index)
            .field("balance", &self.balance)
            .field("unconfirmed_balance", &self.unconfirmed_balance)
            .field("utxos", &self.utxos)
            .field("public_keys", &self.public_keys)
            .field("derivation", &self.derivation)
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ScanResult {
    pub addresses: Vec<AddressRecord>,
    /// Exact sum of every UTXO in `addresses`.
    pub balance: Amount,
    /// Addresses queried, active or not.
    pub probes: u64,
}

impl ScanResult {
    /// Assembles a result from records, recomputing the balance from their UTXOs.
    pub fn from_records(addresses: Vec<AddressRecord>, probes: u64) -> Result<Self, RecoveryError> {
        let balance = total_value(addresses.iter().flat_map(|a| a.utxos.iter()))?;
        Ok(Self { addresses, balance, probes })
    }

    pub fn utxo_count(&self) -> usize {
        self.addresses.iter().map(|a| a.utxos.len()).sum()
    }

    /// Erases and drops every derived private key. Addresses, scripts and UTXOs stay.
    pub fn erase_private_keys(&mut self) {
        for record in self.addresses.iter_mut() {
            for key in record.private_keys.iter_mut() {
                key.non_secure_erase();
            }
            record.private_keys.clear();
        }
    }
}

/// Scans every derivation combination of `wallet`.
///
/// Fails fast: the first indexer error (or cancellation) aborts the whole scan and discards
/// partial results.
pub async fn scan_wallet<C>(
    client: &C,
    wallet: &Wallet,
    options: ScanOptions,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<ScanResult, RecoveryError>
where
    C: IndexerClient + ?Sized,
{
    let combinations = expand(wallet)?;
    progress.report(ProgressEvent::Status(format!(
        "Getting addresses... GAP: {} ({} derivation combinations)",
        options.gap_limit,
        combinations.len()
    )));

    let scans: Vec<CombinationScan> = stream::iter(combinations.iter().enumerate())
        .map(|(i, combination)| {
            scan_combination(client, wallet, i, combination, options.gap_limit, progress, cancel)
        })
        .buffered(options.concurrency.max(1))
        .try_collect()
        .await?;

    let probes = scans.iter().map(|s| s.probes).sum();
    let records: Vec<AddressRecord> = scans.into_iter().flat_map(|s| s.records).collect();
    let result = ScanResult::from_records(records, probes)?;

    info!(
        active = result.addresses.len(),
        utxos = result.utxo_count(),
        probes = result.probes,
        balance = %result.balance,
        "Scan finished"
    );
    progress.report(ProgressEvent::Status(format!(
        "Active addresses: {}, balance: {}",
        result.addresses.len(),
        result.balance
    )));
    Ok(result)
}

struct CombinationScan {
    records: Vec<AddressRecord>,
    probes: u64,
}

async fn scan_combination<C>(
    client: &C,
    wallet: &Wallet,
    ordinal: usize,
    combination: &DerivationCombination,
    gap_limit: u32,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<CombinationScan, RecoveryError>
where
    C: IndexerClient + ?Sized,
{
    let mut records = Vec::new();
    let mut probes = 0u64;
    let mut inactive = 0u32;
    let mut index = 0u32;

    debug!(combination = ordinal, path = %combination.path, "Scanning combination");
    loop {
        if inactive > gap_limit {
            break;
        }
        if cancel.is_cancelled() {
            return Err(RecoveryError::Cancelled);
        }

        let derived = derive_address(wallet, combination, index)?;
        let address = derived.address.to_string();
        let info = until_cancelled(cancel, client.get_address_info(&address, wallet.network)).await?;
        probes += 1;

        let is_active = info.is_active();
        progress.report(ProgressEvent::AddressProbed {
            derivation: derived.derivation.clone(),
            address: address.clone(),
            index,
            is_active,
            balance: info.confirmed_balance,
        });

        if is_active {
            let utxos = until_cancelled(cancel, client.get_utxos(&address, wallet.network)).await?;
            debug!(%address, index, utxos = utxos.len(), "Address is active");
            records.push(AddressRecord::new(derived, info, utxos));
            inactive = 0;
        } else {
            inactive += 1;
            debug!(%address, index, inactive, "Address unused");
        }

        index = index.checked_add(1).ok_or_else(|| {
            RecoveryError::KeyDerivation("address index space exhausted".into())
        })?;
    }

    Ok(CombinationScan { records, probes })
}

async fn until_cancelled<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T, RecoveryError>>,
) -> Result<T, RecoveryError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RecoveryError::Cancelled),
        result = call => result,
    }
}
