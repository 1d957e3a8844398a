//! Unspent outputs as reported by the indexer

use crate::core::errors::RecoveryError;
use bitcoin::{Amount, OutPoint, ScriptBuf, Txid};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One spendable output of a scanned address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    /// Satoshis
    pub amount: u64,
    /// Hex-encoded locking script
    pub script_pubkey: String,
    #[serde(default)]
    pub confirmations: Option<u32>,
}

impl Utxo {
    pub fn new(txid: impl Into<String>, vout: u32, amount: u64, script_pubkey: impl Into<String>) -> Self {
        Self {
            txid: txid.into(),
            vout,
            amount,
            script_pubkey: script_pubkey.into(),
            confirmations: None,
        }
    }

    pub fn outpoint(&self) -> Result<OutPoint, RecoveryError> {
        let txid = Txid::from_str(&self.txid).map_err(|e| {
            RecoveryError::TransactionBuildFailure(format!("invalid txid {}: {}", self.txid, e))
        })?;
        Ok(OutPoint { txid, vout: self.vout })
    }

    pub fn script_pubkey(&self) -> Result<ScriptBuf, RecoveryError> {
        ScriptBuf::from_hex(&self.script_pubkey).map_err(|e| {
            RecoveryError::TransactionBuildFailure(format!("invalid scriptPubKey: {}", e))
        })
    }

    pub fn value(&self) -> Amount {
        Amount::from_sat(self.amount)
    }
}

/// Exact sum of a UTXO set.
pub fn total_value<'a>(utxos: impl IntoIterator<Item = &'a Utxo>) -> Result<Amount, RecoveryError> {
    utxos.into_iter().try_fold(Amount::ZERO, |acc, u| {
        acc.checked_add(u.value())
            .ok_or_else(|| RecoveryError::TransactionBuildFailure("UTXO total overflows".into()))
    })
}
