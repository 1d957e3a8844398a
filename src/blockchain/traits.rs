use async_trait::async_trait;
use bitcoin::{Amount, SignedAmount};
use serde::{Deserialize, Serialize};

use crate::blockchain::bitcoin::utxo::Utxo;
use crate::core::domain::WalletNetwork;
use crate::core::errors::RecoveryError;

/// Balance and history counters of one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressInfo {
    pub confirmed_balance: Amount,
    /// May be negative while an unconfirmed spend is pending.
    pub unconfirmed_balance: SignedAmount,
    pub confirmed_tx_count: u64,
    pub unconfirmed_tx_count: u64,
}

impl AddressInfo {
    /// An address counts as used once it appears in any transaction, confirmed or not.
    pub fn is_active(&self) -> bool {
        self.confirmed_tx_count + self.unconfirmed_tx_count > 0
    }
}

/// Indexer acknowledgement of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReceipt {
    pub txid: String,
}

/// Address-indexed view of the chain: the only remote dependency of a recovery.
#[async_trait]
pub trait IndexerClient: Send + Sync {
    async fn get_address_info(
        &self,
        address: &str,
        network: WalletNetwork,
    ) -> Result<AddressInfo, RecoveryError>;

    async fn get_utxos(&self, address: &str, network: WalletNetwork) -> Result<Vec<Utxo>, RecoveryError>;

    async fn broadcast(
        &self,
        raw_tx_hex: &str,
        network: WalletNetwork,
    ) -> Result<BroadcastReceipt, RecoveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_counts_unconfirmed() {
        let mut info = AddressInfo {
            confirmed_balance: Amount::ZERO,
            unconfirmed_balance: SignedAmount::ZERO,
            confirmed_tx_count: 0,
            unconfirmed_tx_count: 0,
        };
        assert!(!info.is_active());
        info.unconfirmed_tx_count = 1;
        assert!(info.is_active());
        info.unconfirmed_tx_count = 0;
        info.confirmed_tx_count = 3;
        assert!(info.is_active());
    }
}
