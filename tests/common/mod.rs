//! Shared fixtures for the integration tests: Copay-style backups and an in-memory indexer.
#![allow(dead_code)]

use async_trait::async_trait;
use bitcoin::bip32::Xpriv;
use bitcoin::{Amount, SignedAmount};
use multisig_recovery::blockchain::bitcoin::address::derive_address;
use multisig_recovery::blockchain::bitcoin::utxo::Utxo;
use multisig_recovery::blockchain::traits::{AddressInfo, BroadcastReceipt, IndexerClient};
use multisig_recovery::core::derivation::expand;
use multisig_recovery::core::domain::{Wallet, WalletNetwork};
use multisig_recovery::core::errors::RecoveryError;
use multisig_recovery::crypto::sjcl;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;

/// Low iteration count keeps the tests fast; real backups use more.
pub const TEST_ITERATIONS: u32 = 1_000;

pub const FUNDING_TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

pub const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

pub fn master_xpriv(seed_byte: u8, network: bitcoin::Network) -> Xpriv {
    Xpriv::new_master(network, &[seed_byte; 32]).unwrap()
}

/// Encrypted Copay backup of one copayer of a BIP45 P2SH wallet.
pub fn copay_backup(
    password: &str,
    wallet_id: &str,
    copayer_id: &str,
    m: u32,
    n: u32,
    network: WalletNetwork,
    xpriv: &Xpriv,
) -> String {
    let payload = json!({
        "walletId": wallet_id,
        "copayerId": copayer_id,
        "m": m,
        "n": n,
        "network": network.as_str(),
        "xPrivKey": xpriv.to_string(),
        "derivationStrategy": "BIP45",
        "addressType": "P2SH",
    });
    sjcl::encrypt(password, &payload.to_string(), TEST_ITERATIONS).unwrap()
}

/// Address at `index` of the `combination`-th derivation combination.
pub fn address_at(wallet: &Wallet, combination: usize, index: u32) -> String {
    let combinations = expand(wallet).unwrap();
    derive_address(wallet, &combinations[combination], index)
        .unwrap()
        .address
        .to_string()
}

/// Indexer that knows a fixed set of funded addresses and records every call.
#[derive(Default)]
pub struct MockIndexer {
    funded: HashMap<String, u64>,
    pub probes: Mutex<Vec<String>>,
    pub broadcasts: Mutex<Vec<String>>,
}

impl MockIndexer {
    pub fn fund(mut self, address: impl Into<String>, sat: u64) -> Self {
        self.funded.insert(address.into(), sat);
        self
    }

    pub fn probe_count(&self) -> usize {
        self.probes.lock().unwrap().len()
    }
}

#[async_trait]
impl IndexerClient for MockIndexer {
    async fn get_address_info(&self, address: &str, _network: WalletNetwork) -> Result<AddressInfo, RecoveryError> {
        self.probes.lock().unwrap().push(address.to_string());
        let sat = self.funded.get(address).copied().unwrap_or(0);
        Ok(AddressInfo {
            confirmed_balance: Amount::from_sat(sat),
            unconfirmed_balance: SignedAmount::ZERO,
            confirmed_tx_count: u64::from(sat > 0),
            unconfirmed_tx_count: 0,
        })
    }

    async fn get_utxos(&self, address: &str, _network: WalletNetwork) -> Result<Vec<Utxo>, RecoveryError> {
        Ok(match self.funded.get(address) {
            Some(&sat) => vec![Utxo::new(FUNDING_TXID, 0, sat, "")],
            None => Vec::new(),
        })
    }

    async fn broadcast(&self, raw_tx_hex: &str, _network: WalletNetwork) -> Result<BroadcastReceipt, RecoveryError> {
        self.broadcasts.lock().unwrap().push(raw_tx_hex.to_string());
        Ok(BroadcastReceipt { txid: "mock-txid".to_string() })
    }
}
