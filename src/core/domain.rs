//! Core recovery types: networks, wallet layouts, signer credentials and the assembled wallet.

use crate::core::errors::RecoveryError;
use bitcoin::bip32::Xpriv;
use bitcoin::{Amount, Denomination};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two chains a Copay-style wallet can live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletNetwork {
    Livenet,
    Testnet,
}

impl WalletNetwork {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletNetwork::Livenet => "livenet",
            WalletNetwork::Testnet => "testnet",
        }
    }

    pub fn to_bitcoin(self) -> bitcoin::Network {
        match self {
            WalletNetwork::Livenet => bitcoin::Network::Bitcoin,
            WalletNetwork::Testnet => bitcoin::Network::Testnet,
        }
    }
}

impl fmt::Display for WalletNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletNetwork {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "livenet" | "mainnet" | "bitcoin" => Ok(WalletNetwork::Livenet),
            "testnet" => Ok(WalletNetwork::Testnet),
            other => Err(RecoveryError::Config(format!("unknown network '{}'", other))),
        }
    }
}

/// How the wallet laid out its HD tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DerivationStrategy {
    /// Copay shared-wallet layout: `m/45'/2147483647/{0,1}`
    #[serde(rename = "BIP45")]
    Bip45,
    /// Account layout: `m/44'/{coin}'/0'/{0,1}`
    #[serde(rename = "BIP44")]
    Bip44,
}

impl DerivationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivationStrategy::Bip45 => "BIP45",
            DerivationStrategy::Bip44 => "BIP44",
        }
    }
}

impl fmt::Display for DerivationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DerivationStrategy {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BIP45" => Ok(DerivationStrategy::Bip45),
            "BIP44" => Ok(DerivationStrategy::Bip44),
            other => Err(RecoveryError::UnsupportedBackupFormat(format!(
                "derivation strategy '{}' is not supported",
                other
            ))),
        }
    }
}

/// Address flavour of the wallet.
///
/// Backups may name layouts this engine cannot build; those are carried through as
/// `Unsupported` and rejected when an address is derived.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AddressType {
    P2sh,
    P2pkh,
    Unsupported(String),
}

impl AddressType {
    pub fn as_str(&self) -> &str {
        match self {
            AddressType::P2sh => "P2SH",
            AddressType::P2pkh => "P2PKH",
            AddressType::Unsupported(name) => name,
        }
    }
}

impl From<&str> for AddressType {
    fn from(s: &str) -> Self {
        match s {
            "P2SH" => AddressType::P2sh,
            "P2PKH" => AddressType::P2pkh,
            other => AddressType::Unsupported(other.to_string()),
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupSource {
    Backup,
    Mnemonic,
}

impl fmt::Display for BackupSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupSource::Backup => f.write_str("backup"),
            BackupSource::Mnemonic => f.write_str("mnemonic"),
        }
    }
}

/// One signer's normalized credential, produced once per raw backup.
#[derive(Clone)]
pub struct Credential {
    pub wallet_id: Option<String>,
    pub copayer_id: Option<String>,
    pub xpriv: Xpriv,
    pub derivation_strategy: DerivationStrategy,
    pub address_type: AddressType,
    pub m: u32,
    pub n: u32,
    pub network: WalletNetwork,
    pub source: BackupSource,
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.xpriv.private_key.non_secure_erase();
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("wallet_id", &self.wallet_id)
            .field("copayer_id", &self.copayer_id)
            .field("xpriv", &"<redacted>")
            .field("derivation_strategy", &self.derivation_strategy)
            .field("address_type", &self.address_type)
            .field("m", &self.m)
            .field("n", &self.n)
            .field("network", &self.network)
            .field("source", &self.source)
            .finish()
    }
}

/// A signer slot of the assembled wallet.
#[derive(Clone)]
pub struct Copayer {
    pub copayer_id: Option<String>,
    pub xpriv: Xpriv,
}

impl Drop for Copayer {
    fn drop(&mut self) {
        self.xpriv.private_key.non_secure_erase();
    }
}

impl fmt::Debug for Copayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Copayer")
            .field("copayer_id", &self.copayer_id)
            .field("xpriv", &"<redacted>")
            .finish()
    }
}

/// Validated wallet descriptor. Copayer order is the input order and is significant: it fixes
/// the numbering of derivation combinations.
#[derive(Debug, Clone)]
pub struct Wallet {
    pub wallet_id: Option<String>,
    pub derivation_strategy: DerivationStrategy,
    pub address_type: AddressType,
    pub m: u32,
    pub n: u32,
    pub network: WalletNetwork,
    pub source: BackupSource,
    pub copayers: Vec<Copayer>,
}

/// Parses a decimal BTC amount such as `0.0001` into exact satoshis.
pub fn parse_btc_amount(input: &str) -> Result<Amount, RecoveryError> {
    Amount::from_str_in(input.trim(), Denomination::Bitcoin)
        .map_err(|e| RecoveryError::Config(format!("invalid BTC amount '{}': {}", input.trim(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("0.0001", 10_000 ; "default fee")]
    #[test_case(" 0.01 ", 1_000_000 ; "padded")]
    #[test_case("1", 100_000_000 ; "whole coin")]
    fn test_parse_btc_amount(input: &str, sat: u64) {
        assert_eq!(parse_btc_amount(input).unwrap(), Amount::from_sat(sat));
    }

    #[test]
    fn test_parse_btc_amount_rejects_garbage() {
        assert!(parse_btc_amount("abc").is_err());
        assert!(parse_btc_amount("-0.1").is_err());
        assert!(parse_btc_amount("0.000000001").is_err());
    }

    #[test_case("livenet", WalletNetwork::Livenet ; "livenet")]
    #[test_case("mainnet", WalletNetwork::Livenet ; "mainnet alias")]
    #[test_case("Bitcoin", WalletNetwork::Livenet ; "bitcoin alias")]
    #[test_case(" testnet ", WalletNetwork::Testnet ; "testnet padded")]
    fn test_network_parse(input: &str, expected: WalletNetwork) {
        assert_eq!(input.parse::<WalletNetwork>().unwrap(), expected);
    }

    #[test]
    fn test_network_parse_unknown() {
        assert!("regtest".parse::<WalletNetwork>().is_err());
    }

    #[test]
    fn test_network_mapping() {
        assert_eq!(WalletNetwork::Livenet.to_bitcoin(), bitcoin::Network::Bitcoin);
        assert_eq!(WalletNetwork::Testnet.to_bitcoin(), bitcoin::Network::Testnet);
    }

    #[test]
    fn test_network_serde_spelling() {
        assert_eq!(serde_json::to_string(&WalletNetwork::Livenet).unwrap(), "\"livenet\"");
        let parsed: WalletNetwork = serde_json::from_str("\"testnet\"").unwrap();
        assert_eq!(parsed, WalletNetwork::Testnet);
    }

    #[test]
    fn test_address_type_from_str() {
        assert_eq!(AddressType::from("P2SH"), AddressType::P2sh);
        assert_eq!(AddressType::from("P2PKH"), AddressType::P2pkh);
        assert_eq!(
            AddressType::from("P2WSH"),
            AddressType::Unsupported("P2WSH".to_string())
        );
        assert_eq!(AddressType::from("P2WSH").to_string(), "P2WSH");
    }

    #[test]
    fn test_derivation_strategy_parse() {
        assert_eq!("BIP45".parse::<DerivationStrategy>().unwrap(), DerivationStrategy::Bip45);
        assert_eq!("BIP44".parse::<DerivationStrategy>().unwrap(), DerivationStrategy::Bip44);
        assert!(matches!(
            "BIP48".parse::<DerivationStrategy>(),
            Err(RecoveryError::UnsupportedBackupFormat(_))
        ));
    }
}
