//! Address generation for recovered wallets
//!
//! Two layouts are supported:
//! - P2SH multisig: `OP_m <sorted pubkeys> OP_n OP_CHECKMULTISIG`, wrapped in P2SH (3xxx / 2xxx)
//! - P2PKH: compressed single key (1xxx / m,nxxx)

use crate::core::derivation::{DerivationCombination, DerivationInfo};
use crate::core::domain::{AddressType, Wallet, WalletNetwork};
use crate::core::errors::RecoveryError;
use crate::crypto::hd;
use bitcoin::address::{Address, NetworkUnchecked};
use bitcoin::blockdata::opcodes::all::OP_CHECKMULTISIG;
use bitcoin::blockdata::script::{Builder, ScriptBuf};
use bitcoin::secp256k1::{PublicKey as Secp256k1PublicKey, Secp256k1, SecretKey};
use bitcoin::PublicKey as BitcoinPublicKey;
use std::fmt;
use std::str::FromStr;
use tracing::trace;

/// Largest `n` a bare `OP_n` push can express.
const MAX_MULTISIG_KEYS: usize = 16;

/// Address wrapper helpers.
pub struct BitcoinAddress;

impl BitcoinAddress {
    /// Compressed P2PKH address.
    pub fn p2pkh(public_key: &BitcoinPublicKey, network: WalletNetwork) -> Address {
        Address::p2pkh(public_key, network.to_bitcoin())
    }

    /// m-of-n redeem script with public keys sorted by their compressed serialization.
    pub fn multisig_redeem_script(
        m: u32,
        public_keys: &[BitcoinPublicKey],
    ) -> Result<ScriptBuf, RecoveryError> {
        let n = public_keys.len();
        if m == 0 || m as usize > n || n > MAX_MULTISIG_KEYS {
            return Err(RecoveryError::InvalidWalletConfig { m, n: n as u32 });
        }

        let mut sorted = public_keys.to_vec();
        sorted.sort_by_key(|pk| pk.inner.serialize());

        let mut builder = Builder::new().push_int(m as i64);
        for pk in &sorted {
            builder = builder.push_key(pk);
        }
        Ok(builder.push_int(n as i64).push_opcode(OP_CHECKMULTISIG).into_script())
    }

    pub fn p2sh(redeem_script: &ScriptBuf, network: WalletNetwork) -> Result<Address, RecoveryError> {
        Address::p2sh(redeem_script, network.to_bitcoin())
            .map_err(|e| RecoveryError::KeyDerivation(format!("P2SH address: {}", e)))
    }

    /// Parses an address without committing to a network.
    pub fn parse_unchecked(address: &str) -> Result<Address<NetworkUnchecked>, RecoveryError> {
        Address::from_str(address.trim())
            .map_err(|e| RecoveryError::InvalidDestinationAddress(format!("{}: {}", address, e)))
    }

    /// Accepts the address only if it is valid on `network`.
    pub fn require_network(
        address: Address<NetworkUnchecked>,
        network: WalletNetwork,
    ) -> Result<Address, RecoveryError> {
        let shown = address.clone().assume_checked().to_string();
        address.require_network(network.to_bitcoin()).map_err(|_| {
            RecoveryError::DestinationNetworkMismatch { address: shown, expected: network.to_string() }
        })
    }
}

/// The address at `index` of one derivation combination, with the keys that control it.
pub struct DerivedAddress {
    pub address: Address,
    pub index: u32,
    /// Copayer order, not redeem-script order.
    pub public_keys: Vec<BitcoinPublicKey>,
    pub private_keys: Vec<SecretKey>,
    pub redeem_script: Option<ScriptBuf>,
    pub derivation: Vec<DerivationInfo>,
}

impl Drop for DerivedAddress {
    fn drop(&mut self) {
        for key in self.private_keys.iter_mut() {
            key.non_secure_erase();
        }
    }
}

impl fmt::Debug for DerivedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedAddress")
            .field("address", &self.address.to_string())
            .field("index", &self.index)
            .field("public_keys", &self.public_keys)
            .field("private_keys", &format_args!("<{} redacted>", self.private_keys.len()))
            .field("derivation", &self.derivation)
            .finish()
    }
}

/// Derives the address at `index` for one combination. Pure: same inputs, same address.
pub fn derive_address(
    wallet: &Wallet,
    combination: &DerivationCombination,
    index: u32,
) -> Result<DerivedAddress, RecoveryError> {
    let secp = Secp256k1::signing_only();

    let mut private_keys = Vec::with_capacity(combination.candidates.len());
    let mut public_keys = Vec::with_capacity(combination.candidates.len());
    for candidate in &combination.candidates {
        let mut child = hd::derive_child(&secp, &candidate.xpriv, index)?;
        let secret = child.private_key;
        child.private_key.non_secure_erase();
        public_keys.push(BitcoinPublicKey::new(Secp256k1PublicKey::from_secret_key(&secp, &secret)));
        private_keys.push(secret);
    }

    let (address, redeem_script) = match &wallet.address_type {
        AddressType::P2sh => {
            let script = BitcoinAddress::multisig_redeem_script(wallet.m, &public_keys)?;
            (BitcoinAddress::p2sh(&script, wallet.network)?, Some(script))
        }
        AddressType::P2pkh => {
            if public_keys.len() != 1 {
                return Err(RecoveryError::UnsupportedAddressType(format!(
                    "P2PKH needs exactly one key, combination has {}",
                    public_keys.len()
                )));
            }
            (BitcoinAddress::p2pkh(&public_keys[0], wallet.network), None)
        }
        AddressType::Unsupported(name) => {
            return Err(RecoveryError::UnsupportedAddressType(name.clone()));
        }
    };
    trace!(index, address = %address, "Derived address");

    Ok(DerivedAddress {
        address,
        index,
        public_keys,
        private_keys,
        redeem_script,
        derivation: combination.info(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::derivation::expand;
    use crate::core::domain::{BackupSource, Copayer, DerivationStrategy};
    use bitcoin::bip32::Xpriv;
    use bitcoin::Network;

    fn wallet(address_type: AddressType, m: u32, seeds: &[u8], network: WalletNetwork) -> Wallet {
        Wallet {
            wallet_id: None,
            derivation_strategy: DerivationStrategy::Bip45,
            address_type,
            m,
            n: seeds.len() as u32,
            network,
            source: BackupSource::Backup,
            copayers: seeds
                .iter()
                .map(|s| Copayer {
                    copayer_id: None,
                    xpriv: Xpriv::new_master(network.to_bitcoin(), &[*s; 32]).unwrap(),
                })
                .collect(),
        }
    }

    fn key(byte: u8) -> BitcoinPublicKey {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[byte; 32]).unwrap();
        BitcoinPublicKey::new(Secp256k1PublicKey::from_secret_key(&secp, &sk))
    }

    #[test]
    fn test_redeem_script_is_order_independent() {
        let (a, b, c) = (key(1), key(2), key(3));
        let s1 = BitcoinAddress::multisig_redeem_script(2, &[a, b, c]).unwrap();
        let s2 = BitcoinAddress::multisig_redeem_script(2, &[c, a, b]).unwrap();
        assert_eq!(s1, s2);

        let bytes = s1.as_bytes();
        assert_eq!(bytes[0], 0x52); // OP_2
        assert_eq!(bytes[bytes.len() - 2], 0x53); // OP_3
        assert_eq!(bytes[bytes.len() - 1], 0xae); // OP_CHECKMULTISIG
        assert_eq!(bytes.len(), 1 + 3 * 34 + 2);
    }

    #[test]
    fn test_redeem_script_rejects_bad_threshold() {
        assert!(matches!(
            BitcoinAddress::multisig_redeem_script(3, &[key(1), key(2)]),
            Err(RecoveryError::InvalidWalletConfig { m: 3, n: 2 })
        ));
        assert!(BitcoinAddress::multisig_redeem_script(0, &[key(1)]).is_err());
    }

    #[test]
    fn test_p2sh_address_prefix_by_network() {
        let livenet = wallet(AddressType::P2sh, 2, &[1, 2], WalletNetwork::Livenet);
        let combos = expand(&livenet).unwrap();
        let derived = derive_address(&livenet, &combos[0], 0).unwrap();
        assert!(derived.address.to_string().starts_with('3'));
        assert!(derived.redeem_script.is_some());
        assert_eq!(derived.public_keys.len(), 2);

        let testnet = wallet(AddressType::P2sh, 2, &[1, 2], WalletNetwork::Testnet);
        let combos = expand(&testnet).unwrap();
        let derived = derive_address(&testnet, &combos[0], 0).unwrap();
        assert!(derived.address.to_string().starts_with('2'));
    }

    #[test]
    fn test_derive_address_is_pure() {
        let w = wallet(AddressType::P2sh, 1, &[4, 5], WalletNetwork::Livenet);
        let combos = expand(&w).unwrap();
        let a = derive_address(&w, &combos[0], 7).unwrap();
        let b = derive_address(&w, &combos[0], 7).unwrap();
        let c = derive_address(&w, &combos[0], 8).unwrap();
        assert_eq!(a.address, b.address);
        assert_ne!(a.address, c.address);
        assert_eq!(a.index, 7);
    }

    #[test]
    fn test_p2pkh_single_key() {
        let w = wallet(AddressType::P2pkh, 1, &[6], WalletNetwork::Livenet);
        let combos = expand(&w).unwrap();
        let derived = derive_address(&w, &combos[0], 0).unwrap();
        assert!(derived.address.to_string().starts_with('1'));
        assert_eq!(
            derived.address,
            Address::p2pkh(&derived.public_keys[0], Network::Bitcoin)
        );
        assert!(derived.redeem_script.is_none());
    }

    #[test]
    fn test_p2pkh_with_two_keys_is_rejected() {
        let w = wallet(AddressType::P2pkh, 1, &[6, 7], WalletNetwork::Livenet);
        let combos = expand(&w).unwrap();
        assert!(matches!(
            derive_address(&w, &combos[0], 0),
            Err(RecoveryError::UnsupportedAddressType(_))
        ));
    }

    #[test]
    fn test_unsupported_address_type() {
        let w = wallet(AddressType::Unsupported("P2WSH".into()), 1, &[6], WalletNetwork::Livenet);
        let combos = expand(&w).unwrap();
        assert!(matches!(
            derive_address(&w, &combos[0], 0),
            Err(RecoveryError::UnsupportedAddressType(name)) if name == "P2WSH"
        ));
    }

    #[test]
    fn test_index_out_of_range() {
        let w = wallet(AddressType::P2sh, 1, &[6], WalletNetwork::Livenet);
        let combos = expand(&w).unwrap();
        assert!(matches!(
            derive_address(&w, &combos[0], 0x8000_0000),
            Err(RecoveryError::KeyDerivation(_))
        ));
    }

    #[test]
    fn test_destination_parsing() {
        let unchecked = BitcoinAddress::parse_unchecked("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa").unwrap();
        assert!(BitcoinAddress::require_network(unchecked.clone(), WalletNetwork::Livenet).is_ok());
        assert!(matches!(
            BitcoinAddress::require_network(unchecked, WalletNetwork::Testnet),
            Err(RecoveryError::DestinationNetworkMismatch { .. })
        ));
        assert!(matches!(
            BitcoinAddress::parse_unchecked("not-an-address"),
            Err(RecoveryError::InvalidDestinationAddress(_))
        ));
    }
}
