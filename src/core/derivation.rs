//! Derivation expansion
//!
//! For every branch path of the wallet's strategy, each copayer contributes its compliant
//! BIP32 key and, when it differs, the key produced by the legacy non-compliant derivation.
//! Every way of picking one key per copayer is a combination that may hold funds.

use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::secp256k1::Secp256k1;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::core::domain::{DerivationStrategy, Wallet, WalletNetwork};
use crate::core::errors::RecoveryError;
use crate::crypto::hd;

/// Copay shared wallets: receive and change branches under the cosigner index 2^31 - 1.
pub const BIP45_PATHS: [&str; 2] = ["m/45'/2147483647/0", "m/45'/2147483647/1"];
pub const BIP44_LIVENET_PATHS: [&str; 2] = ["m/44'/0'/0'/0", "m/44'/0'/0'/1"];
pub const BIP44_TESTNET_PATHS: [&str; 2] = ["m/44'/1'/0'/0", "m/44'/1'/0'/1"];

/// Branch paths to scan, in scan order.
pub fn paths_for(strategy: DerivationStrategy, network: WalletNetwork) -> &'static [&'static str] {
    match (strategy, network) {
        (DerivationStrategy::Bip45, _) => &BIP45_PATHS,
        (DerivationStrategy::Bip44, WalletNetwork::Livenet) => &BIP44_LIVENET_PATHS,
        (DerivationStrategy::Bip44, WalletNetwork::Testnet) => &BIP44_TESTNET_PATHS,
    }
}

/// Report-safe description of a candidate: which copayer, which path, which derivation mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivationInfo {
    pub copayer: usize,
    pub path: String,
    pub compliant: bool,
}

impl fmt::Display for DerivationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "copayer {} {} ({})",
            self.copayer,
            self.path,
            if self.compliant { "compliant" } else { "non-compliant" }
        )
    }
}

/// One copayer's branch key for one path.
#[derive(Clone)]
pub struct DerivationCandidate {
    /// 1-based position of the copayer in the wallet.
    pub copayer_index: usize,
    pub path: String,
    pub compliant: bool,
    pub xpriv: Xpriv,
}

impl DerivationCandidate {
    pub fn info(&self) -> DerivationInfo {
        DerivationInfo {
            copayer: self.copayer_index,
            path: self.path.clone(),
            compliant: self.compliant,
        }
    }
}

impl Drop for DerivationCandidate {
    fn drop(&mut self) {
        self.xpriv.private_key.non_secure_erase();
    }
}

impl fmt::Debug for DerivationCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivationCandidate")
            .field("copayer_index", &self.copayer_index)
            .field("path", &self.path)
            .field("compliant", &self.compliant)
            .finish_non_exhaustive()
    }
}

/// Exactly one candidate per copayer, in copayer order, all on the same path.
#[derive(Debug, Clone)]
pub struct DerivationCombination {
    pub path: String,
    pub candidates: Vec<DerivationCandidate>,
}

impl DerivationCombination {
    pub fn info(&self) -> Vec<DerivationInfo> {
        self.candidates.iter().map(DerivationCandidate::info).collect()
    }
}

/// Expands the wallet into every derivation combination.
///
/// Order: paths in table order; within a path the first copayer varies slowest and compliant
/// candidates come before non-compliant ones.
pub fn expand(wallet: &Wallet) -> Result<Vec<DerivationCombination>, RecoveryError> {
    let secp = Secp256k1::signing_only();
    let mut combinations = Vec::new();

    for path_str in paths_for(wallet.derivation_strategy, wallet.network) {
        let path = DerivationPath::from_str(path_str)
            .map_err(|e| RecoveryError::KeyDerivation(format!("{}: {}", path_str, e)))?;

        let mut groups: Vec<Vec<DerivationCandidate>> = Vec::with_capacity(wallet.copayers.len());
        for (i, copayer) in wallet.copayers.iter().enumerate() {
            let compliant = hd::derive_compliant(&secp, &copayer.xpriv, &path)?;
            let legacy = hd::derive_non_compliant(&secp, &copayer.xpriv, &path)?;

            let mut group = vec![DerivationCandidate {
                copayer_index: i + 1,
                path: path_str.to_string(),
                compliant: true,
                xpriv: compliant,
            }];
            if legacy.encode() != compliant.encode() {
                debug!(copayer = i + 1, path = %path_str, "Non-compliant derivation differs");
                group.push(DerivationCandidate {
                    copayer_index: i + 1,
                    path: path_str.to_string(),
                    compliant: false,
                    xpriv: legacy,
                });
            }
            groups.push(group);
        }

        let before = combinations.len();
        combinations.extend(cartesian(groups).into_iter().map(|candidates| DerivationCombination {
            path: path_str.to_string(),
            candidates,
        }));
        debug!(path = %path_str, combinations = combinations.len() - before, "Path expanded");
    }

    Ok(combinations)
}

fn cartesian(groups: Vec<Vec<DerivationCandidate>>) -> Vec<Vec<DerivationCandidate>> {
    let mut product: Vec<Vec<DerivationCandidate>> = vec![Vec::new()];
    for group in groups {
        let mut next = Vec::with_capacity(product.len() * group.len());
        for prefix in &product {
            for candidate in &group {
                let mut combo = prefix.clone();
                combo.push(candidate.clone());
                next.push(combo);
            }
        }
        product = next;
    }
    product
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{AddressType, BackupSource, Copayer};
    use bitcoin::secp256k1::SecretKey;
    use bitcoin::Network;
    use pretty_assertions::assert_eq;

    fn xpriv_with_key(key: [u8; 32]) -> Xpriv {
        let mut xpriv = Xpriv::new_master(Network::Bitcoin, &[9u8; 32]).unwrap();
        xpriv.private_key = SecretKey::from_slice(&key).unwrap();
        xpriv
    }

    fn leading_zero_key(fill: u8) -> Xpriv {
        let mut key = [fill; 32];
        key[0] = 0;
        xpriv_with_key(key)
    }

    fn wallet(strategy: DerivationStrategy, copayers: Vec<Xpriv>) -> Wallet {
        let n = copayers.len() as u32;
        Wallet {
            wallet_id: Some("w".into()),
            derivation_strategy: strategy,
            address_type: AddressType::P2sh,
            m: 1,
            n,
            network: WalletNetwork::Livenet,
            source: BackupSource::Backup,
            copayers: copayers
                .into_iter()
                .map(|xpriv| Copayer { copayer_id: None, xpriv })
                .collect(),
        }
    }

    #[test]
    fn test_path_table() {
        assert_eq!(paths_for(DerivationStrategy::Bip45, WalletNetwork::Testnet), &BIP45_PATHS[..]);
        assert_eq!(
            paths_for(DerivationStrategy::Bip44, WalletNetwork::Livenet),
            &["m/44'/0'/0'/0", "m/44'/0'/0'/1"][..]
        );
        assert_eq!(
            paths_for(DerivationStrategy::Bip44, WalletNetwork::Testnet),
            &["m/44'/1'/0'/0", "m/44'/1'/0'/1"][..]
        );
    }

    #[test]
    fn test_collapsed_candidates_give_one_combination_per_path() {
        let w = wallet(
            DerivationStrategy::Bip45,
            vec![xpriv_with_key([0x11; 32]), xpriv_with_key([0x12; 32])],
        );
        let combos = expand(&w).unwrap();
        assert_eq!(combos.len(), 2);
        assert_eq!(combos[0].path, BIP45_PATHS[0]);
        assert_eq!(combos[1].path, BIP45_PATHS[1]);
        for combo in &combos {
            assert_eq!(combo.candidates.len(), 2);
            assert!(combo.candidates.iter().all(|c| c.compliant));
        }
    }

    #[test]
    fn test_divergent_candidates_double_per_copayer() {
        let w = wallet(
            DerivationStrategy::Bip45,
            vec![leading_zero_key(0x21), leading_zero_key(0x22)],
        );
        let combos = expand(&w).unwrap();
        // 2^2 per path, two paths
        assert_eq!(combos.len(), 8);

        let flags: Vec<(bool, bool)> = combos[..4]
            .iter()
            .map(|c| (c.candidates[0].compliant, c.candidates[1].compliant))
            .collect();
        assert_eq!(flags, vec![(true, true), (true, false), (false, true), (false, false)]);
        assert!(combos[..4].iter().all(|c| c.path == BIP45_PATHS[0]));
        assert!(combos[4..].iter().all(|c| c.path == BIP45_PATHS[1]));
    }

    #[test]
    fn test_mixed_copayers() {
        let w = wallet(
            DerivationStrategy::Bip45,
            vec![xpriv_with_key([0x11; 32]), leading_zero_key(0x22)],
        );
        let combos = expand(&w).unwrap();
        assert_eq!(combos.len(), 4);
        assert_eq!(
            combos[0].info(),
            vec![
                DerivationInfo { copayer: 1, path: BIP45_PATHS[0].into(), compliant: true },
                DerivationInfo { copayer: 2, path: BIP45_PATHS[0].into(), compliant: true },
            ]
        );
        assert!(!combos[1].candidates[1].compliant);
    }

    #[test]
    fn test_bip44_combination_depth() {
        let w = wallet(DerivationStrategy::Bip44, vec![leading_zero_key(0x31)]);
        let combos = expand(&w).unwrap();
        assert_eq!(combos.len(), 4);
        assert!(combos.iter().all(|c| c.candidates[0].xpriv.depth == 4));
    }

    #[test]
    fn test_candidate_debug_hides_key() {
        let w = wallet(DerivationStrategy::Bip45, vec![xpriv_with_key([0x11; 32])]);
        let combos = expand(&w).unwrap();
        let dbg = format!("{:?}", combos[0]);
        assert!(!dbg.contains("xprv"));
        assert!(dbg.contains("copayer_index"));
    }
}
