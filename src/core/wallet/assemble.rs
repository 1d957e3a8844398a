// filepath: src/core/wallet/assemble.rs
use std::collections::HashSet;
use tracing::{info, warn};

use crate::core::domain::{AddressType, BackupSource, Copayer, Credential, Wallet};
use crate::core::errors::RecoveryError;

/// Merges per-copayer credentials into one wallet.
///
/// Empty slots are dropped; the rest keep their input order, which fixes combination numbering
/// during derivation. Wallet-level fields come from the first credential and every other
/// credential must agree with it.
pub fn assemble(credentials: Vec<Option<Credential>>) -> Result<Wallet, RecoveryError> {
    let credentials: Vec<Credential> = credentials.into_iter().flatten().collect();
    let first = credentials.first().ok_or(RecoveryError::NoCredentialsProvided)?;

    if credentials.iter().any(|c| c.source != first.source) {
        return Err(RecoveryError::MixedBackupSources);
    }
    if first.m == 0 || first.m > first.n {
        return Err(RecoveryError::InvalidWalletConfig { m: first.m, n: first.n });
    }
    for c in &credentials[1..] {
        check_same_layout(first, c)?;
    }

    if first.source == BackupSource::Backup {
        let expected = first.wallet_id.clone().unwrap_or_default();
        for c in &credentials {
            let actual = c.wallet_id.clone().unwrap_or_default();
            if actual != expected {
                return Err(RecoveryError::WalletIdMismatch { expected, actual });
            }
        }

        let mut seen = HashSet::new();
        for id in credentials.iter().filter_map(|c| c.copayer_id.as_deref()) {
            if !seen.insert(id) {
                return Err(RecoveryError::DuplicateCopayer { copayer_id: id.to_string() });
            }
        }
    }

    let wallet = Wallet {
        wallet_id: first.wallet_id.clone(),
        derivation_strategy: first.derivation_strategy,
        address_type: first.address_type.clone(),
        m: first.m,
        n: first.n,
        network: first.network,
        source: first.source,
        copayers: credentials
            .iter()
            .map(|c| Copayer { copayer_id: c.copayer_id.clone(), xpriv: c.xpriv })
            .collect(),
    };

    if wallet.address_type == AddressType::P2sh && (wallet.copayers.len() as u32) < wallet.n {
        warn!(
            "Only {} of {} copayers supplied; multisig addresses cannot be reproduced without every copayer key",
            wallet.copayers.len(),
            wallet.n
        );
    }
    info!(
        wallet_id = ?wallet.wallet_id,
        m = wallet.m,
        n = wallet.n,
        network = %wallet.network,
        strategy = %wallet.derivation_strategy,
        copayers = wallet.copayers.len(),
        "Recovering wallet"
    );
    Ok(wallet)
}

fn check_same_layout(first: &Credential, other: &Credential) -> Result<(), RecoveryError> {
    if (other.m, other.n) != (first.m, first.n) {
        return Err(RecoveryError::WalletConfigMismatch {
            expected_m: first.m,
            expected_n: first.n,
            actual_m: other.m,
            actual_n: other.n,
        });
    }
    if other.network != first.network {
        return Err(RecoveryError::NetworkMismatch {
            expected: first.network.to_string(),
            actual: other.network.to_string(),
        });
    }
    if other.derivation_strategy != first.derivation_strategy {
        return Err(RecoveryError::InconsistentBackups {
            field: "derivation strategy",
            expected: first.derivation_strategy.to_string(),
            actual: other.derivation_strategy.to_string(),
        });
    }
    if other.address_type != first.address_type {
        return Err(RecoveryError::InconsistentBackups {
            field: "address type",
            expected: first.address_type.to_string(),
            actual: other.address_type.to_string(),
        });
    }
    Ok(())
}
