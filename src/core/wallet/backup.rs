//! Decrypted Copay backup payloads.
//!
//! The plaintext inside a backup envelope went through several layouts over the wallet's
//! lifetime. They are classified up front so the extractor can reject or default fields
//! explicitly instead of probing optional keys inline.

use crate::core::domain::{AddressType, DerivationStrategy};
use crate::core::errors::RecoveryError;
use serde::Deserialize;
use zeroize::Zeroizing;

/// Layout generation of a decrypted payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupSchema {
    /// Copay beta (< 0.10): no `n` field. Not recoverable here.
    PreStandard,
    /// Shared wallets from before derivation strategies were recorded: implicitly BIP45 / P2SH.
    Bip45Legacy,
    /// Explicit `derivationStrategy`, optional `addressType` (P2SH when absent).
    Standard {
        derivation_strategy: String,
        address_type: Option<String>,
    },
}

/// Private key field of a payload. Encrypted material wins when both are present.
pub enum PrivateKeyMaterial {
    Plain(Zeroizing<String>),
    /// Nested SJCL envelope (JSON text) under the private-key password.
    Encrypted(String),
}

impl std::fmt::Debug for PrivateKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrivateKeyMaterial::Plain(_) => f.write_str("Plain(<redacted>)"),
            PrivateKeyMaterial::Encrypted(_) => f.write_str("Encrypted(..)"),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPayload {
    #[serde(default)]
    wallet_id: Option<String>,
    #[serde(default)]
    copayer_id: Option<String>,
    #[serde(default)]
    m: Option<u32>,
    #[serde(default)]
    n: Option<u32>,
    #[serde(default)]
    network: Option<String>,
    #[serde(default)]
    x_priv_key: Option<String>,
    #[serde(default)]
    x_priv_key_encrypted: Option<serde_json::Value>,
    #[serde(default)]
    derivation_strategy: Option<String>,
    #[serde(default)]
    address_type: Option<String>,
}

/// Fields of a decrypted backup that recovery cares about.
#[derive(Debug)]
pub struct BackupPayload {
    pub wallet_id: Option<String>,
    pub copayer_id: Option<String>,
    pub m: Option<u32>,
    pub n: Option<u32>,
    pub network: Option<String>,
    pub schema: BackupSchema,
    pub key_material: Option<PrivateKeyMaterial>,
}

impl BackupPayload {
    /// Parses the plaintext of a backup envelope.
    pub fn parse(plaintext: &str) -> Result<Self, RecoveryError> {
        let raw: RawPayload = serde_json::from_str(plaintext)
            .map_err(|e| RecoveryError::InvalidBackupFormat(format!("backup payload: {}", e)))?;

        let schema = match (raw.n, non_empty(raw.derivation_strategy)) {
            (None, _) => BackupSchema::PreStandard,
            (Some(_), None) => BackupSchema::Bip45Legacy,
            (Some(_), Some(strategy)) => BackupSchema::Standard {
                derivation_strategy: strategy,
                address_type: non_empty(raw.address_type),
            },
        };

        let encrypted = match raw.x_priv_key_encrypted {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) if s.is_empty() => None,
            Some(serde_json::Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        };
        let key_material = match (encrypted, non_empty(raw.x_priv_key)) {
            (Some(envelope), _) => Some(PrivateKeyMaterial::Encrypted(envelope)),
            (None, Some(plain)) => Some(PrivateKeyMaterial::Plain(Zeroizing::new(plain))),
            (None, None) => None,
        };

        Ok(Self {
            wallet_id: non_empty(raw.wallet_id),
            copayer_id: non_empty(raw.copayer_id),
            m: raw.m,
            n: raw.n,
            network: raw.network,
            schema,
            key_material,
        })
    }

    pub fn derivation_strategy(&self) -> Result<DerivationStrategy, RecoveryError> {
        match &self.schema {
            BackupSchema::PreStandard => Err(RecoveryError::UnsupportedBackupFormat(
                "Copay beta backups older than 0.10 are not supported".into(),
            )),
            BackupSchema::Bip45Legacy => Ok(DerivationStrategy::Bip45),
            BackupSchema::Standard { derivation_strategy, .. } => derivation_strategy.parse(),
        }
    }

    pub fn address_type(&self) -> AddressType {
        match &self.schema {
            BackupSchema::Standard { address_type: Some(t), .. } => AddressType::from(t.as_str()),
            _ => AddressType::P2sh,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}
