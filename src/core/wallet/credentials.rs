// filepath: src/core/wallet/credentials.rs
//! Turns raw operator input (encrypted JSON backups or mnemonic phrases) into signer credentials.

use bip39::Mnemonic;
use bitcoin::bip32::Xpriv;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::core::domain::{AddressType, BackupSource, Credential, DerivationStrategy, WalletNetwork};
use crate::core::errors::RecoveryError;
use crate::core::wallet::backup::{BackupPayload, BackupSchema, PrivateKeyMaterial};
use crate::crypto::sjcl;
use crate::security::redaction::redact_body;
use crate::security::secret::{normalize_words, SecretString};

/// One operator-supplied backup: the text plus the passwords that unlock it.
///
/// For mnemonics `password` is the BIP39 passphrase and `private_key_password` is unused.
pub struct RawBackup {
    pub content: SecretString,
    pub password: SecretString,
    pub private_key_password: Option<SecretString>,
}

impl RawBackup {
    pub fn new(content: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            content: Zeroizing::new(content.into()),
            password: Zeroizing::new(password.into()),
            private_key_password: None,
        }
    }

    pub fn with_private_key_password(mut self, password: impl Into<String>) -> Self {
        self.private_key_password = Some(Zeroizing::new(password.into()));
        self
    }
}

impl fmt::Debug for RawBackup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBackup")
            .field("content", &redact_body(&self.content))
            .field("password", &redact_body(&self.password))
            .field("private_key_password", &self.private_key_password.as_ref().map(|p| redact_body(p)))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupFormat {
    EncryptedJson,
    Mnemonic,
}

/// Picks the decoder from the first significant character: `{` means an encrypted JSON backup,
/// anything else a mnemonic. Blank input has no format.
pub fn detect_format(content: &str) -> Option<BackupFormat> {
    match content.trim_start().chars().next() {
        None => None,
        Some('{') => Some(BackupFormat::EncryptedJson),
        Some(_) => Some(BackupFormat::Mnemonic),
    }
}

/// Extracts the credential of one raw backup. Blank input yields `Ok(None)`.
pub fn extract(
    raw: &RawBackup,
    m: u32,
    n: u32,
    network: WalletNetwork,
) -> Result<Option<Credential>, RecoveryError> {
    match detect_format(&raw.content) {
        None => Ok(None),
        Some(BackupFormat::EncryptedJson) => from_encrypted_backup(
            raw.content.trim(),
            &raw.password,
            raw.private_key_password.as_ref().map(|p| p.as_str()),
            m,
            n,
            network,
        )
        .map(Some),
        Some(BackupFormat::Mnemonic) => from_mnemonic(&raw.content, &raw.password, m, n, network).map(Some),
    }
}

/// Decrypts and validates a Copay JSON backup.
pub fn from_encrypted_backup(
    raw_text: &str,
    password: &str,
    private_key_password: Option<&str>,
    expected_m: u32,
    expected_n: u32,
    expected_network: WalletNetwork,
) -> Result<Credential, RecoveryError> {
    serde_json::from_str::<serde_json::Value>(raw_text)
        .map_err(|e| RecoveryError::InvalidBackupFormat(e.to_string()))?;

    let plaintext = sjcl::decrypt(password, raw_text).map_err(|e| {
        debug!("Backup envelope rejected: {}", e);
        RecoveryError::WrongBackupPassword
    })?;
    let payload = BackupPayload::parse(&plaintext)?;

    if payload.schema == BackupSchema::PreStandard {
        return Err(RecoveryError::UnsupportedBackupFormat(
            "Copay beta backups older than 0.10 are not supported".into(),
        ));
    }
    let (actual_m, actual_n) = (payload.m.unwrap_or(0), payload.n.unwrap_or(0));
    if actual_m != expected_m || actual_n != expected_n {
        return Err(RecoveryError::WalletConfigMismatch { expected_m, expected_n, actual_m, actual_n });
    }
    let actual_network = payload.network.as_deref().unwrap_or("<missing>");
    if actual_network != expected_network.as_str() {
        return Err(RecoveryError::NetworkMismatch {
            expected: expected_network.to_string(),
            actual: actual_network.to_string(),
        });
    }

    let xpriv_text = match &payload.key_material {
        None => return Err(RecoveryError::MissingPrivateKey),
        Some(PrivateKeyMaterial::Plain(text)) => text.clone(),
        Some(PrivateKeyMaterial::Encrypted(envelope)) => {
            let key_password = private_key_password.ok_or_else(|| {
                RecoveryError::PrivateKeyDecryptionFailed("no private key password supplied".into())
            })?;
            sjcl::decrypt(key_password, envelope)
                .map_err(|e| RecoveryError::PrivateKeyDecryptionFailed(e.to_string()))?
        }
    };
    let xpriv = Xpriv::from_str(xpriv_text.trim())
        .map_err(|e| RecoveryError::InvalidBackupFormat(format!("xPrivKey: {}", e)))?;

    let derivation_strategy = payload.derivation_strategy()?;
    let address_type = payload.address_type();
    info!(
        wallet_id = ?payload.wallet_id,
        copayer_id = ?payload.copayer_id,
        strategy = %derivation_strategy,
        address_type = %address_type,
        "Backup decrypted"
    );

    Ok(Credential {
        wallet_id: payload.wallet_id.clone(),
        copayer_id: payload.copayer_id.clone(),
        xpriv,
        derivation_strategy,
        address_type,
        m: expected_m,
        n: expected_n,
        network: expected_network,
        source: BackupSource::Backup,
    })
}

/// Builds a credential from a BIP39 phrase (any wordlist) and optional passphrase.
pub fn from_mnemonic(
    words: &str,
    passphrase: &str,
    expected_m: u32,
    expected_n: u32,
    network: WalletNetwork,
) -> Result<Credential, RecoveryError> {
    let words = normalize_words(words);
    let mnemonic = Mnemonic::parse(words.as_str())
        .map_err(|e| RecoveryError::InvalidMnemonic(e.to_string()))?;
    let seed = Zeroizing::new(mnemonic.to_seed(passphrase));
    let xpriv = Xpriv::new_master(network.to_bitcoin(), &seed[..])
        .map_err(|e| RecoveryError::InvalidMnemonic(e.to_string()))?;

    let address_type = if expected_n == 1 { AddressType::P2pkh } else { AddressType::P2sh };
    info!(language = ?mnemonic.language(), address_type = %address_type, "Mnemonic accepted");

    Ok(Credential {
        wallet_id: None,
        copayer_id: None,
        xpriv,
        derivation_strategy: DerivationStrategy::Bip44,
        address_type,
        m: expected_m,
        n: expected_n,
        network,
        source: BackupSource::Mnemonic,
    })
}
