use bitcoin::Amount;

/// Errors surfaced by the recovery engine.
///
/// Every variant is terminal: nothing in the engine retries. Messages carry the offending
/// field and the expected vs. actual value, never key material or passwords.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// The backup text is not the brace-delimited JSON payload.
    #[error("Invalid backup format: {0}. Copy only the text within (and including) the {{ }} brackets")]
    InvalidBackupFormat(String),

    #[error("Incorrect backup password")]
    WrongBackupPassword,

    /// Payload predates the standardized layout (no `n` field).
    #[error("Backup format not recognized: {0}")]
    UnsupportedBackupFormat(String),

    #[error("The wallet configuration ({actual_m}-of-{actual_n}) does not match the values provided ({expected_m}-of-{expected_n})")]
    WalletConfigMismatch {
        expected_m: u32,
        expected_n: u32,
        actual_m: u32,
        actual_n: u32,
    },

    #[error("Incorrect network: expected {expected}, backup is for {actual}")]
    NetworkMismatch { expected: String, actual: String },

    #[error("The backup does not have a private key")]
    MissingPrivateKey,

    #[error("Can not decrypt private key: {0}")]
    PrivateKeyDecryptionFailed(String),

    #[error("Mnemonic wallet seed is not valid: {0}")]
    InvalidMnemonic(String),

    #[error("No backup data provided")]
    NoCredentialsProvided,

    #[error("Mixed backup sources not supported")]
    MixedBackupSources,

    #[error("Backups do not belong to the same wallet: expected {expected}, found {actual}")]
    WalletIdMismatch { expected: String, actual: String },

    #[error("Backups disagree on the {field}: {expected} in the first, {actual} in another")]
    InconsistentBackups {
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Some of the backups belong to the same copayer ({copayer_id})")]
    DuplicateCopayer { copayer_id: String },

    #[error("Address type not supported: {0}")]
    UnsupportedAddressType(String),

    #[error("Invalid wallet configuration: {m}-of-{n}")]
    InvalidWalletConfig { m: u32, n: u32 },

    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    #[error("Please enter a valid destination address: {0}")]
    InvalidDestinationAddress(String),

    #[error("Incorrect destination address network: {address} is not a {expected} address")]
    DestinationNetworkMismatch { address: String, expected: String },

    #[error("Funds are insufficient to complete the transaction (balance {balance}, fee {fee})")]
    InsufficientFunds { balance: Amount, fee: Amount },

    #[error("Could not build tx: {0}")]
    TransactionBuildFailure(String),

    #[error("Indexer unavailable at {endpoint}: {reason}")]
    IndexerUnavailable { endpoint: String, reason: String },

    #[error("Recovery cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RecoveryError {
    /// Errors caused by what the operator supplied (backups, passwords, amounts, addresses).
    pub fn is_user_input_error(&self) -> bool {
        matches!(
            self,
            RecoveryError::InvalidBackupFormat(_)
                | RecoveryError::WrongBackupPassword
                | RecoveryError::UnsupportedBackupFormat(_)
                | RecoveryError::WalletConfigMismatch { .. }
                | RecoveryError::NetworkMismatch { .. }
                | RecoveryError::MissingPrivateKey
                | RecoveryError::PrivateKeyDecryptionFailed(_)
                | RecoveryError::InvalidMnemonic(_)
                | RecoveryError::NoCredentialsProvided
                | RecoveryError::MixedBackupSources
                | RecoveryError::WalletIdMismatch { .. }
                | RecoveryError::InconsistentBackups { .. }
                | RecoveryError::DuplicateCopayer { .. }
                | RecoveryError::InvalidWalletConfig { .. }
                | RecoveryError::InvalidDestinationAddress(_)
                | RecoveryError::DestinationNetworkMismatch { .. }
                | RecoveryError::InsufficientFunds { .. }
        )
    }

    /// Faults of the remote indexer or the path to it.
    pub fn is_indexer_error(&self) -> bool {
        matches!(self, RecoveryError::IndexerUnavailable { .. })
    }
}
