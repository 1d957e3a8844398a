//! Aliases and helpers for secret buffers that must be zeroized on drop.
use zeroize::Zeroizing;

/// Secret byte buffer, zeroed when dropped.
pub type SecretVec = Zeroizing<Vec<u8>>;

/// Secret text (passwords, mnemonic words, serialized xprv), zeroed when dropped.
pub type SecretString = Zeroizing<String>;

/// Reads a secret from the environment. Unset and empty variables both yield `None`.
pub fn secret_from_env(var: &str) -> Option<SecretString> {
    std::env::var(var).ok().filter(|v| !v.is_empty()).map(Zeroizing::new)
}

/// Whitespace-normalized copy of a mnemonic phrase: single spaces, no padding.
pub fn normalize_words(words: &str) -> SecretString {
    Zeroizing::new(words.split_whitespace().collect::<Vec<_>>().join(" "))
}
