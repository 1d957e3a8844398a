use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use crate::security::SecretVec;

/// PBKDF2-HMAC-SHA256, the derivation used for SJCL backup passwords.
///
/// The returned buffer is wiped on drop.
pub fn derive_pbkdf2_sha256(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    key_length: usize,
) -> SecretVec {
    debug!("Deriving {} byte key with PBKDF2 ({} iterations)", key_length, iterations);

    let mut key = Zeroizing::new(vec![0u8; key_length]);
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut key);
    key
}
