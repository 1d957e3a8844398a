//! Stanford JavaScript Crypto Library (SJCL) envelopes.
//!
//! Copay exports its backups, and the `xPrivKeyEncrypted` field inside them, as SJCL JSON:
//!
//! ```text
//! {"iv":"..","v":1,"iter":10000,"ks":128,"ts":64,"mode":"ccm","adata":"","cipher":"aes","salt":"..","ct":".."}
//! ```
//!
//! The key is PBKDF2-HMAC-SHA256 over the UTF-8 password; the payload is AES-CCM with the tag
//! appended to `ct`. SJCL shortens the 16-byte iv to a `15 - L` byte CCM nonce, where `L` is the
//! smallest length-field size (at least 2) able to hold the plaintext length.

use crate::crypto::kdf::derive_pbkdf2_sha256;
use aes::{Aes128, Aes192, Aes256};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use ccm::aead::consts::{U11, U12, U13, U16, U7, U8, U9, U10};
use ccm::aead::{Aead, KeyInit, Payload};
use ccm::Ccm;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

/// SJCL writes padded standard base64 but older exports are not always padded.
const B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub const DEFAULT_ITERATIONS: u32 = 10_000;
const DEFAULT_KEY_SIZE: u32 = 128;
const DEFAULT_TAG_SIZE: u32 = 64;

#[derive(Debug, thiserror::Error)]
pub enum SjclError {
    #[error("malformed SJCL envelope: {0}")]
    Malformed(String),
    #[error("unsupported SJCL parameters: {0}")]
    UnsupportedParameters(String),
    #[error("SJCL authentication failed")]
    Authentication,
}

/// Picks the concrete `Ccm` instantiation for a runtime nonce length.
macro_rules! with_nonce {
    ($cipher:ty, $tag:ty, $key:expr, $nonce:expr, $payload:expr, $op:ident) => {
        match $nonce.len() {
            7 => $op::<Ccm<$cipher, $tag, U7>>($key, $nonce, $payload),
            8 => $op::<Ccm<$cipher, $tag, U8>>($key, $nonce, $payload),
            9 => $op::<Ccm<$cipher, $tag, U9>>($key, $nonce, $payload),
            10 => $op::<Ccm<$cipher, $tag, U10>>($key, $nonce, $payload),
            11 => $op::<Ccm<$cipher, $tag, U11>>($key, $nonce, $payload),
            12 => $op::<Ccm<$cipher, $tag, U12>>($key, $nonce, $payload),
            13 => $op::<Ccm<$cipher, $tag, U13>>($key, $nonce, $payload),
            other => Err(SjclError::UnsupportedParameters(format!("nonce length {}", other))),
        }
    };
}

/// Picks the tag size, then delegates to `with_nonce!`.
macro_rules! with_tag {
    ($cipher:ty, $tag_len:expr, $key:expr, $nonce:expr, $payload:expr, $op:ident) => {
        match $tag_len {
            8 => with_nonce!($cipher, U8, $key, $nonce, $payload, $op),
            12 => with_nonce!($cipher, U12, $key, $nonce, $payload, $op),
            16 => with_nonce!($cipher, U16, $key, $nonce, $payload, $op),
            other => Err(SjclError::UnsupportedParameters(format!("tag length {}", other))),
        }
    };
}

/// Wire layout of an SJCL ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SjclEnvelope {
    pub iv: String,
    #[serde(default = "SjclEnvelope::default_v")]
    pub v: u32,
    #[serde(default = "SjclEnvelope::default_iter")]
    pub iter: u32,
    #[serde(default = "SjclEnvelope::default_ks")]
    pub ks: u32,
    #[serde(default = "SjclEnvelope::default_ts")]
    pub ts: u32,
    #[serde(default = "SjclEnvelope::default_mode")]
    pub mode: String,
    #[serde(default)]
    pub adata: String,
    #[serde(default = "SjclEnvelope::default_cipher")]
    pub cipher: String,
    pub salt: String,
    pub ct: String,
}

impl SjclEnvelope {
    fn default_v() -> u32 { 1 }
    fn default_iter() -> u32 { DEFAULT_ITERATIONS }
    fn default_ks() -> u32 { DEFAULT_KEY_SIZE }
    fn default_ts() -> u32 { DEFAULT_TAG_SIZE }
    fn default_mode() -> String { "ccm".to_string() }
    fn default_cipher() -> String { "aes".to_string() }
}

/// Decrypts an SJCL JSON envelope with `password`.
pub fn decrypt(password: &str, envelope_json: &str) -> Result<Zeroizing<String>, SjclError> {
    let envelope: SjclEnvelope = serde_json::from_str(envelope_json)
        .map_err(|e| SjclError::Malformed(e.to_string()))?;
    decrypt_envelope(password, &envelope)
}

pub fn decrypt_envelope(
    password: &str,
    envelope: &SjclEnvelope,
) -> Result<Zeroizing<String>, SjclError> {
    if envelope.v != 1 {
        return Err(SjclError::UnsupportedParameters(format!("version {}", envelope.v)));
    }
    if envelope.cipher != "aes" || envelope.mode != "ccm" {
        return Err(SjclError::UnsupportedParameters(format!(
            "{}-{}",
            envelope.cipher, envelope.mode
        )));
    }
    if envelope.iter == 0 {
        return Err(SjclError::Malformed("iteration count is zero".into()));
    }

    let iv = decode_field("iv", &envelope.iv)?;
    let salt = decode_field("salt", &envelope.salt)?;
    let ct = decode_field("ct", &envelope.ct)?;
    let adata = decode_field("adata", &envelope.adata)?;

    if !(8..=16).contains(&iv.len()) {
        return Err(SjclError::Malformed(format!("iv length {}", iv.len())));
    }
    let tag_len = tag_bytes(envelope.ts)?;
    if ct.len() < tag_len {
        return Err(SjclError::Malformed("ciphertext shorter than tag".into()));
    }

    let nonce_len = nonce_len(ct.len() - tag_len, iv.len());
    let nonce = &iv[..nonce_len];
    let key = derive_pbkdf2_sha256(password.as_bytes(), &salt, envelope.iter, key_bytes(envelope.ks)?);
    let payload = Payload { msg: &ct, aad: &adata };

    let plaintext = Zeroizing::new(match envelope.ks {
        128 => with_tag!(Aes128, tag_len, &key, nonce, payload, open),
        192 => with_tag!(Aes192, tag_len, &key, nonce, payload, open),
        _ => with_tag!(Aes256, tag_len, &key, nonce, payload, open),
    }?);

    let text = std::str::from_utf8(&plaintext)
        .map_err(|_| SjclError::Malformed("plaintext is not UTF-8".into()))?;
    debug!(len = text.len(), "SJCL envelope decrypted");
    Ok(Zeroizing::new(text.to_string()))
}

/// Encrypts `plaintext` into an SJCL JSON envelope (AES-128-CCM, 64-bit tag).
pub fn encrypt(password: &str, plaintext: &str, iterations: u32) -> Result<String, SjclError> {
    let mut salt = [0u8; 8];
    let mut iv = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let key = derive_pbkdf2_sha256(password.as_bytes(), &salt, iterations, key_bytes(DEFAULT_KEY_SIZE)?);
    let tag_len = tag_bytes(DEFAULT_TAG_SIZE)?;
    let nonce = &iv[..nonce_len(plaintext.len(), iv.len())];
    let payload = Payload { msg: plaintext.as_bytes(), aad: &[] };
    let ct = with_tag!(Aes128, tag_len, &key, nonce, payload, seal)?;

    let envelope = SjclEnvelope {
        iv: B64.encode(iv),
        v: 1,
        iter: iterations,
        ks: DEFAULT_KEY_SIZE,
        ts: DEFAULT_TAG_SIZE,
        mode: "ccm".to_string(),
        adata: String::new(),
        cipher: "aes".to_string(),
        salt: B64.encode(salt),
        ct: B64.encode(ct),
    };
    serde_json::to_string(&envelope).map_err(|e| SjclError::Malformed(e.to_string()))
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, SjclError> {
    B64.decode(value.trim())
        .map_err(|e| SjclError::Malformed(format!("{}: {}", name, e)))
}

fn key_bytes(ks: u32) -> Result<usize, SjclError> {
    match ks {
        128 | 192 | 256 => Ok(ks as usize / 8),
        other => Err(SjclError::UnsupportedParameters(format!("key size {}", other))),
    }
}

fn tag_bytes(ts: u32) -> Result<usize, SjclError> {
    match ts {
        64 | 96 | 128 => Ok(ts as usize / 8),
        other => Err(SjclError::UnsupportedParameters(format!("tag size {}", other))),
    }
}

/// CCM nonce length for a message of `msg_len` bytes under an `iv_len` byte iv.
fn nonce_len(msg_len: usize, iv_len: usize) -> usize {
    let mut l = 2usize;
    while l < 4 && (msg_len as u64) >> (8 * l) != 0 {
        l += 1;
    }
    if l + iv_len < 15 {
        l = 15 - iv_len;
    }
    15 - l
}

#[allow(deprecated)]
fn open<A: Aead + KeyInit>(key: &[u8], nonce: &[u8], payload: Payload<'_, '_>) -> Result<Vec<u8>, SjclError> {
    let cipher = A::new_from_slice(key)
        .map_err(|_| SjclError::UnsupportedParameters("key length".into()))?;
    cipher
        .decrypt(ccm::aead::Nonce::<A>::from_slice(nonce), payload)
        .map_err(|_| SjclError::Authentication)
}

#[allow(deprecated)]
fn seal<A: Aead + KeyInit>(key: &[u8], nonce: &[u8], payload: Payload<'_, '_>) -> Result<Vec<u8>, SjclError> {
    let cipher = A::new_from_slice(key)
        .map_err(|_| SjclError::UnsupportedParameters("key length".into()))?;
    cipher
        .encrypt(ccm::aead::Nonce::<A>::from_slice(nonce), payload)
        .map_err(|_| SjclError::Malformed("CCM encryption failed".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low iteration count keeps the tests fast; the format is otherwise identical.
    const ITER: u32 = 100;

    #[test]
    fn test_encrypt_then_decrypt() {
        let envelope = encrypt("correct horse", r#"{"n":2}"#, ITER).unwrap();
        let plain = decrypt("correct horse", &envelope).unwrap();
        assert_eq!(plain.as_str(), r#"{"n":2}"#);
    }

    // Fixed envelopes: 16-byte iv, PBKDF2 10000 rounds. CCM runs on the first 13 iv bytes.
    const FIXED_AES128: &str = r#"{"iv":"ABEiM0RVZneImaq7zN3u/w==","v":1,"iter":10000,"ks":128,"ts":64,"mode":"ccm","adata":"","cipher":"aes","salt":"AQIDBAUGBwg=","ct":"DK1yuHK6N5uamSf8/+2KCT5C3VnUTV/eE6AePQDNwqjOF6sFYA=="}"#;
    const FIXED_AES256: &str = r#"{"iv":"ABEiM0RVZneImaq7zN3u/w==","v":1,"iter":10000,"ks":256,"ts":128,"mode":"ccm","adata":"","cipher":"aes","salt":"AQIDBAUGBwg=","ct":"g9TZWjnc9ZM1SARvX01j6YCrksDzBnOSBC9EEFU7AmglFifFW+BDVmkHITbF"}"#;
    const FIXED_PLAINTEXT: &str = r#"{"walletId":"w1","n":2,"m":2}"#;

    #[test]
    fn test_decrypts_fixed_envelopes() {
        for envelope in [FIXED_AES128, FIXED_AES256] {
            let plain = decrypt("copay-backup", envelope).unwrap();
            assert_eq!(plain.as_str(), FIXED_PLAINTEXT);
        }
    }

    #[test]
    fn test_fixed_envelope_needs_truncated_nonce() {
        let parsed: SjclEnvelope = serde_json::from_str(FIXED_AES128).unwrap();
        let iv = B64.decode(&parsed.iv).unwrap();
        let ct = B64.decode(&parsed.ct).unwrap();
        let salt = B64.decode(&parsed.salt).unwrap();
        let key = derive_pbkdf2_sha256(b"copay-backup", &salt, parsed.iter, 16);
        let payload = || Payload { msg: &ct, aad: &[] };

        assert!(open::<Ccm<Aes128, U8, U13>>(&key, &iv[..13], payload()).is_ok());
        assert!(matches!(
            open::<Ccm<Aes128, U8, U12>>(&key, &iv[..12], payload()),
            Err(SjclError::Authentication)
        ));
        assert!(matches!(decrypt("copay", FIXED_AES128), Err(SjclError::Authentication)));
    }

    #[test]
    fn test_wrong_password_fails_authentication() {
        let envelope = encrypt("correct horse", "secret", ITER).unwrap();
        assert!(matches!(decrypt("battery staple", &envelope), Err(SjclError::Authentication)));
    }

    #[test]
    fn test_envelope_layout_matches_sjcl_defaults() {
        let envelope = encrypt("pw", "x", ITER).unwrap();
        let value: serde_json::Value = serde_json::from_str(&envelope).unwrap();
        assert_eq!(value["v"], 1);
        assert_eq!(value["ks"], 128);
        assert_eq!(value["ts"], 64);
        assert_eq!(value["mode"], "ccm");
        assert_eq!(value["cipher"], "aes");
        assert_eq!(B64.decode(value["iv"].as_str().unwrap()).unwrap().len(), 16);
        assert_eq!(B64.decode(value["salt"].as_str().unwrap()).unwrap().len(), 8);
    }

    #[test]
    fn test_missing_optional_fields_use_defaults() {
        let envelope = encrypt("pw", "hello", DEFAULT_ITERATIONS).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&envelope).unwrap();
        let obj = value.as_object_mut().unwrap();
        for field in ["v", "iter", "ks", "ts", "mode", "adata", "cipher"] {
            obj.remove(field);
        }
        let plain = decrypt("pw", &value.to_string()).unwrap();
        assert_eq!(plain.as_str(), "hello");
    }

    #[test]
    fn test_tampered_ciphertext_is_rejected() {
        let envelope = encrypt("pw", "payload", ITER).unwrap();
        let mut parsed: SjclEnvelope = serde_json::from_str(&envelope).unwrap();
        let mut ct = B64.decode(&parsed.ct).unwrap();
        ct[0] ^= 0x01;
        parsed.ct = B64.encode(ct);
        assert!(matches!(decrypt_envelope("pw", &parsed), Err(SjclError::Authentication)));
    }

    #[test]
    fn test_unsupported_mode() {
        let envelope = encrypt("pw", "payload", ITER).unwrap();
        let mut parsed: SjclEnvelope = serde_json::from_str(&envelope).unwrap();
        parsed.mode = "ocb2".to_string();
        assert!(matches!(
            decrypt_envelope("pw", &parsed),
            Err(SjclError::UnsupportedParameters(_))
        ));
    }

    #[test]
    fn test_not_json_is_malformed() {
        assert!(matches!(decrypt("pw", "not json"), Err(SjclError::Malformed(_))));
    }

    #[test]
    fn test_nonce_length_follows_message_size() {
        assert_eq!(nonce_len(10, 16), 13);
        assert_eq!(nonce_len(0xffff, 16), 13);
        assert_eq!(nonce_len(0x1_0000, 16), 12);
        assert_eq!(nonce_len(0x100_0000, 16), 11);
        // short ivs force a longer length field
        assert_eq!(nonce_len(10, 8), 8);
    }
}
