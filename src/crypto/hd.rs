//! BIP32 private derivation, standard and non-compliant.
//!
//! Old Copay builds (bitcore) serialized the parent private key for hardened children with its
//! leading zero bytes stripped, so roughly 1 in 256 keys landed on a different child than BIP32
//! prescribes. Funds sent to those children are only reachable by repeating the same mistake:
//!
//! ```text
//! compliant:     HMAC-SHA512(c, 0x00 || ser256(k)            || ser32(i))
//! non-compliant: HMAC-SHA512(c, 0x00 || k (no leading zeros) || ser32(i))
//! ```
//!
//! Non-hardened steps hash the public key and are identical in both modes.

use crate::core::errors::RecoveryError;
use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv};
use bitcoin::hashes::{hash160, Hash};
use bitcoin::secp256k1::{PublicKey, Scalar, Secp256k1, Signing};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use zeroize::Zeroizing;

type HmacSha512 = Hmac<Sha512>;

/// Serialized extended key: version, depth, fingerprint, child number, chain code, key.
const XPRIV_LEN: usize = 78;

/// Standard BIP32 derivation.
pub fn derive_compliant<C: Signing>(
    secp: &Secp256k1<C>,
    parent: &Xpriv,
    path: &DerivationPath,
) -> Result<Xpriv, RecoveryError> {
    parent
        .derive_priv(secp, path)
        .map_err(|e| RecoveryError::KeyDerivation(format!("{}: {}", path, e)))
}

/// bitcore's legacy derivation, applied at every hardened step of `path`.
pub fn derive_non_compliant<C: Signing>(
    secp: &Secp256k1<C>,
    parent: &Xpriv,
    path: &DerivationPath,
) -> Result<Xpriv, RecoveryError> {
    let mut current = *parent;
    for child in path.into_iter() {
        let next = if child.is_hardened() {
            non_compliant_hardened_child(secp, &current, *child)?
        } else {
            current
                .derive_priv(secp, &[*child])
                .map_err(|e| RecoveryError::KeyDerivation(format!("{}: {}", path, e)))?
        };
        current.private_key.non_secure_erase();
        current = next;
    }
    Ok(current)
}

/// Single non-hardened child, the last hop from a combination base to an address key.
pub fn derive_child<C: Signing>(
    secp: &Secp256k1<C>,
    parent: &Xpriv,
    index: u32,
) -> Result<Xpriv, RecoveryError> {
    let child = ChildNumber::from_normal_idx(index)
        .map_err(|e| RecoveryError::KeyDerivation(format!("index {}: {}", index, e)))?;
    parent
        .derive_priv(secp, &[child])
        .map_err(|e| RecoveryError::KeyDerivation(format!("index {}: {}", index, e)))
}

fn non_compliant_hardened_child<C: Signing>(
    secp: &Secp256k1<C>,
    parent: &Xpriv,
    child: ChildNumber,
) -> Result<Xpriv, RecoveryError> {
    let parent_encoded = Zeroizing::new(parent.encode());
    let key_bytes = Zeroizing::new(parent.private_key.secret_bytes());
    let first_nonzero = key_bytes.iter().position(|b| *b != 0).unwrap_or(key_bytes.len());

    let mut mac = HmacSha512::new_from_slice(&parent_encoded[13..45])
        .map_err(|e| RecoveryError::KeyDerivation(e.to_string()))?;
    mac.update(&[0u8]);
    mac.update(&key_bytes[first_nonzero..]);
    mac.update(&u32::from(child).to_be_bytes());
    let output = Zeroizing::new(mac.finalize().into_bytes().to_vec());

    let mut il = [0u8; 32];
    il.copy_from_slice(&output[..32]);
    let tweak = Scalar::from_be_bytes(il)
        .map_err(|_| RecoveryError::KeyDerivation(format!("{}: tweak out of range", child)))?;
    let child_key = parent
        .private_key
        .add_tweak(&tweak)
        .map_err(|e| RecoveryError::KeyDerivation(format!("{}: {}", child, e)))?;

    let parent_pub = PublicKey::from_secret_key(secp, &parent.private_key);
    let fingerprint = hash160::Hash::hash(&parent_pub.serialize()).to_byte_array();

    let mut encoded = Zeroizing::new([0u8; XPRIV_LEN]);
    encoded[0..4].copy_from_slice(&parent_encoded[0..4]);
    encoded[4] = parent.depth.checked_add(1).ok_or_else(|| {
        RecoveryError::KeyDerivation("maximum derivation depth exceeded".into())
    })?;
    encoded[5..9].copy_from_slice(&fingerprint[..4]);
    encoded[9..13].copy_from_slice(&u32::from(child).to_be_bytes());
    encoded[13..45].copy_from_slice(&output[32..]);
    encoded[45] = 0;
    encoded[46..78].copy_from_slice(&child_key.secret_bytes());

    Xpriv::decode(&encoded[..]).map_err(|e| RecoveryError::KeyDerivation(e.to_string()))
}
