//! Sweep transaction construction and signing
//!
//! Every UTXO found by the scan is spent into a single output. Inputs are legacy (non-witness):
//! - P2SH multisig: `OP_0 <sig>... <redeemScript>`, signatures in redeem-script key order
//! - P2PKH: `<sig> <pubkey>`

use super::address::BitcoinAddress;
use super::scanner::{AddressRecord, ScanResult};
use crate::core::domain::{AddressType, Wallet};
use crate::core::errors::RecoveryError;
use bitcoin::absolute::LockTime;
use bitcoin::blockdata::script::Builder;
use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::Hash;
use bitcoin::script::PushBytesBuf;
use bitcoin::secp256k1::{All, Message, PublicKey as Secp256k1PublicKey, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{Amount, PublicKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use tracing::{debug, info};

/// Outputs below this are non-standard and will not relay.
pub const DUST_THRESHOLD: Amount = Amount::from_sat(546);

/// Signed sweep, ready to broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepTransaction {
    /// Consensus serialization, lowercase hex
    pub raw_hex: String,
    pub txid: Txid,
    /// Paid to the destination
    pub amount: Amount,
    pub fee: Amount,
    pub input_count: usize,
}

/// Deduplicated signing keys, erased on drop.
struct SigningKeys(Vec<(SecretKey, PublicKey)>);

impl SigningKeys {
    /// First `m` keys of every record that holds UTXOs, without repeats.
    fn collect(secp: &Secp256k1<All>, records: &[&AddressRecord], m: usize) -> Self {
        let mut keys: Vec<(SecretKey, PublicKey)> = Vec::new();
        for record in records {
            for secret in record.private_keys.iter().take(m) {
                if keys.iter().any(|(k, _)| k == secret) {
                    continue;
                }
                let public = PublicKey::new(Secp256k1PublicKey::from_secret_key(secp, secret));
                keys.push((*secret, public));
            }
        }
        Self(keys)
    }

    fn for_public_key(&self, public: &PublicKey) -> Option<&SecretKey> {
        self.0.iter().find(|(_, p)| p == public).map(|(k, _)| k)
    }
}

impl Drop for SigningKeys {
    fn drop(&mut self) {
        for (secret, _) in self.0.iter_mut() {
            secret.non_secure_erase();
        }
    }
}

/// Sweep transaction builder
pub struct BitcoinTransaction;

impl BitcoinTransaction {
    /// Builds and signs a transaction moving the whole scanned balance, minus `fee`, to
    /// `destination`.
    pub fn build_sweep(
        destination: &str,
        scan: &ScanResult,
        wallet: &Wallet,
        fee: Amount,
    ) -> Result<SweepTransaction, RecoveryError> {
        let unchecked = BitcoinAddress::parse_unchecked(destination)?;

        let amount = match scan.balance.checked_sub(fee) {
            Some(amount) if amount > Amount::ZERO => amount,
            _ => return Err(RecoveryError::InsufficientFunds { balance: scan.balance, fee }),
        };

        let recipient = BitcoinAddress::require_network(unchecked, wallet.network)?;
        info!(
            "Building sweep: {} inputs, amount={}, fee={}, to {}",
            scan.utxo_count(),
            amount,
            fee,
            recipient
        );

        if amount < DUST_THRESHOLD {
            return Err(RecoveryError::TransactionBuildFailure(format!(
                "output of {} is below the dust threshold",
                amount
            )));
        }

        let funded: Vec<&AddressRecord> = scan.addresses.iter().filter(|r| !r.utxos.is_empty()).collect();
        let secp = Secp256k1::new();
        let keys = SigningKeys::collect(&secp, &funded, wallet.m as usize);

        // one entry per input: the record that owns it
        let mut owners: Vec<&AddressRecord> = Vec::new();
        let mut inputs = Vec::new();
        for &record in &funded {
            for utxo in &record.utxos {
                inputs.push(TxIn {
                    previous_output: utxo.outpoint()?,
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::new(),
                });
                owners.push(record);
            }
        }

        let mut tx = Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: inputs,
            output: vec![TxOut {
                value: amount,
                script_pubkey: recipient.script_pubkey(),
            }],
        };

        let mut script_sigs = Vec::with_capacity(owners.len());
        {
            let cache = SighashCache::new(&tx);
            for (i, record) in owners.iter().enumerate() {
                script_sigs.push(sign_input(&secp, &cache, i, record, wallet, &keys)?);
            }
        }
        for (input, script_sig) in tx.input.iter_mut().zip(script_sigs) {
            input.script_sig = script_sig;
        }
        drop(keys);

        let txid = tx.txid();
        let raw_hex = hex::encode(serialize(&tx));
        debug!("Sweep transaction built, txid={}, {} bytes", txid, raw_hex.len() / 2);

        Ok(SweepTransaction {
            raw_hex,
            txid,
            amount,
            fee,
            input_count: tx.input.len(),
        })
    }
}

fn sign_input(
    secp: &Secp256k1<All>,
    cache: &SighashCache<&Transaction>,
    index: usize,
    record: &AddressRecord,
    wallet: &Wallet,
    keys: &SigningKeys,
) -> Result<ScriptBuf, RecoveryError> {
    match &wallet.address_type {
        AddressType::P2sh => {
            let redeem_script = record.redeem_script.clone().ok_or_else(|| {
                RecoveryError::TransactionBuildFailure(format!("{} has no redeem script", record.address))
            })?;
            let script_code = BitcoinAddress::multisig_redeem_script(wallet.m, &record.public_keys)?;
            if script_code != redeem_script {
                return Err(RecoveryError::TransactionBuildFailure(format!(
                    "redeem script of {} does not match its keys",
                    record.address
                )));
            }

            // redeem-script order is sorted compressed-key order
            let mut ordered = record.public_keys.clone();
            ordered.sort_by_key(|pk| pk.inner.serialize());

            let mut builder = Builder::new().push_int(0);
            let mut signatures = 0;
            for public in &ordered {
                if signatures == wallet.m {
                    break;
                }
                if let Some(secret) = keys.for_public_key(public) {
                    builder = builder.push_slice(signature(secp, cache, index, &redeem_script, secret)?);
                    signatures += 1;
                }
            }
            if signatures < wallet.m {
                return Err(RecoveryError::TransactionBuildFailure(format!(
                    "input {} has {} of {} required signatures",
                    index, signatures, wallet.m
                )));
            }
            let redeem_push = PushBytesBuf::try_from(redeem_script.to_bytes())
                .map_err(|e| RecoveryError::TransactionBuildFailure(format!("redeem script push: {:?}", e)))?;
            Ok(builder.push_slice(redeem_push).into_script())
        }
        AddressType::P2pkh => {
            let public = record.public_keys.first().ok_or_else(|| {
                RecoveryError::TransactionBuildFailure(format!("{} has no public key", record.address))
            })?;
            let secret = keys.for_public_key(public).ok_or_else(|| {
                RecoveryError::TransactionBuildFailure(format!("no signing key for {}", record.address))
            })?;
            let script_code = record.address.script_pubkey();
            let sig = signature(secp, cache, index, &script_code, secret)?;
            let pk_push = PushBytesBuf::try_from(public.to_bytes())
                .map_err(|e| RecoveryError::TransactionBuildFailure(format!("public key push: {:?}", e)))?;
            Ok(Builder::new().push_slice(sig).push_slice(pk_push).into_script())
        }
        AddressType::Unsupported(name) => Err(RecoveryError::UnsupportedAddressType(name.clone())),
    }
}

/// DER signature plus SIGHASH_ALL byte, over the legacy sighash of input `index`.
fn signature(
    secp: &Secp256k1<All>,
    cache: &SighashCache<&Transaction>,
    index: usize,
    script_code: &ScriptBuf,
    secret: &SecretKey,
) -> Result<PushBytesBuf, RecoveryError> {
    let sighash = cache
        .legacy_signature_hash(index, script_code, EcdsaSighashType::All.to_u32())
        .map_err(|e| RecoveryError::TransactionBuildFailure(format!("sighash: {}", e)))?;
    let message = Message::from_digest(*sighash.as_byte_array());
    let sig = secp.sign_ecdsa(&message, secret);

    let mut sig_bytes = sig.serialize_der().to_vec();
    sig_bytes.push(EcdsaSighashType::All.to_u32() as u8);
    PushBytesBuf::try_from(sig_bytes)
        .map_err(|e| RecoveryError::TransactionBuildFailure(format!("signature push: {:?}", e)))
}
