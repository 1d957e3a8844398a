//! Recovery hot paths: backup decryption, BIP45 key derivation and per-address derivation.
//!
//! A scan derives one address per probe per combination, so address derivation dominates
//! offline cost; backup decryption is paid once per copayer.

use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::secp256k1::Secp256k1;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use multisig_recovery::blockchain::bitcoin::address::derive_address;
use multisig_recovery::core::derivation::expand;
use multisig_recovery::core::domain::{
    AddressType, BackupSource, Copayer, DerivationStrategy, Wallet, WalletNetwork,
};
use multisig_recovery::crypto::{hd, sjcl};
use std::str::FromStr;

fn bench_backup_decrypt(c: &mut Criterion) {
    let envelope = sjcl::encrypt("correct horse", r#"{"xPrivKey":"xprv"}"#, sjcl::DEFAULT_ITERATIONS)
        .expect("encrypt");

    c.bench_function("sjcl_decrypt_10k_iterations", |b| {
        b.iter(|| sjcl::decrypt(black_box("correct horse"), black_box(&envelope)).expect("decrypt"));
    });
}

fn bench_bip45_derivation(c: &mut Criterion) {
    let secp = Secp256k1::new();
    let master = Xpriv::new_master(bitcoin::Network::Bitcoin, &[7u8; 32]).expect("master");
    let path = DerivationPath::from_str("m/45'/2147483647/0").expect("path");

    c.bench_function("derive_compliant_bip45", |b| {
        b.iter(|| hd::derive_compliant(&secp, black_box(&master), black_box(&path)).expect("derive"));
    });
    c.bench_function("derive_non_compliant_bip45", |b| {
        b.iter(|| hd::derive_non_compliant(&secp, black_box(&master), black_box(&path)).expect("derive"));
    });
}

fn bench_multisig_address(c: &mut Criterion) {
    let wallet = Wallet {
        wallet_id: None,
        derivation_strategy: DerivationStrategy::Bip45,
        address_type: AddressType::P2sh,
        m: 2,
        n: 3,
        network: WalletNetwork::Livenet,
        source: BackupSource::Backup,
        copayers: (1u8..=3)
            .map(|seed| Copayer {
                copayer_id: Some(format!("copayer-{}", seed)),
                xpriv: Xpriv::new_master(bitcoin::Network::Bitcoin, &[seed; 32]).expect("master"),
            })
            .collect(),
    };
    let combinations = expand(&wallet).expect("expand");

    c.bench_function("derive_2_of_3_p2sh_address", |b| {
        b.iter(|| derive_address(&wallet, black_box(&combinations[0]), black_box(17)).expect("address"));
    });
}

criterion_group!(benches, bench_backup_decrypt, bench_bip45_derivation, bench_multisig_address);
criterion_main!(benches);
