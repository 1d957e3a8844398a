pub mod config;
pub mod derivation;
pub mod domain;
pub mod errors;
pub mod progress;
pub mod wallet;

pub use domain::{Credential, Wallet, WalletNetwork};
pub use errors::RecoveryError;
