pub mod address;
pub mod client;
pub mod scanner;
pub mod transaction;
pub mod utxo;

pub use client::InsightClient;
pub use scanner::{scan_wallet, AddressRecord, ScanOptions, ScanResult};
pub use transaction::{BitcoinTransaction, SweepTransaction};
