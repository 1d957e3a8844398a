use bitcoin::Amount;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::core::domain::{parse_btc_amount, WalletNetwork};

/// Env var holding the password of the `position`-th backup (1-based).
pub const PASSWORD_ENV_PREFIX: &str = "RECOVERY_PASSWORD_";
/// Env var holding the private-key password of the `position`-th backup (1-based).
pub const KEY_PASSWORD_ENV_PREFIX: &str = "RECOVERY_KEY_PASSWORD_";

/// Multisig wallet recovery CLI (library-facing definitions)
#[derive(Debug, Parser)]
#[command(
    name = "recovery-cli",
    about = "Recover funds from m-of-n HD multisig wallet backups",
    version,
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Rebuild the wallet from backups, scan it and print a signed sweep transaction
    Recover(RecoverArgs),
    /// Broadcast a previously signed raw transaction
    Broadcast {
        #[arg(long, value_parser = parse_network)]
        network: WalletNetwork,
        /// Raw transaction hex
        #[arg(long = "raw-tx")]
        raw_tx: String,
    },
}

#[derive(Debug, Args)]
pub struct RecoverArgs {
    /// Required signatures
    #[arg(long)]
    pub m: u32,
    /// Total copayers
    #[arg(long)]
    pub n: u32,
    #[arg(long, value_parser = parse_network)]
    pub network: WalletNetwork,
    /// Backup file (encrypted JSON or mnemonic words), one per copayer
    #[arg(long = "backup", required = true)]
    pub backups: Vec<PathBuf>,
    /// Destination address for the swept funds
    #[arg(long)]
    pub to: String,
    /// Flat fee in BTC; defaults to `sweep.default_fee_btc`
    #[arg(long, value_parser = parse_fee)]
    pub fee: Option<Amount>,
    /// Consecutive unused addresses tolerated before a combination is abandoned
    #[arg(long = "gap-limit")]
    pub gap_limit: Option<u32>,
    /// Derivation combinations scanned at once; defaults to `scan.concurrency`
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Send the signed transaction through the indexer
    #[arg(long)]
    pub broadcast: bool,
}

fn parse_network(s: &str) -> Result<WalletNetwork, String> {
    s.parse::<WalletNetwork>().map_err(|e| e.to_string())
}

fn parse_fee(s: &str) -> Result<Amount, String> {
    parse_btc_amount(s).map_err(|e| e.to_string())
}

pub fn password_env_var(position: usize) -> String {
    format!("{}{}", PASSWORD_ENV_PREFIX, position)
}

pub fn key_password_env_var(position: usize) -> String {
    format!("{}{}", KEY_PASSWORD_ENV_PREFIX, position)
}
