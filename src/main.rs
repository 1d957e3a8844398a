// src/main.rs
//! Multisig recovery CLI entry point.
use anyhow::{Context, Result};
use clap::Parser;
use multisig_recovery::cli::{key_password_env_var, password_env_var, Cli, Commands, RecoverArgs};
use multisig_recovery::core::config::RecoveryConfig;
use multisig_recovery::core::progress::TracingProgress;
use multisig_recovery::core::wallet::credentials::RawBackup;
use multisig_recovery::security::secret::secret_from_env;
use multisig_recovery::service::{RecoveryRequest, RecoveryService};
use std::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    info!("Starting multisig-recovery v{}", env!("CARGO_PKG_VERSION"));

    let config = RecoveryConfig::load().context("Failed to load recovery configuration")?;

    match cli.command {
        Commands::Recover(args) => recover(&config, args).await,
        Commands::Broadcast { network, raw_tx } => {
            let service = RecoveryService::from_config(&config).context("Failed to build indexer client")?;
            let receipt = service
                .broadcast(&raw_tx, network)
                .await
                .context("Broadcast failed")?;
            println!("{}", receipt.txid);
            Ok(())
        }
    }
}

async fn recover(config: &RecoveryConfig, args: RecoverArgs) -> Result<()> {
    let concurrency = args.concurrency.unwrap_or(config.scan.concurrency);
    let service = RecoveryService::from_config(config)
        .context("Failed to build indexer client")?
        .with_scan_concurrency(concurrency);

    let fee = match args.fee {
        Some(fee) => fee,
        None => config.sweep.default_fee().context("Invalid default fee")?,
    };

    let request = RecoveryRequest {
        backups: read_backups(&args)?,
        m: args.m,
        n: args.n,
        network: args.network,
        gap_limit: args.gap_limit.unwrap_or(config.scan.gap_limit),
        destination_address: args.to.clone(),
        fee,
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping scan");
            on_interrupt.cancel();
        }
    });

    let outcome = service
        .recover(request, &TracingProgress, &cancel)
        .await
        .context("Recovery failed")?;

    info!(
        addresses = outcome.scan.addresses.len(),
        utxos = outcome.scan.utxo_count(),
        recovered = %outcome.total_recovered,
        fee = %outcome.fee,
        "Recovery complete"
    );
    println!("{}", outcome.raw_signed_tx);

    if args.broadcast {
        let receipt = service
            .broadcast(&outcome.raw_signed_tx, args.network)
            .await
            .context("Broadcast failed")?;
        println!("{}", receipt.txid);
    }
    Ok(())
}

/// Reads every `--backup` file and pairs it with its passwords from the environment.
fn read_backups(args: &RecoverArgs) -> Result<Vec<RawBackup>> {
    args.backups
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let position = i + 1;
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read backup {}", path.display()))?;
            let password = secret_from_env(&password_env_var(position));
            if password.is_none() {
                debug!("{} not set, using an empty password for {}", password_env_var(position), path.display());
            }
            let mut backup = RawBackup::new(content, password.as_ref().map(|p| p.as_str()).unwrap_or(""));
            if let Some(key_password) = secret_from_env(&key_password_env_var(position)) {
                backup = backup.with_private_key_password(key_password.as_str());
            }
            Ok(backup)
        })
        .collect()
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
