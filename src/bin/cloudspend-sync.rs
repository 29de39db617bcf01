//! Operator CLI for running syncs outside the HTTP service.
//!
//! Prints the structured run outcome as JSON on stdout. Exits 0 when the run
//! succeeded or partially succeeded and 1 otherwise.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cloudspend::{
    bulk_sync::BulkSyncCoordinator,
    complete_sync::{CompleteSyncAggregator, RunStatus, SyncTrigger},
    config::ConfigLoader,
    crypto::CryptoKey,
    db,
    providers::Registry,
    sync_orchestrator::SyncOrchestrator,
    telemetry,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "cloudspend-sync", about = "Run cloud resource syncs", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Complete sync of a single account
    Account {
        /// Account ID
        account_id: Uuid,
    },
    /// Bulk sync of every eligible account
    All,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(status) if status != RunStatus::Error => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("cloudspend-sync: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<RunStatus> {
    let config = ConfigLoader::new().load().context("loading configuration")?;
    telemetry::init_tracing(&config).context("initializing tracing")?;

    let key_bytes = config
        .crypto_key
        .clone()
        .context("crypto key not present in configuration")?;
    let crypto_key = CryptoKey::new(key_bytes).context("initializing crypto key")?;

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    db::run_migrations(&db).await?;
    let db = Arc::new(db);

    let registry = Arc::new(Registry::from_config(&config).context("building provider registry")?);
    let orchestrator = SyncOrchestrator::new(db.clone(), registry, crypto_key, &config);
    let aggregator = CompleteSyncAggregator::new(db.clone(), orchestrator);

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling sync");
            signal_token.cancel();
        }
    });

    match cli.command {
        Command::Account { account_id } => {
            let outcome = aggregator
                .run(account_id, SyncTrigger::Cli, &cancel)
                .await
                .with_context(|| format!("syncing account {account_id}"))?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(outcome.status)
        }
        Command::All => {
            let coordinator = BulkSyncCoordinator::new(db, aggregator);
            let outcome = coordinator.run(SyncTrigger::Cli, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(outcome.status)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_account_subcommand() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from(["cloudspend-sync", "account", &id.to_string()]).unwrap();
        assert!(matches!(cli.command, Command::Account { account_id } if account_id == id));
    }

    #[test]
    fn rejects_malformed_account_id() {
        assert!(Cli::try_parse_from(["cloudspend-sync", "account", "not-a-uuid"]).is_err());
    }

    #[test]
    fn parses_all_subcommand() {
        let cli = Cli::try_parse_from(["cloudspend-sync", "all"]).unwrap();
        assert!(matches!(cli.command, Command::All));
    }
}
