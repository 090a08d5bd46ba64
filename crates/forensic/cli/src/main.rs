//! forensic - consensus audit sweeps against a score ledger

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use forensic_cli::genesis::load_manifest;
use forensic_cli::inspect::{list_records, ReadRetry};
use forensic_cli::{build_sweeper, connect_ledger, render_summary, ForensicConfig, RecipeReport};
use forensic_guard::CommitGuard;
use forensic_types::RecipeId;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "forensic")]
#[command(about = "Forensic consensus audits for recipe score ledgers", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "FORENSIC_CONFIG")]
    config: Option<String>,

    /// Log level (overrides logging.level)
    #[arg(long, env = "FORENSIC_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "FORENSIC_LOG_JSON")]
    json: bool,

    /// Echo completion fragments to stdout as they stream in
    #[arg(long)]
    live: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Audit and re-score existing recipes
    Sweep {
        #[arg(long, default_value_t = 0)]
        from: u64,
        /// Exclusive upper bound; defaults to the ledger frontier
        #[arg(long)]
        to: Option<u64>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Register recipes from a genesis manifest
    Genesis {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },
    /// Audit recipes as they are registered, until interrupted
    Watch {
        /// First id to audit; defaults to the current frontier
        #[arg(long)]
        from: Option<u64>,
    },
    /// Lock a recipe as golden
    Promote {
        #[arg(long)]
        id: RecipeId,
    },
    /// List ledger records
    Inspect {
        #[arg(long, default_value_t = 0)]
        from: u64,
        #[arg(long)]
        to: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ForensicConfig::load_validated(cli.config.as_deref())?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let ledger = connect_ledger(&config)?;

    match cli.command {
        Command::Sweep { from, to, dry_run } => {
            let sweeper = build_sweeper(&config, &ledger, cli.live)?.dry_run(dry_run);
            let reports = sweeper.sweep(from, to).await?;
            finish(&config, &reports);
        }
        Command::Genesis { manifest, dry_run } => {
            let entries = load_manifest(&manifest).await?;
            let sweeper = build_sweeper(&config, &ledger, cli.live)?.dry_run(dry_run);
            let reports = sweeper.genesis(entries).await?;
            finish(&config, &reports);
        }
        Command::Watch { from } => {
            let sweeper = build_sweeper(&config, &ledger, cli.live)?;
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "cannot listen for ctrl-c");
                    std::future::pending::<()>().await;
                }
            };
            let reports = sweeper.watch(from, shutdown).await?;
            finish(&config, &reports);
        }
        Command::Promote { id } => {
            let guard = CommitGuard::new(ledger.reader, ledger.writer, config.guard.clone());
            let receipt = guard
                .promote(&id)
                .await
                .with_context(|| format!("promotion of {id} failed"))?;
            info!(recipe_id = %receipt.recipe_id, tx_id = %receipt.tx_id, "recipe locked");
            println!("{} locked in {}", receipt.recipe_id, receipt.tx_id);
        }
        Command::Inspect { from, to } => {
            let table = list_records(ledger.reader.as_ref(), from, to, ReadRetry::default()).await?;
            print!("{table}");
        }
    }

    Ok(())
}

fn finish(config: &ForensicConfig, reports: &[RecipeReport]) {
    print!("{}", render_summary(reports, config.guard.strike_threshold()));
}
