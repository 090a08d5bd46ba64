//! Operator surface for the forensic audit engine.
//!
//! Wires configuration into the completion client, the audit engine, the
//! commit guard and a ledger backend, then drives them through batch sweeps,
//! genesis registration or the frontier watcher.

pub mod archive;
pub mod config;
pub mod genesis;
pub mod inspect;
pub mod report;
pub mod sweep;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use forensic_completion::{HttpTransport, StdoutObserver, StreamingCompletionClient};
use forensic_engine::{AuditEngine, HttpContentStore};
use forensic_guard::{CommitGuard, HttpLedgerGateway, InMemoryLedger, LedgerReader, LedgerWriter};
use tracing::warn;

pub use config::ForensicConfig;
pub use report::{render_summary, Outcome, RecipeReport};
pub use sweep::Sweeper;

/// Both ledger boundaries, backed by the same ledger.
#[derive(Clone)]
pub struct LedgerHandle {
    pub reader: Arc<dyn LedgerReader>,
    pub writer: Arc<dyn LedgerWriter>,
}

impl LedgerHandle {
    pub fn from_ledger<L>(ledger: Arc<L>) -> Self
    where
        L: LedgerReader + LedgerWriter + 'static,
    {
        Self {
            reader: ledger.clone(),
            writer: ledger,
        }
    }
}

/// REST gateway when one is configured, otherwise an empty in-memory ledger.
pub fn connect_ledger(config: &ForensicConfig) -> anyhow::Result<LedgerHandle> {
    match &config.ledger.gateway_url {
        Some(url) => {
            let gateway = HttpLedgerGateway::new(
                url.clone(),
                Duration::from_secs(config.ledger.request_timeout_secs),
            )
            .context("cannot build ledger gateway")?;
            Ok(LedgerHandle::from_ledger(Arc::new(gateway)))
        }
        None => {
            warn!("no ledger.gateway_url configured; using an empty in-memory ledger");
            let ledger = InMemoryLedger::new().with_strike_threshold(config.guard.strike_threshold());
            Ok(LedgerHandle::from_ledger(Arc::new(ledger)))
        }
    }
}

/// Streaming client for the configured endpoint. `live` echoes fragments to stdout.
pub fn completion_client(
    config: &ForensicConfig,
    live: bool,
) -> anyhow::Result<StreamingCompletionClient> {
    let completion = &config.completion;
    let transport = HttpTransport::from_env(
        completion.endpoint.clone(),
        &completion.api_key_env,
        completion.connect_timeout(),
    )
    .context("cannot build completion transport")?;

    let client = StreamingCompletionClient::new(Arc::new(transport))
        .with_timeout(completion.request_timeout());
    Ok(if live {
        client.with_observer(Arc::new(StdoutObserver))
    } else {
        client
    })
}

/// Assemble a sweeper from configuration and a connected ledger.
pub fn build_sweeper(
    config: &ForensicConfig,
    ledger: &LedgerHandle,
    live: bool,
) -> anyhow::Result<Sweeper> {
    let client = completion_client(config, live)?;
    let engine = AuditEngine::new(
        Arc::new(client),
        config.completion.stage_models(),
        config.resolver.resolver_config(),
    );
    let guard = CommitGuard::new(
        ledger.reader.clone(),
        ledger.writer.clone(),
        config.guard.clone(),
    );
    let store = HttpContentStore::new(
        config.content.gateway_url.clone(),
        Duration::from_secs(config.content.request_timeout_secs),
    )
    .context("cannot build content store")?;

    Ok(Sweeper::new(
        Arc::new(engine),
        Arc::new(guard),
        ledger.reader.clone(),
        Arc::new(store),
        config.sweep.clone(),
    ))
}
