//! Batch sweeps and the frontier watcher.
//!
//! Audits for consecutive recipes are pipelined up to `audit_concurrency`, but
//! results are settled strictly in id order and every write goes through the
//! guard's single write lane.

use std::future::Future;
use std::sync::Arc;

use forensic_engine::{AuditEngine, ContentStore};
use forensic_guard::{CommitGuard, CommitRequest, LedgerReader};
use forensic_types::{AuditSession, RecipeId};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::archive::SessionArchive;
use crate::config::SweepConfig;
use crate::report::{Outcome, RecipeReport};

enum Audited {
    Scored(Box<AuditSession>),
    /// Failed after evidence was gathered; the session is archived as is.
    Unscored(RecipeReport, Box<AuditSession>),
    Finished(RecipeReport),
}

pub struct Sweeper {
    pub(crate) engine: Arc<AuditEngine>,
    pub(crate) guard: Arc<CommitGuard>,
    pub(crate) ledger: Arc<dyn LedgerReader>,
    store: Arc<dyn ContentStore>,
    pub(crate) settings: SweepConfig,
    pub(crate) dry_run: bool,
    archive: Option<SessionArchive>,
}

impl Sweeper {
    pub fn new(
        engine: Arc<AuditEngine>,
        guard: Arc<CommitGuard>,
        ledger: Arc<dyn LedgerReader>,
        store: Arc<dyn ContentStore>,
        settings: SweepConfig,
    ) -> Self {
        let archive = settings.session_log.clone().map(SessionArchive::new);
        Self {
            engine,
            guard,
            ledger,
            store,
            settings,
            dry_run: false,
            archive,
        }
    }

    /// Score without writing.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sweep `from..to`, capped at the ledger's registration frontier.
    pub async fn sweep(&self, from: u64, to: Option<u64>) -> anyhow::Result<Vec<RecipeReport>> {
        let frontier = self.ledger.next_id().await?;
        let end = to.map_or(frontier, |to| to.min(frontier));
        info!(from, end, frontier, dry_run = self.dry_run, "sweep started");
        Ok(self.run_ids((from..end).map(RecipeId::Index).collect()).await)
    }

    /// Audit and settle `ids` in order. Never fails as a whole.
    pub async fn run_ids(&self, ids: Vec<RecipeId>) -> Vec<RecipeReport> {
        let concurrency = self.settings.audit_concurrency.max(1);
        let mut audits = stream::iter(ids)
            .map(|id| self.audit(id))
            .buffered(concurrency);

        let mut reports = Vec::new();
        while let Some(audited) = audits.next().await {
            let report = self.settle(audited).await;
            report.log();
            if report.outcome.is_failure() {
                tokio::time::sleep(self.settings.failure_backoff()).await;
            }
            reports.push(report);
        }
        reports
    }

    /// Poll the frontier until `shutdown` resolves, auditing each new recipe.
    ///
    /// Starts from the current frontier unless `start` is given.
    pub async fn watch<F>(&self, start: Option<u64>, shutdown: F) -> anyhow::Result<Vec<RecipeReport>>
    where
        F: Future<Output = ()>,
    {
        let mut cursor = match start {
            Some(start) => start,
            None => self.ledger.next_id().await?,
        };
        info!(cursor, interval_secs = self.settings.watch_interval_secs, "watching for new recipes");

        tokio::pin!(shutdown);
        let mut reports = Vec::new();
        loop {
            match self.poll_frontier(&mut cursor).await {
                Ok(batch) => reports.extend(batch),
                Err(e) => warn!(cursor, error = %e, "frontier poll failed"),
            }
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.settings.watch_interval()) => {}
            }
        }
        info!(processed = reports.len(), "watch stopped");
        Ok(reports)
    }

    /// Audit everything registered since `cursor` and advance it.
    pub async fn poll_frontier(&self, cursor: &mut u64) -> anyhow::Result<Vec<RecipeReport>> {
        let frontier = self.ledger.next_id().await?;
        if frontier <= *cursor {
            return Ok(Vec::new());
        }
        info!(from = *cursor, to = frontier, "new recipes registered");
        let reports = self
            .run_ids((*cursor..frontier).map(RecipeId::Index).collect())
            .await;
        *cursor = frontier;
        Ok(reports)
    }

    async fn audit(&self, id: RecipeId) -> Audited {
        let record = match self.ledger.get_record(&id).await {
            Ok(record) => record,
            Err(e) => return Audited::Finished(RecipeReport::read_failed(id, &e)),
        };

        if record.locked {
            return Audited::Finished(RecipeReport::skipped(id, "locked"));
        }
        if record.is_vacant() {
            return Audited::Finished(RecipeReport::skipped(id, "vacant record"));
        }
        if !self.dry_run {
            if let Some(remaining) = self.guard.cooldown_remaining(&record) {
                return Audited::Finished(RecipeReport::skipped(
                    id,
                    format!("cooldown active for {}s", remaining.as_secs()),
                ));
            }
        }

        match self
            .engine
            .audit_record_retaining(&record, self.store.as_ref())
            .await
        {
            Ok(session) => Audited::Scored(Box::new(session)),
            Err(failure) => {
                let report = RecipeReport::audit_failed(id, &failure.error);
                match failure.session {
                    Some(session) => Audited::Unscored(report, session),
                    None => Audited::Finished(report),
                }
            }
        }
    }

    async fn settle(&self, audited: Audited) -> RecipeReport {
        let session = match audited {
            Audited::Scored(session) => session,
            Audited::Unscored(report, session) => {
                self.archive(&session, &report).await;
                return report;
            }
            Audited::Finished(report) => return report,
        };

        let report = if self.dry_run {
            RecipeReport::scored(&session, Outcome::DryRun)
        } else {
            match CommitRequest::from_session(&session) {
                Some(request) => match self.guard.commit(request).await {
                    Ok(receipt) => RecipeReport::committed(&session, &receipt),
                    Err(e) => RecipeReport::commit_failed(&session, &e),
                },
                None => RecipeReport::scored(
                    &session,
                    Outcome::Failed {
                        reason: "session finished without a score".into(),
                        retryable: false,
                    },
                ),
            }
        };

        self.archive(&session, &report).await;
        report
    }

    pub(crate) async fn archive(&self, session: &AuditSession, report: &RecipeReport) {
        if let Some(archive) = &self.archive {
            if let Err(e) = archive.append(session, report).await {
                warn!(path = %archive.path().display(), error = %e, "session not archived");
            }
        }
    }
}
