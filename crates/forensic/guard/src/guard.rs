use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use forensic_types::{AuditSession, Bps, EvidenceDigest, LedgerRecord, RecipeId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::CommitError;
use crate::ledger::{LedgerReader, LedgerWrite, LedgerWriter};
use crate::sequencer::{Confirmed, RetryPolicy, WriteSequencer};

/// Longest cooldown the guard accepts: ten years.
pub const MAX_COOLDOWN_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Commit guard settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Minimum time between accepted score writes to one record.
    pub cooldown_secs: u64,
    pub max_write_attempts: u32,
    pub nonce_refresh_delay_ms: u64,
    /// Threshold below which an accepted score earns a strike. The real ledger
    /// applies its own; this one drives the in-memory ledger and reports.
    pub strike_threshold_bps: u16,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 6 * 24 * 60 * 60,
            max_write_attempts: 3,
            nonce_refresh_delay_ms: 500,
            strike_threshold_bps: 7800,
        }
    }
}

impl GuardConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn strike_threshold(&self) -> Bps {
        Bps::clamped(i64::from(self.strike_threshold_bps))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_write_attempts,
            refresh_delay: Duration::from_millis(self.nonce_refresh_delay_ms),
        }
    }
}

/// Guard progress, logged as the commit advances.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitPhase {
    Idle,
    ReplayChecked,
    Read,
    Validated,
    Submitted,
    Confirmed,
}

impl CommitPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            CommitPhase::Idle => "idle",
            CommitPhase::ReplayChecked => "replay-checked",
            CommitPhase::Read => "read",
            CommitPhase::Validated => "validated",
            CommitPhase::Submitted => "submitted",
            CommitPhase::Confirmed => "confirmed",
        }
    }
}

/// A resolved score asking to be written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitRequest {
    pub recipe_id: RecipeId,
    pub score: Bps,
    pub digest: EvidenceDigest,
    /// Pointer the audited content came from; checked against the fresh read.
    pub audited_pointer: Option<String>,
}

impl CommitRequest {
    pub fn new(recipe_id: RecipeId, score: Bps, digest: EvidenceDigest) -> Self {
        Self {
            recipe_id,
            score,
            digest,
            audited_pointer: None,
        }
    }

    /// `None` unless the session reached a resolved score.
    pub fn from_session(session: &AuditSession) -> Option<Self> {
        Some(Self {
            recipe_id: session.target_id.clone(),
            score: session.resolved?.score,
            digest: session.digest?,
            audited_pointer: session.content_pointer.clone(),
        })
    }
}

/// First-time registration of a recipe with its initial score.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterRequest {
    pub outcome: String,
    pub content_pointer: String,
    pub score: Bps,
    pub digest: EvidenceDigest,
}

/// Confirmed result of a guarded write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub recipe_id: RecipeId,
    pub score: Bps,
    pub digest: Option<EvidenceDigest>,
    pub tx_id: String,
    pub nonce: u64,
    pub attempts: u32,
    pub strikes: u32,
    pub strike_issued: bool,
    pub locked: bool,
    pub committed_at: DateTime<Utc>,
}

/// The only path by which scores reach the ledger.
///
/// Every check runs inside the write lane, so the record read for validation
/// is the record the write lands on.
pub struct CommitGuard {
    reader: Arc<dyn LedgerReader>,
    sequencer: WriteSequencer,
    clock: Arc<dyn Clock>,
    config: GuardConfig,
}

impl CommitGuard {
    pub fn new(
        reader: Arc<dyn LedgerReader>,
        writer: Arc<dyn LedgerWriter>,
        config: GuardConfig,
    ) -> Self {
        Self {
            sequencer: WriteSequencer::new(reader.clone(), writer, config.retry_policy()),
            reader,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Guard over a ledger that implements both boundaries.
    pub fn over<L>(ledger: Arc<L>, config: GuardConfig) -> Self
    where
        L: LedgerReader + LedgerWriter + 'static,
    {
        Self::new(ledger.clone(), ledger, config)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Validate and write a score update.
    pub async fn commit(&self, request: CommitRequest) -> Result<CommitReceipt, CommitError> {
        let id = request.recipe_id.clone();
        let mut lane = self.sequencer.acquire().await;
        trace_phase(&id, CommitPhase::Idle);

        self.check_replay(&request.digest).await?;
        trace_phase(&id, CommitPhase::ReplayChecked);

        let record = self.reader.get_record(&id).await?;
        trace_phase(&id, CommitPhase::Read);

        self.validate(&record, &request)?;
        trace_phase(&id, CommitPhase::Validated);

        let write = LedgerWrite::UpdateScore {
            id: record.id.clone(),
            outcome: record.outcome.clone(),
            content_pointer: record.content_pointer.clone(),
            score: request.score,
            evidence: request.digest,
        };
        trace_phase(&id, CommitPhase::Submitted);
        let confirmed = lane.submit(&write).await.map_err(|e| {
            warn!(recipe_id = %id, digest = %request.digest, error = %e, "score write failed");
            e
        })?;
        trace_phase(&id, CommitPhase::Confirmed);

        let receipt = self.receipt(confirmed, Some(request.digest));
        info!(
            recipe_id = %receipt.recipe_id,
            score = receipt.score.value(),
            digest = %request.digest.short(),
            attempts = receipt.attempts,
            strike = receipt.strike_issued,
            "score committed"
        );
        Ok(receipt)
    }

    /// Mint a new record with its first score.
    pub async fn register(&self, request: RegisterRequest) -> Result<CommitReceipt, CommitError> {
        let mut lane = self.sequencer.acquire().await;
        self.check_replay(&request.digest).await?;

        let write = LedgerWrite::Mint {
            outcome: request.outcome,
            content_pointer: request.content_pointer,
            score: request.score,
            evidence: request.digest,
        };
        let confirmed = lane.submit(&write).await?;
        let receipt = self.receipt(confirmed, Some(request.digest));
        info!(
            recipe_id = %receipt.recipe_id,
            score = receipt.score.value(),
            digest = %request.digest.short(),
            "recipe registered"
        );
        Ok(receipt)
    }

    /// Lock a record. Promotion of an already locked record is refused.
    pub async fn promote(&self, id: &RecipeId) -> Result<CommitReceipt, CommitError> {
        let mut lane = self.sequencer.acquire().await;
        let record = self.reader.get_record(id).await?;
        if record.locked {
            return Err(CommitError::RecordLocked(record.id));
        }
        let confirmed = lane.submit(&LedgerWrite::Promote { id: record.id }).await?;
        let receipt = self.receipt(confirmed, None);
        info!(recipe_id = %receipt.recipe_id, score = receipt.score.value(), "record promoted");
        Ok(receipt)
    }

    async fn check_replay(&self, digest: &EvidenceDigest) -> Result<(), CommitError> {
        if self.reader.is_evidence_used(digest).await? {
            warn!(digest = %digest, "evidence replay refused");
            return Err(CommitError::DuplicateEvidence(*digest));
        }
        Ok(())
    }

    fn validate(&self, record: &LedgerRecord, request: &CommitRequest) -> Result<(), CommitError> {
        if record.locked {
            debug!(recipe_id = %record.id, "record is locked");
            return Err(CommitError::RecordLocked(record.id.clone()));
        }

        if let Some(audited) = &request.audited_pointer {
            if audited != &record.content_pointer {
                return Err(CommitError::PointerDrift {
                    id: record.id.clone(),
                    audited: audited.clone(),
                    current: record.content_pointer.clone(),
                });
            }
        }

        if let Some(remaining) = self.cooldown_remaining(record) {
            debug!(recipe_id = %record.id, remaining_secs = remaining.as_secs(), "cooldown active");
            return Err(CommitError::CooldownActive {
                id: record.id.clone(),
                remaining,
            });
        }
        Ok(())
    }

    /// Time left before `record` may be written again, if any.
    ///
    /// An interval too large to compare against timestamps never expires.
    pub fn cooldown_remaining(&self, record: &LedgerRecord) -> Option<Duration> {
        let last = record.last_audit_at?;
        let Ok(interval) = chrono::Duration::from_std(self.config.cooldown()) else {
            warn!(recipe_id = %record.id, cooldown_secs = self.config.cooldown_secs, "cooldown out of range");
            return Some(self.config.cooldown());
        };
        let elapsed = self.clock.now() - last;
        if elapsed >= interval {
            return None;
        }
        Some((interval - elapsed).to_std().unwrap_or(self.config.cooldown()))
    }

    fn receipt(&self, confirmed: Confirmed, digest: Option<EvidenceDigest>) -> CommitReceipt {
        CommitReceipt {
            recipe_id: confirmed.receipt.id,
            score: confirmed.receipt.score,
            digest,
            tx_id: confirmed.receipt.tx_id,
            nonce: confirmed.nonce,
            attempts: confirmed.attempts,
            strikes: confirmed.receipt.strikes,
            strike_issued: confirmed.receipt.strike_issued,
            locked: confirmed.receipt.locked,
            committed_at: self.clock.now(),
        }
    }
}

fn trace_phase(id: &RecipeId, phase: CommitPhase) {
    debug!(recipe_id = %id, phase = phase.as_str(), "commit phase");
}
