//! Per-recipe outcomes and the end-of-run summary.

use std::fmt::Write as _;

use forensic_engine::AuditError;
use forensic_guard::{CommitError, CommitReceipt, LedgerError};
use forensic_types::{AuditSession, Bps, EvidenceDigest, RecipeId, ResolutionStrategy};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What happened to one recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Committed {
        tx_id: String,
        attempts: u32,
        strike_issued: bool,
    },
    /// Scored but not written.
    DryRun,
    Skipped { reason: String },
    /// A guard integrity check declined the write.
    Refused { reason: String },
    Failed { reason: String, retryable: bool },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Committed { .. } => "committed",
            Outcome::DryRun => "dry-run",
            Outcome::Skipped { .. } => "skipped",
            Outcome::Refused { .. } => "refused",
            Outcome::Failed { .. } => "failed",
        }
    }

    /// Whether the sweep should back off before the next recipe.
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeReport {
    pub recipe_id: RecipeId,
    /// Last pipeline stage reached, or the one that failed.
    pub stage: String,
    pub score: Option<Bps>,
    pub strategy: Option<ResolutionStrategy>,
    pub digest: Option<EvidenceDigest>,
    pub outcome: Outcome,
}

impl RecipeReport {
    pub fn skipped(recipe_id: RecipeId, reason: impl Into<String>) -> Self {
        Self {
            recipe_id,
            stage: "read".into(),
            score: None,
            strategy: None,
            digest: None,
            outcome: Outcome::Skipped {
                reason: reason.into(),
            },
        }
    }

    pub fn read_failed(recipe_id: RecipeId, error: &LedgerError) -> Self {
        Self {
            outcome: Outcome::Failed {
                reason: error.to_string(),
                retryable: error.is_retryable(),
            },
            ..Self::skipped(recipe_id, "")
        }
    }

    pub fn audit_failed(recipe_id: RecipeId, error: &AuditError) -> Self {
        Self {
            recipe_id,
            stage: error.stage().into(),
            score: None,
            strategy: None,
            digest: error.digest(),
            outcome: Outcome::Failed {
                reason: error.to_string(),
                retryable: error.is_transient(),
            },
        }
    }

    /// Scored session, outcome still to be decided.
    pub fn scored(session: &AuditSession, outcome: Outcome) -> Self {
        Self {
            recipe_id: session.target_id.clone(),
            stage: "resolver".into(),
            score: session.resolved.map(|r| r.score),
            strategy: session.resolved.map(|r| r.strategy),
            digest: session.digest,
            outcome,
        }
    }

    pub fn committed(session: &AuditSession, receipt: &CommitReceipt) -> Self {
        let mut report = Self::scored(
            session,
            Outcome::Committed {
                tx_id: receipt.tx_id.clone(),
                attempts: receipt.attempts,
                strike_issued: receipt.strike_issued,
            },
        );
        report.recipe_id = receipt.recipe_id.clone();
        report.stage = "commit".into();
        report
    }

    pub fn commit_failed(session: &AuditSession, error: &CommitError) -> Self {
        let outcome = if error.is_refusal() {
            Outcome::Refused {
                reason: error.to_string(),
            }
        } else {
            Outcome::Failed {
                reason: error.to_string(),
                retryable: error.is_retryable(),
            }
        };
        let mut report = Self::scored(session, outcome);
        report.stage = error.stage().into();
        report
    }

    /// One structured log line per recipe; nothing is skipped silently.
    pub fn log(&self) {
        let score = self.score.map(|s| s.value());
        let strategy = self.strategy.map(|s| s.as_str());
        let digest = self.digest.map(|d| d.short());
        match &self.outcome {
            Outcome::Failed { reason, retryable } => warn!(
                recipe_id = %self.recipe_id,
                stage = %self.stage,
                score = ?score,
                digest = ?digest,
                retryable,
                reason = %reason,
                "recipe failed"
            ),
            outcome => info!(
                recipe_id = %self.recipe_id,
                stage = %self.stage,
                score = ?score,
                strategy = ?strategy,
                digest = ?digest,
                outcome = outcome.label(),
                "recipe finished"
            ),
        }
    }
}

/// Plain-text table of every report plus totals.
///
/// Scores below `strike_threshold` are flagged with `!`.
pub fn render_summary(reports: &[RecipeReport], strike_threshold: Bps) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<14} {:>6}  {:<25} {:<10} {}",
        "RECIPE", "BPS", "STRATEGY", "OUTCOME", "DETAIL"
    );
    for report in reports {
        let score = match report.score {
            Some(s) if s < strike_threshold => format!("{}!", s.value()),
            Some(s) => s.value().to_string(),
            None => "-".into(),
        };
        let strategy = report.strategy.map(|s| s.as_str()).unwrap_or("-");
        let detail = match &report.outcome {
            Outcome::Committed {
                tx_id,
                strike_issued,
                ..
            } => {
                if *strike_issued {
                    format!("{tx_id} (strike)")
                } else {
                    tx_id.clone()
                }
            }
            Outcome::DryRun => String::new(),
            Outcome::Skipped { reason }
            | Outcome::Refused { reason }
            | Outcome::Failed { reason, .. } => reason.clone(),
        };
        let _ = writeln!(
            out,
            "{:<14} {:>6}  {:<25} {:<10} {}",
            report.recipe_id.to_string(),
            score,
            strategy,
            report.outcome.label(),
            detail
        );
    }

    let count = |label: &str| reports.iter().filter(|r| r.outcome.label() == label).count();
    let below = reports
        .iter()
        .filter(|r| r.score.is_some_and(|s| s < strike_threshold))
        .count();
    let _ = writeln!(
        out,
        "{} recipes: {} committed, {} dry-run, {} skipped, {} refused, {} failed; {} below {} bps",
        reports.len(),
        count("committed"),
        count("dry-run"),
        count("skipped"),
        count("refused"),
        count("failed"),
        below,
        strike_threshold.value()
    );
    out
}
