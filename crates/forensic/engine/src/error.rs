use forensic_completion::CompletionError;
use forensic_types::{EvidenceDigest, SiloRole};
use thiserror::Error;

/// Recipe-scoped pipeline failures. None of them may abort a batch sweep.
#[derive(Error, Debug, Clone)]
pub enum AuditError {
    #[error("content unavailable at {pointer}: {reason}")]
    ContentUnavailable { pointer: String, reason: String },

    #[error("silo {role} failed: {source}")]
    SiloAuditFailed {
        role: SiloRole,
        #[source]
        source: CompletionError,
    },

    #[error("jury synthesis failed: {0}")]
    JurySynthesisFailed(#[source] CompletionError),

    /// Every extraction strategy came back empty. No write may follow.
    #[error("score unresolvable from {chars} chars of jury output (evidence {digest})")]
    ScoreUnresolvable { chars: usize, digest: EvidenceDigest },
}

impl AuditError {
    /// Pipeline stage the failure belongs to, for sweep reports.
    pub fn stage(&self) -> &'static str {
        match self {
            AuditError::ContentUnavailable { .. } => "content",
            AuditError::SiloAuditFailed { .. } => "silo",
            AuditError::JurySynthesisFailed(_) => "jury",
            AuditError::ScoreUnresolvable { .. } => "resolver",
        }
    }

    pub fn digest(&self) -> Option<EvidenceDigest> {
        match self {
            AuditError::ScoreUnresolvable { digest, .. } => Some(*digest),
            _ => None,
        }
    }

    /// Whether the upstream cause looks temporary.
    pub fn is_transient(&self) -> bool {
        match self {
            AuditError::ContentUnavailable { .. } => true,
            AuditError::SiloAuditFailed { source, .. } => source.is_transient(),
            AuditError::JurySynthesisFailed(source) => source.is_transient(),
            AuditError::ScoreUnresolvable { .. } => false,
        }
    }
}
