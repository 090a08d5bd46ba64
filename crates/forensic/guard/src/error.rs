use std::time::Duration;

use forensic_types::{EvidenceDigest, RecipeId};
use thiserror::Error;

/// Failures at the ledger boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The sequencing token moved between read and submit.
    #[error("stale nonce {submitted} (ledger expects {expected:?})")]
    StaleNonce {
        submitted: u64,
        expected: Option<u64>,
    },

    #[error("ledger rejected write: {0}")]
    Rejected(String),

    #[error("ledger transport error: {0}")]
    Transport(String),

    #[error("ledger response could not be decoded: {0}")]
    Decode(String),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::StaleNonce { .. } | LedgerError::Transport(_))
    }
}

/// Why the commit guard refused or failed a write.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommitError {
    #[error("evidence {0} was already used for an accepted write")]
    DuplicateEvidence(EvidenceDigest),

    #[error("record {0} is locked")]
    RecordLocked(RecipeId),

    #[error("record {id} is cooling down for another {remaining:?}")]
    CooldownActive { id: RecipeId, remaining: Duration },

    /// The content pointer changed after the audit fetched it.
    #[error("record {id} now points at {current}, audit covered {audited}")]
    PointerDrift {
        id: RecipeId,
        audited: String,
        current: String,
    },

    #[error("write failed after {attempts} attempts: {last_reason}")]
    WriteFailed { attempts: u32, last_reason: String },

    #[error("ledger rejected write: {0}")]
    Rejected(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl CommitError {
    /// Guard check that produced the error.
    pub fn stage(&self) -> &'static str {
        match self {
            CommitError::DuplicateEvidence(_) => "replay",
            CommitError::RecordLocked(_) => "lock",
            CommitError::CooldownActive { .. } => "cooldown",
            CommitError::PointerDrift { .. } => "identity",
            CommitError::WriteFailed { .. } | CommitError::Rejected(_) => "write",
            CommitError::Ledger(_) => "ledger",
        }
    }

    /// Whether a later sweep may succeed without anything else changing.
    pub fn is_retryable(&self) -> bool {
        match self {
            CommitError::CooldownActive { .. } | CommitError::WriteFailed { .. } => true,
            CommitError::Ledger(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Integrity refusals are expected outcomes, not faults.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            CommitError::DuplicateEvidence(_)
                | CommitError::RecordLocked(_)
                | CommitError::CooldownActive { .. }
                | CommitError::PointerDrift { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let locked = CommitError::RecordLocked(RecipeId::Index(4));
        assert_eq!(locked.stage(), "lock");
        assert!(locked.is_refusal());
        assert!(!locked.is_retryable());

        let cooling = CommitError::CooldownActive {
            id: RecipeId::Index(4),
            remaining: Duration::from_secs(60),
        };
        assert!(cooling.is_retryable());

        let transport: CommitError = LedgerError::Transport("reset".into()).into();
        assert_eq!(transport.stage(), "ledger");
        assert!(transport.is_retryable());
        assert!(!CommitError::Rejected("bad".into()).is_retryable());
    }
}
