use async_trait::async_trait;
use forensic_types::{Bps, EvidenceDigest, LedgerRecord, RecipeId};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Read boundary for the recipe ledger.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    async fn get_record(&self, id: &RecipeId) -> Result<LedgerRecord, LedgerError>;

    /// Whether `digest` already backs an accepted write.
    async fn is_evidence_used(&self, digest: &EvidenceDigest) -> Result<bool, LedgerError>;

    /// Registration frontier: the id the next mint will receive.
    async fn next_id(&self) -> Result<u64, LedgerError>;

    /// Sequencing token the next submission must carry.
    async fn current_nonce(&self) -> Result<u64, LedgerError>;
}

/// Write boundary for the recipe ledger.
///
/// Submission hands back a pending transaction; nothing is final until
/// [`await_confirmation`](LedgerWriter::await_confirmation) returns.
#[async_trait]
pub trait LedgerWriter: Send + Sync {
    async fn submit(&self, write: &LedgerWrite, nonce: u64) -> Result<PendingTx, LedgerError>;

    async fn await_confirmation(&self, pending: &PendingTx) -> Result<TxReceipt, LedgerError>;
}

/// Every mutation the guard can ask the ledger for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerWrite {
    /// `outcome` and `content_pointer` are echoed verbatim from a fresh read.
    UpdateScore {
        id: RecipeId,
        outcome: String,
        content_pointer: String,
        score: Bps,
        evidence: EvidenceDigest,
    },
    Mint {
        outcome: String,
        content_pointer: String,
        score: Bps,
        evidence: EvidenceDigest,
    },
    Promote {
        id: RecipeId,
    },
}

impl LedgerWrite {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerWrite::UpdateScore { .. } => "update_score",
            LedgerWrite::Mint { .. } => "mint",
            LedgerWrite::Promote { .. } => "promote",
        }
    }

    pub fn evidence(&self) -> Option<EvidenceDigest> {
        match self {
            LedgerWrite::UpdateScore { evidence, .. } | LedgerWrite::Mint { evidence, .. } => {
                Some(*evidence)
            }
            LedgerWrite::Promote { .. } => None,
        }
    }
}

/// Handle for a submitted, not yet confirmed, write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTx {
    pub tx_id: String,
    pub nonce: u64,
}

/// Confirmed effect of a write on its record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_id: String,
    pub id: RecipeId,
    pub score: Bps,
    pub strikes: u32,
    /// The accepted score fell below the ledger's trust threshold.
    #[serde(default)]
    pub strike_issued: bool,
    pub locked: bool,
}
