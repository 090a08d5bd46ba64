use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use forensic_types::{Bps, EvidenceDigest, LedgerRecord, RecipeId};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::LedgerError;
use crate::ledger::{LedgerReader, LedgerWrite, LedgerWriter, PendingTx, TxReceipt};

/// Default strike threshold: scores below this many basis points earn a strike.
pub const STRIKE_THRESHOLD_BPS: u16 = 7800;

/// In-memory ledger used for tests, dry runs and local demos.
///
/// Enforces the same record invariants a real ledger does and records every
/// submission, so tests can assert that a refused commit never reached the
/// write boundary. Faults can be injected for the retry paths.
pub struct InMemoryLedger {
    clock: Arc<dyn Clock>,
    strike_threshold: Bps,
    inner: Mutex<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    records: BTreeMap<RecipeId, LedgerRecord>,
    next_index: u64,
    used_evidence: HashSet<EvidenceDigest>,
    nonce: u64,
    pending: HashMap<String, TxReceipt>,
    submissions: Vec<(LedgerWrite, u64)>,
    stale_nonce_faults: u32,
    rejection: Option<String>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            strike_threshold: Bps::clamped(i64::from(STRIKE_THRESHOLD_BPS)),
            inner: Mutex::new(LedgerState::default()),
        }
    }

    pub fn with_strike_threshold(mut self, threshold: Bps) -> Self {
        self.strike_threshold = threshold;
        self
    }

    fn state(&self) -> Result<MutexGuard<'_, LedgerState>, LedgerError> {
        self.inner
            .lock()
            .map_err(|_| LedgerError::Transport("ledger state poisoned".into()))
    }

    /// Seed a record. Index ids advance the registration frontier past them.
    pub fn insert(&self, record: LedgerRecord) {
        if let Ok(mut state) = self.inner.lock() {
            if let Some(index) = record.id.as_index() {
                state.next_index = state.next_index.max(index + 1);
            }
            state.records.insert(record.id.clone(), record);
        }
    }

    pub fn record(&self, id: &RecipeId) -> Option<LedgerRecord> {
        self.inner.lock().ok()?.records.get(id).cloned()
    }

    pub fn mark_evidence_used(&self, digest: EvidenceDigest) {
        if let Ok(mut state) = self.inner.lock() {
            state.used_evidence.insert(digest);
        }
    }

    /// Every submission seen, with the nonce it carried, in order.
    pub fn submissions(&self) -> Vec<(LedgerWrite, u64)> {
        self.inner
            .lock()
            .map(|s| s.submissions.clone())
            .unwrap_or_default()
    }

    pub fn submission_count(&self) -> usize {
        self.inner.lock().map(|s| s.submissions.len()).unwrap_or(0)
    }

    pub fn nonce(&self) -> u64 {
        self.inner.lock().map(|s| s.nonce).unwrap_or(0)
    }

    /// The next `times` submissions lose a race for the nonce.
    pub fn inject_stale_nonce(&self, times: u32) {
        if let Ok(mut state) = self.inner.lock() {
            state.stale_nonce_faults = times;
        }
    }

    /// The next submission is rejected with `reason`.
    pub fn reject_next(&self, reason: impl Into<String>) {
        if let Ok(mut state) = self.inner.lock() {
            state.rejection = Some(reason.into());
        }
    }

    fn apply(&self, state: &mut LedgerState, write: &LedgerWrite) -> Result<TxReceipt, LedgerError> {
        let tx_id = Uuid::new_v4().to_string();
        match write {
            LedgerWrite::UpdateScore {
                id,
                outcome,
                content_pointer,
                score,
                evidence,
            } => {
                if state.used_evidence.contains(evidence) {
                    return Err(LedgerError::Rejected("evidence already used".into()));
                }
                let now = self.clock.now();
                let record = state
                    .records
                    .get_mut(id)
                    .ok_or_else(|| LedgerError::NotFound(format!("record {id}")))?;
                if record.locked {
                    return Err(LedgerError::Rejected("record is golden".into()));
                }
                if &record.outcome != outcome || &record.content_pointer != content_pointer {
                    return Err(LedgerError::Rejected("immutable fields mismatch".into()));
                }
                let strike_issued = *score < self.strike_threshold;
                record.score = *score;
                record.last_audit_at = Some(now);
                if strike_issued {
                    record.strikes += 1;
                }
                let receipt = TxReceipt {
                    tx_id,
                    id: id.clone(),
                    score: record.score,
                    strikes: record.strikes,
                    strike_issued,
                    locked: record.locked,
                };
                state.used_evidence.insert(*evidence);
                Ok(receipt)
            }
            LedgerWrite::Mint {
                outcome,
                content_pointer,
                score,
                evidence,
            } => {
                if state.used_evidence.contains(evidence) {
                    return Err(LedgerError::Rejected("evidence already used".into()));
                }
                let id = RecipeId::Index(state.next_index);
                let strike_issued = *score < self.strike_threshold;
                let record = LedgerRecord {
                    id: id.clone(),
                    outcome: outcome.clone(),
                    content_pointer: content_pointer.clone(),
                    score: *score,
                    strikes: u32::from(strike_issued),
                    locked: false,
                    // The initial score is not an audit; the cooldown starts with the first update.
                    last_audit_at: None,
                };
                let receipt = TxReceipt {
                    tx_id,
                    id: id.clone(),
                    score: record.score,
                    strikes: record.strikes,
                    strike_issued,
                    locked: false,
                };
                state.next_index += 1;
                state.records.insert(id, record);
                state.used_evidence.insert(*evidence);
                Ok(receipt)
            }
            LedgerWrite::Promote { id } => {
                let record = state
                    .records
                    .get_mut(id)
                    .ok_or_else(|| LedgerError::NotFound(format!("record {id}")))?;
                if record.locked {
                    return Err(LedgerError::Rejected("record is already golden".into()));
                }
                record.locked = true;
                Ok(TxReceipt {
                    tx_id,
                    id: id.clone(),
                    score: record.score,
                    strikes: record.strikes,
                    strike_issued: false,
                    locked: true,
                })
            }
        }
    }
}

#[async_trait]
impl LedgerReader for InMemoryLedger {
    async fn get_record(&self, id: &RecipeId) -> Result<LedgerRecord, LedgerError> {
        self.state()?
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("record {id}")))
    }

    async fn is_evidence_used(&self, digest: &EvidenceDigest) -> Result<bool, LedgerError> {
        Ok(self.state()?.used_evidence.contains(digest))
    }

    async fn next_id(&self) -> Result<u64, LedgerError> {
        Ok(self.state()?.next_index)
    }

    async fn current_nonce(&self) -> Result<u64, LedgerError> {
        Ok(self.state()?.nonce)
    }
}

#[async_trait]
impl LedgerWriter for InMemoryLedger {
    async fn submit(&self, write: &LedgerWrite, nonce: u64) -> Result<PendingTx, LedgerError> {
        let mut state = self.state()?;
        state.submissions.push((write.clone(), nonce));

        if state.stale_nonce_faults > 0 {
            // Someone else's transaction landed first.
            state.stale_nonce_faults -= 1;
            state.nonce += 1;
            return Err(LedgerError::StaleNonce {
                submitted: nonce,
                expected: Some(state.nonce),
            });
        }
        if nonce != state.nonce {
            return Err(LedgerError::StaleNonce {
                submitted: nonce,
                expected: Some(state.nonce),
            });
        }
        if let Some(reason) = state.rejection.take() {
            return Err(LedgerError::Rejected(reason));
        }

        let receipt = self.apply(&mut state, write)?;
        state.nonce += 1;
        let pending = PendingTx {
            tx_id: receipt.tx_id.clone(),
            nonce,
        };
        state.pending.insert(receipt.tx_id.clone(), receipt);
        Ok(pending)
    }

    async fn await_confirmation(&self, pending: &PendingTx) -> Result<TxReceipt, LedgerError> {
        self.state()?
            .pending
            .remove(&pending.tx_id)
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {}", pending.tx_id)))
    }
}

/// Record with neutral defaults, for seeding.
pub fn seed_record(id: impl Into<RecipeId>, outcome: &str, pointer: &str) -> LedgerRecord {
    LedgerRecord {
        id: id.into(),
        outcome: outcome.to_string(),
        content_pointer: pointer.to_string(),
        score: Bps::ZERO,
        strikes: 0,
        locked: false,
        last_audit_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(id: u64, score: u16, evidence: u8) -> LedgerWrite {
        LedgerWrite::UpdateScore {
            id: RecipeId::Index(id),
            outcome: "refund".into(),
            content_pointer: "cid".into(),
            score: Bps::clamped(i64::from(score)),
            evidence: EvidenceDigest::from_bytes([evidence; 32]),
        }
    }

    #[tokio::test]
    async fn update_applies_on_confirmation_and_consumes_nonce() {
        let ledger = InMemoryLedger::new();
        ledger.insert(seed_record(0u64, "refund", "cid"));

        let pending = ledger.submit(&update(0, 9200, 1), 0).await.unwrap();
        let receipt = ledger.await_confirmation(&pending).await.unwrap();

        assert_eq!(receipt.score.value(), 9200);
        assert!(!receipt.strike_issued);
        assert_eq!(ledger.nonce(), 1);
        assert!(ledger
            .is_evidence_used(&EvidenceDigest::from_bytes([1; 32]))
            .await
            .unwrap());
        assert!(ledger.record(&RecipeId::Index(0)).unwrap().last_audit_at.is_some());
    }

    #[tokio::test]
    async fn low_scores_earn_strikes() {
        let ledger = InMemoryLedger::new();
        ledger.insert(seed_record(0u64, "refund", "cid"));
        let pending = ledger.submit(&update(0, 7799, 2), 0).await.unwrap();
        let receipt = ledger.await_confirmation(&pending).await.unwrap();
        assert!(receipt.strike_issued);
        assert_eq!(receipt.strikes, 1);
    }

    #[tokio::test]
    async fn ledger_enforces_lock_and_identity() {
        let ledger = InMemoryLedger::new();
        let mut golden = seed_record(0u64, "refund", "cid");
        golden.locked = true;
        ledger.insert(golden);
        ledger.insert(seed_record(1u64, "other", "cid"));

        assert!(matches!(
            ledger.submit(&update(0, 9000, 3), 0).await,
            Err(LedgerError::Rejected(_))
        ));
        assert!(matches!(
            ledger.submit(&update(1, 9000, 4), 0).await,
            Err(LedgerError::Rejected(_))
        ));
        assert_eq!(ledger.nonce(), 0);
    }

    #[tokio::test]
    async fn injected_faults_bump_the_nonce() {
        let ledger = InMemoryLedger::new();
        ledger.insert(seed_record(0u64, "refund", "cid"));
        ledger.inject_stale_nonce(1);

        let err = ledger.submit(&update(0, 9000, 5), 0).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::StaleNonce {
                submitted: 0,
                expected: Some(1)
            }
        );
        assert!(ledger.submit(&update(0, 9000, 5), 1).await.is_ok());
        assert_eq!(ledger.submission_count(), 2);
    }

    #[tokio::test]
    async fn mint_assigns_the_frontier() {
        let ledger = InMemoryLedger::new();
        ledger.insert(seed_record(4u64, "seeded", "cid"));
        assert_eq!(ledger.next_id().await.unwrap(), 5);

        let mint = LedgerWrite::Mint {
            outcome: "new".into(),
            content_pointer: "cid-new".into(),
            score: Bps::MAX,
            evidence: EvidenceDigest::from_bytes([6; 32]),
        };
        let pending = ledger.submit(&mint, 0).await.unwrap();
        let receipt = ledger.await_confirmation(&pending).await.unwrap();
        assert_eq!(receipt.id, RecipeId::Index(5));
        assert_eq!(ledger.next_id().await.unwrap(), 6);
        assert_eq!(ledger.record(&RecipeId::Index(5)).unwrap().last_audit_at, None);
    }

    #[tokio::test]
    async fn strike_threshold_is_configurable() {
        let ledger = InMemoryLedger::new().with_strike_threshold(Bps::clamped(9000));
        ledger.insert(seed_record(0u64, "refund", "cid"));
        let pending = ledger.submit(&update(0, 8500, 7), 0).await.unwrap();
        let receipt = ledger.await_confirmation(&pending).await.unwrap();
        assert!(receipt.strike_issued);
    }
}
