use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::{CommitError, LedgerError};
use crate::ledger::{LedgerReader, LedgerWrite, LedgerWriter, TxReceipt};

/// Bounds for nonce-refresh retries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub refresh_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            refresh_delay: Duration::from_millis(500),
        }
    }
}

/// A write that reached confirmation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confirmed {
    pub receipt: TxReceipt,
    pub nonce: u64,
    pub attempts: u32,
}

#[derive(Debug, Default)]
struct LaneState {
    confirmed: u64,
}

/// Single-writer lane for ledger submissions.
///
/// Only one [`WriteLane`] exists at a time. The nonce is read from the ledger
/// for every attempt and never carried between attempts or recipes.
pub struct WriteSequencer {
    reader: Arc<dyn LedgerReader>,
    writer: Arc<dyn LedgerWriter>,
    policy: RetryPolicy,
    lane: Mutex<LaneState>,
}

impl WriteSequencer {
    pub fn new(
        reader: Arc<dyn LedgerReader>,
        writer: Arc<dyn LedgerWriter>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            reader,
            writer,
            policy,
            lane: Mutex::new(LaneState::default()),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Wait for exclusive use of the write path.
    pub async fn acquire(&self) -> WriteLane<'_> {
        WriteLane {
            sequencer: self,
            state: self.lane.lock().await,
        }
    }

    /// Writes confirmed through this sequencer so far.
    pub async fn confirmed(&self) -> u64 {
        self.lane.lock().await.confirmed
    }
}

/// Exclusive hold on the write path; released on drop.
pub struct WriteLane<'a> {
    sequencer: &'a WriteSequencer,
    state: MutexGuard<'a, LaneState>,
}

impl WriteLane<'_> {
    /// Submit and confirm `write`, refreshing the nonce on stale-token failures.
    ///
    /// Any other ledger rejection is returned as is, without retrying.
    pub async fn submit(&mut self, write: &LedgerWrite) -> Result<Confirmed, CommitError> {
        let policy = self.sequencer.policy;
        let max_attempts = policy.max_attempts.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            let nonce = self.sequencer.reader.current_nonce().await?;
            debug!(kind = write.kind(), attempt, nonce, "submitting write");

            let outcome = match self.sequencer.writer.submit(write, nonce).await {
                Ok(pending) => self.sequencer.writer.await_confirmation(&pending).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(receipt) => {
                    self.state.confirmed += 1;
                    return Ok(Confirmed {
                        receipt,
                        nonce,
                        attempts: attempt,
                    });
                }
                Err(LedgerError::StaleNonce { submitted, expected }) => {
                    warn!(
                        kind = write.kind(),
                        attempt,
                        submitted,
                        expected = ?expected,
                        "stale nonce, refreshing"
                    );
                    last_reason = format!("stale nonce {submitted}");
                    if attempt < max_attempts {
                        tokio::time::sleep(policy.refresh_delay).await;
                    }
                }
                Err(LedgerError::Rejected(reason)) => return Err(CommitError::Rejected(reason)),
                Err(other) => return Err(CommitError::Ledger(other)),
            }
        }

        Err(CommitError::WriteFailed {
            attempts: max_attempts,
            last_reason,
        })
    }
}
