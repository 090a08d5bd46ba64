//! Ledger boundary and commit guard.
//!
//! Scores reach the ledger only through [`CommitGuard`], which inside a single
//! write lane checks, in order:
//!
//! 1. the evidence digest has not backed an accepted write before
//! 2. a fresh read of the record
//! 3. the record is not locked (golden)
//! 4. the content pointer still matches the one that was audited
//! 5. the cooldown since the last accepted write has elapsed
//!
//! and then submits with bounded nonce-refresh retries. Identity fields sent
//! with the write are copied from the fresh read.

pub mod clock;
pub mod error;
pub mod guard;
pub mod http;
pub mod ledger;
pub mod memory;
pub mod sequencer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CommitError, LedgerError};
pub use guard::{
    CommitGuard, CommitPhase, CommitReceipt, CommitRequest, GuardConfig, RegisterRequest,
    MAX_COOLDOWN_SECS,
};
pub use http::HttpLedgerGateway;
pub use ledger::{LedgerReader, LedgerWrite, LedgerWriter, PendingTx, TxReceipt};
pub use memory::{seed_record, InMemoryLedger, STRIKE_THRESHOLD_BPS};
pub use sequencer::{Confirmed, RetryPolicy, WriteLane, WriteSequencer};
