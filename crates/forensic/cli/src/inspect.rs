//! Read-only ledger listing.

use std::fmt::Write as _;
use std::time::Duration;

use forensic_guard::{LedgerError, LedgerReader};
use forensic_types::{LedgerRecord, RecipeId};
use tracing::warn;

/// Bounded retry for flaky ledger reads.
#[derive(Debug, Clone, Copy)]
pub struct ReadRetry {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ReadRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

async fn read_record(
    ledger: &dyn LedgerReader,
    id: &RecipeId,
    retry: ReadRetry,
) -> Result<LedgerRecord, LedgerError> {
    let mut attempt = 1;
    loop {
        match ledger.get_record(id).await {
            Ok(record) => return Ok(record),
            Err(e) if e.is_retryable() && attempt < retry.attempts => {
                warn!(recipe_id = %id, attempt, error = %e, "ledger read failed, retrying");
                attempt += 1;
                tokio::time::sleep(retry.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Render `from..to` (capped at the frontier) as one row per record.
///
/// Records that cannot be read are listed with the error instead of aborting.
pub async fn list_records(
    ledger: &dyn LedgerReader,
    from: u64,
    to: Option<u64>,
    retry: ReadRetry,
) -> Result<String, LedgerError> {
    let frontier = ledger.next_id().await?;
    let end = to.map_or(frontier, |to| to.min(frontier));

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<8} {:>6} {:>7} {:<6} {}",
        "ID", "BPS", "STRIKES", "LOCKED", "OUTCOME"
    );
    for index in from..end {
        let id = RecipeId::Index(index);
        match read_record(ledger, &id, retry).await {
            Ok(record) => {
                let _ = writeln!(
                    out,
                    "{:<8} {:>6} {:>7} {:<6} {}",
                    id.to_string(),
                    record.score.value(),
                    record.strikes,
                    if record.locked { "yes" } else { "no" },
                    record.outcome
                );
            }
            Err(e) => {
                let _ = writeln!(out, "{:<8} unreadable: {}", id.to_string(), e);
            }
        }
    }
    Ok(out)
}
