//! First-time registration from a genesis manifest.

use std::path::Path;

use anyhow::{bail, Context};
use forensic_guard::RegisterRequest;
use forensic_types::{AuditSession, RecipeId};
use serde_json::Value;
use tracing::{info, warn};

use crate::report::{Outcome, RecipeReport};
use crate::sweep::Sweeper;

/// One manifest entry. The whole entry is the content that gets audited.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub id: u64,
    pub outcome: String,
    pub cid: String,
    pub document: Value,
}

/// Parse a manifest: a JSON array of `{id?, outcome, cid, ...}` objects.
///
/// A leading byte-order mark is tolerated. Entries without an `id` take their
/// position in the array.
pub fn parse_manifest(text: &str) -> anyhow::Result<Vec<ManifestEntry>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let entries: Vec<Value> = serde_json::from_str(text).context("manifest is not a JSON array")?;

    let mut manifest = Vec::with_capacity(entries.len());
    for (position, document) in entries.into_iter().enumerate() {
        let id = document
            .get("id")
            .and_then(Value::as_u64)
            .unwrap_or(position as u64);
        let outcome = match document.get("outcome").and_then(Value::as_str) {
            Some(outcome) => outcome.to_string(),
            None => bail!("manifest entry {position} has no outcome"),
        };
        let cid = document
            .get("cid")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        manifest.push(ManifestEntry {
            id,
            outcome,
            cid,
            document,
        });
    }
    manifest.sort_by_key(|entry| entry.id);
    Ok(manifest)
}

pub async fn load_manifest(path: &Path) -> anyhow::Result<Vec<ManifestEntry>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read manifest {}", path.display()))?;
    parse_manifest(&text)
}

impl Sweeper {
    /// Audit and mint every manifest entry at or beyond the ledger frontier.
    pub async fn genesis(&self, manifest: Vec<ManifestEntry>) -> anyhow::Result<Vec<RecipeReport>> {
        let frontier = self.ledger.next_id().await?;
        info!(entries = manifest.len(), frontier, dry_run = self.dry_run, "genesis started");

        let mut reports = Vec::with_capacity(manifest.len());
        for entry in manifest {
            let report = self.register_entry(entry, frontier).await;
            report.log();
            if report.outcome.is_failure() {
                tokio::time::sleep(self.settings.failure_backoff()).await;
            }
            reports.push(report);
        }
        Ok(reports)
    }

    async fn register_entry(&self, entry: ManifestEntry, frontier: u64) -> RecipeReport {
        let id = RecipeId::Index(entry.id);
        if entry.id < frontier {
            return RecipeReport::skipped(id, "already registered");
        }

        let content = match serde_json::to_string_pretty(&entry.document) {
            Ok(content) => content,
            Err(e) => {
                return RecipeReport::scored(
                    &AuditSession::new(id, ""),
                    Outcome::Failed {
                        reason: e.to_string(),
                        retryable: false,
                    },
                )
            }
        };

        let session = match self.engine.audit_retaining(id.clone(), content).await {
            Ok(session) => session.with_pointer(&entry.cid),
            Err(failure) => {
                let report = RecipeReport::audit_failed(id, &failure.error);
                if let Some(session) = failure.session {
                    self.archive(&(*session).with_pointer(&entry.cid), &report).await;
                }
                return report;
            }
        };

        let report = match (self.dry_run, session.resolved, session.digest) {
            (true, _, _) => RecipeReport::scored(&session, Outcome::DryRun),
            (false, Some(resolved), Some(digest)) => {
                let request = RegisterRequest {
                    outcome: entry.outcome.clone(),
                    content_pointer: entry.cid.clone(),
                    score: resolved.score,
                    digest,
                };
                match self.guard.register(request).await {
                    Ok(receipt) => {
                        if receipt.recipe_id != id {
                            warn!(
                                manifest_id = entry.id,
                                ledger_id = %receipt.recipe_id,
                                "ledger assigned a different id"
                            );
                        }
                        RecipeReport::committed(&session, &receipt)
                    }
                    Err(e) => RecipeReport::commit_failed(&session, &e),
                }
            }
            (false, _, _) => RecipeReport::scored(
                &session,
                Outcome::Failed {
                    reason: "session finished without a score".into(),
                    retryable: false,
                },
            ),
        };

        self.archive(&session, &report).await;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bom_and_missing_ids_are_tolerated() {
        let text = "\u{feff}[{\"outcome\": \"A-GENESIS-00\", \"cid\": \"c0\"}, \
                    {\"id\": 1, \"outcome\": \"A-GENESIS-01\", \"cid\": \"c1\", \"steps\": [1]}]";
        let manifest = parse_manifest(text).unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest[0].id, 0);
        assert_eq!(manifest[1].document["steps"][0], 1);
    }

    #[test]
    fn entries_are_ordered_by_id() {
        let text = r#"[{"id": 5, "outcome": "b"}, {"id": 2, "outcome": "a"}]"#;
        let ids: Vec<u64> = parse_manifest(text).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 5]);
    }

    #[test]
    fn entry_without_outcome_is_rejected() {
        assert!(parse_manifest(r#"[{"id": 1, "cid": "x"}]"#).is_err());
    }
}
