use std::path::{Path, PathBuf};

use anyhow::Context;
use forensic_types::AuditSession;
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::report::RecipeReport;

#[derive(Serialize)]
struct ArchiveLine<'a> {
    session: &'a AuditSession,
    report: &'a RecipeReport,
}

/// Append-only JSON-lines log of finished sessions.
#[derive(Debug, Clone)]
pub struct SessionArchive {
    path: PathBuf,
}

impl SessionArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, session: &AuditSession, report: &RecipeReport) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(&ArchiveLine { session, report })?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("cannot open session log {}", self.path.display()))?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use forensic_types::RecipeId;

    use super::*;

    #[tokio::test]
    async fn appends_one_line_per_session() {
        let dir = tempfile::tempdir().unwrap();
        let archive = SessionArchive::new(dir.path().join("sessions.jsonl"));

        for id in [1u64, 2] {
            let session = AuditSession::new(RecipeId::Index(id), "{}");
            let report = RecipeReport::skipped(RecipeId::Index(id), "test");
            archive.append(&session, &report).await.unwrap();
        }

        let written = tokio::fs::read_to_string(archive.path()).await.unwrap();
        let lines: Vec<serde_json::Value> = written
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["session"]["target_id"], 2);
        assert_eq!(lines[1]["report"]["outcome"]["status"], "skipped");
    }
}
