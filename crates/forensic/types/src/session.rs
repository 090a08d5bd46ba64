use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evidence::EvidenceDigest;
use crate::panel::{JuryVote, SiloReports};
use crate::recipe::RecipeId;
use crate::score::Bps;

/// Which extraction layer produced the score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    DirectParse,
    RegexScrape,
    SelfCalculatedFallback,
}

impl ResolutionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionStrategy::DirectParse => "direct-parse",
            ResolutionStrategy::RegexScrape => "regex-scrape",
            ResolutionStrategy::SelfCalculatedFallback => "self-calculated-fallback",
        }
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedScore {
    pub score: Bps,
    pub strategy: ResolutionStrategy,
}

/// One recipe's trip through the pipeline.
///
/// Populated stage by stage; the evidence digest is fixed the moment the
/// jury output is recorded, since it covers reports and votes together.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditSession {
    pub session_id: Uuid,
    pub target_id: RecipeId,
    /// Pointer the content was fetched from, if it came from the ledger.
    pub content_pointer: Option<String>,
    pub content: String,
    pub silo_reports: Option<SiloReports>,
    pub jury_text: Option<String>,
    pub jury_votes: Vec<JuryVote>,
    pub resolved: Option<ResolvedScore>,
    pub digest: Option<EvidenceDigest>,
    pub started_at: DateTime<Utc>,
}

impl AuditSession {
    pub fn new(target_id: RecipeId, content: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            target_id,
            content_pointer: None,
            content: content.into(),
            silo_reports: None,
            jury_text: None,
            jury_votes: Vec::new(),
            resolved: None,
            digest: None,
            started_at: Utc::now(),
        }
    }

    pub fn with_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.content_pointer = Some(pointer.into());
        self
    }

    pub fn record_silos(&mut self, reports: SiloReports) {
        self.silo_reports = Some(reports);
    }

    /// Records the jury output and seals the evidence digest.
    ///
    /// Returns `None` if silo reports have not been recorded yet.
    pub fn record_jury(&mut self, jury_text: String, votes: Vec<JuryVote>) -> Option<EvidenceDigest> {
        let reports = self.silo_reports.as_ref()?;
        let digest = EvidenceDigest::compute(reports, &jury_text);
        self.jury_text = Some(jury_text);
        self.jury_votes = votes;
        self.digest = Some(digest);
        Some(digest)
    }

    pub fn record_resolution(&mut self, resolved: ResolvedScore) {
        self.resolved = Some(resolved);
    }

    pub fn is_complete(&self) -> bool {
        self.silo_reports.is_some() && self.digest.is_some() && self.resolved.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reports() -> SiloReports {
        SiloReports {
            toil: "t".into(),
            security: "s".into(),
            economy: "e".into(),
            structure: "st".into(),
        }
    }

    #[test]
    fn jury_requires_silos_first() {
        let mut session = AuditSession::new(RecipeId::Index(3), "{}");
        assert!(session.record_jury("votes".into(), vec![]).is_none());
        assert!(session.digest.is_none());
    }

    #[test]
    fn lifecycle_completes() {
        let mut session = AuditSession::new(RecipeId::Index(3), "{}").with_pointer("ar://abc");
        session.record_silos(reports());
        let digest = session.record_jury("votes".into(), vec![]).unwrap();
        assert_eq!(digest, EvidenceDigest::compute(&reports(), "votes"));
        assert!(!session.is_complete());

        session.record_resolution(ResolvedScore {
            score: Bps::clamped(9_650),
            strategy: ResolutionStrategy::SelfCalculatedFallback,
        });
        assert!(session.is_complete());
        assert_eq!(session.content_pointer.as_deref(), Some("ar://abc"));
    }

    #[test]
    fn strategy_tags() {
        assert_eq!(ResolutionStrategy::RegexScrape.to_string(), "regex-scrape");
        let json = serde_json::to_string(&ResolutionStrategy::SelfCalculatedFallback).unwrap();
        assert_eq!(json, "\"self-calculated-fallback\"");
    }
}
