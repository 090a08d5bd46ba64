use std::sync::Arc;

use forensic_completion::{CompletionRequest, CompletionService};
use forensic_types::{AuditSession, EvidenceDigest, LedgerRecord, RecipeId};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::content::ContentStore;
use crate::error::AuditError;
use crate::jury::{parse_votes, JuryStage};
use crate::resolver::{ResolverConfig, ScoreResolver};
use crate::silo::SiloStage;

/// Model and sampling settings shared by both completion stages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageModels {
    pub silo_model: String,
    pub jury_model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for StageModels {
    fn default() -> Self {
        Self {
            silo_model: "grok-4-1-fast-reasoning".to_string(),
            jury_model: "grok-4-1-fast-reasoning".to_string(),
            temperature: CompletionRequest::DEFAULT_TEMPERATURE,
            max_tokens: None,
        }
    }
}

/// A failed audit, with the session as far as it got.
#[derive(Debug)]
pub struct AuditFailure {
    pub error: AuditError,
    /// `None` when the content never arrived.
    pub session: Option<Box<AuditSession>>,
}

impl From<AuditFailure> for AuditError {
    fn from(failure: AuditFailure) -> Self {
        failure.error
    }
}

/// The three-stage audit pipeline for a single recipe.
///
/// Stages run strictly in order. A failure at any stage ends the session with
/// no score; the caller decides whether the batch carries on.
pub struct AuditEngine {
    silos: SiloStage,
    jury: JuryStage,
    resolver: ScoreResolver,
}

impl AuditEngine {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        models: StageModels,
        resolver: ResolverConfig,
    ) -> Self {
        Self {
            silos: SiloStage::new(completion.clone(), models.clone()),
            jury: JuryStage::new(completion, models),
            resolver: ScoreResolver::new(resolver),
        }
    }

    /// Swap the extractor chain.
    pub fn with_resolver(mut self, resolver: ScoreResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Audit content already in hand.
    pub async fn audit(
        &self,
        target_id: RecipeId,
        content: impl Into<String>,
    ) -> Result<AuditSession, AuditError> {
        Ok(self.audit_retaining(target_id, content).await?)
    }

    /// [`audit`](Self::audit), handing back the partial session on failure.
    pub async fn audit_retaining(
        &self,
        target_id: RecipeId,
        content: impl Into<String>,
    ) -> Result<AuditSession, AuditFailure> {
        self.run(AuditSession::new(target_id, content)).await
    }

    /// Fetch the record's content, then audit it.
    ///
    /// The session keeps the pointer it was fetched from so the commit guard
    /// can detect a pointer that moved while the audit was in flight.
    pub async fn audit_record(
        &self,
        record: &LedgerRecord,
        store: &dyn ContentStore,
    ) -> Result<AuditSession, AuditError> {
        Ok(self.audit_record_retaining(record, store).await?)
    }

    /// [`audit_record`](Self::audit_record), handing back the partial session
    /// on failure so its evidence can be kept.
    pub async fn audit_record_retaining(
        &self,
        record: &LedgerRecord,
        store: &dyn ContentStore,
    ) -> Result<AuditSession, AuditFailure> {
        let content = store
            .fetch(&record.content_pointer)
            .await
            .map_err(|error| AuditFailure {
                error,
                session: None,
            })?;
        let session =
            AuditSession::new(record.id.clone(), content).with_pointer(&record.content_pointer);
        self.run(session).await
    }

    async fn run(&self, mut session: AuditSession) -> Result<AuditSession, AuditFailure> {
        match self.stages(&mut session).await {
            Ok(()) => Ok(session),
            Err(error) => Err(AuditFailure {
                error,
                session: Some(Box::new(session)),
            }),
        }
    }

    async fn stages(&self, session: &mut AuditSession) -> Result<(), AuditError> {
        let target = session.target_id.to_string();
        info!(recipe = %target, session = %session.session_id, "audit started");

        let reports = self.silos.run(&session.content).await?;
        session.record_silos(reports.clone());

        let jury_text = self.jury.run(&reports).await?;
        let votes = parse_votes(&jury_text);
        let digest = session
            .record_jury(jury_text.clone(), votes)
            .unwrap_or_else(|| EvidenceDigest::compute(&reports, &jury_text));

        let resolved = self.resolver.resolve_evidence(&jury_text, digest)?;
        session.record_resolution(resolved);

        info!(
            recipe = %target,
            score = resolved.score.value(),
            strategy = %resolved.strategy,
            evidence = %digest.short(),
            votes = session.jury_votes.len(),
            "audit resolved"
        );
        Ok(())
    }
}
