use std::sync::Arc;

use forensic_completion::{CompletionRequest, CompletionService};
use forensic_types::{SiloReports, SiloRole};
use tracing::{debug, info, warn};

use crate::error::AuditError;
use crate::pipeline::StageModels;

/// Four independent specialist reviews of the same content.
pub struct SiloStage {
    completion: Arc<dyn CompletionService>,
    models: StageModels,
}

impl SiloStage {
    pub fn new(completion: Arc<dyn CompletionService>, models: StageModels) -> Self {
        Self { completion, models }
    }

    pub fn request_for(&self, role: SiloRole, content: &str) -> CompletionRequest {
        CompletionRequest::new(&self.models.silo_model, role.system_prompt(), content)
            .temperature(self.models.temperature)
            .max_tokens(self.models.max_tokens)
            .labeled(format!("SILO {}", role.label()))
    }

    /// Runs all four roles concurrently. The first failure cancels the rest.
    pub async fn run(&self, content: &str) -> Result<SiloReports, AuditError> {
        info!(chars = content.len(), "dispatching silo reviews");
        let (toil, security, economy, structure) = tokio::try_join!(
            self.review(SiloRole::Toil, content),
            self.review(SiloRole::Security, content),
            self.review(SiloRole::Economy, content),
            self.review(SiloRole::Structure, content),
        )?;
        Ok(SiloReports {
            toil,
            security,
            economy,
            structure,
        })
    }

    async fn review(&self, role: SiloRole, content: &str) -> Result<String, AuditError> {
        let request = self.request_for(role, content);
        match self.completion.complete(&request).await {
            Ok(report) => {
                debug!(role = %role, chars = report.len(), "silo report received");
                Ok(report)
            }
            Err(source) => {
                warn!(role = %role, error = %source, "silo review failed");
                Err(AuditError::SiloAuditFailed { role, source })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use forensic_completion::mocks::ScriptedCompletion;
    use forensic_completion::CompletionError;

    use super::*;

    fn stage(completion: Arc<ScriptedCompletion>) -> SiloStage {
        SiloStage::new(completion, StageModels::default())
    }

    #[tokio::test]
    async fn each_role_gets_its_own_report() {
        let completion = Arc::new(
            ScriptedCompletion::new()
                .reply_when("SILO TOIL", "toil ok")
                .reply_when("SILO SECURITY", "no injection")
                .reply_when("SILO ECONOMY", "fees gameable")
                .reply_when("SILO STRUCTURE", "conforms"),
        );
        let reports = stage(completion.clone()).run("{\"recipe\":1}").await.unwrap();

        assert_eq!(reports.toil, "toil ok");
        assert_eq!(reports.security, "no injection");
        assert_eq!(reports.economy, "fees gameable");
        assert_eq!(reports.structure, "conforms");
        assert_eq!(completion.call_count(), 4);
        assert!(completion
            .calls()
            .iter()
            .all(|c| c.user_content == "{\"recipe\":1}"));
    }

    #[tokio::test]
    async fn one_failed_role_fails_the_stage() {
        let completion = Arc::new(
            ScriptedCompletion::new()
                .fail_when("SILO ECONOMY", CompletionError::unavailable(Some(503), "down"))
                .otherwise("fine"),
        );
        let err = stage(completion).run("content").await.unwrap_err();
        match err {
            AuditError::SiloAuditFailed { role, source } => {
                assert_eq!(role, SiloRole::Economy);
                assert_eq!(source.status(), Some(503));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn requests_carry_stage_settings() {
        let completion = Arc::new(ScriptedCompletion::new());
        let models = StageModels {
            silo_model: "silo-m".into(),
            temperature: 0.2,
            max_tokens: Some(800),
            ..StageModels::default()
        };
        let request = SiloStage::new(completion, models).request_for(SiloRole::Security, "x");
        assert_eq!(request.model, "silo-m");
        assert_eq!(request.temperature, 0.2);
        assert_eq!(request.max_tokens, Some(800));
        assert_eq!(request.system_prompt, SiloRole::Security.system_prompt());
    }
}
