use std::sync::Arc;

use forensic_completion::{CompletionRequest, CompletionService};
use forensic_types::{JuryVote, Severity, SiloReports, JURY_SIZE};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::AuditError;
use crate::pipeline::StageModels;
use crate::scan::{as_integer, embedded_objects, normalize_key};

/// Single-call synthesis: the model role-plays the whole jury.
pub struct JuryStage {
    completion: Arc<dyn CompletionService>,
    models: StageModels,
}

impl JuryStage {
    pub fn new(completion: Arc<dyn CompletionService>, models: StageModels) -> Self {
        Self { completion, models }
    }

    pub fn system_prompt() -> String {
        format!(
            "Lead Forensics: You are a {JURY_SIZE}-person Jury. Review the 4 technical reports. \
             Each juror provides a 1-sentence verdict and a 1-100 severity score \
             (100 = SYSTEM BREAKDOWN). Respond with JSON: \
             {{\"jury\": [{{\"voter\": 1, \"score\": <int>, \"verdict\": \"...\"}}]}}"
        )
    }

    pub fn request_for(&self, reports: &SiloReports) -> CompletionRequest {
        CompletionRequest::new(
            &self.models.jury_model,
            Self::system_prompt(),
            format!("Reports:\n{}", reports.render()),
        )
        .temperature(self.models.temperature)
        .max_tokens(self.models.max_tokens)
        .labeled("JURY")
    }

    pub async fn run(&self, reports: &SiloReports) -> Result<String, AuditError> {
        info!(jurors = JURY_SIZE, "convening jury");
        self.completion
            .complete(&self.request_for(reports))
            .await
            .map_err(|source| {
                warn!(error = %source, "jury synthesis failed");
                AuditError::JurySynthesisFailed(source)
            })
    }
}

/// Best-effort juror votes from the jury output.
///
/// Looks for the first JSON array of objects carrying a severity score.
/// Entries with a severity outside 1..=100 are dropped.
pub fn parse_votes(text: &str) -> Vec<JuryVote> {
    embedded_objects(text)
        .iter()
        .find_map(votes_in)
        .unwrap_or_default()
}

fn votes_in(value: &Value) -> Option<Vec<JuryVote>> {
    match value {
        Value::Array(items) => {
            let votes: Vec<JuryVote> = items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| item.as_object().and_then(|o| vote_from(i, o)))
                .collect();
            if votes.is_empty() {
                items.iter().find_map(votes_in)
            } else {
                Some(votes)
            }
        }
        Value::Object(map) => map.values().find_map(votes_in),
        _ => None,
    }
}

fn vote_from(position: usize, object: &Map<String, Value>) -> Option<JuryVote> {
    let mut voter = None;
    let mut severity = None;
    let mut verdict = String::new();
    for (key, value) in object {
        match normalize_key(key).as_str() {
            "voter" | "juror" | "member" => {
                voter = as_integer(value).and_then(|v| u8::try_from(v).ok());
            }
            "score" | "severity" | "severityscore" => {
                severity = as_integer(value).and_then(Severity::from_i64);
            }
            "verdict" | "reason" | "rationale" => {
                verdict = value.as_str().unwrap_or_default().trim().to_string();
            }
            _ => {}
        }
    }
    Some(JuryVote {
        voter: voter.unwrap_or_else(|| u8::try_from(position + 1).unwrap_or(u8::MAX)),
        severity: severity?,
        verdict,
    })
}

#[cfg(test)]
mod tests {
    use forensic_completion::mocks::ScriptedCompletion;
    use forensic_completion::CompletionError;

    use super::*;

    fn reports() -> SiloReports {
        SiloReports {
            toil: "t".into(),
            security: "s".into(),
            economy: "e".into(),
            structure: "st".into(),
        }
    }

    #[tokio::test]
    async fn one_call_over_rendered_reports() {
        let completion = Arc::new(ScriptedCompletion::new().reply_when("JURY", "{\"bps\": 9000}"));
        let stage = JuryStage::new(completion.clone(), StageModels::default());

        let text = stage.run(&reports()).await.unwrap();

        assert_eq!(text, "{\"bps\": 9000}");
        let calls = completion.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].user_content.contains("SECURITY: s"));
        assert!(calls[0].system_prompt.contains("10-person Jury"));
    }

    #[tokio::test]
    async fn failure_maps_to_jury_error() {
        let completion = Arc::new(
            ScriptedCompletion::new().fail_when("JURY", CompletionError::Stream("eof".into())),
        );
        let err = JuryStage::new(completion, StageModels::default())
            .run(&reports())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "jury");
    }

    #[test]
    fn votes_from_jury_json() {
        let text = r#"Deliberation complete.
{"jury": [
  {"voter": 1, "score": 10, "verdict": "Sound."},
  {"voter": 2, "score": 20, "verdict": "Minor toil."},
  {"voter": 3, "score": 0, "verdict": "Out of range."}
]}"#;
        let votes = parse_votes(text);
        assert_eq!(votes.len(), 2);
        assert_eq!(votes[1].voter, 2);
        assert_eq!(votes[1].severity.value(), 20);
        assert_eq!(votes[1].verdict, "Minor toil.");
    }

    #[test]
    fn missing_voter_numbers_follow_position() {
        let votes = parse_votes(r#"{"jurors": [{"severity": 30}, {"severity": "45"}]}"#);
        let numbers: Vec<u8> = votes.iter().map(|v| v.voter).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn prose_yields_no_votes() {
        assert!(parse_votes("The jury could not agree.").is_empty());
    }
}
