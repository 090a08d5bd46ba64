use std::sync::Arc;
use std::time::Duration;

use forensic_completion::mocks::ScriptedCompletion;
use forensic_completion::CompletionError;
use forensic_engine::{
    AuditEngine, AuditError, ContentStore, HttpContentStore, ResolverConfig, StageModels,
    StaticContentStore,
};
use forensic_types::{Bps, EvidenceDigest, LedgerRecord, RecipeId, ResolutionStrategy};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JURY_NO_BPS: &str = r#"The jury has deliberated.
{"jury": [
  {"voter": 1, "score": 10, "verdict": "Operationally sound."},
  {"voter": 2, "score": 20, "verdict": "Some fee path exposure."},
  {"voter": 3, "score": 15, "verdict": "Schema is strict enough."},
  {"voter": 4, "score": 25, "verdict": "Lifecycle drift is possible."}
]}"#;

fn silos_ok() -> ScriptedCompletion {
    ScriptedCompletion::new()
        .reply_when("SILO TOIL", "Minimal toil.")
        .reply_when("SILO SECURITY", "No injection surface.")
        .reply_when("SILO ECONOMY", "Arbitrage window on refunds.")
        .reply_when("SILO STRUCTURE", "Conforms to lifecycle.")
}

fn engine(completion: Arc<ScriptedCompletion>) -> AuditEngine {
    AuditEngine::new(completion, StageModels::default(), ResolverConfig::default())
}

#[tokio::test]
async fn recomputes_score_from_juror_severities() {
    let completion = Arc::new(silos_ok().reply_when("JURY", JURY_NO_BPS));
    let session = engine(completion.clone())
        .audit(RecipeId::Index(42), "{\"outcome\":\"refund\"}")
        .await
        .unwrap();

    let resolved = session.resolved.unwrap();
    assert_eq!(resolved.score, Bps::new(9650).unwrap());
    assert_eq!(resolved.strategy, ResolutionStrategy::SelfCalculatedFallback);
    assert_eq!(session.jury_votes.len(), 4);
    assert_eq!(completion.call_count(), 5);

    let reports = session.silo_reports.as_ref().unwrap();
    assert_eq!(
        session.digest,
        Some(EvidenceDigest::compute(reports, JURY_NO_BPS))
    );
    assert!(session.is_complete());
}

#[tokio::test]
async fn explicit_bps_field_is_used_verbatim() {
    let completion = Arc::new(silos_ok().reply_when("JURY", r#"{"final_bps": 8125}"#));
    let session = engine(completion)
        .audit(RecipeId::Key("A-GENESIS-01".into()), "{}")
        .await
        .unwrap();
    let resolved = session.resolved.unwrap();
    assert_eq!(resolved.score.value(), 8125);
    assert_eq!(resolved.strategy, ResolutionStrategy::DirectParse);
}

#[tokio::test]
async fn failed_silo_never_reaches_jury() {
    let completion = Arc::new(
        ScriptedCompletion::new()
            .fail_when("SILO SECURITY", CompletionError::unavailable(Some(500), "boom"))
            .reply_when("JURY", JURY_NO_BPS)
            .otherwise("Report."),
    );
    let err = engine(completion.clone())
        .audit(RecipeId::Index(7), "{}")
        .await
        .unwrap_err();

    assert_eq!(err.stage(), "silo");
    assert_eq!(completion.calls_matching("JURY"), 0);
}

#[tokio::test]
async fn unresolvable_jury_output_carries_digest() {
    let completion = Arc::new(silos_ok().reply_when("JURY", "The jury declined to vote."));
    let err = engine(completion)
        .audit(RecipeId::Index(3), "{}")
        .await
        .unwrap_err();

    match err {
        AuditError::ScoreUnresolvable { digest, .. } => {
            assert_ne!(digest, EvidenceDigest::from_bytes([0; 32]));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unresolvable_session_keeps_its_evidence() {
    let completion = Arc::new(silos_ok().reply_when("JURY", "The jury declined to vote."));
    let failure = engine(completion)
        .audit_retaining(RecipeId::Index(3), "{}")
        .await
        .unwrap_err();

    let session = failure.session.expect("partial session");
    assert_eq!(session.jury_text.as_deref(), Some("The jury declined to vote."));
    assert!(session.silo_reports.is_some());
    assert_eq!(session.digest, failure.error.digest());
    assert!(session.resolved.is_none());
}

#[tokio::test]
async fn record_audit_keeps_pointer() {
    let completion = Arc::new(silos_ok().reply_when("JURY", JURY_NO_BPS));
    let store = StaticContentStore::new().with("cid-9", "{\"steps\":[]}");
    let record = LedgerRecord {
        id: RecipeId::Index(9),
        outcome: "refund".into(),
        content_pointer: "cid-9".into(),
        score: Bps::ZERO,
        strikes: 0,
        locked: false,
        last_audit_at: None,
    };

    let session = engine(completion.clone())
        .audit_record(&record, &store)
        .await
        .unwrap();

    assert_eq!(session.content_pointer.as_deref(), Some("cid-9"));
    assert_eq!(session.content, "{\"steps\":[]}");
    assert!(completion
        .calls()
        .iter()
        .filter(|c| c.label.as_deref().unwrap_or("").starts_with("SILO"))
        .all(|c| c.user_content == "{\"steps\":[]}"));
}

#[tokio::test]
async fn gateway_document_is_pretty_printed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cid-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "outcome": "refund",
            "steps": [1, 2]
        })))
        .mount(&server)
        .await;

    let store = HttpContentStore::new(server.uri(), Duration::from_secs(5)).unwrap();
    let content = store.fetch("ar://cid-abc").await.unwrap();

    let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(parsed["outcome"], "refund");
    assert!(content.contains('\n'));
}

#[tokio::test]
async fn gateway_errors_are_content_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/not-json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = HttpContentStore::new(server.uri(), Duration::from_secs(5)).unwrap();
    assert!(matches!(
        store.fetch("missing").await,
        Err(AuditError::ContentUnavailable { .. })
    ));
    assert!(matches!(
        store.fetch("not-json").await,
        Err(AuditError::ContentUnavailable { .. })
    ));
}
