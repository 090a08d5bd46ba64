//! Layered score extraction.
//!
//! Jury output is free text. Extractors are tried in order and the first one
//! that yields a number wins; its result is clamped to `[0, 10000]`. When all
//! of them come back empty the score is unresolvable and nothing may be written.

use forensic_types::{Bps, EvidenceDigest, ResolutionStrategy, ResolvedScore, Severity};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::AuditError;
use crate::jury::parse_votes;
use crate::scan::{as_integer, embedded_objects, normalize_key, parse_grouped};

/// One extraction layer.
pub trait ScoreExtractor: Send + Sync {
    fn strategy(&self) -> ResolutionStrategy;

    /// Raw, unclamped score if this layer recognises one.
    fn extract(&self, text: &str) -> Option<i64>;
}

/// Reads an explicit basis-point field out of embedded JSON.
///
/// Per-juror `score` fields are severities, not basis points, and are ignored.
#[derive(Debug, Default)]
pub struct DirectFieldExtractor;

const BPS_KEYS: [&str; 5] = ["bps", "finalbps", "scorebps", "basispoints", "successbps"];

impl DirectFieldExtractor {
    fn find(value: &Value) -> Option<i64> {
        match value {
            Value::Object(map) => map
                .iter()
                .find(|(k, _)| BPS_KEYS.contains(&normalize_key(k).as_str()))
                .and_then(|(_, v)| as_integer(v))
                .or_else(|| map.values().find_map(Self::find)),
            Value::Array(items) => items.iter().find_map(Self::find),
            _ => None,
        }
    }
}

impl ScoreExtractor for DirectFieldExtractor {
    fn strategy(&self) -> ResolutionStrategy {
        ResolutionStrategy::DirectParse
    }

    fn extract(&self, text: &str) -> Option<i64> {
        embedded_objects(text).iter().find_map(Self::find)
    }
}

/// Scrapes a labeled number such as `Final BPS: 9650` from prose.
///
/// The last labeled value wins, so a restated final figure beats an earlier
/// mention. A value that opens an arithmetic expression (`BPS: 10000 - 350`)
/// is a formula, not a result, and is skipped.
#[derive(Debug)]
pub struct LabeledPatternExtractor {
    pattern: Regex,
}

impl Default for LabeledPatternExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LabeledPatternExtractor {
    pub fn new() -> Self {
        Self {
            pattern: labeled(r"(?:final[\s_-]*)?(?:bps|basis[\s_-]*points)"),
        }
    }
}

impl ScoreExtractor for LabeledPatternExtractor {
    fn strategy(&self) -> ResolutionStrategy {
        ResolutionStrategy::RegexScrape
    }

    fn extract(&self, text: &str) -> Option<i64> {
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| {
                let number = caps.get(1)?;
                if starts_expression(&text[number.end()..]) {
                    return None;
                }
                parse_grouped(number.as_str())
            })
            .last()
    }
}

/// Recomputes the score from juror severities: `10000 - 20 × mean`.
///
/// Structured votes are preferred; then labeled `score`/`severity` numbers,
/// then per-juror lines such as `Juror 3: 15`. Only values in 1..=100 count,
/// and fewer than `min_samples` is a miss.
#[derive(Debug)]
pub struct SeverityAverageExtractor {
    min_samples: usize,
    labeled: Regex,
    per_juror: Regex,
}

impl SeverityAverageExtractor {
    pub fn new(min_samples: usize) -> Self {
        Self {
            min_samples: min_samples.max(1),
            labeled: labeled(r"(?:severity|score)"),
            per_juror: fixed(r"(?i)(?:juror|member|voter)\s*#?\s*\d{1,2}\s*[:=]\s*(\d{1,3})"),
        }
    }

    fn severities(&self, text: &str) -> Vec<Severity> {
        let votes = parse_votes(text);
        if votes.len() >= self.min_samples {
            return votes.into_iter().map(|v| v.severity).collect();
        }
        let labeled = scrape(&self.labeled, text);
        if labeled.len() >= self.min_samples {
            return labeled;
        }
        scrape(&self.per_juror, text)
    }
}

fn scrape(pattern: &Regex, text: &str) -> Vec<Severity> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| parse_grouped(caps.get(1)?.as_str()))
        .filter_map(Severity::from_i64)
        .collect()
}

impl ScoreExtractor for SeverityAverageExtractor {
    fn strategy(&self) -> ResolutionStrategy {
        ResolutionStrategy::SelfCalculatedFallback
    }

    fn extract(&self, text: &str) -> Option<i64> {
        let severities = self.severities(text);
        if severities.len() < self.min_samples {
            debug!(
                found = severities.len(),
                required = self.min_samples,
                "too few severities to recompute"
            );
            return None;
        }
        let average = Severity::average(&severities)?;
        Some(i64::from(Bps::from_average_severity(average).value()))
    }
}

/// `label` followed by an optional quote and separator, capturing the number.
/// Comma-grouped thousands (`9,650`) are captured whole.
fn labeled(label: &str) -> Regex {
    fixed(&format!(
        r#"(?i)\b{label}\b["']?\s*(?:[:=]|is|of)?\s*["']?(-?\d{{1,3}}(?:,\d{{3}})+|-?\d{{1,6}})\b"#
    ))
}

fn fixed(source: &str) -> Regex {
    // Patterns are fixed at compile time; a failure here is a programming error.
    Regex::new(source).unwrap_or_else(|e| panic!("invalid extractor pattern {source}: {e}"))
}

fn starts_expression(rest: &str) -> bool {
    matches!(
        rest.trim_start().chars().next(),
        Some('-' | '+' | '*' | '/' | '×' | '(')
    )
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum juror severities before the fallback will recompute a score.
    pub min_severity_samples: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_severity_samples: 4,
        }
    }
}

/// Ordered extractor chain.
pub struct ScoreResolver {
    extractors: Vec<Box<dyn ScoreExtractor>>,
}

impl ScoreResolver {
    /// Direct field, then labeled pattern, then severity recomputation.
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            extractors: vec![
                Box::new(DirectFieldExtractor),
                Box::new(LabeledPatternExtractor::new()),
                Box::new(SeverityAverageExtractor::new(config.min_severity_samples)),
            ],
        }
    }

    pub fn with_extractors(extractors: Vec<Box<dyn ScoreExtractor>>) -> Self {
        Self { extractors }
    }

    pub fn strategies(&self) -> Vec<ResolutionStrategy> {
        self.extractors.iter().map(|e| e.strategy()).collect()
    }

    /// First extractor to produce a number wins.
    pub fn resolve(&self, text: &str) -> Option<ResolvedScore> {
        self.extractors.iter().find_map(|extractor| {
            let raw = extractor.extract(text)?;
            let score = Bps::clamped(raw);
            debug!(
                strategy = %extractor.strategy(),
                raw,
                score = score.value(),
                "score resolved"
            );
            Some(ResolvedScore {
                score,
                strategy: extractor.strategy(),
            })
        })
    }

    /// [`resolve`](Self::resolve), with a miss reported against the evidence digest.
    pub fn resolve_evidence(
        &self,
        text: &str,
        digest: EvidenceDigest,
    ) -> Result<ResolvedScore, AuditError> {
        self.resolve(text).ok_or_else(|| {
            warn!(evidence = %digest, chars = text.len(), "no extraction strategy matched");
            AuditError::ScoreUnresolvable {
                chars: text.len(),
                digest,
            }
        })
    }
}

impl Default for ScoreResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(text: &str) -> Option<ResolvedScore> {
        ScoreResolver::default().resolve(text)
    }

    #[test]
    fn direct_field_wins() {
        let text = r#"{"jury": [{"voter": 1, "score": 90}], "final_bps": 9100}"#;
        let resolved = resolve(text).unwrap();
        assert_eq!(resolved.score.value(), 9100);
        assert_eq!(resolved.strategy, ResolutionStrategy::DirectParse);
    }

    #[test]
    fn direct_field_as_string_inside_fence() {
        let text = "```json\n{\"result\": {\"BPS\": \"8800\"}}\n```";
        assert_eq!(resolve(text).unwrap().score.value(), 8800);
    }

    #[test]
    fn out_of_range_values_clamp() {
        assert_eq!(resolve(r#"{"bps": 12000}"#).unwrap().score, Bps::MAX);
        assert_eq!(resolve(r#"{"bps": -40}"#).unwrap().score, Bps::ZERO);
        assert_eq!(resolve("Final BPS: 99999").unwrap().score, Bps::MAX);
    }

    #[test]
    fn labeled_prose_is_scraped() {
        let resolved = resolve("After deliberation the Final BPS: 9450. Adjourned.").unwrap();
        assert_eq!(resolved.score.value(), 9450);
        assert_eq!(resolved.strategy, ResolutionStrategy::RegexScrape);
    }

    #[test]
    fn grouped_thousands_are_read_whole() {
        let resolved = resolve("The jury concludes. Final BPS: 9,650.").unwrap();
        assert_eq!(resolved.score.value(), 9650);
        assert_eq!(resolved.strategy, ResolutionStrategy::RegexScrape);

        let resolved = resolve(r#"{"bps": "9,650"}"#).unwrap();
        assert_eq!(resolved.score.value(), 9650);
        assert_eq!(resolved.strategy, ResolutionStrategy::DirectParse);
    }

    #[test]
    fn per_juror_lines_recompute() {
        let text = "Juror 1: 10 / Juror 2: 20 / Juror 3: 15 / Juror 4: 25";
        let resolved = resolve(text).unwrap();
        assert_eq!(resolved.strategy, ResolutionStrategy::SelfCalculatedFallback);
        assert_eq!(resolved.score.value(), 9650);
    }

    #[test]
    fn last_labeled_value_wins() {
        let text = "Initial bps = 9000 before review. Revised BPS: 8700.";
        assert_eq!(resolve(text).unwrap().score.value(), 8700);
    }

    #[test]
    fn formula_operands_are_not_scores() {
        let text = "BPS: 10000 - (17.5 * 20). Severity 10, severity 20, severity 15, severity 25.";
        let resolved = resolve(text).unwrap();
        assert_eq!(resolved.strategy, ResolutionStrategy::SelfCalculatedFallback);
        assert_eq!(resolved.score.value(), 9650);
    }

    #[test]
    fn juror_json_without_bps_recomputes() {
        let text = r#"{"jury": [
            {"voter": 1, "score": 10, "verdict": "a"},
            {"voter": 2, "score": 20, "verdict": "b"},
            {"voter": 3, "score": 15, "verdict": "c"},
            {"voter": 4, "score": 25, "verdict": "d"}
        ]}"#;
        let resolved = resolve(text).unwrap();
        assert_eq!(resolved.strategy, ResolutionStrategy::SelfCalculatedFallback);
        assert_eq!(resolved.score.value(), 9650);
    }

    #[test]
    fn too_few_severities_is_unresolvable() {
        assert!(resolve("Juror 1 score: 40. Juror 2 score: 50.").is_none());
        assert!(resolve("The jury is undecided.").is_none());
    }

    #[test]
    fn severities_outside_range_are_ignored() {
        let text = "score: 0, score: 250, score: 10, score: 10, score: 10";
        assert!(resolve(text).is_none());
    }

    #[test]
    fn unresolvable_reports_digest() {
        let digest = EvidenceDigest::from_bytes([7; 32]);
        let err = ScoreResolver::default()
            .resolve_evidence("nothing useful", digest)
            .unwrap_err();
        assert_eq!(err.digest(), Some(digest));
        assert_eq!(err.stage(), "resolver");
    }

    #[test]
    fn chain_order_is_fixed() {
        assert_eq!(
            ScoreResolver::default().strategies(),
            vec![
                ResolutionStrategy::DirectParse,
                ResolutionStrategy::RegexScrape,
                ResolutionStrategy::SelfCalculatedFallback,
            ]
        );
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn any_text_resolves_in_range_or_not_at_all(text in ".{0,400}") {
                if let Some(resolved) = ScoreResolver::default().resolve(&text) {
                    prop_assert!(resolved.score.value() <= 10_000);
                }
            }

            #[test]
            fn recomputed_score_matches_formula(severities in prop::collection::vec(1u8..=100, 4..=10)) {
                let text: String = severities
                    .iter()
                    .enumerate()
                    .map(|(i, s)| format!("Juror {} severity: {}. ", i + 1, s))
                    .collect();
                let resolved = ScoreResolver::default().resolve(&text).unwrap();
                let mean = severities.iter().map(|&s| f64::from(s)).sum::<f64>()
                    / severities.len() as f64;
                prop_assert_eq!(resolved.strategy, ResolutionStrategy::SelfCalculatedFallback);
                prop_assert_eq!(resolved.score, Bps::from_average_severity(mean));
            }
        }
    }
}
