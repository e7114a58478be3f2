//! Deterministic query router.
//!
//! Classifies a query as simple (one retrieval pass) or complex (multi-hop
//! orchestration) from structural signals alone. No learned model: the same
//! text always routes the same way. Borderline queries stay on the simple
//! path, which keeps the expensive multi-hop loop opt-in by evidence.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Routing outcome for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteDecision {
    /// One fusion + rerank pass.
    Simple,
    /// Multi-hop orchestration.
    Complex,
}

impl RouteDecision {
    /// Stable name used in logs and traces.
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteDecision::Simple => "simple",
            RouteDecision::Complex => "complex",
        }
    }
}

impl std::fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structural signals found in a query, for trace output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteSignals {
    /// Comparison or causal conjunction ("versus", "because", ...).
    pub conjunction: bool,
    /// More than one independent clause.
    pub multiple_clauses: bool,
    /// Several distinct entity references ("both", "each of", enumerations).
    pub multiple_entities: bool,
}

impl RouteSignals {
    fn count(&self) -> usize {
        usize::from(self.conjunction)
            + usize::from(self.multiple_clauses)
            + usize::from(self.multiple_entities)
    }
}

/// Comparison and causal connectives. Matched on word boundaries so that
/// e.g. "android" does not trip the "and" check.
const CONJUNCTIONS: &[&str] = &[
    "versus",
    "vs",
    "compared to",
    "compare",
    "difference between",
    "differences between",
    "because",
    "why does",
    "why did",
    "caused by",
    "cause of",
    "leads to",
    "led to",
    "as a result",
    "impact of",
    "effect of",
];

/// Markers of explicit multi-entity scope.
const MULTI_ENTITY_MARKERS: &[&str] = &["both", "each of", "all of the", "respectively", "either"];

/// Classifies a query by its structural signals.
///
/// Two or more distinct signals are required for the complex route; a single
/// signal is too weak to justify the multi-hop cost.
pub fn classify(query_text: &str) -> RouteDecision {
    let (decision, _) = classify_with_signals(query_text);
    decision
}

/// Classification plus the signals that produced it.
pub fn classify_with_signals(query_text: &str) -> (RouteDecision, RouteSignals) {
    let lowered = query_text.to_lowercase();
    let signals = RouteSignals {
        conjunction: contains_any_phrase(&lowered, CONJUNCTIONS),
        multiple_clauses: clause_count(&lowered) >= 2,
        multiple_entities: contains_any_phrase(&lowered, MULTI_ENTITY_MARKERS)
            || has_enumeration(&lowered),
    };

    let decision = if signals.count() >= 2 {
        RouteDecision::Complex
    } else {
        RouteDecision::Simple
    };
    debug!(
        route = %decision,
        conjunction = signals.conjunction,
        multiple_clauses = signals.multiple_clauses,
        multiple_entities = signals.multiple_entities,
        "query routed"
    );
    (decision, signals)
}

/// Phrase match on word boundaries.
fn contains_any_phrase(lowered: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| {
        lowered.match_indices(phrase).any(|(start, _)| {
            let end = start + phrase.len();
            let before_ok = start == 0
                || !lowered[..start]
                    .chars()
                    .next_back()
                    .is_some_and(char::is_alphanumeric);
            let after_ok = end == lowered.len()
                || !lowered[end..].chars().next().is_some_and(char::is_alphanumeric);
            before_ok && after_ok
        })
    })
}

/// Counts independent clauses: segments split on sentence punctuation and
/// coordinating "and"/"but"/"then" that each carry their own verb-ish weight
/// (at least three words).
fn clause_count(lowered: &str) -> usize {
    lowered
        .split(|c| matches!(c, '.' | ';' | '?' | '!' | ','))
        .flat_map(split_on_coordinators)
        .filter(|clause| clause.split_whitespace().count() >= 3)
        .count()
}

fn split_on_coordinators(segment: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = segment;
    loop {
        let cut = [" and ", " but ", " then "]
            .iter()
            .filter_map(|sep| rest.find(sep).map(|at| (at, sep.len())))
            .min_by_key(|(at, _)| *at);
        match cut {
            Some((at, len)) => {
                parts.push(&rest[..at]);
                rest = &rest[at + len..];
            }
            None => {
                parts.push(rest);
                return parts;
            }
        }
    }
}

/// Detects a comma-separated enumeration: at least three comma items in one
/// sentence, of which the non-head items are short noun-phrase sized.
fn has_enumeration(lowered: &str) -> bool {
    lowered
        .split(|c| matches!(c, '.' | ';' | '?' | '!'))
        .any(|sentence| {
            let items: Vec<&str> = sentence.split(',').collect();
            if items.len() < 3 {
                return false;
            }
            items
                .iter()
                .skip(1)
                .filter(|item| {
                    let words = item
                        .trim_start()
                        .trim_start_matches("and ")
                        .trim_start_matches("or ")
                        .split_whitespace()
                        .count();
                    (1..=4).contains(&words)
                })
                .count()
                >= 2
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_lookup_is_simple() {
        assert_eq!(classify("what is the refund policy"), RouteDecision::Simple);
        assert_eq!(classify("reset password"), RouteDecision::Simple);
    }

    #[test]
    fn test_comparison_across_clauses_is_complex() {
        let (decision, signals) = classify_with_signals(
            "compare the 2023 revenue figures with the 2024 projections, and explain why the forecast changed",
        );
        assert_eq!(decision, RouteDecision::Complex);
        assert!(signals.conjunction);
        assert!(signals.multiple_clauses);
    }

    #[test]
    fn test_single_signal_stays_simple() {
        // A causal connective alone is not enough.
        assert_eq!(classify("why does the build fail"), RouteDecision::Simple);
        // Two clauses alone are not enough either.
        assert_eq!(
            classify("open the settings page and enable dark mode"),
            RouteDecision::Simple
        );
    }

    #[test]
    fn test_multi_entity_enumeration_with_conjunction_is_complex() {
        let (decision, signals) = classify_with_signals(
            "what is the difference between the basic, pro, and enterprise plans",
        );
        assert_eq!(decision, RouteDecision::Complex);
        assert!(signals.conjunction);
        assert!(signals.multiple_entities);
    }

    #[test]
    fn test_both_marker_counts_as_multi_entity() {
        let (_, signals) =
            classify_with_signals("summarize both the intro and the appendix because they overlap");
        assert!(signals.multiple_entities);
        assert!(signals.conjunction);
    }

    #[test]
    fn test_word_boundary_matching() {
        // "android" must not match "and"; "canvas" must not match "vs".
        let (decision, signals) = classify_with_signals("install the android canvas app");
        assert_eq!(decision, RouteDecision::Simple);
        assert!(!signals.conjunction);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let text = "compare the old api with the new api, and list what changed because of it";
        let first = classify(text);
        for _ in 0..10 {
            assert_eq!(classify(text), first);
        }
    }
}
