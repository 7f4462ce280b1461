//! Evidence-quality guardrails.
//!
//! Scores retrieved evidence and generated answers with a bag-of-words
//! keyword overlap. This is deliberately crude: the retrieval score already
//! carries the semantic signal, and the lexical overlap is a cheap second
//! opinion, not an embedding-based one. Keep it coarse.

use crate::rag::types::{GuardrailVerdict, RefusalReason, RetrievedChunk};
use std::collections::HashSet;

/// Words too common (or too domain-generic) to signal relevance.
const STOPWORDS: [&str; 23] = [
    "this", "that", "with", "from", "what", "when", "where", "which", "your", "about", "into",
    "their", "there", "here", "have", "will", "could", "should", "would", "also", "city",
    "report", "problem",
];

/// Generated answers echoing fewer query keywords than this are discarded.
const ANSWER_COVERAGE_FLOOR: f32 = 0.2;

/// Generated answers with less vocabulary support than this are discarded.
const GROUNDEDNESS_FLOOR: f32 = 0.3;

/// How many top chunks participate in coverage and groundedness scoring.
const SCORING_CHUNKS: usize = 3;

/// Thresholds for the refusal decision.
#[derive(Debug, Clone)]
pub struct GuardrailPolicy {
    /// Minimum top-result similarity before refusing with `low_confidence`
    pub similarity_threshold: f32,

    /// Minimum query-keyword coverage before refusing with `low_coverage`
    pub coverage_threshold: f32,

    /// Queries with fewer keywords than this pass the coverage check trivially
    pub min_keyword_count: usize,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.35,
            coverage_threshold: 0.34,
            min_keyword_count: 2,
        }
    }
}

/// Lowercase alphabetic tokens of length >= 4, minus stop words.
pub fn keywords(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|word| word.len() >= 4)
        .filter(|word| !STOPWORDS.contains(word))
        .map(|word| word.to_string())
        .collect()
}

fn combined_text(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .take(SCORING_CHUNKS)
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

impl GuardrailPolicy {
    /// Fraction of query keywords present in the top chunks.
    ///
    /// Queries with fewer keywords than `min_keyword_count` trivially pass:
    /// short or ambiguous questions are not penalized for lacking long words.
    pub fn coverage_score(&self, query: &str, chunks: &[RetrievedChunk]) -> f32 {
        let terms = keywords(query);
        if terms.len() < self.min_keyword_count {
            return 1.0;
        }

        let hay = keywords(&combined_text(chunks));
        if terms.is_empty() {
            return 0.0;
        }
        terms.intersection(&hay).count() as f32 / terms.len() as f32
    }

    /// Fraction of query keywords present in the answer text.
    pub fn answer_coverage(&self, query: &str, answer: &str) -> f32 {
        let terms = keywords(query);
        if terms.is_empty() {
            return 0.0;
        }
        let answer_terms = keywords(answer);
        terms.intersection(&answer_terms).count() as f32 / terms.len() as f32
    }

    /// Fraction of answer keywords supported by the top chunks.
    pub fn groundedness_score(&self, answer: &str, chunks: &[RetrievedChunk]) -> f32 {
        let answer_terms = keywords(answer);
        if answer_terms.is_empty() {
            return 0.0;
        }
        let context_terms = keywords(&combined_text(chunks));
        if context_terms.is_empty() {
            return 0.0;
        }
        answer_terms.intersection(&context_terms).count() as f32 / answer_terms.len() as f32
    }

    /// Pre-generation gate. Checks run in a fixed order; first match wins.
    pub fn should_refuse(&self, query: &str, chunks: &[RetrievedChunk]) -> GuardrailVerdict {
        if chunks.is_empty() {
            return GuardrailVerdict {
                refused: true,
                reason: Some(RefusalReason::NoRetrievalHits),
                coverage: 0.0,
                top_score: None,
            };
        }

        let top_score = chunks[0].score;
        if top_score < self.similarity_threshold {
            return GuardrailVerdict {
                refused: true,
                reason: Some(RefusalReason::LowConfidence),
                coverage: 0.0,
                top_score: Some(top_score),
            };
        }

        let coverage = self.coverage_score(query, chunks);
        if coverage < self.coverage_threshold {
            return GuardrailVerdict {
                refused: true,
                reason: Some(RefusalReason::LowCoverage),
                coverage,
                top_score: Some(top_score),
            };
        }

        GuardrailVerdict {
            refused: false,
            reason: None,
            coverage,
            top_score: Some(top_score),
        }
    }

    /// Post-generation gate (non-streaming path only): discard answers that
    /// ignore the question or wander beyond the sources.
    pub fn should_discard_answer(
        &self,
        query: &str,
        answer: &str,
        chunks: &[RetrievedChunk],
    ) -> bool {
        self.answer_coverage(query, answer) < ANSWER_COVERAGE_FLOOR
            || self.groundedness_score(answer, chunks) < GROUNDEDNESS_FLOOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            score,
            text: text.to_string(),
            title: "Test".to_string(),
            uri: "https://city.test/doc".to_string(),
            chunk_id: "https://city.test/doc#0".to_string(),
            doc_id: "doc".to_string(),
        }
    }

    #[test]
    fn test_keywords_filters_short_and_stop_words() {
        let terms = keywords("What are the library parking hours in the city?");
        assert!(terms.contains("library"));
        assert!(terms.contains("parking"));
        assert!(terms.contains("hours"));
        // "what" and "city" are stop words; "the"/"in" are too short.
        assert!(!terms.contains("what"));
        assert!(!terms.contains("city"));
        assert!(!terms.contains("the"));
    }

    #[test]
    fn test_refuses_with_no_hits() {
        let policy = GuardrailPolicy::default();
        let verdict = policy.should_refuse("library hours", &[]);

        assert!(verdict.refused);
        assert_eq!(verdict.reason, Some(RefusalReason::NoRetrievalHits));
        assert_eq!(verdict.top_score, None);
    }

    #[test]
    fn test_refuses_low_confidence_before_coverage() {
        let policy = GuardrailPolicy::default();
        // Text overlaps the query perfectly, but the score is too low.
        let chunks = vec![chunk("library parking garage hours posted", 0.10)];
        let verdict = policy.should_refuse("library parking garage", &chunks);

        assert!(verdict.refused);
        assert_eq!(verdict.reason, Some(RefusalReason::LowConfidence));
        assert_eq!(verdict.top_score, Some(0.10));
    }

    #[test]
    fn test_refuses_low_coverage_on_disjoint_vocabulary() {
        let policy = GuardrailPolicy::default();
        let chunks = vec![chunk("zoning variance appeals procedure", 0.90)];
        let verdict = policy.should_refuse("library parking garage", &chunks);

        assert!(verdict.refused);
        assert_eq!(verdict.reason, Some(RefusalReason::LowCoverage));
        assert!(verdict.coverage < policy.coverage_threshold);
    }

    #[test]
    fn test_passes_with_score_and_coverage() {
        let policy = GuardrailPolicy::default();
        let chunks = vec![chunk(
            "The library parking garage is open weekdays.",
            0.80,
        )];
        let verdict = policy.should_refuse("library parking garage", &chunks);

        assert!(!verdict.refused);
        assert_eq!(verdict.reason, None);
        assert!(verdict.coverage >= policy.coverage_threshold);
        assert_eq!(verdict.top_score, Some(0.80));
    }

    #[test]
    fn test_short_query_coverage_trivially_passes() {
        let policy = GuardrailPolicy::default();
        // One keyword < min_keyword_count: coverage is 1.0 no matter the chunks.
        let coverage = policy.coverage_score("hours?", &[chunk("unrelated text entirely", 0.9)]);
        assert_eq!(coverage, 1.0);
    }

    #[test]
    fn test_coverage_only_counts_top_three_chunks() {
        let policy = GuardrailPolicy::default();
        let chunks = vec![
            chunk("nothing relevant one", 0.9),
            chunk("nothing relevant two", 0.8),
            chunk("nothing relevant three", 0.7),
            // The matching chunk is ranked fourth and must not count.
            chunk("library parking garage", 0.6),
        ];
        let coverage = policy.coverage_score("library parking garage", &chunks);
        assert_eq!(coverage, 0.0);
    }

    #[test]
    fn test_answer_coverage() {
        let policy = GuardrailPolicy::default();
        let coverage =
            policy.answer_coverage("library parking garage", "The parking garage is on Main.");
        assert!((coverage - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(policy.answer_coverage("", "anything"), 0.0);
    }

    #[test]
    fn test_groundedness_score() {
        let policy = GuardrailPolicy::default();
        let chunks = vec![chunk("The recycling schedule changes during holidays.", 0.9)];

        let grounded = policy.groundedness_score("Recycling changes during holidays.", &chunks);
        assert_eq!(grounded, 1.0);

        let ungrounded = policy.groundedness_score("Parking meters accept quarters.", &chunks);
        assert_eq!(ungrounded, 0.0);

        // No answer keywords → zero.
        assert_eq!(policy.groundedness_score("so it is", &chunks), 0.0);
    }

    #[test]
    fn test_should_discard_answer() {
        let policy = GuardrailPolicy::default();
        let chunks = vec![chunk("The library parking garage is open weekdays.", 0.9)];

        // Grounded, on-topic answer survives.
        assert!(!policy.should_discard_answer(
            "library parking garage",
            "The library parking garage is open weekdays.",
            &chunks
        ));

        // Off-topic answer fails answer coverage.
        assert!(policy.should_discard_answer(
            "library parking garage",
            "Restaurants downtown serve lunch daily.",
            &chunks
        ));
    }
}
