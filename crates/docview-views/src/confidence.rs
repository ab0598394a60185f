//! Confidence re-scoring
//!
//! Raw model confidence is only one signal. Every field group is re-scored
//! from five weighted signals, penalized for concrete defects, clamped to
//! [0, 100], and labeled.

/// Weights for the confidence re-score. Must sum to 1.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceWeights {
    pub base: f64,
    pub retrieval: f64,
    pub similarity: f64,
    pub concentration: f64,
    pub consistency: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            base: 0.40,
            retrieval: 0.20,
            similarity: 0.15,
            concentration: 0.15,
            consistency: 0.10,
        }
    }
}

impl ConfidenceWeights {
    pub fn sum(&self) -> f64 {
        self.base + self.retrieval + self.similarity + self.concentration + self.consistency
    }
}

/// Signals feeding the re-score. `base_confidence` is on the 0..100 scale;
/// the rest are fractions in [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceSignals {
    pub base_confidence: f64,
    pub retrieval_strength: f64,
    pub similarity: f64,
    pub concentration: f64,
    pub consistency: f64,
}

/// Defects that subtract fixed penalties from the re-score.
#[derive(Debug, Clone, Copy, Default)]
pub struct PenaltyFlags {
    /// References segment ids outside the valid range: −20
    pub out_of_range_refs: bool,
    /// Mentions concepts absent from the preprocessed text: −15
    pub unknown_concepts: bool,
    /// Contradicts itself within the field group: −10
    pub self_contradiction: bool,
}

/// Compute the final confidence for a field group.
pub fn rescore(signals: ConfidenceSignals, flags: PenaltyFlags, weights: ConfidenceWeights) -> u8 {
    let weighted = signals.base_confidence.clamp(0.0, 100.0) * weights.base
        + signals.retrieval_strength.clamp(0.0, 1.0) * 100.0 * weights.retrieval
        + signals.similarity.clamp(0.0, 1.0) * 100.0 * weights.similarity
        + signals.concentration.clamp(0.0, 1.0) * 100.0 * weights.concentration
        + signals.consistency.clamp(0.0, 1.0) * 100.0 * weights.consistency;

    let mut score = weighted;
    if flags.out_of_range_refs {
        score -= 20.0;
    }
    if flags.unknown_concepts {
        score -= 15.0;
    }
    if flags.self_contradiction {
        score -= 10.0;
    }

    score.clamp(0.0, 100.0).round() as u8
}

/// Label for a confidence score: high ≥ 75, medium ≥ 40, low otherwise.
pub fn confidence_label(score: u8) -> &'static str {
    if score >= 75 {
        "high"
    } else if score >= 40 {
        "medium"
    } else {
        "low"
    }
}

/// Fraction of `terms` that occur (case-insensitively) in `text`.
///
/// Returns 1.0 for an empty term list: nothing claimed, nothing absent.
pub fn term_coverage(terms: &[String], text: &str) -> f64 {
    if terms.is_empty() {
        return 1.0;
    }
    let haystack = text.to_lowercase();
    let present = terms
        .iter()
        .filter(|t| {
            let needle = t.trim().to_lowercase();
            !needle.is_empty() && haystack.contains(&needle)
        })
        .count();
    present as f64 / terms.len() as f64
}

/// Fraction of significant words (length > 3) of `content` present in `text`.
pub fn word_overlap(content: &str, text: &str) -> f64 {
    let haystack = text.to_lowercase();
    let words: Vec<String> = content
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3)
        .map(String::from)
        .collect();
    if words.is_empty() {
        return 1.0;
    }
    let present = words.iter().filter(|w| haystack.contains(w.as_str())).count();
    present as f64 / words.len() as f64
}

/// Case-insensitive duplicate check over a list of names, used as the
/// self-contradiction signal for list-shaped field groups.
pub fn has_duplicate_names(names: &[String]) -> bool {
    let mut seen = std::collections::HashSet::new();
    names
        .iter()
        .any(|n| !seen.insert(n.trim().to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_signals() -> ConfidenceSignals {
        ConfidenceSignals {
            base_confidence: 100.0,
            retrieval_strength: 1.0,
            similarity: 1.0,
            concentration: 1.0,
            consistency: 1.0,
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        assert!((ConfidenceWeights::default().sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_perfect_signals_score_100() {
        let score = rescore(full_signals(), PenaltyFlags::default(), ConfidenceWeights::default());
        assert_eq!(score, 100);
    }

    #[test]
    fn test_penalties_subtract_fixed_amounts() {
        let weights = ConfidenceWeights::default();
        let all = PenaltyFlags {
            out_of_range_refs: true,
            unknown_concepts: true,
            self_contradiction: true,
        };
        assert_eq!(rescore(full_signals(), all, weights), 55);
    }

    #[test]
    fn test_score_clamped_at_zero() {
        let signals = ConfidenceSignals {
            base_confidence: 10.0,
            retrieval_strength: 0.0,
            similarity: 0.0,
            concentration: 0.0,
            consistency: 0.0,
        };
        let flags = PenaltyFlags {
            out_of_range_refs: true,
            unknown_concepts: true,
            self_contradiction: true,
        };
        assert_eq!(rescore(signals, flags, ConfidenceWeights::default()), 0);
    }

    #[test]
    fn test_labels() {
        assert_eq!(confidence_label(90), "high");
        assert_eq!(confidence_label(75), "high");
        assert_eq!(confidence_label(74), "medium");
        assert_eq!(confidence_label(40), "medium");
        assert_eq!(confidence_label(39), "low");
        assert_eq!(confidence_label(0), "low");
    }

    #[test]
    fn test_term_coverage() {
        let text = "Kubernetes clusters run containerized workloads on nodes.";
        let terms = vec!["Kubernetes".to_string(), "Terraform".to_string()];
        assert!((term_coverage(&terms, text) - 0.5).abs() < 1e-9);
        assert_eq!(term_coverage(&[], text), 1.0);
    }

    #[test]
    fn test_word_overlap() {
        let text = "install the database server and start the service";
        assert!(word_overlap("install database", text) > 0.99);
        assert!(word_overlap("quantum entanglement", text) < 0.01);
    }

    #[test]
    fn test_duplicate_names() {
        let names = vec!["Docker".to_string(), " docker ".to_string()];
        assert!(has_duplicate_names(&names));
        let unique = vec!["Docker".to_string(), "Podman".to_string()];
        assert!(!has_duplicate_names(&unique));
    }
}
