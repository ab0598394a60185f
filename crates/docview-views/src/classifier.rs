//! View classification
//!
//! Pure rule scoring over marker densities, with an optional single AI
//! refinement call when the rules are unsure. The cache key for downstream
//! artifacts is derived from the detected scores only — never from the
//! recommendation built on top of them, so an override of the enabled views
//! can never change cache identity.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

use docview_core::{DetectionMethod, DocumentId, View};
use docview_llm::{ChatMessage, ChatOptions, LlmGateway};

/// Enable a view when its score reaches this threshold.
const THETA_ENABLE: f64 = 0.3;
/// Below this top score the rules are unsure and AI refinement is consulted.
const THETA_CONFIDENT: f64 = 0.5;
/// Marker hits per word mapped onto [0, 1] with this gain.
const DENSITY_GAIN: f64 = 10.0;
/// How much classified text the refinement prompt sees.
const REFINE_PROMPT_CHARS: usize = 4000;

static LEARNING_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)\b(tutorial|guide|learn|learning|lesson|course|how to|step \d|getting started|introduction|beginner|practice|exercise|example)\b",
    )
    .unwrap()
});

static QA_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)\b(question|answer|faq|quiz|interview|what is|why does|how does|problem|solution)\b|^\s*(q|a)\s*[:.]",
    )
    .unwrap()
});

static SYSTEM_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)\b(architecture|component|deploy|deployment|server|database|cluster|service|configuration|config|infrastructure|module|network|topology|install|installation)\b",
    )
    .unwrap()
});

/// Outcome of classification.
#[derive(Debug, Clone)]
pub struct Classification {
    pub scores: BTreeMap<View, f64>,
    pub primary: View,
    pub enabled: Vec<View>,
    pub method: DetectionMethod,
    pub confidence: f64,
}

/// Rule-based view classifier with optional AI refinement.
#[derive(Debug, Clone, Default)]
pub struct ViewClassifier;

impl ViewClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Pure scoring: marker density per view, normalized to [0, 1].
    pub fn score(&self, text: &str) -> BTreeMap<View, f64> {
        let words = text.split_whitespace().count().max(1) as f64;

        let mut scores = BTreeMap::new();
        scores.insert(View::Learning, density_score(&LEARNING_MARKERS, text, words));
        scores.insert(View::Qa, density_score(&QA_MARKERS, text, words));
        scores.insert(View::System, density_score(&SYSTEM_MARKERS, text, words));
        scores
    }

    /// Rule-only classification.
    pub fn classify_rules(&self, text: &str) -> Classification {
        let scores = self.score(text);
        let primary = argmax(&scores);
        let confidence = scores[&primary];
        let enabled = enabled_views(&scores, primary);

        Classification {
            scores,
            primary,
            enabled,
            method: DetectionMethod::Rule,
            confidence,
        }
    }

    /// Full classification: rules first, one AI refinement call when the top
    /// score is below the confidence threshold and a gateway is available.
    /// The AI verdict replaces the rule result only when its confidence is
    /// at least the rule confidence.
    pub async fn classify(&self, text: &str, gateway: Option<&LlmGateway>) -> Classification {
        let mut result = self.classify_rules(text);

        if result.confidence >= THETA_CONFIDENT {
            return result;
        }
        let Some(gateway) = gateway else {
            return result;
        };

        match self.refine(text, gateway).await {
            Some((view, confidence)) if confidence >= result.confidence => {
                debug!(
                    rule_primary = %result.primary,
                    ai_primary = %view,
                    ai_confidence = confidence,
                    "AI verdict replaced rule classification"
                );
                result.primary = view;
                result.confidence = confidence;
                result.method = DetectionMethod::Hybrid;
                result.enabled = enabled_views(&result.scores, view);
            }
            Some(_) => {
                // AI was consulted but less sure than the rules.
                result.method = DetectionMethod::Hybrid;
            }
            None => {}
        }
        result
    }

    async fn refine(&self, text: &str, gateway: &LlmGateway) -> Option<(View, f64)> {
        let excerpt = crate::sources::truncate_chars(text, REFINE_PROMPT_CHARS);
        let messages = [
            ChatMessage::system(
                "You classify IT documents into exactly one category: \
                 learning (tutorials, guides, courses), qa (question/answer \
                 collections), or system (architecture, deployment, operations).",
            ),
            ChatMessage::user(format!(
                "Classify this document. Reply with only a JSON object \
                 {{\"view\": \"learning|qa|system\", \"confidence\": 0.0-1.0}}.\n\n{}",
                excerpt
            )),
        ];

        let value = gateway
            .generate_json(
                "view_classification",
                &messages,
                r#"{"view": "learning|qa|system", "confidence": 0.0}"#,
                &ChatOptions::default(),
            )
            .await
            .ok()?;

        let view: View = value.get("view")?.as_str()?.parse().ok()?;
        let confidence = value.get("confidence")?.as_f64()?.clamp(0.0, 1.0);
        Some((view, confidence))
    }
}

fn density_score(markers: &Regex, text: &str, words: f64) -> f64 {
    let hits = markers.find_iter(text).count() as f64;
    (hits / words * DENSITY_GAIN).min(1.0)
}

fn argmax(scores: &BTreeMap<View, f64>) -> View {
    let mut best = View::Learning;
    let mut best_score = f64::MIN;
    for view in View::ALL {
        let score = scores.get(&view).copied().unwrap_or(0.0);
        if score > best_score {
            best = view;
            best_score = score;
        }
    }
    best
}

fn enabled_views(scores: &BTreeMap<View, f64>, primary: View) -> Vec<View> {
    let mut enabled = vec![primary];
    for view in View::ALL {
        if view != primary && scores.get(&view).copied().unwrap_or(0.0) >= THETA_ENABLE {
            enabled.push(view);
        }
    }
    enabled
}

/// Cache key for downstream artifacts.
///
/// Derived from the document id and the detection scores only, over a
/// canonical encoding: view names in sorted order, scores at fixed 4-decimal
/// precision. Enabled views and the primary view must never feed this hash.
pub fn cache_key(document_id: &DocumentId, scores: &BTreeMap<View, f64>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.to_string().as_bytes());
    for view in View::ALL {
        let score = scores.get(&view).copied().unwrap_or(0.0);
        hasher.update(format!("|{}={:.4}", view.as_str(), score).as_bytes());
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Display mapping from view to document type label.
pub fn type_mapping() -> serde_json::Value {
    json!({
        "learning": "learning_document",
        "qa": "qa_collection",
        "system": "system_document",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn learning_text() -> String {
        "This tutorial is a beginner guide. In this course you will learn \
         step 1 through practice and example exercises. Getting started is \
         easy with this lesson."
            .to_string()
    }

    fn system_text() -> String {
        "The deployment architecture uses a database cluster behind the API \
         server. Each component reads its configuration from the config \
         service; infrastructure and network topology are described below."
            .to_string()
    }

    #[test]
    fn test_learning_text_scores_learning_highest() {
        let classifier = ViewClassifier::new();
        let result = classifier.classify_rules(&learning_text());
        assert_eq!(result.primary, View::Learning);
        assert!(result.scores[&View::Learning] > result.scores[&View::System]);
        assert!(result.scores[&View::Learning] > result.scores[&View::Qa]);
        assert_eq!(result.method, DetectionMethod::Rule);
    }

    #[test]
    fn test_system_text_scores_system_highest() {
        let classifier = ViewClassifier::new();
        let result = classifier.classify_rules(&system_text());
        assert_eq!(result.primary, View::System);
    }

    #[test]
    fn test_scores_are_normalized() {
        let classifier = ViewClassifier::new();
        let dense = "tutorial guide learn course lesson ".repeat(50);
        for score in classifier.score(&dense).values() {
            assert!((0.0..=1.0).contains(score));
        }
    }

    #[test]
    fn test_primary_always_enabled() {
        let classifier = ViewClassifier::new();
        let result = classifier.classify_rules("plain text with no markers at all");
        assert!(result.enabled.contains(&result.primary));
        assert!(!result.enabled.is_empty());
    }

    #[test]
    fn test_mixed_text_enables_both_views() {
        let text = format!("{} {}", learning_text(), system_text());
        let result = ViewClassifier::new().classify_rules(&text);
        assert!(result.enabled.len() >= 2);
        assert!(result.enabled.contains(&View::Learning));
        assert!(result.enabled.contains(&View::System));
    }

    #[test]
    fn test_cache_key_depends_only_on_id_and_scores() {
        let id = DocumentId::new();
        let mut scores = BTreeMap::new();
        scores.insert(View::Learning, 0.7);
        scores.insert(View::Qa, 0.05);
        scores.insert(View::System, 0.6);

        // The key is a pure function of (id, scores); recommendation fields
        // are not inputs, so recomputing always matches.
        let a = cache_key(&id, &scores);
        let b = cache_key(&id, &scores);
        assert_eq!(a, b);

        let mut other = scores.clone();
        other.insert(View::Qa, 0.06);
        assert_ne!(a, cache_key(&id, &other));

        let other_id = DocumentId::new();
        assert_ne!(a, cache_key(&other_id, &scores));
    }

    #[test]
    fn test_cache_key_canonical_precision() {
        let id = DocumentId::new();
        let mut a = BTreeMap::new();
        a.insert(View::Learning, 0.70001);
        let mut b = BTreeMap::new();
        b.insert(View::Learning, 0.70002);
        // Below canonical precision the keys coincide
        assert_eq!(cache_key(&id, &a), cache_key(&id, &b));
    }

    #[tokio::test]
    async fn test_confident_rules_skip_gateway() {
        let classifier = ViewClassifier::new();
        let dense = "tutorial guide learn course lesson how to ".repeat(20);
        let result = classifier.classify(&dense, None).await;
        assert_eq!(result.method, DetectionMethod::Rule);
        assert!(result.confidence >= 0.5);
    }

    #[tokio::test]
    async fn test_unsure_without_gateway_stays_rule() {
        let classifier = ViewClassifier::new();
        let result = classifier.classify("nothing special written here today", None).await;
        assert_eq!(result.method, DetectionMethod::Rule);
    }
}
