//! The view processor contract and shared step machinery.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use docview_core::{Segment, View};
use docview_llm::{ChatMessage, ChatOptions, LlmGateway};

use crate::confidence::{
    confidence_label, rescore, term_coverage, word_overlap, ConfidenceSignals, ConfidenceWeights,
    PenaltyFlags,
};
use crate::sources::{
    clamp_confidence, has_out_of_range_ids, resolve_sources, sanitize_source_ids,
};
use crate::{Result, ViewError};

/// Callback invoked after each completed step: `(step, total, label)`.
pub type StepCallback = dyn Fn(usize, usize, &str) + Send + Sync;

/// Everything a view processor needs for one run.
pub struct ProcessContext<'a> {
    pub preprocessed_text: &'a str,
    pub segments: &'a [Segment],
    pub gateway: &'a LlmGateway,
    pub step_timeout: Duration,
    on_step: Option<&'a StepCallback>,
}

impl<'a> ProcessContext<'a> {
    pub fn new(
        preprocessed_text: &'a str,
        segments: &'a [Segment],
        gateway: &'a LlmGateway,
        step_timeout: Duration,
    ) -> Self {
        Self {
            preprocessed_text,
            segments,
            gateway,
            step_timeout,
            on_step: None,
        }
    }

    pub fn with_step_callback(mut self, callback: &'a StepCallback) -> Self {
        self.on_step = Some(callback);
        self
    }

    pub(crate) fn publish_step(&self, step: usize, total: usize, title: &str) {
        if let Some(callback) = self.on_step {
            let label = format!("step {}/{} – {}", step, total, title);
            callback(step, total, &label);
        }
    }

    /// Run one scripted LLM step under the step timeout.
    pub(crate) async fn run_step(
        &self,
        call_type: &str,
        system_prompt: &str,
        user_prompt: String,
        schema_hint: &str,
    ) -> Result<Value> {
        let messages = [
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_prompt),
        ];
        match tokio::time::timeout(
            self.step_timeout,
            self.gateway
                .generate_json(call_type, &messages, schema_hint, &ChatOptions::default()),
        )
        .await
        {
            Ok(result) => result.map_err(ViewError::from),
            Err(_) => Err(ViewError::StepTimeout(call_type.to_string())),
        }
    }

    /// Segment-tagged document text for prompts: `[id] text` per segment.
    pub(crate) fn render_segments(&self) -> String {
        self.segments
            .iter()
            .map(|s| format!("[{}] {}", s.id, s.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Normalized outcome of one field group.
pub(crate) struct GroupOutcome {
    pub confidence: u8,
    pub label: &'static str,
    pub sources: Vec<Value>,
}

/// Validate and re-score one field group of a step payload.
///
/// `claimed_terms` are names the group asserts (technologies, prerequisites);
/// terms absent from the document text trigger the unknown-concept penalty.
/// `contradiction` is the group's self-contradiction signal.
pub(crate) fn finalize_group(
    ctx: &ProcessContext<'_>,
    payload: &Value,
    claimed_terms: &[String],
    contradiction: bool,
) -> GroupOutcome {
    let segment_count = ctx.segments.len() as u32;
    let raw_ids = payload.get("source_ids");
    let valid_ids = sanitize_source_ids(raw_ids, segment_count);
    let out_of_range = has_out_of_range_ids(raw_ids, segment_count);
    let base_confidence = clamp_confidence(payload.get("confidence"));

    let requested = match raw_ids {
        Some(Value::Array(items)) => items.len(),
        _ => 0,
    };
    let retrieval_strength = if requested == 0 {
        0.0
    } else {
        valid_ids.len() as f64 / requested as f64
    };

    let cited_text: String = valid_ids
        .iter()
        .filter_map(|id| ctx.segments.iter().find(|s| s.id == *id))
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let group_text = group_content_text(payload);
    let similarity = if cited_text.is_empty() {
        word_overlap(&group_text, ctx.preprocessed_text)
    } else {
        word_overlap(&group_text, &cited_text)
    };

    let coverage = term_coverage(claimed_terms, ctx.preprocessed_text);
    let unknown_concepts = !claimed_terms.is_empty() && coverage < 0.7;

    let concentration = if valid_ids.is_empty() {
        0.0
    } else {
        1.0 / valid_ids.len() as f64
    };

    let consistency = if contradiction { 0.0 } else { 1.0 };

    let score = rescore(
        ConfidenceSignals {
            base_confidence: base_confidence as f64,
            retrieval_strength,
            similarity,
            concentration,
            consistency,
        },
        PenaltyFlags {
            out_of_range_refs: out_of_range,
            unknown_concepts,
            self_contradiction: contradiction,
        },
        ConfidenceWeights::default(),
    );

    GroupOutcome {
        confidence: score,
        label: confidence_label(score),
        sources: resolve_sources(&valid_ids, ctx.segments),
    }
}

/// Concatenated free-text content of a step payload, for similarity checks.
fn group_content_text(payload: &Value) -> String {
    fn collect(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(s) => out.push(s.clone()),
            Value::Array(items) => items.iter().for_each(|v| collect(v, out)),
            Value::Object(map) => map
                .iter()
                .filter(|(k, _)| *k != "source_ids" && *k != "confidence")
                .for_each(|(_, v)| collect(v, out)),
            _ => {}
        }
    }
    let mut parts = Vec::new();
    collect(payload, &mut parts);
    parts.join(" ")
}

/// Read a string array field, dropping non-strings.
pub(crate) fn string_array(payload: &Value, field: &str) -> Vec<String> {
    payload
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// A view's fixed multi-step script.
#[async_trait]
pub trait ViewProcessor: Send + Sync {
    /// The view this processor produces.
    fn view(&self) -> View;

    /// Number of scripted steps, for progress interpolation.
    fn step_count(&self) -> usize;

    /// Run the script and return the view's result object.
    async fn process(&self, ctx: &ProcessContext<'_>) -> Result<Value>;
}

/// Value-type registry of view processors, passed through constructors.
#[derive(Clone)]
pub struct ViewRegistry {
    processors: HashMap<View, Arc<dyn ViewProcessor>>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    /// Registry with all three standard processors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::learning::LearningProcessor::new()));
        registry.register(Arc::new(crate::qa::QaProcessor::new()));
        registry.register(Arc::new(crate::system::SystemProcessor::new()));
        registry
    }

    pub fn register(&mut self, processor: Arc<dyn ViewProcessor>) {
        self.processors.insert(processor.view(), processor);
    }

    pub fn get(&self, view: View) -> Option<Arc<dyn ViewProcessor>> {
        self.processors.get(&view).cloned()
    }

    pub fn registered_views(&self) -> Vec<View> {
        View::ALL
            .into_iter()
            .filter(|v| self.processors.contains_key(v))
            .collect()
    }
}

impl Default for ViewRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_defaults_cover_all_views() {
        let registry = ViewRegistry::with_defaults();
        assert_eq!(registry.registered_views(), View::ALL.to_vec());
        for view in View::ALL {
            assert!(registry.get(view).is_some());
        }
    }

    #[test]
    fn test_group_content_text_skips_bookkeeping_fields() {
        let payload = json!({
            "required": ["Rust basics"],
            "confidence": 80,
            "source_ids": [1, 2],
        });
        let text = group_content_text(&payload);
        assert!(text.contains("Rust basics"));
        assert!(!text.contains("80"));
    }

    #[test]
    fn test_string_array_filters_non_strings() {
        let payload = json!({"items": ["a", 1, "b", null]});
        assert_eq!(string_array(&payload, "items"), vec!["a", "b"]);
        assert!(string_array(&payload, "missing").is_empty());
    }
}
