//! Call-metric sink and result-quality measurement.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use docview_core::{AiCallMetric, AiResultQuality, DocumentId, View};
use docview_llm::MetricSink;
use docview_store::Store;

/// Metric sink writing append-only rows through the store. Failures are
/// logged and swallowed; metrics never fail a call.
pub struct StoreMetricSink {
    store: Arc<dyn Store>,
}

impl StoreMetricSink {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MetricSink for StoreMetricSink {
    async fn record(&self, metric: AiCallMetric) {
        if let Err(e) = self.store.record_metric(&metric).await {
            warn!(error = %e, call_type = %metric.call_type, "failed to record call metric");
        }
    }
}

/// Measure the quality of a completed view result.
pub fn quality_of(document_id: DocumentId, view: View, result: &Value) -> AiResultQuality {
    let empty = serde_json::Map::new();
    let fields = result.as_object().unwrap_or(&empty);

    let total_fields = fields.len().max(1);
    let filled_fields = fields.values().filter(|v| !is_empty_value(v)).count();
    let field_completeness = filled_fields as f64 / total_fields as f64;

    let mut confidences = Vec::new();
    collect_confidences(result, &mut confidences);
    let (confidence_avg, confidence_min, confidence_max) = if confidences.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let sum: f64 = confidences.iter().sum();
        (
            sum / confidences.len() as f64,
            confidences.iter().cloned().fold(f64::MAX, f64::min),
            confidences.iter().cloned().fold(f64::MIN, f64::max),
        )
    };

    let mut sources_total = 0u32;
    let mut groups_with_sources_key = 0u32;
    let mut groups_with_sources = 0u32;
    collect_sources(
        result,
        &mut sources_total,
        &mut groups_with_sources_key,
        &mut groups_with_sources,
    );
    let sources_completeness = if groups_with_sources_key == 0 {
        0.0
    } else {
        groups_with_sources as f64 / groups_with_sources_key as f64
    };

    let quality_score = (field_completeness * 40.0
        + confidence_avg * 0.4
        + sources_completeness * 20.0)
        .clamp(0.0, 100.0);

    AiResultQuality {
        document_id,
        view,
        field_completeness,
        confidence_avg,
        confidence_min,
        confidence_max,
        sources_count: sources_total,
        sources_completeness,
        quality_score,
        created_at: chrono::Utc::now(),
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn collect_confidences(value: &Value, out: &mut Vec<f64>) {
    match value {
        Value::Object(map) => {
            if let Some(c) = map.get("confidence").and_then(Value::as_f64) {
                out.push(c);
            }
            map.values().for_each(|v| collect_confidences(v, out));
        }
        Value::Array(items) => items.iter().for_each(|v| collect_confidences(v, out)),
        _ => {}
    }
}

fn collect_sources(value: &Value, total: &mut u32, with_key: &mut u32, non_empty: &mut u32) {
    match value {
        Value::Object(map) => {
            if let Some(Value::Array(sources)) = map.get("sources") {
                *with_key += 1;
                *total += sources.len() as u32;
                if !sources.is_empty() {
                    *non_empty += 1;
                }
            }
            map.values()
                .for_each(|v| collect_sources(v, total, with_key, non_empty));
        }
        Value::Array(items) => items
            .iter()
            .for_each(|v| collect_sources(v, total, with_key, non_empty)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quality_of_complete_result() {
        let result = json!({
            "prerequisites": {
                "required": ["basics"],
                "confidence": 80,
                "sources": [{"id": 1}],
            },
            "related_technologies": {
                "technologies": ["docker"],
                "confidence": 60,
                "sources": [{"id": 2}, {"id": 3}],
            },
        });
        let quality = quality_of(DocumentId::new(), View::Learning, &result);

        assert!((quality.field_completeness - 1.0).abs() < 1e-9);
        assert!((quality.confidence_avg - 70.0).abs() < 1e-9);
        assert_eq!(quality.confidence_min, 60.0);
        assert_eq!(quality.confidence_max, 80.0);
        assert_eq!(quality.sources_count, 3);
        assert!((quality.sources_completeness - 1.0).abs() < 1e-9);
        assert!(quality.quality_score > 80.0);
    }

    #[test]
    fn test_quality_of_sparse_result() {
        let result = json!({
            "summary": {},
            "generated_questions": [],
            "extracted_answers": {"answers": []},
        });
        let quality = quality_of(DocumentId::new(), View::Qa, &result);

        assert!(quality.field_completeness < 0.5);
        assert_eq!(quality.confidence_avg, 0.0);
        assert_eq!(quality.sources_count, 0);
    }

    #[test]
    fn test_quality_score_bounded() {
        let quality = quality_of(DocumentId::new(), View::System, &json!({}));
        assert!((0.0..=100.0).contains(&quality.quality_score));
    }
}
