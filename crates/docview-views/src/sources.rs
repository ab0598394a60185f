//! Source citation handling
//!
//! Model output references segments by id. Ids are validated against the
//! actual segment range, confidences are clamped, and valid ids are resolved
//! to citation objects carrying a bounded text excerpt and its position.

use serde_json::{json, Value};

use docview_core::Segment;

/// Maximum excerpt length in a resolved source, in characters.
const MAX_SOURCE_TEXT_CHARS: usize = 200;

/// Read a `source_ids` array and keep only ids within `[1, segment_count]`.
///
/// Non-integers, zero, negatives, and out-of-range ids are dropped. An
/// absent or malformed field yields an empty list.
pub fn sanitize_source_ids(raw: Option<&Value>, segment_count: u32) -> Vec<u32> {
    let Some(Value::Array(items)) = raw else {
        return Vec::new();
    };
    let mut ids: Vec<u32> = items
        .iter()
        .filter_map(|v| v.as_i64())
        .filter(|&id| id >= 1 && id <= segment_count as i64)
        .map(|id| id as u32)
        .collect();
    ids.dedup();
    ids
}

/// Whether a raw `source_ids` field referenced anything outside the valid
/// range (drives the out-of-range penalty).
pub fn has_out_of_range_ids(raw: Option<&Value>, segment_count: u32) -> bool {
    let Some(Value::Array(items)) = raw else {
        return false;
    };
    items.iter().any(|v| match v.as_i64() {
        Some(id) => id < 1 || id > segment_count as i64,
        None => true,
    })
}

/// Read a `confidence` field: absent defaults to 50, present is clamped
/// into [0, 100].
pub fn clamp_confidence(raw: Option<&Value>) -> u8 {
    match raw.and_then(|v| v.as_i64()) {
        Some(value) => value.clamp(0, 100) as u8,
        None => 50,
    }
}

/// Resolve validated ids to citation objects.
pub fn resolve_sources(ids: &[u32], segments: &[Segment]) -> Vec<Value> {
    ids.iter()
        .filter_map(|id| segments.iter().find(|s| s.id == *id))
        .map(|segment| {
            json!({
                "id": segment.id,
                "text": truncate_chars(&segment.text, MAX_SOURCE_TEXT_CHARS),
                "position": { "start": segment.start, "end": segment.end },
            })
        })
        .collect()
}

/// Truncate to at most `max` characters on a character boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments() -> Vec<Segment> {
        vec![
            Segment { id: 1, text: "first".into(), start: 0, end: 5 },
            Segment { id: 2, text: "second".into(), start: 7, end: 13 },
            Segment { id: 3, text: "third".into(), start: 15, end: 20 },
        ]
    }

    #[test]
    fn test_out_of_range_ids_dropped() {
        let raw = json!([0, 4, -5]);
        assert!(sanitize_source_ids(Some(&raw), 3).is_empty());
        assert!(has_out_of_range_ids(Some(&raw), 3));
    }

    #[test]
    fn test_valid_ids_kept_in_order() {
        let raw = json!([2, 1, 3]);
        assert_eq!(sanitize_source_ids(Some(&raw), 3), vec![2, 1, 3]);
        assert!(!has_out_of_range_ids(Some(&raw), 3));
    }

    #[test]
    fn test_mixed_ids_filtered() {
        let raw = json!([1, 99, "two", 3]);
        assert_eq!(sanitize_source_ids(Some(&raw), 3), vec![1, 3]);
        assert!(has_out_of_range_ids(Some(&raw), 3));
    }

    #[test]
    fn test_absent_ids_default_empty() {
        assert!(sanitize_source_ids(None, 3).is_empty());
        assert!(!has_out_of_range_ids(None, 3));
    }

    #[test]
    fn test_confidence_clamping() {
        assert_eq!(clamp_confidence(Some(&json!(170))), 100);
        assert_eq!(clamp_confidence(Some(&json!(-5))), 0);
        assert_eq!(clamp_confidence(Some(&json!(63))), 63);
        assert_eq!(clamp_confidence(None), 50);
        assert_eq!(clamp_confidence(Some(&json!("high"))), 50);
    }

    #[test]
    fn test_resolve_sources_shape() {
        let resolved = resolve_sources(&[2], &segments());
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0]["id"], 2);
        assert_eq!(resolved[0]["text"], "second");
        assert_eq!(resolved[0]["position"]["start"], 7);
        assert_eq!(resolved[0]["position"]["end"], 13);
    }

    #[test]
    fn test_source_text_truncated() {
        let long = Segment { id: 1, text: "x".repeat(500), start: 0, end: 500 };
        let resolved = resolve_sources(&[1], &[long]);
        assert_eq!(resolved[0]["text"].as_str().unwrap().chars().count(), 200);
    }

    #[test]
    fn test_truncate_chars_multibyte_safe() {
        let text = "héllo wörld";
        let truncated = truncate_chars(text, 4);
        assert_eq!(truncated, "héll");
    }
}
