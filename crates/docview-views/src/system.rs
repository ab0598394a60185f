//! System view: configuration steps, components, architecture, plain
//! explanation, checklist, related technologies. Six scripted LLM steps.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use docview_core::View;

use crate::confidence::has_duplicate_names;
use crate::postprocess::clean_technology_names;
use crate::processor::{finalize_group, string_array, ProcessContext, ViewProcessor};
use crate::sources::{clamp_confidence, resolve_sources, sanitize_source_ids, truncate_chars};
use crate::Result;

const STEPS: usize = 6;
const MAX_CHECKLIST_ITEMS: usize = 20;
const MAX_TECHNOLOGIES: usize = 20;

/// Very long inputs are cut to head + tail before prompt construction.
const TRUNCATE_HEAD_CHARS: usize = 15_000;
const TRUNCATE_TAIL_CHARS: usize = 5_000;

const SYSTEM_PROMPT: &str = "You analyze IT system and operations documents. The document is given \
     as numbered segments, [n] marking segment n. When you cite the \
     document, reference segment ids in a source_ids array. Reply with only \
     a JSON object.";

/// Produces the system-view result object.
pub struct SystemProcessor;

impl SystemProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ViewProcessor for SystemProcessor {
    fn view(&self) -> View {
        View::System
    }

    fn step_count(&self) -> usize {
        STEPS
    }

    async fn process(&self, ctx: &ProcessContext<'_>) -> Result<Value> {
        let full = ctx.render_segments();
        let (document, truncated) = truncate_head_tail(&full);

        // Step 1: configuration steps
        let payload = ctx
            .run_step(
                "system_config_steps",
                SYSTEM_PROMPT,
                format!(
                    "Extract the ordered configuration or setup steps this \
                     document describes.\n\nDocument:\n{}",
                    document
                ),
                r#"{"steps": [{"step": 1, "description": "...", "confidence": 0, "source_ids": [1]}]}"#,
            )
            .await?;
        let config_steps: Vec<Value> = payload
            .get("steps")
            .and_then(Value::as_array)
            .map(|steps| {
                steps
                    .iter()
                    .enumerate()
                    .filter_map(|(i, s)| {
                        let description = s.get("description").and_then(Value::as_str)?;
                        let mut entry = Map::new();
                        entry.insert(
                            "step".into(),
                            json!(s.get("step").and_then(Value::as_i64).unwrap_or(i as i64 + 1)),
                        );
                        entry.insert("description".into(), json!(description));
                        if s.get("confidence").is_some() {
                            entry.insert("confidence".into(), json!(clamp_confidence(s.get("confidence"))));
                        }
                        if s.get("source_ids").is_some() {
                            let ids = sanitize_source_ids(s.get("source_ids"), ctx.segments.len() as u32);
                            entry.insert("sources".into(), json!(resolve_sources(&ids, ctx.segments)));
                        }
                        Some(Value::Object(entry))
                    })
                    .collect()
            })
            .unwrap_or_default();
        ctx.publish_step(1, STEPS, "configuration steps");

        // Step 2: components
        let payload = ctx
            .run_step(
                "system_components",
                SYSTEM_PROMPT,
                format!(
                    "List the system components this document describes, with a \
                     one-line description each and a type where evident \
                     (service, database, queue, ...).\n\nDocument:\n{}",
                    document
                ),
                r#"{"components": [{"name": "...", "description": "...", "type": "..."}]}"#,
            )
            .await?;
        let components: Vec<Value> = payload
            .get("components")
            .and_then(Value::as_array)
            .map(|components| {
                components
                    .iter()
                    .filter_map(|c| {
                        let name = c.get("name").and_then(Value::as_str)?;
                        let mut entry = Map::new();
                        entry.insert("name".into(), json!(name));
                        entry.insert(
                            "description".into(),
                            json!(c.get("description").and_then(Value::as_str).unwrap_or_default()),
                        );
                        if let Some(kind) = c.get("type").and_then(Value::as_str) {
                            entry.insert("type".into(), json!(kind));
                        }
                        Some(Value::Object(entry))
                    })
                    .collect()
            })
            .unwrap_or_default();
        ctx.publish_step(2, STEPS, "components");

        // Step 3: architecture view
        let payload = ctx
            .run_step(
                "system_architecture",
                SYSTEM_PROMPT,
                format!(
                    "Describe the architecture of the system. If the structure \
                     is clear enough, include a Mermaid diagram in a fenced \
                     block inside the string.\n\nDocument:\n{}",
                    document
                ),
                r#"{"architecture_view": "..."}"#,
            )
            .await?;
        let architecture_view = payload
            .get("architecture_view")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        ctx.publish_step(3, STEPS, "architecture");

        // Step 4: plain explanation
        let payload = ctx
            .run_step(
                "system_plain_explanation",
                SYSTEM_PROMPT,
                format!(
                    "Explain this system in plain language for a newcomer, a few \
                     short paragraphs at most.\n\nDocument:\n{}",
                    document
                ),
                r#"{"plain_explanation": "..."}"#,
            )
            .await?;
        let plain_explanation = payload
            .get("plain_explanation")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        ctx.publish_step(4, STEPS, "plain explanation");

        // Step 5: checklist
        let payload = ctx
            .run_step(
                "system_checklist",
                SYSTEM_PROMPT,
                format!(
                    "Produce an operations checklist for running this system: \
                     short imperative items.\n\nDocument:\n{}",
                    document
                ),
                r#"{"items": ["..."]}"#,
            )
            .await?;
        let mut items = string_array(&payload, "items");
        items.truncate(MAX_CHECKLIST_ITEMS);
        ctx.publish_step(5, STEPS, "checklist");

        // Step 6: related technologies
        let payload = ctx
            .run_step(
                "system_related_technologies",
                SYSTEM_PROMPT,
                format!(
                    "List the technologies this system involves, most central \
                     first.\n\nDocument:\n{}",
                    document
                ),
                r#"{"technologies": ["..."], "confidence": 0, "source_ids": [1]}"#,
            )
            .await?;
        let raw_names = string_array(&payload, "technologies");
        let contradiction = has_duplicate_names(&raw_names);
        let technologies = clean_technology_names(raw_names, MAX_TECHNOLOGIES);
        let outcome = finalize_group(ctx, &payload, &technologies, contradiction);
        ctx.publish_step(6, STEPS, "related technologies");

        let mut result = Map::new();
        result.insert("config_steps".into(), json!(config_steps));
        result.insert("components".into(), json!(components));
        result.insert("architecture_view".into(), json!(architecture_view));
        result.insert("plain_explanation".into(), json!(plain_explanation));
        result.insert("checklist".into(), json!({ "items": items }));
        result.insert(
            "related_technologies".into(),
            json!({
                "technologies": technologies,
                "confidence": outcome.confidence,
                "sources": outcome.sources,
            }),
        );
        if truncated {
            result.insert(
                "metadata".into(),
                json!({
                    "truncated": true,
                    "strategy": format!("head_{}_tail_{}", TRUNCATE_HEAD_CHARS, TRUNCATE_TAIL_CHARS),
                    "original_chars": full.chars().count(),
                }),
            );
        }
        Ok(Value::Object(result))
    }
}

/// Cut very long input to first 15000 + last 5000 characters.
fn truncate_head_tail(text: &str) -> (String, bool) {
    let total = text.chars().count();
    if total <= TRUNCATE_HEAD_CHARS + TRUNCATE_TAIL_CHARS {
        return (text.to_string(), false);
    }

    let head = truncate_chars(text, TRUNCATE_HEAD_CHARS);
    let tail_start_char = total - TRUNCATE_TAIL_CHARS;
    let tail_byte = text
        .char_indices()
        .nth(tail_start_char)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let tail = &text[tail_byte..];

    (format!("{}\n[...]\n{}", head, tail), true)
}
