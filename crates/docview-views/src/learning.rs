//! Learning view: prerequisites, learning path, methods, related
//! technologies. Four scripted LLM steps.

use async_trait::async_trait;
use serde_json::{json, Value};

use docview_core::View;

use crate::confidence::has_duplicate_names;
use crate::postprocess::clean_technology_names;
use crate::processor::{finalize_group, string_array, ProcessContext, ViewProcessor};
use crate::Result;

const STEPS: usize = 4;
const MAX_TECHNOLOGIES: usize = 10;

const SYSTEM_PROMPT: &str = "You analyze IT learning documents. The document is given as numbered \
     segments, [n] marking segment n. Every answer must cite the segment ids \
     it is based on in a source_ids array, and carry an integer confidence \
     from 0 to 100. Reply with only a JSON object.";

/// Produces the learning-view result object.
pub struct LearningProcessor;

impl LearningProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LearningProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ViewProcessor for LearningProcessor {
    fn view(&self) -> View {
        View::Learning
    }

    fn step_count(&self) -> usize {
        STEPS
    }

    async fn process(&self, ctx: &ProcessContext<'_>) -> Result<Value> {
        let document = ctx.render_segments();

        // Step 1: prerequisites
        let payload = ctx
            .run_step(
                "learning_prerequisites",
                SYSTEM_PROMPT,
                format!(
                    "List the prerequisites for studying this material. \
                     Required knowledge goes in \"required\", helpful background \
                     in \"recommended\".\n\nDocument:\n{}",
                    document
                ),
                r#"{"required": ["..."], "recommended": ["..."], "confidence": 0, "source_ids": [1]}"#,
            )
            .await?;
        let required = string_array(&payload, "required");
        let recommended = string_array(&payload, "recommended");
        let mut claimed: Vec<String> = required.clone();
        claimed.extend(recommended.iter().cloned());
        let outcome = finalize_group(ctx, &payload, &claimed, has_duplicate_names(&claimed));
        let prerequisites = json!({
            "required": required,
            "recommended": recommended,
            "confidence": outcome.confidence,
            "confidence_label": outcome.label,
            "sources": outcome.sources,
        });
        ctx.publish_step(1, STEPS, "prerequisites");

        // Step 2: learning path
        let payload = ctx
            .run_step(
                "learning_path",
                SYSTEM_PROMPT,
                format!(
                    "Lay out a staged learning path through this material. Each \
                     stage has a number, a title, and what to cover.\n\nDocument:\n{}",
                    document
                ),
                r#"{"stages": [{"stage": 1, "title": "...", "content": "...", "confidence": 0, "source_ids": [1]}]}"#,
            )
            .await?;
        let learning_path: Vec<Value> = payload
            .get("stages")
            .and_then(Value::as_array)
            .map(|stages| {
                stages
                    .iter()
                    .enumerate()
                    .map(|(i, stage)| {
                        let outcome = finalize_group(ctx, stage, &[], false);
                        json!({
                            "stage": stage.get("stage").and_then(Value::as_i64).unwrap_or(i as i64 + 1),
                            "title": stage.get("title").and_then(Value::as_str).unwrap_or_default(),
                            "content": stage.get("content").and_then(Value::as_str).unwrap_or_default(),
                            "confidence": outcome.confidence,
                            "sources": outcome.sources,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        ctx.publish_step(2, STEPS, "learning path");

        // Step 3: learning methods
        let payload = ctx
            .run_step(
                "learning_methods",
                SYSTEM_PROMPT,
                format!(
                    "Describe how to study this material: the theory to read up \
                     on (\"theory\") and the hands-on work to do (\"practice\").\n\nDocument:\n{}",
                    document
                ),
                r#"{"theory": "...", "practice": "...", "confidence": 0, "source_ids": [1]}"#,
            )
            .await?;
        let outcome = finalize_group(ctx, &payload, &[], false);
        let learning_methods = json!({
            "theory": payload.get("theory").and_then(Value::as_str).unwrap_or_default(),
            "practice": payload.get("practice").and_then(Value::as_str).unwrap_or_default(),
            "confidence": outcome.confidence,
            "sources": outcome.sources,
        });
        ctx.publish_step(3, STEPS, "learning methods");

        // Step 4: related technologies
        let payload = ctx
            .run_step(
                "learning_related_technologies",
                SYSTEM_PROMPT,
                format!(
                    "List the technologies related to this material, most \
                     relevant first.\n\nDocument:\n{}",
                    document
                ),
                r#"{"technologies": ["..."], "confidence": 0, "source_ids": [1]}"#,
            )
            .await?;
        let raw_names = string_array(&payload, "technologies");
        let contradiction = has_duplicate_names(&raw_names);
        let technologies = clean_technology_names(raw_names, MAX_TECHNOLOGIES);
        let outcome = finalize_group(ctx, &payload, &technologies, contradiction);
        let related_technologies = json!({
            "technologies": technologies,
            "confidence": outcome.confidence,
            "sources": outcome.sources,
        });
        ctx.publish_step(4, STEPS, "related technologies");

        Ok(json!({
            "prerequisites": prerequisites,
            "learning_path": learning_path,
            "learning_methods": learning_methods,
            "related_technologies": related_technologies,
        }))
    }
}
