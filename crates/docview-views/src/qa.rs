//! Q&A view: summary, generated questions, extracted answers. Three
//! scripted LLM steps. Confidence and sources are optional on this view's
//! fields (weak display contract).

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use docview_core::View;

use crate::processor::{finalize_group, string_array, ProcessContext, ViewProcessor};
use crate::sources::{clamp_confidence, resolve_sources, sanitize_source_ids};
use crate::Result;

const STEPS: usize = 3;
const MAX_EXTRACTED_ANSWERS: usize = 20;

const SYSTEM_PROMPT: &str = "You analyze question-and-answer style IT documents. The document is \
     given as numbered segments, [n] marking segment n. When you cite the \
     document, reference segment ids in a source_ids array. Reply with only \
     a JSON object.";

/// Produces the qa-view result object.
pub struct QaProcessor;

impl QaProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for QaProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ViewProcessor for QaProcessor {
    fn view(&self) -> View {
        View::Qa
    }

    fn step_count(&self) -> usize {
        STEPS
    }

    async fn process(&self, ctx: &ProcessContext<'_>) -> Result<Value> {
        let document = ctx.render_segments();

        // Step 1: summary
        let payload = ctx
            .run_step(
                "qa_summary",
                SYSTEM_PROMPT,
                format!(
                    "Summarize this Q&A material: key points, a histogram of \
                     question types, a histogram of difficulty levels, and the \
                     total number of questions.\n\nDocument:\n{}",
                    document
                ),
                r#"{"key_points": ["..."], "question_types": {"...": 0}, "difficulty": {"...": 0}, "total_questions": 0, "confidence": 0, "source_ids": [1]}"#,
            )
            .await?;
        let mut summary = Map::new();
        summary.insert("key_points".into(), json!(string_array(&payload, "key_points")));
        summary.insert(
            "question_types".into(),
            payload.get("question_types").cloned().unwrap_or_else(|| json!({})),
        );
        summary.insert(
            "difficulty".into(),
            payload.get("difficulty").cloned().unwrap_or_else(|| json!({})),
        );
        summary.insert(
            "total_questions".into(),
            json!(payload.get("total_questions").and_then(Value::as_i64).unwrap_or(0)),
        );
        if payload.get("confidence").is_some() || payload.get("source_ids").is_some() {
            let outcome = finalize_group(ctx, &payload, &[], false);
            summary.insert("confidence".into(), json!(outcome.confidence));
            summary.insert("sources".into(), json!(outcome.sources));
        }
        ctx.publish_step(1, STEPS, "summary");

        // Step 2: generated questions
        let payload = ctx
            .run_step(
                "qa_generated_questions",
                SYSTEM_PROMPT,
                format!(
                    "Generate practice questions grounded in this material. Each \
                     entry has a question and an answer; a hint and a difficulty \
                     are welcome where they help.\n\nDocument:\n{}",
                    document
                ),
                r#"{"questions": [{"question": "...", "answer": "...", "hint": "...", "difficulty": "...", "confidence": 0, "source_ids": [1]}]}"#,
            )
            .await?;
        let generated_questions: Vec<Value> = payload
            .get("questions")
            .and_then(Value::as_array)
            .map(|questions| {
                questions
                    .iter()
                    .filter_map(|q| {
                        let question = q.get("question").and_then(Value::as_str)?;
                        let answer = q.get("answer").and_then(Value::as_str)?;
                        let mut entry = Map::new();
                        entry.insert("question".into(), json!(question));
                        entry.insert("answer".into(), json!(answer));
                        if let Some(hint) = q.get("hint").and_then(Value::as_str) {
                            entry.insert("hint".into(), json!(hint));
                        }
                        if let Some(difficulty) = q.get("difficulty").and_then(Value::as_str) {
                            entry.insert("difficulty".into(), json!(difficulty));
                        }
                        if q.get("confidence").is_some() {
                            entry.insert(
                                "confidence".into(),
                                json!(clamp_confidence(q.get("confidence"))),
                            );
                        }
                        if q.get("source_ids").is_some() {
                            let ids =
                                sanitize_source_ids(q.get("source_ids"), ctx.segments.len() as u32);
                            entry.insert("sources".into(), json!(resolve_sources(&ids, ctx.segments)));
                        }
                        Some(Value::Object(entry))
                    })
                    .collect()
            })
            .unwrap_or_default();
        ctx.publish_step(2, STEPS, "generated questions");

        // Step 3: extracted answers
        let payload = ctx
            .run_step(
                "qa_extracted_answers",
                SYSTEM_PROMPT,
                format!(
                    "Extract the answers this material itself gives, verbatim \
                     where possible.\n\nDocument:\n{}",
                    document
                ),
                r#"{"answers": ["..."]}"#,
            )
            .await?;
        let mut answers = string_array(&payload, "answers");
        answers.truncate(MAX_EXTRACTED_ANSWERS);
        ctx.publish_step(3, STEPS, "extracted answers");

        Ok(json!({
            "summary": Value::Object(summary),
            "generated_questions": generated_questions,
            "extracted_answers": { "answers": answers },
        }))
    }
}
