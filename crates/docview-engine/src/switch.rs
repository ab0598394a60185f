//! View-switch fast path
//!
//! Computes a single view against the stored intermediate artifacts, never
//! re-extracting or re-segmenting. An already-committed result is returned
//! as a cache hit.

use std::time::{Duration, Instant};
use tracing::{info, warn};

use docview_core::{DocumentId, ProcessingResult, View};
use docview_views::ProcessContext;

use crate::engine::ViewEngine;
use crate::metrics::quality_of;
use crate::{EngineError, Result};

/// Soft latency budget; exceeding it warns but never fails.
const SWITCH_BUDGET: Duration = Duration::from_secs(5);

/// Outcome of a view switch.
#[derive(Debug, Clone)]
pub struct SwitchOutcome {
    pub result: ProcessingResult,
    pub from_cache: bool,
    pub used_intermediate_results: bool,
    pub processing_time: f64,
}

impl ViewEngine {
    /// Produce `view` for a document from cached intermediates.
    ///
    /// Requires the intermediate result to exist; a committed result for
    /// `(document, view)` short-circuits as a cache hit.
    pub async fn switch_view(&self, document_id: DocumentId, view: View) -> Result<SwitchOutcome> {
        let started = Instant::now();

        let intermediate = self
            .store()
            .get_intermediate(document_id)
            .await?
            .ok_or(EngineError::IntermediateMissing(document_id))?;

        if let Some(existing) = self.store().get_result(document_id, view).await? {
            return Ok(SwitchOutcome {
                result: existing,
                from_cache: true,
                used_intermediate_results: true,
                processing_time: started.elapsed().as_secs_f64(),
            });
        }

        let processor = self
            .registry()
            .get(view)
            .ok_or(EngineError::UnregisteredView(view))?;

        let ctx = ProcessContext::new(
            &intermediate.preprocessed_text,
            &intermediate.segments,
            self.gateway(),
            self.processing().step_timeout(),
        );
        let result_data = processor
            .process(&ctx)
            .await
            .map_err(|source| EngineError::View { view, source })?;

        let elapsed = started.elapsed();
        let result = ProcessingResult::new(
            document_id,
            view,
            result_data,
            false,
            elapsed.as_secs_f64(),
        );
        self.store().upsert_result(&result).await?;

        let quality = quality_of(document_id, view, &result.result_data);
        if let Err(e) = self.store().record_quality(&quality).await {
            warn!(view = %view, error = %e, "failed to record quality row");
        }

        // The switched view is now part of the document's enabled set.
        if let Some(mut profile) = self.store().get_profile(document_id).await? {
            if !profile.enabled_views.contains(&view) {
                profile.enabled_views.push(view);
                self.store().upsert_profile(&profile).await?;
            }
        }

        if elapsed > SWITCH_BUDGET {
            warn!(
                document_id = %document_id,
                view = %view,
                seconds = elapsed.as_secs_f64(),
                "view switch exceeded soft budget"
            );
        } else {
            info!(
                document_id = %document_id,
                view = %view,
                seconds = elapsed.as_secs_f64(),
                "view switch computed"
            );
        }

        Ok(SwitchOutcome {
            result,
            from_cache: false,
            used_intermediate_results: true,
            processing_time: elapsed.as_secs_f64(),
        })
    }
}
