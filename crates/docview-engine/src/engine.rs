//! The view engine
//!
//! Orchestrates one document job: load-or-build the intermediate artifacts,
//! resolve the view profile, run the primary view to completion in the
//! current task, then fan out secondary views. Each view commits its own
//! result row; the primary's commit strictly precedes any secondary's.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use docview_core::{
    config::ProcessingConfig, Document, DocumentId, DocumentStatus, DocumentViewProfile, ErrorKind,
    IntermediateResult, ProcessingResult, ProgressEvent, TaskId, TaskStage, TaskStatus, View,
};
use docview_ingestion::{ExtractorRegistry, IngestionError, Preprocessor, Segmenter};
use docview_llm::LlmGateway;
use docview_store::Store;
use docview_views::{ProcessContext, ViewClassifier, ViewRegistry};

use crate::broker::ProgressBroker;
use crate::metrics::quality_of;
use crate::queue::Job;
use crate::{EngineError, Result};

// Milestone progress values; per-view steps interpolate the remainder.
const PROGRESS_EXTRACTED: u8 = 20;
const PROGRESS_PREPROCESSED: u8 = 30;
const PROGRESS_SEGMENTED: u8 = 35;
const PROGRESS_CLASSIFIED: u8 = 40;

/// Drives document jobs through extraction, classification, and the
/// per-view scripts.
pub struct ViewEngine {
    store: Arc<dyn Store>,
    gateway: Arc<LlmGateway>,
    broker: Arc<ProgressBroker>,
    registry: ViewRegistry,
    classifier: ViewClassifier,
    extractors: Arc<ExtractorRegistry>,
    preprocessor: Preprocessor,
    segmenter: Segmenter,
    processing: ProcessingConfig,
    ai_classification: bool,
}

impl ViewEngine {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<LlmGateway>,
        broker: Arc<ProgressBroker>,
        processing: ProcessingConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            broker,
            registry: ViewRegistry::with_defaults(),
            classifier: ViewClassifier::new(),
            extractors: Arc::new(ExtractorRegistry::with_defaults()),
            preprocessor: Preprocessor::new(),
            segmenter: Segmenter::new(),
            processing,
            ai_classification: false,
        }
    }

    pub fn with_registry(mut self, registry: ViewRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_extractors(mut self, extractors: Arc<ExtractorRegistry>) -> Self {
        self.extractors = extractors;
        self
    }

    /// Allow one AI refinement call when the rule classifier is unsure.
    pub fn with_ai_classification(mut self, enabled: bool) -> Self {
        self.ai_classification = enabled;
        self
    }

    pub(crate) fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub(crate) fn gateway(&self) -> &Arc<LlmGateway> {
        &self.gateway
    }

    pub(crate) fn registry(&self) -> &ViewRegistry {
        &self.registry
    }

    pub(crate) fn processing(&self) -> &ProcessingConfig {
        &self.processing
    }

    /// The classifier output for already-preprocessed text, used by the
    /// recommend-views surface.
    pub async fn classify_text(&self, text: &str) -> docview_views::Classification {
        let gateway = self.ai_classification.then(|| self.gateway.as_ref());
        self.classifier.classify(text, gateway).await
    }

    /// Run one document job to completion.
    ///
    /// A failure before or during the primary view terminalizes the task;
    /// secondary failures are logged and absorbed.
    pub async fn run(self: Arc<Self>, job: Job) -> Result<()> {
        match self.clone().run_inner(&job).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.mark_failed(&job, &e).await;
                Err(e)
            }
        }
    }

    async fn run_inner(self: Arc<Self>, job: &Job) -> Result<()> {
        let document = self
            .store
            .get_document(job.document_id)
            .await?
            .ok_or(EngineError::DocumentNotFound(job.document_id))?;

        self.store
            .set_document_status(document.id, DocumentStatus::Processing)
            .await?;
        self.progress(job.task_id, document.id, TaskStage::Extract, 5, "starting")
            .await;

        // View-agnostic artifacts: computed once, reused forever after.
        let intermediate = match self.store.get_intermediate(document.id).await? {
            Some(existing) => existing,
            None => self.build_intermediate(&document, job.task_id).await?,
        };

        let profile = self.resolve_profile(document.id, &intermediate).await?;
        self.progress(
            job.task_id,
            document.id,
            TaskStage::Identify,
            PROGRESS_CLASSIFIED,
            "classified",
        )
        .await;

        // Caller hint wins over the recommendation, both intersected with
        // what is actually registered.
        let registered = self.registry.registered_views();
        let mut effective: Vec<View> = match &job.enabled_views_hint {
            Some(hint) if !hint.is_empty() => hint
                .iter()
                .copied()
                .filter(|v| registered.contains(v))
                .collect(),
            _ => profile
                .enabled_views
                .iter()
                .copied()
                .filter(|v| registered.contains(v))
                .collect(),
        };
        if effective.is_empty() {
            effective.push(profile.primary_view);
        }
        let primary = if effective.contains(&profile.primary_view) {
            profile.primary_view
        } else {
            effective[0]
        };

        // Keep the profile consistent with what actually gets generated, so
        // committed views always sit inside enabled_views.
        if profile.enabled_views != effective || profile.primary_view != primary {
            let mut updated = profile.clone();
            updated.primary_view = primary;
            updated.enabled_views = effective.clone();
            self.store.upsert_profile(&updated).await?;
        }

        let total_steps: usize = effective
            .iter()
            .filter_map(|v| self.registry.get(*v))
            .map(|p| p.step_count())
            .sum();
        let completed_steps = Arc::new(AtomicUsize::new(0));

        info!(
            document_id = %document.id,
            primary = %primary,
            views = ?effective,
            "running view scripts"
        );

        // Primary runs here, in the owning worker, and commits first.
        self.run_single_view(
            job.task_id,
            &document,
            &intermediate,
            primary,
            true,
            total_steps,
            completed_steps.clone(),
        )
        .await?;

        // Secondaries fan out, each owning its write. A failure here is a
        // per-view condition, not a document failure.
        let mut handles = Vec::new();
        for view in effective.into_iter().filter(|v| *v != primary) {
            let engine = self.clone();
            let document = document.clone();
            let intermediate = intermediate.clone();
            let completed_steps = completed_steps.clone();
            let task_id = job.task_id;

            handles.push(tokio::spawn(async move {
                if let Err(e) = engine
                    .run_single_view(
                        task_id,
                        &document,
                        &intermediate,
                        view,
                        false,
                        total_steps,
                        completed_steps,
                    )
                    .await
                {
                    warn!(view = %view, error = %e, "secondary view failed");
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }

        self.store
            .terminalize_task(job.task_id, TaskStatus::Completed, None)
            .await?;
        self.store
            .set_document_status(document.id, DocumentStatus::Completed)
            .await?;
        self.broker
            .publish(ProgressEvent::completed(job.task_id, document.id));

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_single_view(
        &self,
        task_id: TaskId,
        document: &Document,
        intermediate: &IntermediateResult,
        view: View,
        is_primary: bool,
        total_steps: usize,
        completed_steps: Arc<AtomicUsize>,
    ) -> Result<()> {
        let processor = self
            .registry
            .get(view)
            .ok_or(EngineError::UnregisteredView(view))?;
        let started = Instant::now();

        let broker = self.broker.clone();
        let document_id = document.id;
        let counter = completed_steps.clone();
        let callback = move |_step: usize, _total: usize, label: &str| {
            let done = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let progress = step_progress(done, total_steps);
            broker.publish(ProgressEvent::progress(task_id, document_id, progress, label));
        };

        let ctx = ProcessContext::new(
            &intermediate.preprocessed_text,
            &intermediate.segments,
            &self.gateway,
            self.processing.step_timeout(),
        )
        .with_step_callback(&callback);

        let result_data = processor
            .process(&ctx)
            .await
            .map_err(|source| EngineError::View { view, source })?;

        let result = ProcessingResult::new(
            document.id,
            view,
            result_data,
            is_primary,
            started.elapsed().as_secs_f64(),
        );
        // Own single-row transaction; never batched with another view.
        self.store.upsert_result(&result).await?;

        let quality = quality_of(document.id, view, &result.result_data);
        if let Err(e) = self.store.record_quality(&quality).await {
            warn!(view = %view, error = %e, "failed to record quality row");
        }

        let progress = step_progress(completed_steps.load(Ordering::SeqCst), total_steps);
        let _ = self
            .store
            .set_task_progress(
                task_id,
                TaskStage::Process,
                progress,
                &format!("{} view committed", view),
            )
            .await;

        info!(
            document_id = %document.id,
            view = %view,
            is_primary,
            seconds = result.processing_time_seconds,
            "view committed"
        );
        Ok(())
    }

    /// Extract, preprocess, and segment, then persist the intermediate.
    pub(crate) async fn build_intermediate(
        &self,
        document: &Document,
        task_id: TaskId,
    ) -> Result<IntermediateResult> {
        let blob = tokio::fs::read(&document.blob_path).await?;

        let raw_text = self.extractors.extract(document.file_type, &blob)?;
        let chars = raw_text.chars().count();
        if chars > self.processing.max_content_chars {
            return Err(EngineError::ContentTooLarge {
                chars,
                limit: self.processing.max_content_chars,
            });
        }
        self.progress(
            task_id,
            document.id,
            TaskStage::Extract,
            PROGRESS_EXTRACTED,
            "extracted",
        )
        .await;

        let preprocessed = self.preprocessor.preprocess(&raw_text)?;
        self.progress(
            task_id,
            document.id,
            TaskStage::Extract,
            PROGRESS_PREPROCESSED,
            "preprocessed",
        )
        .await;

        let segments = self.segmenter.segment(&preprocessed);
        if segments.is_empty() {
            return Err(EngineError::Ingestion(IngestionError::LowQuality));
        }
        self.progress(
            task_id,
            document.id,
            TaskStage::Extract,
            PROGRESS_SEGMENTED,
            "segmented",
        )
        .await;

        let intermediate = IntermediateResult::new(document.id, raw_text, preprocessed, segments);
        self.store.upsert_intermediate(&intermediate).await?;
        Ok(intermediate)
    }

    async fn resolve_profile(
        &self,
        document_id: DocumentId,
        intermediate: &IntermediateResult,
    ) -> Result<DocumentViewProfile> {
        if let Some(profile) = self.store.get_profile(document_id).await? {
            return Ok(profile);
        }

        let classification = self.classify_text(&intermediate.preprocessed_text).await;
        let profile = DocumentViewProfile {
            document_id,
            primary_view: classification.primary,
            enabled_views: classification.enabled,
            detection_scores: classification.scores,
            detection_method: classification.method,
            confidence: classification.confidence,
        };
        self.store.upsert_profile(&profile).await?;
        Ok(profile)
    }

    async fn progress(
        &self,
        task_id: TaskId,
        document_id: DocumentId,
        stage: TaskStage,
        progress: u8,
        label: &str,
    ) {
        if let Err(e) = self
            .store
            .set_task_progress(task_id, stage, progress, label)
            .await
        {
            warn!(error = %e, "failed to persist task progress");
        }
        self.broker
            .publish(ProgressEvent::progress(task_id, document_id, progress, label));
    }

    async fn mark_failed(&self, job: &Job, error: &EngineError) {
        let kind = error.kind();
        let document_status = match kind {
            ErrorKind::LowQuality => DocumentStatus::LowQuality,
            ErrorKind::Timeout => DocumentStatus::Timeout,
            _ => DocumentStatus::Failed,
        };

        if let Err(e) = self
            .store
            .set_document_status(job.document_id, document_status)
            .await
        {
            warn!(error = %e, "failed to set document failure status");
        }
        if let Err(e) = self
            .store
            .terminalize_task(job.task_id, TaskStatus::Failed, Some(kind.as_str()))
            .await
        {
            warn!(error = %e, "failed to terminalize task");
        }
        self.broker.publish(ProgressEvent::error(
            job.task_id,
            job.document_id,
            0,
            kind.as_str(),
            document_status.as_str(),
        ));
    }
}

/// Interpolate per-step progress across the 40..100 band.
fn step_progress(completed: usize, total: usize) -> u8 {
    let total = total.max(1);
    let interpolated =
        PROGRESS_CLASSIFIED as usize + (100 - PROGRESS_CLASSIFIED as usize) * completed / total;
    interpolated.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_progress_interpolation() {
        assert_eq!(step_progress(0, 4), 40);
        assert_eq!(step_progress(2, 4), 70);
        assert_eq!(step_progress(4, 4), 100);
        assert_eq!(step_progress(5, 4), 100);
        assert_eq!(step_progress(0, 0), 40);
    }
}
