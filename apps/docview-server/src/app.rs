//! Application state and initialization

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use docview_api::AppState;
use docview_core::AppConfig;
use docview_engine::{
    job_queue, CancelRegistry, ProgressBroker, StoreMetricSink, ViewEngine, WorkerPool,
};
use docview_llm::{ChatMessage, ChatOptions, Fallback, LlmGateway, OpenAiCompatProvider, RetryPolicy};
use docview_store::{MemoryStore, PgStore, Store};

use crate::cli::Args;
use crate::server::Server;

/// Startup failure, distinguishing configuration errors for the exit code.
#[derive(Debug)]
pub struct BuildError {
    inner: anyhow::Error,
    config: bool,
}

impl BuildError {
    fn config(inner: anyhow::Error) -> Self {
        Self { inner, config: true }
    }

    fn other(inner: anyhow::Error) -> Self {
        Self {
            inner,
            config: false,
        }
    }

    pub fn is_config_error(&self) -> bool {
        self.config
    }
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.inner)
    }
}

impl std::error::Error for BuildError {}

/// Main application
pub struct App {
    state: AppState,
    gateway: Arc<LlmGateway>,
    _pool: WorkerPool,
}

impl App {
    /// Build the application with all dependencies
    pub async fn build(args: Args) -> std::result::Result<Self, BuildError> {
        let mut config = AppConfig::load()
            .context("failed to load configuration")
            .map_err(BuildError::config)?;
        if let Some(port) = args.port {
            config.server.port = port;
        }
        let config = Arc::new(config);

        info!("initializing application components");

        let store: Arc<dyn Store> = if config.database.url.starts_with("memory://") {
            warn!("using the in-memory store; data does not survive restarts");
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(
                PgStore::connect(&config.database.url, config.database.max_connections)
                    .await
                    .context("failed to connect to the database")
                    .map_err(BuildError::other)?,
            )
        };

        let gateway = Arc::new(build_gateway(&config, store.clone()));
        let broker = Arc::new(ProgressBroker::new());
        let cancels = Arc::new(CancelRegistry::new());

        let engine = Arc::new(
            ViewEngine::new(
                store.clone(),
                gateway.clone(),
                broker.clone(),
                config.processing.clone(),
            )
            .with_ai_classification(config.llm.is_configured()),
        );

        let (queue, consumer) = job_queue(config.queue.capacity);
        let pool = WorkerPool::spawn(
            config.processing.worker_count,
            consumer,
            engine.clone(),
            store.clone(),
            broker.clone(),
            cancels.clone(),
            config.processing.job_timeout(),
        );
        info!(workers = config.processing.worker_count, "worker pool started");

        spawn_retention_sweeper(store.clone(), config.retention.metric_days);

        let state = AppState {
            store,
            engine,
            queue,
            broker,
            cancels,
            config,
        };

        Ok(Self {
            state,
            gateway,
            _pool: pool,
        })
    }

    /// Run the HTTP server until shutdown
    pub async fn run(self) -> Result<()> {
        let server = Server::new(self.state);
        server.run().await
    }

    /// One round-trip through the LLM gateway.
    pub async fn smoke_test(&self) -> Result<()> {
        let response = self
            .gateway
            .chat_completion(
                "smoke_test",
                &[ChatMessage::user("Reply with the single word: pong")],
                &ChatOptions::default(),
                Fallback::Disabled,
            )
            .await
            .context("LLM gateway did not answer")?;
        info!(response = %response.trim(), "LLM gateway answered");
        Ok(())
    }
}

fn build_gateway(config: &AppConfig, store: Arc<dyn Store>) -> LlmGateway {
    let provider = OpenAiCompatProvider::new(
        config.llm.base_url.clone(),
        config.llm.api_key.clone(),
        config.llm.model.clone(),
    );

    let gateway = LlmGateway::new(Arc::new(provider))
        .with_retry_policy(RetryPolicy::default())
        .with_call_timeout(config.processing.call_timeout())
        .with_metric_sink(Arc::new(StoreMetricSink::new(store)));

    #[cfg(feature = "llm-mock")]
    let gateway = if config.llm.mock_enabled {
        warn!(
            failure = %config.llm.mock_failure,
            probability = config.llm.mock_probability,
            "LLM failure injection is active"
        );
        gateway.with_failure_injector(docview_llm::FailureInjector::new(
            config.llm.mock_failure.clone(),
            config.llm.mock_probability,
        ))
    } else {
        gateway
    };

    gateway
}

fn spawn_retention_sweeper(store: Arc<dyn Store>, metric_days: u32) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60 * 60));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match store.sweep_metrics(metric_days).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "swept expired call metrics"),
                Err(e) => warn!(error = %e, "metric sweep failed"),
            }
        }
    });
}
