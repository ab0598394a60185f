use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub storage: StorageConfig,
    pub processing: ProcessingConfig,
    pub llm: LlmConfig,
    pub retention: RetentionConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_env("DOCVIEW")
    }

    /// Load configuration from environment with custom prefix
    pub fn load_from_env(prefix: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(
                Environment::with_prefix(prefix)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("processing.allowed_extensions"),
            )
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "postgres://localhost/docview")?
            .set_default("database.max_connections", default_db_max_connections() as i64)?
            .set_default("queue.url", "memory://jobs")?
            .set_default("queue.capacity", 256)?
            .set_default("storage.blob_dir", "./data/blobs")?
            .set_default("processing.worker_count", default_worker_count() as i64)?
            .set_default("processing.call_timeout_secs", 60)?
            .set_default("processing.step_timeout_secs", 120)?
            .set_default("processing.job_timeout_secs", 600)?
            .set_default("processing.max_file_size_bytes", 30 * 1024 * 1024)?
            .set_default("processing.max_content_chars", 500_000)?
            .set_default(
                "processing.allowed_extensions",
                vec!["pdf", "docx", "pptx", "md", "txt"],
            )?
            .set_default("llm.base_url", "https://api.openai.com/v1")?
            .set_default("llm.api_key", "")?
            .set_default("llm.model", "gpt-4o-mini")?
            .set_default("llm.mock_enabled", false)?
            .set_default("llm.mock_failure", "timeout")?
            .set_default("llm.mock_probability", 0.0)?
            .set_default("retention.metric_days", 30)?;

        let config = builder.build()?;
        config.try_deserialize()
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_db_max_connections")]
    pub max_connections: u32,
}

fn default_db_max_connections() -> u32 {
    // Sized for short per-view transactions from every worker
    (default_worker_count() as u32) * 2
}

/// Job queue configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub url: String,
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

fn default_queue_capacity() -> usize {
    256
}

/// Blob storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub blob_dir: String,
}

/// Processing limits and timeouts
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl ProcessingConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn is_extension_allowed(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.allowed_extensions.iter().any(|e| e == &ext)
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            call_timeout_secs: default_call_timeout_secs(),
            step_timeout_secs: default_step_timeout_secs(),
            job_timeout_secs: default_job_timeout_secs(),
            max_file_size_bytes: default_max_file_size_bytes(),
            max_content_chars: default_max_content_chars(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

fn default_worker_count() -> usize {
    num_cpus::get().max(1)
}

fn default_call_timeout_secs() -> u64 {
    60
}

fn default_step_timeout_secs() -> u64 {
    120
}

fn default_job_timeout_secs() -> u64 {
    600
}

fn default_max_file_size_bytes() -> u64 {
    30 * 1024 * 1024
}

fn default_max_content_chars() -> usize {
    500_000
}

fn default_allowed_extensions() -> Vec<String> {
    ["pdf", "docx", "pptx", "md", "txt"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// LLM provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub mock_enabled: bool,
    #[serde(default = "default_mock_failure")]
    pub mock_failure: String,
    #[serde(default)]
    pub mock_probability: f64,
}

impl LlmConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

fn default_mock_failure() -> String {
    "timeout".to_string()
}

/// Metric retention configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_metric_days")]
    pub metric_days: u32,
}

fn default_metric_days() -> u32 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_load_without_env() {
        let config = AppConfig::load_from_env("DOCVIEW_TEST_NONE").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.processing.max_file_size_bytes, 30 * 1024 * 1024);
        assert_eq!(config.processing.job_timeout_secs, 600);
        assert_eq!(config.retention.metric_days, 30);
        assert!(config.queue.url.starts_with("memory://"));
    }

    #[test]
    fn test_allowed_extensions_default_set() {
        let config = ProcessingConfig::default();
        for ext in ["pdf", "docx", "pptx", "md", "txt"] {
            assert!(config.is_extension_allowed(ext));
        }
        assert!(config.is_extension_allowed("PDF"));
        assert!(!config.is_extension_allowed("doc"));
        assert!(!config.is_extension_allowed("exe"));
    }

    #[test]
    fn test_timeout_accessors() {
        let config = ProcessingConfig::default();
        assert_eq!(config.call_timeout(), Duration::from_secs(60));
        assert_eq!(config.step_timeout(), Duration::from_secs(120));
        assert_eq!(config.job_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn test_server_address() {
        let server = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        assert_eq!(server.address(), "127.0.0.1:3000");
    }
}
