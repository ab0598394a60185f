//! LLM gateway for docview
//!
//! The single choke point for all model calls. Everything that talks to the
//! model goes through [`LlmGateway`], which layers retry with exponential
//! backoff, error classification, per-call timeouts, JSON repair, an opt-in
//! fallback cache, and best-effort call metrics on top of a pluggable
//! [`ChatProvider`].
//!
//! The `mock` cargo feature compiles in a deterministic failure injector for
//! resilience testing; production builds leave it out entirely.

pub mod error;
pub mod gateway;
#[cfg(feature = "mock")]
pub mod mock;
pub mod provider;
pub mod retry;

pub use error::LlmError;
pub use gateway::{Fallback, LlmGateway, MetricSink};
#[cfg(feature = "mock")]
pub use mock::FailureInjector;
pub use provider::{ChatMessage, ChatOptions, ChatProvider, OpenAiCompatProvider};
pub use retry::RetryPolicy;

pub type Result<T> = std::result::Result<T, LlmError>;
