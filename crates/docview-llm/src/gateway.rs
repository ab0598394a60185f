//! The gateway: retrying, classifying, repairing, and metering model calls.

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use docview_core::AiCallMetric;

use crate::provider::{ChatMessage, ChatOptions, ChatProvider};
use crate::retry::RetryPolicy;
use crate::{LlmError, Result};

/// Sink for per-call metrics. Emission never blocks the call's return path.
#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn record(&self, metric: AiCallMetric);
}

/// Fallback behavior on terminal failure of a chat completion.
///
/// Callers that produce structured view artifacts must stay with
/// [`Fallback::Disabled`]; a stale or default answer would be persisted as a
/// misleading result.
#[derive(Debug, Clone)]
pub enum Fallback {
    Disabled,
    Allow { default: String },
}

/// Single choke point for all model calls.
pub struct LlmGateway {
    provider: Arc<dyn ChatProvider>,
    retry: RetryPolicy,
    call_timeout: Duration,
    metrics: Option<Arc<dyn MetricSink>>,
    response_cache: DashMap<String, String>,
    #[cfg(feature = "mock")]
    injector: Option<crate::mock::FailureInjector>,
}

impl LlmGateway {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            provider,
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(60),
            metrics: None,
            response_cache: DashMap::new(),
            #[cfg(feature = "mock")]
            injector: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_metric_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    #[cfg(feature = "mock")]
    pub fn with_failure_injector(mut self, injector: crate::mock::FailureInjector) -> Self {
        self.injector = Some(injector);
        self
    }

    /// One chat completion with retry, classification, and optional fallback.
    pub async fn chat_completion(
        &self,
        call_type: &str,
        messages: &[ChatMessage],
        options: &ChatOptions,
        fallback: Fallback,
    ) -> Result<String> {
        let started = Instant::now();
        let (outcome, retries) = self
            .retry
            .execute(|| self.attempt(messages, options))
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(content) => {
                self.response_cache
                    .insert(messages_key(messages), content.clone());
                self.emit(AiCallMetric::success(call_type, elapsed_ms, retries));
                Ok(content)
            }
            Err(e) => {
                self.emit(AiCallMetric::failure(
                    call_type,
                    elapsed_ms,
                    e.classification(),
                    retries,
                ));

                if let Fallback::Allow { default } = fallback {
                    let key = messages_key(messages);
                    if let Some(cached) = self.response_cache.get(&key) {
                        warn!(
                            call_type,
                            classification = e.classification(),
                            "model call failed terminally, serving cached response"
                        );
                        return Ok(cached.clone());
                    }
                    warn!(
                        call_type,
                        classification = e.classification(),
                        "model call failed terminally, serving declared default"
                    );
                    return Ok(default);
                }
                Err(e)
            }
        }
    }

    /// Chat completion that must yield a JSON object.
    ///
    /// On parse failure, one repair pass asks the model to re-emit valid
    /// JSON; after that, the first balanced `{...}` substring is taken as a
    /// best effort. No fallback: structured callers raise.
    pub async fn generate_json(
        &self,
        call_type: &str,
        messages: &[ChatMessage],
        schema_hint: &str,
        options: &ChatOptions,
    ) -> Result<serde_json::Value> {
        let content = self
            .chat_completion(call_type, messages, options, Fallback::Disabled)
            .await?;

        if let Some(value) = parse_json_lenient(&content) {
            return Ok(value);
        }

        debug!(call_type, "response was not valid JSON, running repair pass");
        let mut repair_messages = messages.to_vec();
        repair_messages.push(ChatMessage::assistant(content.clone()));
        repair_messages.push(ChatMessage::user(format!(
            "The previous reply was not valid JSON. Reply again with ONLY a valid JSON object, \
             no prose and no code fences, matching this shape: {}",
            schema_hint
        )));

        let repaired = self
            .chat_completion(call_type, &repair_messages, options, Fallback::Disabled)
            .await?;

        if let Some(value) = parse_json_lenient(&repaired) {
            return Ok(value);
        }
        if let Some(value) = extract_balanced_object(&repaired).or_else(|| extract_balanced_object(&content)) {
            return Ok(value);
        }

        Err(LlmError::InvalidResponse(format!(
            "no JSON object after repair pass (call_type={})",
            call_type
        )))
    }

    async fn attempt(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String> {
        #[cfg(feature = "mock")]
        if let Some(injector) = &self.injector {
            if let Some(err) = injector.intercept() {
                return Err(err);
            }
        }

        match tokio::time::timeout(self.call_timeout, self.provider.chat(messages, options)).await
        {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(self.call_timeout)),
        }
    }

    fn emit(&self, metric: AiCallMetric) {
        if let Some(sink) = &self.metrics {
            let sink = Arc::clone(sink);
            tokio::spawn(async move {
                sink.record(metric).await;
            });
        }
    }
}

/// Hash key over the exact message sequence.
fn messages_key(messages: &[ChatMessage]) -> String {
    let mut hasher = Sha256::new();
    for message in messages {
        hasher.update(message.role.as_bytes());
        hasher.update([0u8]);
        hasher.update(message.content.as_bytes());
        hasher.update([0u8]);
    }
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Parse JSON directly, tolerating surrounding code fences and prose-free
/// whitespace.
fn parse_json_lenient(content: &str) -> Option<serde_json::Value> {
    let trimmed = strip_code_fences(content.trim());
    serde_json::from_str(trimmed).ok()
}

fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Extract and parse the first balanced `{...}` substring.
fn extract_balanced_object(content: &str) -> Option<serde_json::Value> {
    let start = content.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in content[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &content[start..start + i + 1];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Provider that replays a script of responses.
    struct ScriptedProvider {
        script: Mutex<Vec<Result<String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<String>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        async fn chat(&self, _messages: &[ChatMessage], _options: &ChatOptions) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok("out of script".to_string())
            } else {
                script.remove(0)
            }
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn gateway_with(script: Vec<Result<String>>) -> LlmGateway {
        LlmGateway::new(Arc::new(ScriptedProvider::new(script))).with_retry_policy(
            RetryPolicy::new(3)
                .with_backoff(Duration::from_millis(1), Duration::from_millis(2))
                .with_jitter(false),
        )
    }

    #[tokio::test]
    async fn test_chat_completion_success() {
        let gateway = gateway_with(vec![Ok("hello".to_string())]);
        let result = gateway
            .chat_completion(
                "test",
                &[ChatMessage::user("hi")],
                &ChatOptions::default(),
                Fallback::Disabled,
            )
            .await
            .unwrap();
        assert_eq!(result, "hello");
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let gateway = gateway_with(vec![
            Err(LlmError::Server("500".into())),
            Ok("recovered".to_string()),
        ]);
        let result = gateway
            .chat_completion(
                "test",
                &[ChatMessage::user("hi")],
                &ChatOptions::default(),
                Fallback::Disabled,
            )
            .await
            .unwrap();
        assert_eq!(result, "recovered");
    }

    #[tokio::test]
    async fn test_terminal_failure_without_fallback() {
        let gateway = gateway_with(vec![
            Err(LlmError::Server("1".into())),
            Err(LlmError::Server("2".into())),
            Err(LlmError::Server("3".into())),
        ]);
        let result = gateway
            .chat_completion(
                "test",
                &[ChatMessage::user("hi")],
                &ChatOptions::default(),
                Fallback::Disabled,
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fallback_serves_cached_then_default() {
        let gateway = gateway_with(vec![
            Ok("first answer".to_string()),
            Err(LlmError::Unauthorized),
            Err(LlmError::Unauthorized),
        ]);
        let messages = [ChatMessage::user("same question")];
        let options = ChatOptions::default();

        let first = gateway
            .chat_completion("test", &messages, &options, Fallback::Disabled)
            .await
            .unwrap();
        assert_eq!(first, "first answer");

        // Same messages: terminal failure is answered from cache.
        let second = gateway
            .chat_completion(
                "test",
                &messages,
                &options,
                Fallback::Allow {
                    default: "default".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(second, "first answer");

        // Different messages: no cache entry, declared default wins.
        let third = gateway
            .chat_completion(
                "test",
                &[ChatMessage::user("different question")],
                &options,
                Fallback::Allow {
                    default: "default".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(third, "default");
    }

    #[tokio::test]
    async fn test_generate_json_direct_parse() {
        let gateway = gateway_with(vec![Ok(r#"{"answer": 42}"#.to_string())]);
        let value = gateway
            .generate_json(
                "test",
                &[ChatMessage::user("json please")],
                r#"{"answer": int}"#,
                &ChatOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(value["answer"], 42);
    }

    #[tokio::test]
    async fn test_generate_json_strips_fences() {
        let gateway = gateway_with(vec![Ok("```json\n{\"ok\": true}\n```".to_string())]);
        let value = gateway
            .generate_json("test", &[ChatMessage::user("x")], "{}", &ChatOptions::default())
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_generate_json_repair_pass() {
        let gateway = gateway_with(vec![
            Ok("Sure! Here you go: it is forty-two.".to_string()),
            Ok(r#"{"answer": 42}"#.to_string()),
        ]);
        let value = gateway
            .generate_json("test", &[ChatMessage::user("x")], "{}", &ChatOptions::default())
            .await
            .unwrap();
        assert_eq!(value["answer"], 42);
    }

    #[tokio::test]
    async fn test_generate_json_balanced_extraction_after_repair() {
        let gateway = gateway_with(vec![
            Ok("no json at all".to_string()),
            Ok("I apologize. {\"answer\": 7} is the object.".to_string()),
        ]);
        let value = gateway
            .generate_json("test", &[ChatMessage::user("x")], "{}", &ChatOptions::default())
            .await
            .unwrap();
        assert_eq!(value["answer"], 7);
    }

    #[tokio::test]
    async fn test_generate_json_fails_after_repair() {
        let gateway = gateway_with(vec![
            Ok("still prose".to_string()),
            Ok("more prose".to_string()),
        ]);
        let result = gateway
            .generate_json("test", &[ChatMessage::user("x")], "{}", &ChatOptions::default())
            .await;
        assert!(matches!(result, Err(LlmError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_per_call_timeout() {
        struct SlowProvider;

        #[async_trait]
        impl ChatProvider for SlowProvider {
            async fn chat(&self, _m: &[ChatMessage], _o: &ChatOptions) -> Result<String> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok("late".to_string())
            }

            fn name(&self) -> &'static str {
                "slow"
            }
        }

        let gateway = LlmGateway::new(Arc::new(SlowProvider))
            .with_call_timeout(Duration::from_millis(10))
            .with_retry_policy(
                RetryPolicy::new(1).with_backoff(Duration::from_millis(1), Duration::from_millis(1)),
            );
        let result = gateway
            .chat_completion(
                "test",
                &[ChatMessage::user("x")],
                &ChatOptions::default(),
                Fallback::Disabled,
            )
            .await;
        assert!(matches!(result, Err(LlmError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_metrics_emitted_without_blocking() {
        struct ChannelSink(tokio::sync::mpsc::UnboundedSender<AiCallMetric>);

        #[async_trait]
        impl MetricSink for ChannelSink {
            async fn record(&self, metric: AiCallMetric) {
                let _ = self.0.send(metric);
            }
        }

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let gateway = gateway_with(vec![Ok("hi".to_string())]).with_metric_sink(Arc::new(ChannelSink(tx)));

        gateway
            .chat_completion(
                "classify",
                &[ChatMessage::user("x")],
                &ChatOptions::default(),
                Fallback::Disabled,
            )
            .await
            .unwrap();

        let metric = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(metric.call_type, "classify");
        assert_eq!(metric.status, "success");
    }

    #[test]
    fn test_balanced_extraction_handles_nesting_and_strings() {
        let content = r#"prefix {"a": {"b": "with } brace"}, "c": 1} suffix"#;
        let value = extract_balanced_object(content).unwrap();
        assert_eq!(value["c"], 1);
        assert_eq!(value["a"]["b"], "with } brace");
    }

    #[test]
    fn test_messages_key_is_stable_and_distinct() {
        let a = [ChatMessage::user("hello")];
        let b = [ChatMessage::user("hello")];
        let c = [ChatMessage::system("hello")];
        assert_eq!(messages_key(&a), messages_key(&b));
        assert_ne!(messages_key(&a), messages_key(&c));
    }
}
