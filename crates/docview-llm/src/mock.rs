//! Deterministic failure injection for resilience testing.
//!
//! Only compiled under the `mock` cargo feature; production builds cannot
//! reach this code path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::LlmError;

/// Intercepts gateway calls with a configured probability and produces a
/// configured failure.
///
/// Interception is deterministic: call `n` is intercepted when the running
/// total `⌊n·p⌋` advances, so the same configuration and call sequence
/// always fails at the same points.
pub struct FailureInjector {
    failure: String,
    probability: f64,
    calls: AtomicU64,
}

impl FailureInjector {
    pub fn new(failure: impl Into<String>, probability: f64) -> Self {
        Self {
            failure: failure.into(),
            probability: probability.clamp(0.0, 1.0),
            calls: AtomicU64::new(0),
        }
    }

    /// Decide whether this call is intercepted, and with which failure.
    pub fn intercept(&self) -> Option<LlmError> {
        if self.probability <= 0.0 {
            return None;
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let before = (n as f64 * self.probability).floor() as u64;
        let after = ((n + 1) as f64 * self.probability).floor() as u64;
        if after > before {
            Some(self.make_error())
        } else {
            None
        }
    }

    fn make_error(&self) -> LlmError {
        match self.failure.as_str() {
            "timeout" => LlmError::Timeout(Duration::from_secs(60)),
            "rate_limit" => LlmError::RateLimit {
                retry_after: Some(Duration::from_secs(2)),
            },
            "server_error" => LlmError::Server("injected server error".to_string()),
            "network_error" => LlmError::Network("injected network error".to_string()),
            "invalid_response" => LlmError::InvalidResponse("injected invalid response".to_string()),
            "unauthorized" => LlmError::Unauthorized,
            "bad_request" => LlmError::BadRequest("injected bad request".to_string()),
            "service_unavailable" => {
                LlmError::ServiceUnavailable("injected service unavailable".to_string())
            }
            other => LlmError::Server(format!("unknown injected failure: {}", other)),
        }
    }
}
