//! Provider adapter contract.
//!
//! An adapter is the engine's only way to reach an upstream LLM API. The
//! engine never speaks a vendor wire format directly — that plumbing is an
//! external collaborator, implemented outside this crate and registered into
//! the [`crate::catalog::Catalog`] as a `Arc<dyn Provider>`.

use crate::error::ProviderError;
use crate::models::{ClassifiedError, Request};
use async_trait::async_trait;
use std::time::Duration;

/// Raw bytes returned by a provider on success. The engine does not parse
/// these beyond the response-content extraction used by the Orchestrator
/// (see [`crate::orchestrator::extract_content`]).
pub type ResponseBytes = Vec<u8>;

/// What the engine consumes from an upstream provider.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier used as the provider id in [`crate::models::Model::provider_id`].
    fn id(&self) -> &str;

    /// Send `request` to `model_id`, honoring `deadline` as a per-attempt timeout.
    async fn send(
        &self,
        deadline: Duration,
        model_id: &str,
        request: &Request,
    ) -> Result<ResponseBytes, ProviderError>;

    /// Classify a failed attempt into the error class that drives escalation.
    fn classify_error(&self, error: &ProviderError) -> ClassifiedError;

    /// Health-check endpoint URL, or `None` to opt out of probing entirely.
    fn health_endpoint(&self) -> Option<String> {
        None
    }
}

/// In-memory test double implementing [`Provider`] without any network
/// plumbing — the engine has no in-scope vendor adapters, so tests exercise
/// routing semantics against this instead.
#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Scripted outcome for one call to [`MockProvider::send`]. Not `Clone` —
    /// `ProviderError` carries non-`Clone` variants (`reqwest::Error`,
    /// `serde_json::Error`) for the real adapter's `?`-conversion use, so a
    /// queued outcome is consumed by value, never copied.
    pub enum ScriptedOutcome {
        Success(ResponseBytes),
        Error(ProviderError),
    }

    /// A provider whose responses are scripted per-model, in call order.
    ///
    /// `default_body` is returned as a success once a model's script is
    /// unset or exhausted.
    pub struct MockProvider {
        id: String,
        scripts: Mutex<std::collections::HashMap<String, Vec<ScriptedOutcome>>>,
        default_body: ResponseBytes,
        health_endpoint: Option<String>,
        received: Mutex<Vec<Request>>,
    }

    impl MockProvider {
        pub fn new(id: impl Into<String>) -> Self {
            Self {
                id: id.into(),
                scripts: Mutex::new(std::collections::HashMap::new()),
                default_body: b"mock".to_vec(),
                health_endpoint: None,
                received: Mutex::new(Vec::new()),
            }
        }

        /// Every `Request` this provider has seen via `send`, in call order.
        pub fn received_requests(&self) -> Vec<Request> {
            self.received.lock().unwrap().clone()
        }

        pub fn with_health_endpoint(mut self, url: impl Into<String>) -> Self {
            self.health_endpoint = Some(url.into());
            self
        }

        pub fn with_default_success(mut self, body: impl Into<Vec<u8>>) -> Self {
            self.default_body = body.into();
            self
        }

        /// Queue outcomes for `model_id`, returned in order on successive calls.
        pub fn script(&self, model_id: impl Into<String>, outcomes: Vec<ScriptedOutcome>) {
            self.scripts
                .lock()
                .unwrap()
                .insert(model_id.into(), outcomes);
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn id(&self) -> &str {
            &self.id
        }

        async fn send(
            &self,
            _deadline: Duration,
            model_id: &str,
            request: &Request,
        ) -> Result<ResponseBytes, ProviderError> {
            self.received.lock().unwrap().push(request.clone());
            let mut scripts = self.scripts.lock().unwrap();
            let outcome = match scripts.get_mut(model_id) {
                Some(queue) if !queue.is_empty() => Some(queue.remove(0)),
                _ => None,
            };
            match outcome {
                Some(ScriptedOutcome::Success(body)) => Ok(body),
                Some(ScriptedOutcome::Error(err)) => Err(err),
                None => Ok(self.default_body.clone()),
            }
        }

        fn classify_error(&self, error: &ProviderError) -> ClassifiedError {
            use crate::models::ErrorClass;
            let class = match error {
                ProviderError::ContextOverflow => ErrorClass::ContextOverflow,
                ProviderError::RateLimit | ProviderError::QuotaExceeded => ErrorClass::RateLimited,
                ProviderError::Timeout
                | ProviderError::ServiceUnavailable
                | ProviderError::NetworkError { .. }
                | ProviderError::Http(_) => ErrorClass::Transient,
                _ => ErrorClass::Fatal,
            };
            ClassifiedError {
                class,
                retry_after: None,
                message: error.to_string(),
            }
        }

        fn health_endpoint(&self) -> Option<String> {
            self.health_endpoint.clone()
        }
    }

    impl ScriptedOutcome {
        pub fn context_overflow() -> Self {
            ScriptedOutcome::Error(ProviderError::ContextOverflow)
        }

        pub fn rate_limited() -> Self {
            ScriptedOutcome::Error(ProviderError::RateLimit)
        }

        pub fn transient() -> Self {
            ScriptedOutcome::Error(ProviderError::Timeout)
        }

        pub fn fatal() -> Self {
            ScriptedOutcome::Error(ProviderError::InvalidApiKey)
        }
    }
}
