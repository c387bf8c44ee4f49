//! Error taxonomy for the routing and orchestration engine.
//!
//! [`EngineError`] is what callers of [`crate::engine::TokenHubRouter`] see.
//! [`ProviderError`] is what a [`crate::providers::Provider`] adapter raises
//! internally; [`crate::route_engine`] classifies it into a [`crate::models::ClassifiedError`]
//! and consumes it before it ever reaches a caller — adapter errors never
//! propagate directly.

use thiserror::Error;

/// Errors visible to callers of the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Selector produced an empty candidate list. Non-retryable.
    #[error("no eligible models registered")]
    NoEligibleCandidates,

    /// The candidate list was exhausted without a successful attempt.
    #[error("all providers failed: {cause}")]
    AllCandidatesFailed { cause: String },

    /// An orchestration stage other than plan failed (critique, refine, judge).
    #[error("orchestration stage failed: {stage}: {cause}")]
    StageFailed { stage: String, cause: String },

    /// The adversarial plan stage failed.
    #[error("adversarial plan phase: {cause}")]
    PlanFailed { cause: String },

    /// Configuration could not be loaded or was invalid.
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

/// Errors an adapter can raise while attempting to send a request.
///
/// This is the type a [`crate::providers::Provider`] implementation returns;
/// `classify_error` turns it into a [`crate::models::ClassifiedError`] with an
/// error class that drives the escalation state machine.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {code} - {message}")]
    Api { code: u16, message: String },

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("model not found: {model}")]
    ModelNotFound { model: String },

    #[error("rate limit exceeded")]
    RateLimit,

    #[error("quota exceeded")]
    QuotaExceeded,

    #[error("service unavailable")]
    ServiceUnavailable,

    #[error("timeout")]
    Timeout,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid response format")]
    InvalidResponse,

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("context window exceeded")]
    ContextOverflow,

    #[error("authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("network error: {message}")]
    NetworkError { message: String },
}
