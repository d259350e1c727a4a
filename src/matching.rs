//! Matching Orchestrator
//!
//! Sends one [`MatchRequest`] through an ordered chain of model identifiers.
//! Every failure is run through [`classify`]:
//! - **Retryable** (rate limited, overloaded, model not found): try the next model
//! - **Fatal** (anything else): stop, the next model would fail the same way
//!
//! Each model is tried at most once per request. Attempt history lives only as
//! long as the request.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::dataset::CachedDataset;
use crate::error::PipelineError;
use crate::prompt::{build_match_request, MatchRequest};

/// Default response token cap
pub const DEFAULT_MAX_TOKENS: usize = 4096;

/// Errors from a matching backend call
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("ANTHROPIC_API_KEY not set - matching service unavailable")]
    MissingApiKey,

    #[error("model returned no text")]
    EmptyResponse,
}

/// Recovery class of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// This model is unavailable right now; another model may serve
    Retryable,
    /// Would fail identically on every model
    Fatal,
}

/// Error type markers that mean "this model, right now" across providers
const OVERLOAD_MARKERS: &[&str] = &[
    "overloaded_error",
    "rate_limit_error",
    "not_found_error",
    "resource_exhausted",
    "too many requests",
    "model not found",
    "capacity",
];

/// Classify a backend failure
pub fn classify(error: &BackendError) -> FailureClass {
    match error {
        BackendError::Api { status, body } => {
            if matches!(status, 404 | 429 | 503 | 529) {
                return FailureClass::Retryable;
            }
            let lower = body.to_lowercase();
            if OVERLOAD_MARKERS.iter().any(|m| lower.contains(m)) {
                FailureClass::Retryable
            } else {
                FailureClass::Fatal
            }
        }
        BackendError::Transport(_) | BackendError::MissingApiKey | BackendError::EmptyResponse => {
            FailureClass::Fatal
        }
    }
}

/// External semantic-matching service
#[async_trait]
pub trait MatchingBackend: Send + Sync {
    async fn generate(&self, model: &str, request: &MatchRequest) -> Result<String, BackendError>;
}

/// Outcome of one model call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure {
        class: FailureClass,
        error: String,
    },
}

/// One call to the matching service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAttempt {
    pub model: String,
    pub outcome: AttemptOutcome,
}

/// How the body should be rendered by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatMode {
    Plain,
    Rich,
}

/// Result ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResponse {
    pub body: String,
    pub format: FormatMode,
    /// Model that produced the body
    pub model: String,
    /// Attempts made for this request, in chain order
    pub attempts: Vec<ModelAttempt>,
}

/// Runs match requests through the model fallback chain
#[derive(Clone)]
pub struct MatchingOrchestrator {
    backend: Arc<dyn MatchingBackend>,
    chain: Vec<String>,
    max_tokens: usize,
}

impl MatchingOrchestrator {
    pub fn new(backend: Arc<dyn MatchingBackend>, chain: Vec<String>) -> Self {
        Self {
            backend,
            chain,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Model identifiers in priority order
    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    pub async fn find_matches(
        &self,
        query: &str,
        dataset: &CachedDataset,
        ceiling: usize,
    ) -> Result<MatchResponse, PipelineError> {
        let request = build_match_request(query, dataset, ceiling, self.max_tokens);
        debug!(
            "Match request: query_len={}, rows={}, ceiling={}",
            query.len(),
            dataset.data.len(),
            ceiling
        );

        let mut attempts: Vec<ModelAttempt> = Vec::with_capacity(self.chain.len());
        let mut last_error = None;

        for model in &self.chain {
            match self.backend.generate(model, &request).await {
                Ok(body) => {
                    attempts.push(ModelAttempt {
                        model: model.clone(),
                        outcome: AttemptOutcome::Success,
                    });
                    info!("Match served by {} after {} attempt(s)", model, attempts.len());

                    return Ok(MatchResponse {
                        body,
                        format: FormatMode::Rich,
                        model: model.clone(),
                        attempts,
                    });
                }
                Err(e) => {
                    let class = classify(&e);
                    warn!("Model {} failed ({:?}): {}", model, class, e);
                    attempts.push(ModelAttempt {
                        model: model.clone(),
                        outcome: AttemptOutcome::Failure {
                            class,
                            error: e.to_string(),
                        },
                    });
                    last_error = Some(e);

                    if class == FailureClass::Fatal {
                        break;
                    }
                }
            }
        }

        Err(PipelineError::MatchingServiceUnavailable {
            attempts: attempts.len(),
            last: last_error,
        })
    }
}
