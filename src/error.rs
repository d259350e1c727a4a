//! Pipeline errors and the user-facing error envelope
//!
//! Upstream faults carry full technical detail for the logs. Before anything
//! reaches a chat they are reduced to an [`ErrorEnvelope`] whose user text is
//! one of the fixed localized strings in [`crate::delivery`].

use crate::delivery::SERVICE_UNAVAILABLE_TEXT;
use crate::matching::BackendError;
use crate::sheets::DataSourceError;

/// Faults that abort a pipeline run
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("data source unavailable")]
    DataSourceUnavailable(#[source] DataSourceError),

    #[error("matching service unavailable after {attempts} attempt(s)")]
    MatchingServiceUnavailable {
        attempts: usize,
        #[source]
        last: Option<BackendError>,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure as surfaced to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEnvelope {
    /// Localized, generic text safe to send to the chat
    pub user_message: &'static str,
    /// Log-only technical detail
    pub detail: String,
}

impl PipelineError {
    /// Every fault collapses to the one "temporarily unavailable" text
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            user_message: SERVICE_UNAVAILABLE_TEXT,
            detail: self.detail(),
        }
    }

    /// Full error chain, outermost first
    pub fn detail(&self) -> String {
        let mut detail = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            detail.push_str(": ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        detail
    }
}
