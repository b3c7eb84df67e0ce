//! Error taxonomy of the reconcilers.
//!
//! Callers branch on the variant, never on the message:
//! - `Validation`: a parameter is missing or malformed; no API call was made.
//! - `NotFound` / `AmbiguousMatch`: an identity did not resolve to exactly one resource.
//! - `Remote`: an API call failed.
//! - `OperationFailed`: a provider request finished in `FAILED`.
//! - `Timeout`: the deadline elapsed while polling.

use thiserror::Error;

use crate::profitbricks_client::ApiError;
use crate::profitbricks_types::ResourceKind;

/// Error type for module and reconciler operations.
#[derive(Debug, Error)]
pub enum ProfitbricksError {
    /// Invalid or missing parameter.
    #[error("{0}")]
    Validation(String),

    /// Identity resolved to no resource.
    #[error("{kind} '{identity}' could not be found")]
    NotFound {
        /// Kind of the missing resource.
        kind: ResourceKind,
        /// Name or id that was looked up.
        identity: String,
    },

    /// Identity resolved to more than one resource.
    #[error("{kind} '{identity}' matches {count} resources, refer to it by id")]
    AmbiguousMatch {
        /// Kind of the resources.
        kind: ResourceKind,
        /// Name that was looked up.
        identity: String,
        /// Number of matching resources.
        count: usize,
    },

    /// Cloud API call failed.
    #[error("failed to {context}: {source}")]
    Remote {
        /// What was being attempted.
        context: String,
        /// Underlying client error.
        #[source]
        source: ApiError,
    },

    /// Provider request completed with status `FAILED`.
    #[error("request \"{request_id}\" for {operation} failed: {}", .message.as_deref().unwrap_or("no message from provider"))]
    OperationFailed {
        /// Operation that issued the request.
        operation: String,
        /// Provider request id.
        request_id: String,
        /// Provider failure message.
        message: Option<String>,
    },

    /// Deadline elapsed before the awaited state was reached.
    #[error("timed out waiting for {operation} on \"{target}\" to complete")]
    Timeout {
        /// Operation being awaited.
        operation: String,
        /// Request id or resource ids being polled.
        target: String,
    },

    /// Result could not be encoded.
    #[error("failed to encode module result: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ProfitbricksError {
    /// Stable tag reported in the failure envelope.
    #[must_use]
    pub const fn kind_tag(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::AmbiguousMatch { .. } => "ambiguous_match",
            Self::Remote { .. } => "remote",
            Self::OperationFailed { .. } => "operation_failed",
            Self::Timeout { .. } => "timeout",
            Self::Encode(_) => "internal",
        }
    }

    /// Shorthand for a `Validation` error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Shorthand for a `NotFound` error.
    pub fn not_found(kind: ResourceKind, identity: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            identity: identity.into(),
        }
    }
}

/// Result type for module and reconciler operations.
pub type Result<T> = std::result::Result<T, ProfitbricksError>;

/// Attach a context to a failed API call.
pub trait RemoteContext<T> {
    /// Convert an `ApiError` into `ProfitbricksError::Remote`.
    ///
    /// # Errors
    ///
    /// Returns the wrapped error when `self` is an error.
    fn remote(self, context: &str) -> Result<T>;
}

impl<T> RemoteContext<T> for std::result::Result<T, ApiError> {
    fn remote(self, context: &str) -> Result<T> {
        self.map_err(|source| ProfitbricksError::Remote {
            context: context.to_string(),
            source,
        })
    }
}
