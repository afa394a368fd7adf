//! Error types for declarative stacks.
//!
//! [`Error`] covers everything that can go wrong between loading a stack
//! declaration and applying it. Provider failures are kept in their own
//! [`ProviderError`] so retry logic can inspect them.

use std::fmt;

/// Result type alias for declarative operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of provider errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Throttling, timeouts, eventual consistency (retryable).
    Transient,
    /// The physical resource does not exist.
    NotFound,
    /// The provider refused the request (bad attributes, quota, policy).
    Rejected,
}

impl ErrorCategory {
    /// Whether this error category is worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transient => "Transient provider failure",
            Self::NotFound => "Resource not found",
            Self::Rejected => "Request rejected by provider",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors returned by a [`Provider`](crate::Provider).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Temporary failure; the same call may succeed later.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The physical resource does not exist.
    #[error("{kind} {physical_id} not found")]
    NotFound {
        /// Resource kind.
        kind: String,
        /// Provider-assigned identifier.
        physical_id: String,
    },

    /// The provider refused the request.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl ProviderError {
    /// Get the error category for retry logic.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transient(_) => ErrorCategory::Transient,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Rejected(_) => ErrorCategory::Rejected,
        }
    }

    /// Whether this error is worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

/// Errors that can occur while building, planning, or applying a stack.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two declarations share the same logical id.
    #[error("duplicate resource id: {0}")]
    DuplicateResource(String),

    /// A reference or `depends_on` entry names an undeclared resource.
    #[error("resource {from} references undeclared resource {to}")]
    DanglingReference {
        /// Declaring resource.
        from: String,
        /// Missing target.
        to: String,
    },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    /// A required parameter has no value and no default.
    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    /// A parameter was supplied or referenced but never declared.
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    /// A parameter value failed its declared constraint.
    #[error("invalid value for parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A `${...}` token could not be understood.
    #[error("invalid token {token} in {resource}.{attribute}")]
    InvalidToken {
        /// Resource containing the token.
        resource: String,
        /// Attribute path containing the token.
        attribute: String,
        /// The offending token.
        token: String,
    },

    /// A `${ref:...}` token points at a resource with no recorded state.
    #[error("{resource} references {target}, which has not been applied")]
    UnresolvedReference {
        /// Resource containing the reference.
        resource: String,
        /// Referenced resource (and output, if any).
        target: String,
    },

    /// A provider call failed.
    #[error("{action} {resource} failed: {source}")]
    Provider {
        /// Action being performed.
        action: String,
        /// Logical resource id.
        resource: String,
        /// Underlying provider error.
        #[source]
        source: ProviderError,
    },

    /// Reading a confirmation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap a provider error with the action and resource it came from.
    pub fn provider(
        action: impl Into<String>,
        resource: impl Into<String>,
        source: ProviderError,
    ) -> Self {
        Self::Provider {
            action: action.into(),
            resource: resource.into(),
            source,
        }
    }

    /// Whether this error is a transient provider error worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider { source, .. } if source.is_retryable())
    }
}
