//! Error types for rollout operations
//!
//! Errors carry the resource identity and the operation that failed so a
//! returned error can be diagnosed without the surrounding log lines.

use thiserror::Error;

/// Main error type for rollout operations
#[derive(Debug, Error)]
pub enum Error {
    /// The tracked resource (or pod) does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Resource kind (e.g., "Deployment")
        kind: String,
        /// Namespace the lookup ran in
        namespace: String,
        /// Resource name
        name: String,
    },

    /// Caller supplied an incomplete or invalid configuration
    #[error("bad parameter: {message}")]
    BadParameter {
        /// Description of what is missing or invalid
        message: String,
    },

    /// The live state does not match a finished rollout yet
    #[error("rollout of {resource} not converged: {message}")]
    ConvergenceMismatch {
        /// Resource identity (e.g., "Deployment default/web")
        resource: String,
        /// Which counter or pod is lagging
        message: String,
    },

    /// A call to the cluster API failed
    #[error("{operation} {resource} failed: {source}")]
    Remote {
        /// Remote operation (get, create, update, delete, list pods, delete pod)
        operation: String,
        /// Resource identity the call was made for
        resource: String,
        /// The underlying kube-rs error
        #[source]
        source: kube::Error,
    },

    /// A resource document could not be decoded
    #[error("decode error: {message}")]
    Decode {
        /// Description of what failed
        message: String,
        /// The resource kind being decoded (if known)
        kind: Option<String>,
    },

    /// The operation was cancelled before it finished
    #[error("{operation} cancelled")]
    Cancelled {
        /// Operation that observed the cancellation
        operation: String,
    },
}

impl Error {
    /// Create a not-found error for a resource identity
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a bad parameter error with the given message
    pub fn bad_parameter(msg: impl Into<String>) -> Self {
        Self::BadParameter {
            message: msg.into(),
        }
    }

    /// Create a convergence mismatch for a resource
    pub fn mismatch(resource: impl std::fmt::Display, msg: impl Into<String>) -> Self {
        Self::ConvergenceMismatch {
            resource: resource.to_string(),
            message: msg.into(),
        }
    }

    /// Wrap a kube-rs error with the operation and resource it failed for
    pub fn remote(
        operation: impl Into<String>,
        resource: impl std::fmt::Display,
        source: kube::Error,
    ) -> Self {
        Self::Remote {
            operation: operation.into(),
            resource: resource.to_string(),
            source,
        }
    }

    /// Create a decode error with the given message
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a decode error for a specific target kind
    pub fn decode_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a cancellation error for the given operation
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Whether another attempt may succeed without any caller action
    ///
    /// Only convergence mismatches qualify: everything else either needs the
    /// caller to act or reflects a remote failure that is not retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConvergenceMismatch { .. })
    }

    /// Whether this error reports a missing resource
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Remote {
                source: kube::Error::Api(response),
                ..
            } => response.code == 404,
            _ => false,
        }
    }

    /// Whether this error reports a cancelled operation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
