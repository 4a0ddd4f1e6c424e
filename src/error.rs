//! Error types for the chaos operator

use thiserror::Error;

/// Main error type for chaos operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error that has no dedicated variant
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Optimistic-concurrency failure: the object changed since it was read
    #[error("write conflict: {0}")]
    Conflict(String),

    /// Create raced with another writer that created the same object
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Validation error for ChaosEngine specs
    #[error("validation error: {0}")]
    Validation(String),

    /// Forceful cleanup failed for one or more resource kinds
    #[error("unable to delete chaos resources: {kinds}")]
    Cleanup {
        /// Comma separated list of the kinds that failed to delete
        kinds: String,
    },

    /// A bounded wait never converged
    #[error("{operation} did not converge after {attempts} attempts")]
    WaitExhausted {
        /// What was being waited for
        operation: String,
        /// Number of attempts made
        attempts: u32,
    },

    /// The operation was cancelled by shutdown or deadline
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// The ChaosEngine carries no namespace
    #[error("missing namespace on ChaosEngine")]
    MissingNamespace,
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a cancellation error with the given message
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// True for stale-version write failures that should be retried without backoff
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// True when a create lost a race with another creator
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// True for errors caused by the ChaosEngine spec itself
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// True when the API server reported the object as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Kube(e) if is_not_found(e))
    }

    /// Classify a raw kube error, splitting out the 409 cases.
    ///
    /// The API server reports both stale writes and duplicate creates with
    /// HTTP 409; the `reason` field tells them apart.
    pub fn from_kube(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                Self::AlreadyExists(ae.message)
            }
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict(ae.message),
            other => Self::Kube(other),
        }
    }
}

/// True when a kube error is a 404
pub(crate) fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}
