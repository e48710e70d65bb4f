//! Crate-wide error type.

use thiserror::Error;
use tracing::error;

use crate::backend::{BackendError, ImportError};
use crate::config::ConfigError;
use crate::validate::ValidationError;

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the model, planner, and executor.
#[derive(Debug, Error)]
pub enum Error {
    /// A constructor or operation was handed a malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The operation is not legal for the current state of the receiver.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// The query failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// An internal invariant was violated; the plan or run must be abandoned.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
    /// A backend operation failed outside of a plan step.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// A backend operation failed while executing a plan step.
    #[error("step {step} failed: {source}")]
    Execution {
        /// Human readable label of the failing step.
        step: String,
        /// Underlying backend failure.
        source: BackendError,
    },
    /// Engine configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Source data could not be imported.
    #[error(transparent)]
    Import(#[from] ImportError),
}

impl Error {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState(message.into())
    }

    /// Builds an [`Error::Invariant`] and logs it at error level.
    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(message = %message, "qgraph.invariant_violated");
        Error::Invariant(message)
    }

    /// Attaches a step label to backend failures raised while running a step.
    pub(crate) fn in_step(self, step: &str) -> Self {
        match self {
            Error::Backend(source) => Error::Execution {
                step: step.to_owned(),
                source,
            },
            other => other,
        }
    }

    /// Stable machine-readable code for the error category.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "invalid_argument",
            Error::InvalidState(_) => "invalid_state",
            Error::Validation(_) => "validation",
            Error::Invariant(_) => "invariant",
            Error::Backend(_) => "backend",
            Error::Execution { .. } => "execution",
            Error::Config(_) => "config",
            Error::Import(_) => "import",
        }
    }

    /// Returns `true` when the error must abort the whole plan or run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Invariant(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_gain_step_context() {
        let err = Error::Backend(BackendError::UnknownContainer("out".into()));
        match err.in_step("2/3 collapse-edge:B|Y|A") {
            Error::Execution { step, source } => {
                assert_eq!(step, "2/3 collapse-edge:B|Y|A");
                assert_eq!(source, BackendError::UnknownContainer("out".into()));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn non_backend_errors_pass_through() {
        let err = Error::invalid_state("nope").in_step("1/1 get-vertex:A");
        assert_eq!(err.code(), "invalid_state");
        assert!(!err.is_fatal());
        assert!(Error::invariant("cycle").is_fatal());
    }
}
