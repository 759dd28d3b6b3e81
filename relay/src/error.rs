//! Typed errors for stages, resolution and backend calls.
//!
//! Orchestration code wraps these in `anyhow` for context; `main` downcasts
//! back to [`RelayError`] to pick an exit code.

use thiserror::Error;

use crate::core::filter::LookupFilter;

/// Failure reported by a backend adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend validated a dry-run request and reports it would have succeeded.
    #[error("{operation}: request would have succeeded ({message})")]
    DryRunSucceeded { operation: String, message: String },
    /// The addressed entity does not exist.
    #[error("{operation}: not found ({message})")]
    NotFound { operation: String, message: String },
    #[error("{operation} failed: {message}")]
    Failed { operation: String, message: String },
}

impl BackendError {
    pub fn failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        BackendError::Failed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn not_found(operation: impl Into<String>, message: impl Into<String>) -> Self {
        BackendError::NotFound {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn dry_run(operation: impl Into<String>, message: impl Into<String>) -> Self {
        BackendError::DryRunSucceeded {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound { .. })
    }
}

/// Pipeline state access and parsing failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("state key '{key}' is missing")]
    Missing { key: String },
    #[error("state key '{key}' is not {expected}")]
    WrongType { key: String, expected: &'static str },
    #[error("parse pipeline state: {0}")]
    Parse(String),
    #[error("render pipeline state: {0}")]
    Render(String),
    /// Applying an update to an integer key left the `i64` range.
    #[error("state key '{key}' overflows after update")]
    Overflow { key: String },
}

/// Top-level error taxonomy for a stage.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("required environment variable {key} is not set")]
    Configuration { key: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("no {entity} found matching {filter}")]
    NotFound { entity: String, filter: String },
    #[error("{count} {entity}s found matching {filter}; expected exactly one")]
    Ambiguous {
        entity: String,
        count: usize,
        filter: String,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    State(#[from] StateError),
}

impl RelayError {
    pub fn not_found(filter: &LookupFilter) -> Self {
        RelayError::NotFound {
            entity: filter.entity().to_string(),
            filter: filter.to_string(),
        }
    }

    pub fn ambiguous(filter: &LookupFilter, count: usize) -> Self {
        RelayError::Ambiguous {
            entity: filter.entity().to_string(),
            count,
            filter: filter.to_string(),
        }
    }
}

pub type Result<T, E = RelayError> = std::result::Result<T, E>;
