//! Error taxonomy for the mapping layer.
//!
//! Every public operation returns [`Result<T>`]. Nothing is retried or
//! recovered here; the caller decides.

use thiserror::Error;

/// Unified error type for schema, mapping and store failures.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Entity declaration problem: no columns, no primary key, a field whose
    /// type has no resolver, or colliding index names.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No resolver is registered for the requested native type.
    #[error("no type resolver registered for [{0}]")]
    UnknownType(&'static str),

    /// A single-row read observed more than one row (or column).
    #[error("cardinality error: {0}")]
    Cardinality(String),

    /// Entity construction or field assignment failed.
    #[error("access error: {0}")]
    Access(String),

    /// The underlying store rejected a statement.
    #[error("store error: {0}")]
    Store(String),
}

impl From<rusqlite::Error> for OrmError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Store(error.to_string())
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, OrmError>;
