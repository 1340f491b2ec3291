//! Core error types.

use thiserror::Error;

/// Persistence layer errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Record not found.
    #[error("record not found: {table}/{id}")]
    NotFound {
        /// Table that was searched.
        table: String,
        /// Identifier that was not found.
        id: String,
    },

    /// A record with the same identifier already exists.
    #[error("duplicate record: {table}/{id}")]
    Duplicate {
        /// Table the write targeted.
        table: String,
        /// Conflicting identifier.
        id: String,
    },

    /// Invalid data format.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The backing store is temporarily unavailable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Storage(sled::Error::Io(_)) | Error::Unavailable(_))
    }
}

/// Errors surfaced by the migration, rollback and validation managers.
#[derive(Debug, Error)]
pub enum CutoverError {
    /// The persistence collaborator rejected an operation.
    #[error("{operation} failed: {source}")]
    Persistence {
        /// The operation being performed.
        operation: String,
        /// The underlying store error.
        #[source]
        source: Error,
    },

    /// The requested record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record (table name).
        entity: String,
        /// Identifier that was requested.
        id: String,
    },

    /// A rollback step failed; the rest of the plan was not attempted.
    #[error("rollback step '{step}' failed: {message}")]
    StepExecution {
        /// Name of the failing step.
        step: String,
        /// Error reported by the step executor.
        message: String,
    },

    /// A structural integrity check found violations.
    #[error("integrity check failed for table {table}: {message}")]
    Integrity {
        /// Offending table.
        table: String,
        /// Description of the violation.
        message: String,
    },

    /// Caller supplied an unusable argument.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CutoverError {
    /// Wrap a store error with the name of the operation that produced it.
    ///
    /// Missing records are reported as [`CutoverError::NotFound`] so callers
    /// can distinguish them from storage faults.
    pub fn persistence(operation: impl Into<String>, source: Error) -> Self {
        match source {
            Error::NotFound { table, id } => CutoverError::NotFound { entity: table, id },
            source => CutoverError::Persistence {
                operation: operation.into(),
                source,
            },
        }
    }
}
