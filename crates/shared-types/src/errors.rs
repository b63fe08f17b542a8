//! # Error Types
//!
//! Defines error types used across subsystems.

use thiserror::Error;

/// Errors raised by the persistence layer.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Record not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A conditional write lost its race (e.g. an in-flight state exists).
    #[error("Conditional write rejected: {0}")]
    Conflict(String),

    /// Stored data failed an integrity check.
    #[error("Data corruption: {0}")]
    DataCorruption(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),
}
