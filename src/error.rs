// ABOUTME: Typed error taxonomy for the migration pipeline
// ABOUTME: Distinguishes retryable I/O failures from per-table structural and verification failures

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors the pipeline classifies explicitly.
///
/// Everything else travels as `anyhow::Error` with context attached; callers
/// recover these variants with `downcast_ref::<MigrationError>()`.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// Network, timeout or lock-wait failure talking to a database
    #[error("Transient I/O failure during {operation}")]
    TransientIo {
        operation: String,
        #[source]
        source: BoxError,
    },

    /// The retry wrapper gave up after its maximum attempt count
    #[error("{operation} failed after {attempts} attempt(s)")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: BoxError,
    },

    /// The retry predicate rejected the error, no further attempts were made
    #[error("{operation} failed with a non-retryable error")]
    NonRetryable {
        operation: String,
        #[source]
        source: BoxError,
    },

    /// Source and target column metadata do not describe the same table
    #[error("Structural mismatch for {table}: {detail}")]
    StructuralMismatch { table: String, detail: String },

    /// Source and target disagree on row count or sampled content
    #[error("Sanity check failed for {table}: {detail}")]
    VerificationMismatch { table: String, detail: String },

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MigrationError {
    pub fn transient(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        MigrationError::TransientIo {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub fn structural(table: impl Into<String>, detail: impl Into<String>) -> Self {
        MigrationError::StructuralMismatch {
            table: table.into(),
            detail: detail.into(),
        }
    }

    /// True for errors produced after the retry wrapper already gave up
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, MigrationError::RetryExhausted { .. })
    }
}
