//! Error taxonomy for ingestion passes.

use thiserror::Error;

/// Errors raised while reconciling and persisting a scan pass.
///
/// Only [`IngestError::Evidence`] is recoverable: extractors turn it into a
/// skipped item on the scan report. The other variants abort the pass and
/// the store rolls back everything the pass wrote.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A single file or log record could not be used.
    #[error("evidence error at {path}: {reason}")]
    Evidence { path: String, reason: String },

    /// A write would break a referential invariant of the data model.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// The store could not complete the pass.
    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl IngestError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        IngestError::Invariant(msg.into())
    }

    /// Whether retrying the whole pass from scratch is expected to help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Persistence(_))
    }
}
