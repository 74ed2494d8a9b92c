//! Errors surfaced by the span reporting pipeline.
//!
//! Tracing failures never affect the traced call itself: processors and
//! exporters report problems through these types (or the internal logging
//! macros) without altering call control flow.
use std::sync::PoisonError;
use std::time::Duration;
use thiserror::Error;

/// Result type for fallible reporting pipeline operations.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors returned by flush, shutdown and export operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// The processor or exporter has already been shut down.
    #[error("reporting pipeline already shut down")]
    AlreadyShutdown,

    /// A flush or shutdown did not complete within its deadline.
    #[error("export timed out after {0:?}")]
    ExportTimedOut(Duration),

    /// Exporting a batch of finished spans failed.
    #[error("span export failed: {0}")]
    ExportFailed(String),

    /// Other types of failures not covered by the variants above.
    #[error("{0}")]
    Other(String),
}

impl<T> From<PoisonError<T>> for TraceError {
    fn from(err: PoisonError<T>) -> Self {
        TraceError::Other(err.to_string())
    }
}
