//! Span exporters
use crate::error::TraceError;
use crate::trace::SpanData;
use std::fmt::Debug;

/// Describes the result of an export.
pub type ExportResult = Result<(), TraceError>;

/// `SpanExporter` defines the interface that backend-specific senders must
/// implement so they can be plugged into the reporting pipeline.
///
/// The exporter is expected to be a simple encoder and transmitter of
/// finished span data; batching, queueing and retry cadence live in the
/// [`SpanProcessor`] driving it.
///
/// [`SpanProcessor`]: crate::trace::SpanProcessor
pub trait SpanExporter: Send + Debug {
    /// Exports a batch of finished spans.
    ///
    /// This function is never called concurrently for the same exporter
    /// instance, and must not block indefinitely.
    fn export(&mut self, batch: Vec<SpanData>) -> ExportResult;

    /// Shuts down the exporter. Called when the pipeline is shut down. This
    /// is an opportunity for the exporter to do any cleanup required.
    ///
    /// After the call to `shutdown`, subsequent calls to `export` are not
    /// allowed and should return an error.
    fn shutdown(&mut self) {}
}
