use crate::error::TraceResult;
use crate::trace::{ExportResult, SpanData, SpanExporter};
use std::sync::{Arc, Mutex};

/// An in-memory span exporter that stores finished spans in memory.
///
/// This exporter is the recorder used for testing and debugging: it keeps an
/// append-only `Vec<SpanData>` in completion order, safe for concurrent
/// appends from multiple calls. Records can be retrieved with
/// [`get_finished_spans`] and the store survives pipeline shutdown; it is
/// cleared only by an explicit [`reset`].
///
/// [`get_finished_spans`]: InMemorySpanExporter::get_finished_spans
/// [`reset`]: InMemorySpanExporter::reset
///
/// # Example
///
/// ```
/// use wiretrace::trace::{InMemorySpanExporter, SimpleSpanProcessor, Tracer};
///
/// let exporter = InMemorySpanExporter::default();
/// let tracer = Tracer::builder()
///     .with_span_processor(SimpleSpanProcessor::new(Box::new(exporter.clone())))
///     .build();
///
/// tracer.span_builder("say hello").start(&tracer).end();
///
/// let spans = exporter.get_finished_spans().unwrap();
/// assert_eq!(spans.len(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct InMemorySpanExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
}

impl Default for InMemorySpanExporter {
    fn default() -> Self {
        InMemorySpanExporterBuilder::new().build()
    }
}

/// Builder for [`InMemorySpanExporter`].
///
/// # Example
///
/// ```
/// # use wiretrace::trace::InMemorySpanExporterBuilder;
/// let exporter = InMemorySpanExporterBuilder::new().build();
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporterBuilder {}

impl InMemorySpanExporterBuilder {
    /// Creates a new instance of the `InMemorySpanExporterBuilder`.
    pub fn new() -> Self {
        Self {}
    }

    /// Creates a new instance of the `InMemorySpanExporter`.
    pub fn build(&self) -> InMemorySpanExporter {
        InMemorySpanExporter {
            spans: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl InMemorySpanExporter {
    /// Returns the finished spans, in completion order.
    ///
    /// # Errors
    ///
    /// Returns a `TraceError` if the internal lock cannot be acquired.
    pub fn get_finished_spans(&self) -> TraceResult<Vec<SpanData>> {
        Ok(self.spans.lock().map(|spans| spans.clone())?)
    }

    /// Clears the internal storage of finished spans.
    pub fn reset(&self) {
        let _ = self.spans.lock().map(|mut spans| spans.clear());
    }
}

impl SpanExporter for InMemorySpanExporter {
    fn export(&mut self, mut batch: Vec<SpanData>) -> ExportResult {
        Ok(self.spans.lock().map(|mut spans| spans.append(&mut batch))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SpanContext, SpanKind, Status};
    use std::borrow::Cow;
    use std::time::SystemTime;

    fn span_data(name: &'static str) -> SpanData {
        SpanData {
            span_context: SpanContext::NONE,
            name: Cow::Borrowed(name),
            span_kind: SpanKind::Internal,
            references: Vec::new(),
            start_time: SystemTime::now(),
            end_time: SystemTime::now(),
            attributes: Vec::new(),
            status: Status::Unset,
        }
    }

    #[test]
    fn appends_in_completion_order() {
        let mut exporter = InMemorySpanExporter::default();
        exporter.export(vec![span_data("first")]).unwrap();
        exporter.export(vec![span_data("second")]).unwrap();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].name, "first");
        assert_eq!(spans[1].name, "second");
    }

    #[test]
    fn reset_clears_the_store() {
        let mut exporter = InMemorySpanExporter::default();
        exporter.export(vec![span_data("first")]).unwrap();
        exporter.reset();
        assert!(exporter.get_finished_spans().unwrap().is_empty());
    }

    #[test]
    fn clones_share_the_store() {
        let mut exporter = InMemorySpanExporter::default();
        let reader = exporter.clone();
        exporter.export(vec![span_data("shared")]).unwrap();
        assert_eq!(reader.get_finished_spans().unwrap().len(), 1);
    }
}
