//! # Tracer
//!
//! The [`Tracer`] is the explicit span factory of the crate: it owns the id
//! generator, the sampling decision for root spans and the reporting
//! pipeline. There is no process-global registry; components that start
//! spans hold their own (cheaply cloneable) `Tracer`.
use crate::common::KeyValue;
use crate::error::TraceResult;
use crate::trace::{
    IdGenerator, RandomIdGenerator, Span, SpanContext, SpanData, SpanId, SpanKind, SpanProcessor,
    Status, TraceFlags,
};
use crate::wiretrace_debug;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Sampling decision applied to root spans.
///
/// Child spans inherit the sampled flag of their parent context, so the
/// sampler only runs where a trace begins. Spans that are not sampled are
/// skipped by the built-in processors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Sampler {
    /// Sample every root span.
    #[default]
    AlwaysOn,
    /// Sample no root span.
    AlwaysOff,
}

#[derive(Debug)]
struct TracerInner {
    sampler: Sampler,
    id_generator: Box<dyn IdGenerator>,
    processors: Vec<Box<dyn SpanProcessor>>,
    is_shutdown: AtomicBool,
}

impl Drop for TracerInner {
    fn drop(&mut self) {
        if !self.is_shutdown.swap(true, Ordering::Relaxed) {
            for processor in &self.processors {
                let _ = processor.shutdown();
            }
        }
    }
}

/// Starts spans and hands their finished records to the reporting pipeline.
///
/// # Examples
///
/// ```
/// use wiretrace::trace::{InMemorySpanExporter, SimpleSpanProcessor, Tracer};
///
/// let exporter = InMemorySpanExporter::default();
/// let tracer = Tracer::builder()
///     .with_span_processor(SimpleSpanProcessor::new(Box::new(exporter.clone())))
///     .build();
///
/// let mut span = tracer.span_builder("lookup").start(&tracer);
/// span.end();
///
/// assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

impl Tracer {
    /// Create a [`TracerBuilder`] with the default configuration.
    pub fn builder() -> TracerBuilder {
        TracerBuilder::default()
    }

    /// Creates a [`SpanBuilder`] for the named operation.
    pub fn span_builder(&self, name: impl Into<Cow<'static, str>>) -> SpanBuilder {
        SpanBuilder::from_name(name)
    }

    /// Flush all processors, blocking until their queued spans reach the
    /// exporter or the attempt times out.
    pub fn force_flush(&self) -> TraceResult<()> {
        for processor in &self.inner.processors {
            processor.force_flush()?;
        }
        Ok(())
    }

    /// Shut down the reporting pipeline.
    ///
    /// Spans ended after shutdown are discarded.
    pub fn shutdown(&self) -> TraceResult<()> {
        if self.inner.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(crate::error::TraceError::AlreadyShutdown);
        }
        for processor in &self.inner.processors {
            processor.shutdown()?;
        }
        Ok(())
    }

    pub(crate) fn build_span(&self, builder: SpanBuilder) -> Span {
        let (trace_id, parent_id, trace_flags) = match builder.references.first() {
            Some(parent) => (parent.trace_id(), parent.span_id(), parent.trace_flags()),
            None => (
                self.inner.id_generator.new_trace_id(),
                SpanId::INVALID,
                match self.inner.sampler {
                    Sampler::AlwaysOn => TraceFlags::SAMPLED,
                    Sampler::AlwaysOff => TraceFlags::NOT_SAMPLED,
                },
            ),
        };
        let span_context = SpanContext::new(
            trace_id,
            self.inner.id_generator.new_span_id(),
            parent_id,
            trace_flags,
        );

        let start_time = builder.start_time.unwrap_or_else(SystemTime::now);
        let data = SpanData {
            span_context: span_context.clone(),
            name: builder.name,
            span_kind: builder.span_kind,
            references: builder.references,
            start_time,
            end_time: start_time,
            attributes: builder.attributes,
            status: Status::Unset,
        };

        Span::new(span_context, data, self.clone())
    }

    pub(crate) fn report(&self, span: SpanData) {
        if self.inner.is_shutdown.load(Ordering::Relaxed) {
            wiretrace_debug!(name: "Tracer.Report.AfterShutdown", span_name = span.name.as_ref());
            return;
        }
        match self.inner.processors.as_slice() {
            [] => {}
            [processor] => processor.on_end(span),
            processors => {
                for processor in processors {
                    processor.on_end(span.clone());
                }
            }
        }
    }
}

/// Configures and produces a [`Tracer`].
#[derive(Debug)]
pub struct TracerBuilder {
    sampler: Sampler,
    id_generator: Box<dyn IdGenerator>,
    processors: Vec<Box<dyn SpanProcessor>>,
}

impl Default for TracerBuilder {
    fn default() -> Self {
        TracerBuilder {
            sampler: Sampler::default(),
            id_generator: Box::new(RandomIdGenerator::default()),
            processors: Vec::new(),
        }
    }
}

impl TracerBuilder {
    /// The [`Sampler`] deciding the sampled flag of root spans.
    pub fn with_sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = sampler;
        self
    }

    /// The [`IdGenerator`] the tracer should use.
    pub fn with_id_generator<T: IdGenerator + 'static>(mut self, id_generator: T) -> Self {
        self.id_generator = Box::new(id_generator);
        self
    }

    /// Add a [`SpanProcessor`] to the reporting pipeline.
    ///
    /// Processors are invoked in registration order for every ended span.
    pub fn with_span_processor<T: SpanProcessor + 'static>(mut self, processor: T) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Create the configured [`Tracer`].
    pub fn build(self) -> Tracer {
        Tracer {
            inner: Arc::new(TracerInner {
                sampler: self.sampler,
                id_generator: self.id_generator,
                processors: self.processors,
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }
}

/// Entry for building a [`Span`].
#[derive(Clone, Debug)]
pub struct SpanBuilder {
    /// The operation name of the span under construction.
    pub name: Cow<'static, str>,
    /// The role the span plays in its exchange.
    pub span_kind: SpanKind,
    /// Parent contexts the span references, empty for root spans.
    pub references: Vec<SpanContext>,
    /// Attributes recorded at span start.
    pub attributes: Vec<KeyValue>,
    /// An explicit start time, defaults to now.
    pub start_time: Option<SystemTime>,
}

impl SpanBuilder {
    /// Create a builder with the given operation name.
    pub fn from_name(name: impl Into<Cow<'static, str>>) -> Self {
        SpanBuilder {
            name: name.into(),
            span_kind: SpanKind::Internal,
            references: Vec::new(),
            attributes: Vec::new(),
            start_time: None,
        }
    }

    /// Specify the role the span plays in its exchange.
    pub fn with_kind(mut self, span_kind: SpanKind) -> Self {
        self.span_kind = span_kind;
        self
    }

    /// Reference a parent context; the new span joins its trace and inherits
    /// its sampled flag.
    pub fn with_reference(mut self, reference: SpanContext) -> Self {
        self.references.push(reference);
        self
    }

    /// Assign attributes to the span under construction.
    pub fn with_attributes(mut self, attributes: Vec<KeyValue>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Assign an explicit start time to the span under construction.
    pub fn with_start_time(mut self, start_time: SystemTime) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Builds a span with the given tracer.
    pub fn start(self, tracer: &Tracer) -> Span {
        tracer.build_span(self)
    }
}
