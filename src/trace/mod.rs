//! # Trace layer
//!
//! The span model and reporting pipeline:
//!
//! * The [`Tracer`] struct which starts spans and owns the pipeline.
//! * The [`Span`] struct which is a mutable object storing information about
//!   the current operation execution, ended exactly once.
//! * The [`TraceContext`] handle which makes the active span explicit instead
//!   of ambient.
//! * The [`SpanProcessor`] implementations which deliver finished spans to a
//!   [`SpanExporter`], either synchronously or on a background schedule.
mod context;
mod export;
mod id_generator;
mod in_memory_exporter;
mod span;
mod span_context;
mod span_processor;
mod tracer;

pub use context::{ContextGuard, TraceContext};
pub use export::{ExportResult, SpanExporter};
pub use id_generator::{IdGenerator, IncrementIdGenerator, RandomIdGenerator};
pub use in_memory_exporter::{InMemorySpanExporter, InMemorySpanExporterBuilder};
pub use span::{Span, SpanData, SpanKind, Status};
pub use span_context::{SpanContext, SpanId, TraceFlags, TraceId};
pub use span_processor::{
    BatchConfig, BatchConfigBuilder, BatchSpanProcessor, BatchSpanProcessorBuilder,
    SimpleSpanProcessor, SpanProcessor,
};
pub use tracer::{Sampler, SpanBuilder, Tracer, TracerBuilder};
