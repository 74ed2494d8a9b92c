//! # Wiretrace
//!
//! Span instrumentation and trace context propagation for synchronous
//! request/response exchanges.
//!
//! The crate provides three layers:
//!
//! * The [`trace`] module holds the span model: [`trace::SpanContext`]
//!   identities, [`trace::Span`] lifecycle, the explicit active-span
//!   [`trace::TraceContext`], and the reporting pipeline
//!   ([`trace::SpanProcessor`] implementations feeding a
//!   [`trace::SpanExporter`]).
//! * The [`propagation`] module carries a [`trace::SpanContext`] across the
//!   wire as protocol headers via [`propagation::HeaderPropagator`].
//! * The [`interceptor`] module wraps one exchange in an ordered list of named
//!   stages; [`interceptor::ClientTracing`] and [`interceptor::ServerTracing`]
//!   are the stages that span an outbound call and an inbound invocation.
//!
//! There is no global tracer registry: every component receives its
//! [`trace::Tracer`] and, where relevant, its parent context explicitly.
//!
//! ## Example
//!
//! ```
//! use wiretrace::interceptor::{Exchange, Pipeline, ServerTracing};
//! use wiretrace::trace::{InMemorySpanExporter, SimpleSpanProcessor, Tracer};
//!
//! let exporter = InMemorySpanExporter::default();
//! let tracer = Tracer::builder()
//!     .with_span_processor(SimpleSpanProcessor::new(Box::new(exporter.clone())))
//!     .build();
//!
//! let pipeline = Pipeline::new().with_stage(ServerTracing::new(tracer.clone()));
//! let mut exchange = Exchange::new("POST", "/catalog");
//! let result: Result<(), wiretrace::interceptor::Fault> =
//!     pipeline.execute(&mut exchange, |_exchange| Ok(()));
//!
//! assert!(result.is_ok());
//! assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![cfg_attr(test, deny(warnings))]

mod common;
pub mod error;
mod internal_logging;
pub mod interceptor;
pub mod propagation;
pub mod trace;

pub use common::{Key, KeyValue, Value};
pub use error::{TraceError, TraceResult};

#[cfg(feature = "internal-logs")]
#[doc(hidden)]
pub mod _private {
    pub use tracing::{debug, error, warn};
}
