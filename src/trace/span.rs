//! # Span
//!
//! `Span`s represent a single operation within a trace. A span is started by
//! the interceptor (or application code) that wraps the operation, may collect
//! attributes while open, and is ended exactly once, on normal completion or
//! on a propagated fault. At that point its [`SpanData`] becomes immutable
//! and is handed to the reporting pipeline.
use crate::common::KeyValue;
use crate::trace::{SpanContext, Tracer};
use std::borrow::Cow;
use std::time::SystemTime;

/// The role a span plays in an exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpanKind {
    /// The span wraps an outbound call.
    Client,
    /// The span wraps an inbound invocation.
    Server,
    /// The span wraps work local to the process.
    Internal,
}

/// The status of a finished [`Span`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Status {
    /// The default status.
    #[default]
    Unset,

    /// The operation completed successfully.
    Ok,

    /// The operation ended with a fault.
    Error {
        /// The description of the fault.
        description: Cow<'static, str>,
    },
}

impl Status {
    /// Create a new error status with the given description.
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }

    /// Returns `true` if the span ended with a fault.
    pub fn is_error(&self) -> bool {
        matches!(self, Status::Error { .. })
    }
}

/// Finished-span record handed to processors and exporters.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanData {
    /// Exportable `SpanContext`.
    pub span_context: SpanContext,
    /// The operation name.
    pub name: Cow<'static, str>,
    /// The role the span played in its exchange.
    pub span_kind: SpanKind,
    /// Propagated parent contexts, empty for root spans.
    pub references: Vec<SpanContext>,
    /// Span start time.
    pub start_time: SystemTime,
    /// Span end time.
    pub end_time: SystemTime,
    /// Span attributes.
    pub attributes: Vec<KeyValue>,
    /// Span status.
    pub status: Status,
}

/// Single operation within a trace.
///
/// The component that started a span owns it until [`Span::end`] runs; a span
/// that is merely *activated* in a scope is never ended by that scope. An
/// unended span reports itself on drop so no exit path leaks a record.
#[derive(Debug)]
pub struct Span {
    span_context: SpanContext,
    data: Option<SpanData>,
    tracer: Tracer,
}

impl Span {
    pub(crate) fn new(span_context: SpanContext, data: SpanData, tracer: Tracer) -> Self {
        Span {
            span_context,
            data: Some(data),
            tracer,
        }
    }

    /// Returns the [`SpanContext`] for the given `Span`.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// Returns `true` if this span has not been ended yet.
    pub fn is_recording(&self) -> bool {
        self.data.is_some()
    }

    /// Sets a single attribute on the span.
    ///
    /// Ignored after the span has ended.
    pub fn set_attribute(&mut self, attribute: KeyValue) {
        if let Some(data) = self.data.as_mut() {
            data.attributes.push(attribute);
        }
    }

    /// Sets the status of this span.
    ///
    /// Ignored after the span has ended.
    pub fn set_status(&mut self, status: Status) {
        if let Some(data) = self.data.as_mut() {
            data.status = status;
        }
    }

    /// Ends the span with the current time.
    pub fn end(&mut self) {
        self.ensure_ended_and_exported(None);
    }

    /// Ends the span with the given timestamp.
    pub fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        self.ensure_ended_and_exported(Some(timestamp));
    }

    fn ensure_ended_and_exported(&mut self, timestamp: Option<SystemTime>) {
        // Take data, skip if it has already been exported
        let mut data = match self.data.take() {
            Some(data) => data,
            None => return, // Already ended
        };

        // ensure end time is set via explicit end or implicitly on drop
        if let Some(timestamp) = timestamp {
            data.end_time = timestamp;
        } else if data.end_time == data.start_time {
            data.end_time = SystemTime::now();
        }

        self.tracer.report(data);
    }
}

impl Drop for Span {
    /// Report span on drop
    fn drop(&mut self) {
        self.ensure_ended_and_exported(None);
    }
}
