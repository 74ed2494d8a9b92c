//! Header propagation of span contexts.
use crate::propagation::{Extractor, Injector};
use crate::trace::{SpanContext, SpanId, TraceFlags, TraceId};
use crate::wiretrace_debug;

const TRACE_HEADER: &str = "x-wiretrace-id";

/// `HeaderPropagator` serializes a [`SpanContext`] to and from a single
/// protocol header.
///
/// The header value carries all four context fields as colon-separated,
/// zero-padded lower hex: `{trace_id}:{span_id}:{parent_id}:{flags}`.
/// Injecting a context and extracting it again reconstructs every field.
///
/// Extraction of an absent or malformed header yields `None`, which the
/// server side treats as "no parent": propagation problems never fail a
/// call.
#[derive(Clone, Debug)]
pub struct HeaderPropagator {
    header_name: &'static str,
}

impl Default for HeaderPropagator {
    fn default() -> Self {
        HeaderPropagator::new()
    }
}

impl HeaderPropagator {
    /// Create a propagator using the default header name.
    pub fn new() -> Self {
        Self::with_custom_header(TRACE_HEADER)
    }

    /// Create a propagator with a custom header name.
    ///
    /// Falls back to the default header name when the provided name is blank.
    /// The serialized format does not depend on the header name.
    pub fn with_custom_header(custom_header_name: &'static str) -> Self {
        let header_name = if custom_header_name.trim().is_empty() {
            TRACE_HEADER
        } else {
            custom_header_name.trim()
        };
        HeaderPropagator { header_name }
    }

    /// The header name this propagator reads and writes.
    pub fn header_name(&self) -> &'static str {
        self.header_name
    }

    /// Writes the span context into the carrier under the propagation header.
    ///
    /// Invalid contexts are not injected; no other carrier entries are
    /// touched.
    pub fn inject(&self, span_context: &SpanContext, injector: &mut dyn Injector) {
        if !span_context.is_valid() {
            return;
        }
        let header_value = format!(
            "{}:{}:{}:{:x}",
            span_context.trace_id(),
            span_context.span_id(),
            span_context.parent_id(),
            span_context.trace_flags(),
        );
        injector.set(self.header_name, header_value);
    }

    /// Reads a span context back out of the carrier.
    ///
    /// Returns `None` when the header is absent, has the wrong number of
    /// parts, fails hex parsing, or does not describe a valid context.
    pub fn extract(&self, extractor: &dyn Extractor) -> Option<SpanContext> {
        let header_value = extractor.get(self.header_name)?;

        let parts = header_value.split_terminator(':').collect::<Vec<&str>>();
        if parts.len() != 4 {
            wiretrace_debug!(
                name: "HeaderPropagator.Extract.InvalidFormat",
                header_value = header_value
            );
            return None;
        }

        match (
            Self::extract_id(parts[0]),
            Self::extract_id(parts[1]),
            Self::extract_id(parts[2]),
            Self::extract_trace_flags(parts[3]),
        ) {
            (Ok(trace_id), Ok(span_id), Ok(parent_id), Ok(trace_flags)) => {
                let span_context = SpanContext::new(
                    TraceId::from(trace_id),
                    SpanId::from(span_id),
                    SpanId::from(parent_id),
                    trace_flags,
                );
                span_context.is_valid().then_some(span_context)
            }
            _ => {
                wiretrace_debug!(
                    name: "HeaderPropagator.Extract.InvalidFormat",
                    header_value = header_value
                );
                None
            }
        }
    }

    /// Extract a 64-bit identifier from one header part.
    fn extract_id(id: &str) -> Result<u64, ()> {
        if id.len() > 16 {
            return Err(());
        }
        u64::from_str_radix(id, 16).map_err(|_| ())
    }

    /// Extract the flags from the last header part.
    ///
    /// The first bit controls whether the trace is sampled; remaining bits
    /// are carried through untouched.
    fn extract_trace_flags(flag: &str) -> Result<TraceFlags, ()> {
        if flag.len() > 2 {
            return Err(());
        }
        let flag = u8::from_str_radix(flag, 16).map_err(|_| ())?;
        Ok(TraceFlags::new(flag))
    }
}
