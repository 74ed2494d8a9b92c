//! Execution-scoped active-span state, passed explicitly.
//!
//! A [`TraceContext`] is the explicit replacement for a process-global
//! "current span": every call site that wants an active span receives a
//! handle as a parameter instead of reading ambient state. Activating a
//! context is distinct from starting or ending a span: releasing a scope
//! restores whatever was active before without finishing anything.
use crate::trace::{SpanContext, SpanId};
use std::sync::{Arc, Mutex};

/// A cloneable handle to the stack of active [`SpanContext`]s for one logical
/// thread of control.
///
/// Clones share the same stack, so a context handed to a pipeline stage sees
/// activations made by the caller and vice versa.
///
/// # Examples
///
/// ```
/// use wiretrace::trace::{SpanContext, SpanId, TraceContext, TraceFlags, TraceId};
///
/// let context = TraceContext::new();
/// assert!(context.active().is_none());
///
/// let span_context = SpanContext::new(
///     TraceId::from(1),
///     SpanId::from(2),
///     SpanId::INVALID,
///     TraceFlags::SAMPLED,
/// );
///
/// {
///     let _guard = context.attach(span_context.clone());
///     assert_eq!(context.active(), Some(span_context));
/// }
///
/// // Restored once the guard is dropped
/// assert!(context.active().is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct TraceContext {
    stack: Arc<Mutex<Vec<SpanContext>>>,
}

impl TraceContext {
    /// Creates an empty `TraceContext`.
    pub fn new() -> Self {
        TraceContext::default()
    }

    /// Returns the currently active span context, if any.
    pub fn active(&self) -> Option<SpanContext> {
        self.stack
            .lock()
            .ok()
            .and_then(|stack| stack.last().cloned())
    }

    /// Makes the given span context the active one until the returned guard
    /// is dropped.
    ///
    /// Dropping the guard restores the previously active context. The span
    /// behind the context is not ended; activation and span lifecycle are
    /// independent.
    pub fn attach(&self, span_context: SpanContext) -> ContextGuard {
        let span_id = span_context.span_id();
        if let Ok(mut stack) = self.stack.lock() {
            stack.push(span_context);
        }
        ContextGuard {
            stack: Arc::clone(&self.stack),
            span_id,
        }
    }
}

/// A guard that restores the previously active span context on drop.
#[derive(Debug)]
pub struct ContextGuard {
    stack: Arc<Mutex<Vec<SpanContext>>>,
    span_id: SpanId,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Ok(mut stack) = self.stack.lock() {
            // tolerate out-of-order guard drops by removing the matching entry
            if let Some(position) = stack
                .iter()
                .rposition(|span_context| span_context.span_id() == self.span_id)
            {
                stack.remove(position);
            }
        }
    }
}
