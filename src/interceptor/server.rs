//! Server-side tracing stage.
use crate::common::KeyValue;
use crate::interceptor::{Exchange, Fault, Stage};
use crate::propagation::HeaderPropagator;
use crate::trace::{ContextGuard, Span, SpanKind, Status, TraceContext, Tracer};

/// Per-invocation state parked on the exchange between the request and
/// outcome passes.
#[derive(Debug)]
struct ServerScope {
    span: Option<Span>,
    _guard: Option<ContextGuard>,
}

/// Wraps one inbound invocation in a span.
///
/// The stage extracts the propagated context from the protocol headers and
/// starts the transport-level span named after the inbound operation
/// (`"{method} {address}"`). With a propagated parent the span references it;
/// without one (absent or malformed headers) the span is a root.
///
/// The extracted context is also attached to the exchange's [`TraceContext`]
/// for the duration of the invocation, so application-level spans started by
/// the service operation reference the same propagated identity. The span is
/// ended on completion or fault; faults propagate to the transport unchanged.
#[derive(Clone, Debug)]
pub struct ServerTracing {
    tracer: Tracer,
    propagator: HeaderPropagator,
}

impl ServerTracing {
    /// Create the stage with the default header propagator.
    pub fn new(tracer: Tracer) -> Self {
        Self::with_propagator(tracer, HeaderPropagator::new())
    }

    /// Create the stage with a custom header propagator.
    pub fn with_propagator(tracer: Tracer, propagator: HeaderPropagator) -> Self {
        ServerTracing { tracer, propagator }
    }
}

impl Stage for ServerTracing {
    fn name(&self) -> &str {
        "server-tracing"
    }

    fn on_request(&self, exchange: &mut Exchange) {
        let extracted = self.propagator.extract(exchange.headers());

        let mut builder = self
            .tracer
            .span_builder(format!("{} {}", exchange.method(), exchange.address()))
            .with_kind(SpanKind::Server)
            .with_attributes(vec![
                KeyValue::new("rpc.method", exchange.method().to_string()),
                KeyValue::new("rpc.route", exchange.address().to_string()),
            ]);
        if let Some(parent) = extracted.clone() {
            builder = builder.with_reference(parent);
        }
        let span = builder.start(&self.tracer);

        // Expose the propagated identity to the service operation.
        let trace_context = exchange.get::<TraceContext>().cloned().unwrap_or_default();
        let guard = extracted.map(|span_context| trace_context.attach(span_context));
        exchange.put(trace_context);
        exchange.put(ServerScope {
            span: Some(span),
            _guard: guard,
        });
    }

    fn on_outcome(&self, exchange: &mut Exchange, outcome: Result<(), &Fault>) {
        let Some(mut scope) = exchange.remove::<ServerScope>() else {
            return;
        };
        if let Some(span) = scope.span.as_mut() {
            if let Err(fault) = outcome {
                span.set_attribute(KeyValue::new("error", true));
                span.set_status(Status::error(fault.message().to_string()));
            }
            span.end();
        }
    }
}
