//! Client-side tracing stage.
use crate::common::KeyValue;
use crate::interceptor::{Exchange, Fault, Stage};
use crate::propagation::HeaderPropagator;
use crate::trace::{ContextGuard, Span, SpanKind, Status, TraceContext, Tracer};

/// Per-call state parked on the exchange between the request and outcome
/// passes.
///
/// `span` is `Some` only when this stage started the span itself; a span the
/// caller activated stays externally owned and is never ended here. The
/// activation guard is released on every exit path when the scope is dropped.
#[derive(Debug)]
struct ClientScope {
    span: Option<Span>,
    _guard: Option<ContextGuard>,
}

/// Wraps one outbound call in a span.
///
/// With no active span in the exchange's [`TraceContext`], the stage starts a
/// fresh root span named after the outbound operation
/// (`"{method} {address}"`), injects its context into the protocol headers
/// and ends it once the dispatcher reports an outcome, recording the fault
/// first when there is one.
///
/// When the caller already holds an active span, the stage continues it
/// instead: the active context is injected so the remote side can reference
/// it, but start/finish stay with the caller. The stage never ends a span it
/// did not start, on any exit path.
#[derive(Clone, Debug)]
pub struct ClientTracing {
    tracer: Tracer,
    propagator: HeaderPropagator,
}

impl ClientTracing {
    /// Create the stage with the default header propagator.
    pub fn new(tracer: Tracer) -> Self {
        Self::with_propagator(tracer, HeaderPropagator::new())
    }

    /// Create the stage with a custom header propagator.
    pub fn with_propagator(tracer: Tracer, propagator: HeaderPropagator) -> Self {
        ClientTracing { tracer, propagator }
    }
}

impl Stage for ClientTracing {
    fn name(&self) -> &str {
        "client-tracing"
    }

    fn on_request(&self, exchange: &mut Exchange) {
        let trace_context = exchange.get::<TraceContext>().cloned();
        let active = trace_context.as_ref().and_then(TraceContext::active);

        let scope = match active {
            Some(span_context) => {
                // Continue the caller's span: propagate its identity, own nothing.
                self.propagator.inject(&span_context, exchange.headers_mut());
                ClientScope {
                    span: None,
                    _guard: None,
                }
            }
            None => {
                let span = self
                    .tracer
                    .span_builder(format!("{} {}", exchange.method(), exchange.address()))
                    .with_kind(SpanKind::Client)
                    .with_attributes(vec![
                        KeyValue::new("rpc.method", exchange.method().to_string()),
                        KeyValue::new("rpc.target", exchange.address().to_string()),
                    ])
                    .start(&self.tracer);
                self.propagator
                    .inject(span.span_context(), exchange.headers_mut());
                let guard =
                    trace_context.map(|context| context.attach(span.span_context().clone()));
                ClientScope {
                    span: Some(span),
                    _guard: guard,
                }
            }
        };
        exchange.put(scope);
    }

    fn on_outcome(&self, exchange: &mut Exchange, outcome: Result<(), &Fault>) {
        let Some(mut scope) = exchange.remove::<ClientScope>() else {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::Pipeline;
    use crate::propagation::Extractor;
    use crate::trace::{InMemorySpanExporter, SimpleSpanProcessor};

    fn recording_tracer() -> (Tracer, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let tracer = Tracer::builder()
            .with_span_processor(SimpleSpanProcessor::new(Box::new(exporter.clone())))
            .build();
        (tracer, exporter)
    }

    #[test]
    fn starts_and_ends_a_root_span() {
        let (tracer, exporter) = recording_tracer();
        let pipeline = Pipeline::new().with_stage(ClientTracing::new(tracer));

        let mut exchange = Exchange::new("POST", "http://localhost:9000/catalog");
        let result: Result<(), Fault> = pipeline.execute(&mut exchange, |exchange| {
            // the new span's identity is already on the wire
            assert!(Extractor::get(exchange.headers(), "x-wiretrace-id").is_some());
            Ok(())
        });
        assert!(result.is_ok());

        let finished = exporter.get_finished_spans().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].name, "POST http://localhost:9000/catalog");
        assert_eq!(finished[0].span_kind, SpanKind::Client);
        assert!(finished[0].references.is_empty());
        assert!(!finished[0].status.is_error());
    }

    #[test]
    fn records_the_fault_and_reraises_it() {
        let (tracer, exporter) = recording_tracer();
        let pipeline = Pipeline::new().with_stage(ClientTracing::new(tracer));

        let mut exchange = Exchange::new("POST", "http://localhost:9000/catalog");
        let result: Result<(), Fault> =
            pipeline.execute(&mut exchange, |_| Err(Fault::transport("connection reset")));
        assert_eq!(result, Err(Fault::transport("connection reset")));

        let finished = exporter.get_finished_spans().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].status, Status::error("connection reset"));
    }

    #[test]
    fn active_span_is_continued_not_ended() {
        let (tracer, exporter) = recording_tracer();
        let pipeline = Pipeline::new().with_stage(ClientTracing::new(tracer.clone()));

        let caller_span = tracer.span_builder("caller scope").start(&tracer);
        let trace_context = TraceContext::new();
        let _scope = trace_context.attach(caller_span.span_context().clone());

        let mut exchange = Exchange::new("POST", "http://localhost:9000/catalog");
        exchange.put(trace_context.clone());

        let mut injected = None;
        let result: Result<(), Fault> = pipeline.execute(&mut exchange, |exchange| {
            injected = Extractor::get(exchange.headers(), "x-wiretrace-id").map(str::to_string);
            Ok(())
        });
        assert!(result.is_ok());

        // the caller's own identity went over the wire
        let propagator = HeaderPropagator::new();
        let mut carrier: std::collections::HashMap<String, Vec<String>> = Default::default();
        propagator.inject(caller_span.span_context(), &mut carrier);
        assert_eq!(
            injected,
            Extractor::get(&carrier, "x-wiretrace-id").map(str::to_string)
        );

        // no span was started or ended by the stage
        assert!(exporter.get_finished_spans().unwrap().is_empty());
        assert!(caller_span.is_recording());

        // the caller's scope is still active after the call
        assert_eq!(
            trace_context.active().as_ref(),
            Some(caller_span.span_context())
        );
    }

    #[test]
    fn fresh_span_is_activated_for_nested_callers() {
        let (tracer, exporter) = recording_tracer();
        let stage = ClientTracing::new(tracer);
        let trace_context = TraceContext::new();

        let mut exchange = Exchange::new("POST", "http://localhost:9000/catalog");
        exchange.put(trace_context.clone());

        stage.on_request(&mut exchange);
        let active = trace_context.active().expect("stage span active");
        assert!(active.is_valid());

        stage.on_outcome(&mut exchange, Ok(()));
        assert!(trace_context.active().is_none());

        let finished = exporter.get_finished_spans().unwrap();
        assert_eq!(finished[0].span_context, active);
    }
}
