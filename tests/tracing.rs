//! End-to-end scenarios for the client/server tracing stages.
//!
//! A loopback dispatcher stands in for the transport: the client pipeline's
//! headers travel verbatim into a server pipeline wrapping a small catalog
//! service. Both sides report into one shared in-memory recorder, so the
//! record order is the completion order across the whole call.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use wiretrace::interceptor::{
    ClientTracing, Dispatcher, Exchange, Fault, Pipeline, ServerTracing, WireLogging,
};
use wiretrace::propagation::HeaderPropagator;
use wiretrace::trace::{
    BatchConfigBuilder, BatchSpanProcessor, InMemorySpanExporter, SimpleSpanProcessor,
    SpanContext, SpanData, SpanId, TraceContext, TraceFlags, TraceId, Tracer,
};

const ENDPOINT: &str = "http://localhost:9000/catalog";
const ROUTE: &str = "/catalog";

/// The in-process stand-in for the remote service.
struct CatalogServer {
    pipeline: Pipeline,
    tracer: Tracer,
}

impl CatalogServer {
    fn new(exporter: InMemorySpanExporter) -> Arc<Self> {
        let tracer = Tracer::builder()
            .with_span_processor(SimpleSpanProcessor::new(Box::new(exporter)))
            .build();
        let pipeline = Pipeline::new()
            .with_stage(WireLogging::new())
            .with_stage(ServerTracing::new(tracer.clone()));
        Arc::new(CatalogServer { pipeline, tracer })
    }

    fn serve(&self, exchange: &mut Exchange, operation: &str) -> Result<Vec<String>, Fault> {
        let tracer = self.tracer.clone();
        self.pipeline.execute(exchange, |exchange| match operation {
            "list" => {
                // application-level span around the actual lookup
                let trace_context = exchange
                    .get::<TraceContext>()
                    .cloned()
                    .unwrap_or_default();
                let mut builder = tracer.span_builder("Fetch Catalog");
                if let Some(parent) = trace_context.active() {
                    builder = builder.with_reference(parent);
                }
                let mut span = builder.start(&tracer);
                let items = vec!["hardcover".to_string(), "paperback".to_string()];
                span.end();
                Ok(items)
            }
            _ => Err(Fault::application("catalog is read-only")),
        })
    }
}

/// Routes client exchanges straight into the server pipeline.
struct Loopback {
    server: Arc<CatalogServer>,
    operation: &'static str,
}

impl Dispatcher for Loopback {
    type Response = Vec<String>;

    fn invoke(&self, exchange: &mut Exchange) -> Result<Self::Response, Fault> {
        let mut inbound = Exchange::new("POST", ROUTE);
        *inbound.headers_mut() = exchange.headers().clone();
        self.server.serve(&mut inbound, self.operation)
    }
}

struct Harness {
    exporter: InMemorySpanExporter,
    server: Arc<CatalogServer>,
}

impl Harness {
    fn new() -> Self {
        let exporter = InMemorySpanExporter::default();
        let server = CatalogServer::new(exporter.clone());
        Harness { exporter, server }
    }

    /// A caller-side tracer reporting through the background batch reporter.
    fn caller_tracer(&self, flush_interval: Duration) -> Tracer {
        Tracer::builder()
            .with_span_processor(
                BatchSpanProcessor::builder(self.exporter.clone())
                    .with_batch_config(
                        BatchConfigBuilder::default()
                            .with_scheduled_delay(flush_interval)
                            .build(),
                    )
                    .build(),
            )
            .build()
    }

    fn call(
        &self,
        client_pipeline: &Pipeline,
        operation: &'static str,
        seed_headers: Option<HashMap<String, Vec<String>>>,
        trace_context: Option<TraceContext>,
    ) -> Result<Vec<String>, Fault> {
        let mut exchange = Exchange::new("POST", ENDPOINT);
        if let Some(headers) = seed_headers {
            *exchange.headers_mut() = headers;
        }
        if let Some(trace_context) = trace_context {
            exchange.put(trace_context);
        }
        let dispatcher = Loopback {
            server: self.server.clone(),
            operation,
        };
        client_pipeline.call(&mut exchange, &dispatcher)
    }

    fn spans(&self) -> Vec<SpanData> {
        self.exporter.get_finished_spans().expect("recorder lock")
    }

    /// Poll the recorder until `count` spans are visible or the timeout
    /// elapses; caller-managed spans arrive on the reporter's schedule.
    fn await_spans(&self, count: usize, timeout: Duration) -> Vec<SpanData> {
        let deadline = Instant::now() + timeout;
        loop {
            let spans = self.spans();
            if spans.len() >= count || Instant::now() >= deadline {
                return spans;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

fn plain_pipeline() -> Pipeline {
    Pipeline::new().with_stage(WireLogging::new())
}

#[test]
fn new_spans_are_created_when_no_context_is_provided() {
    let harness = Harness::new();

    let items = harness
        .call(&plain_pipeline(), "list", None, None)
        .expect("call succeeds");
    assert_eq!(items.len(), 2);

    let spans = harness.spans();
    assert_eq!(spans.len(), 2);
    assert_eq!(spans[0].name, "Fetch Catalog");
    assert!(spans[0].references.is_empty());
    assert_eq!(spans[1].name, "POST /catalog");
    assert!(spans[1].references.is_empty());
}

#[test]
fn seeded_headers_without_a_client_stage_do_not_change_the_span_shape() {
    let harness = Harness::new();

    // a synthetic context injected by the caller, not by a client stage
    let synthetic = SpanContext::new(
        TraceId::from(0x517e_d00d_1234_5678),
        SpanId::from(0x9abc_def0_1111_2222),
        SpanId::from(0x3333_4444_5555_6666),
        TraceFlags::SAMPLED,
    );
    let mut headers = HashMap::new();
    HeaderPropagator::new().inject(&synthetic, &mut headers);

    let items = harness
        .call(&plain_pipeline(), "list", Some(headers), None)
        .expect("call succeeds");
    assert_eq!(items.len(), 2);

    // same count, names and order as the no-context call
    let spans = harness.spans();
    assert_eq!(spans.len(), 2);
    assert_eq!(spans[0].name, "Fetch Catalog");
    assert_eq!(spans[1].name, "POST /catalog");
}

#[test]
fn child_spans_are_created_when_a_client_stage_participates() {
    let harness = Harness::new();
    let caller_tracer = harness.caller_tracer(Duration::from_millis(100));
    let pipeline = plain_pipeline().with_stage(ClientTracing::new(caller_tracer.clone()));

    let items = harness
        .call(&pipeline, "list", None, None)
        .expect("call succeeds");
    assert_eq!(items.len(), 2);

    let spans = harness.await_spans(3, Duration::from_secs(2));
    assert_eq!(spans.len(), 3);
    assert_eq!(spans[0].name, "Fetch Catalog");
    assert!(!spans[0].references.is_empty());
    assert_eq!(spans[1].name, "POST /catalog");
    assert!(!spans[1].references.is_empty());
    assert_eq!(spans[2].name, "POST http://localhost:9000/catalog");

    // both server-side spans reference the client's injected identity
    let client_context = &spans[2].span_context;
    assert_eq!(spans[0].references[0].span_id(), client_context.span_id());
    assert_eq!(spans[1].references[0].span_id(), client_context.span_id());
    assert_eq!(spans[0].span_context.trace_id(), client_context.trace_id());
}

#[test]
fn a_provided_active_span_is_not_closed_by_the_call() {
    let harness = Harness::new();
    let caller_tracer = harness.caller_tracer(Duration::from_millis(250));
    let pipeline = plain_pipeline().with_stage(ClientTracing::new(caller_tracer.clone()));

    let trace_context = TraceContext::new();
    let mut caller_span = caller_tracer.span_builder("checkout session").start(&caller_tracer);
    let scope = trace_context.attach(caller_span.span_context().clone());

    let items = harness
        .call(&pipeline, "list", None, Some(trace_context.clone()))
        .expect("call succeeds");
    assert_eq!(items.len(), 2);

    // the caller's span is still open and active, and only the two
    // server-side records exist
    assert!(caller_span.is_recording());
    assert!(trace_context.active().is_some());
    let spans = harness.spans();
    assert_eq!(spans.len(), 2);
    assert_eq!(spans[0].name, "Fetch Catalog");
    assert_eq!(
        spans[0].references,
        vec![caller_span.span_context().clone()]
    );
    assert_eq!(spans[1].name, "POST /catalog");

    // closing the scope and span makes the third record appear within the
    // reporter's flush interval
    drop(scope);
    caller_span.end();

    let spans = harness.await_spans(3, Duration::from_secs(1));
    assert_eq!(spans.len(), 3);
    assert_eq!(spans[2].name, "checkout session");
}

#[test]
fn a_fault_still_produces_the_transport_span() {
    let harness = Harness::new();

    let fault = harness
        .call(&plain_pipeline(), "clear", None, None)
        .expect_err("fault expected");
    assert_eq!(fault, Fault::application("catalog is read-only"));

    let spans = harness.spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, "POST /catalog");
    assert!(spans[0].status.is_error());
}

#[test]
fn a_fault_with_a_client_stage_produces_both_spans() {
    let harness = Harness::new();
    let caller_tracer = harness.caller_tracer(Duration::from_millis(100));
    let pipeline = plain_pipeline().with_stage(ClientTracing::new(caller_tracer));

    let fault = harness
        .call(&pipeline, "clear", None, None)
        .expect_err("fault expected");
    assert_eq!(fault, Fault::application("catalog is read-only"));

    let spans = harness.await_spans(2, Duration::from_secs(2));
    assert_eq!(spans.len(), 2);
    assert_eq!(spans[0].name, "POST /catalog");
    assert!(spans[0].status.is_error());
    assert_eq!(spans[1].name, "POST http://localhost:9000/catalog");
    assert!(spans[1].status.is_error());
}

#[test]
fn concurrent_calls_keep_per_call_completion_order() {
    let harness = Harness::new();
    let pipeline = Arc::new(
        plain_pipeline().with_stage(ClientTracing::new(
            harness.caller_tracer(Duration::from_millis(50)),
        )),
    );

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let server = harness.server.clone();
            let pipeline = pipeline.clone();
            std::thread::spawn(move || {
                let mut exchange = Exchange::new("POST", ENDPOINT);
                let dispatcher = Loopback {
                    server,
                    operation: "list",
                };
                pipeline.call(&mut exchange, &dispatcher)
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().expect("thread").is_ok());
    }

    let spans = harness.await_spans(12, Duration::from_secs(3));
    assert_eq!(spans.len(), 12);

    // propagation ties each call's three spans to one trace; within every
    // trace the records appear in completion order
    for client in spans
        .iter()
        .filter(|span| span.name == "POST http://localhost:9000/catalog")
    {
        let trace_id = client.span_context.trace_id();
        let position_of = |name: &str| {
            spans
                .iter()
                .position(|span| span.span_context.trace_id() == trace_id && span.name == name)
                .expect("span present")
        };
        assert!(position_of("Fetch Catalog") < position_of("POST /catalog"));
        assert!(
            position_of("POST /catalog")
                < position_of("POST http://localhost:9000/catalog")
        );
    }
}
