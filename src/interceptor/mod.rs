//! # Interceptor layer
//!
//! A call moves through a [`Pipeline`]: a small ordered list of named
//! [`Stage`]s wrapped around an opaque dispatch function. Every stage sees
//! the [`Exchange`] before dispatch (`on_request`, in order) and after the
//! outcome is known (`on_outcome`, in reverse order), so stages unwind like
//! an interceptor chain on both the success and the fault path.
//!
//! The tracing stages, [`ClientTracing`] for outbound calls and
//! [`ServerTracing`] for inbound invocations, are ordinary stages and know
//! nothing about the transport beyond the exchange's headers and the
//! success/fault outcome. [`WireLogging`] is a second stage demonstrating
//! that the pipeline composes concerns beyond tracing.
//!
//! Faults are never translated, wrapped, or suppressed here: the value the
//! dispatch function returns is the value the caller sees.
mod client;
mod exchange;
mod logging;
mod server;

pub use client::ClientTracing;
pub use exchange::{Exchange, Fault, FaultKind};
pub use logging::WireLogging;
pub use server::ServerTracing;

use std::fmt;
use std::sync::Arc;

/// One named processing stage in a [`Pipeline`].
pub trait Stage: Send + Sync + fmt::Debug {
    /// The stage name, used for diagnostics.
    fn name(&self) -> &str;

    /// Runs before the exchange is handed to the next layer.
    fn on_request(&self, exchange: &mut Exchange);

    /// Runs after the exchange produced an outcome, successful or faulted.
    ///
    /// Stages observe the outcome; they cannot change it.
    fn on_outcome(&self, exchange: &mut Exchange, outcome: Result<(), &Fault>);
}

/// Performs the actual request/response exchange on behalf of a client
/// pipeline.
///
/// The dispatcher is opaque to the tracing stages: it receives the exchange
/// (headers included) and produces a response or a [`Fault`]. Cancellation
/// and timeouts are the dispatcher's business; the surrounding stages still
/// see a fault outcome and finish their spans.
pub trait Dispatcher {
    /// The response payload produced by a successful exchange.
    type Response;

    /// Perform the exchange.
    fn invoke(&self, exchange: &mut Exchange) -> Result<Self::Response, Fault>;
}

/// A small ordered list of named [`Stage`]s around an opaque dispatch
/// boundary.
///
/// The same type serves both directions: a client pipeline dispatches into a
/// [`Dispatcher`], a server pipeline dispatches into the invoked service
/// operation.
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Pipeline::default()
    }

    /// Append a stage to the pipeline.
    ///
    /// Stages run in insertion order before dispatch and in reverse order
    /// after the outcome.
    pub fn with_stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// The names of the stages, in request order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run the exchange through every stage around the given dispatch
    /// function.
    ///
    /// The dispatch result is returned unchanged; a fault raised inside
    /// dispatch still unwinds through every entered stage's `on_outcome`.
    pub fn execute<T>(
        &self,
        exchange: &mut Exchange,
        dispatch: impl FnOnce(&mut Exchange) -> Result<T, Fault>,
    ) -> Result<T, Fault> {
        for stage in &self.stages {
            stage.on_request(exchange);
        }

        let outcome = dispatch(exchange);

        let observed = match &outcome {
            Ok(_) => Ok(()),
            Err(fault) => Err(fault),
        };
        for stage in self.stages.iter().rev() {
            stage.on_outcome(exchange, observed);
        }

        outcome
    }

    /// Run the exchange through every stage around a [`Dispatcher`].
    pub fn call<D: Dispatcher>(
        &self,
        exchange: &mut Exchange,
        dispatcher: &D,
    ) -> Result<D::Response, Fault> {
        self.execute(exchange, |exchange| dispatcher.invoke(exchange))
    }
}
