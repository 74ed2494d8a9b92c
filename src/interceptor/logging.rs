//! Wire logging stage.
use crate::interceptor::{Exchange, Fault, Stage};
use crate::{wiretrace_debug, wiretrace_warn};

/// Logs each exchange through the internal logging macros.
///
/// Typically installed alongside the tracing stages on both the client and
/// the server pipeline. Observation only: the stage stores no per-call
/// state and never touches headers or outcome.
#[derive(Clone, Copy, Debug, Default)]
pub struct WireLogging {
    _private: (),
}

impl WireLogging {
    /// Create the stage.
    pub fn new() -> Self {
        WireLogging::default()
    }
}

impl Stage for WireLogging {
    fn name(&self) -> &str {
        "wire-logging"
    }

    fn on_request(&self, exchange: &mut Exchange) {
        wiretrace_debug!(
            name: "Wire.Request",
            method = exchange.method(),
            address = exchange.address()
        );
    }

    fn on_outcome(&self, exchange: &mut Exchange, outcome: Result<(), &Fault>) {
        match outcome {
            Ok(()) => {
                wiretrace_debug!(
                    name: "Wire.Response",
                    method = exchange.method(),
                    address = exchange.address()
                );
            }
            Err(fault) => {
                wiretrace_warn!(
                    name: "Wire.Fault",
                    method = exchange.method(),
                    address = exchange.address(),
                    fault = fault.message()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::Pipeline;

    #[test]
    fn observation_only() {
        let pipeline = Pipeline::new().with_stage(WireLogging::new());
        let mut exchange = Exchange::new("POST", "/catalog");

        let ok: Result<u8, Fault> = pipeline.execute(&mut exchange, |_| Ok(1));
        assert_eq!(ok, Ok(1));

        let fault = Fault::transport("unreachable");
        let err: Result<u8, Fault> = pipeline.execute(&mut exchange, |_| Err(fault.clone()));
        assert_eq!(err, Err(fault));
        assert!(exchange.headers().is_empty());
    }
}
