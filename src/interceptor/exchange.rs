//! The per-call exchange model.
use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Where a [`Fault`] originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultKind {
    /// Raised by the invoked service operation.
    Application,
    /// Raised by the transport while moving the message.
    Transport,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::Application => f.write_str("application"),
            FaultKind::Transport => f.write_str("transport"),
        }
    }
}

/// The failed outcome of an exchange.
///
/// Faults pass through pipeline stages untouched: the tracing stages observe
/// them to mark spans, then the same fault reaches the caller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct Fault {
    kind: FaultKind,
    message: String,
}

impl Fault {
    /// A fault raised by the invoked service operation.
    pub fn application(message: impl Into<String>) -> Self {
        Fault {
            kind: FaultKind::Application,
            message: message.into(),
        }
    }

    /// A fault raised by the transport layer.
    pub fn transport(message: impl Into<String>) -> Self {
        Fault {
            kind: FaultKind::Transport,
            message: message.into(),
        }
    }

    /// Where the fault originated.
    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    /// The fault message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// One request/response exchange moving through a [`Pipeline`].
///
/// Carries the operation identity (method and address), the protocol headers
/// used as the propagation carrier, and a typed property map where stages
/// park per-call state between the request and outcome passes.
///
/// [`Pipeline`]: crate::interceptor::Pipeline
pub struct Exchange {
    method: Cow<'static, str>,
    address: String,
    headers: HashMap<String, Vec<String>>,
    properties: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl Exchange {
    /// Create an exchange for the given method and target address.
    ///
    /// On the client side the address is the full endpoint; on the server
    /// side it is the request path.
    pub fn new(method: impl Into<Cow<'static, str>>, address: impl Into<String>) -> Self {
        Exchange {
            method: method.into(),
            address: address.into(),
            headers: HashMap::new(),
            properties: HashMap::new(),
        }
    }

    /// The transport method of the exchange, e.g. `POST`.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The target address of the exchange.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The protocol headers travelling with the exchange.
    pub fn headers(&self) -> &HashMap<String, Vec<String>> {
        &self.headers
    }

    /// Mutable access to the protocol headers.
    pub fn headers_mut(&mut self) -> &mut HashMap<String, Vec<String>> {
        &mut self.headers
    }

    /// Store a typed property on the exchange, replacing any previous value
    /// of the same type.
    pub fn put<T: Any + Send>(&mut self, value: T) {
        self.properties.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Borrow a typed property previously stored with [`Exchange::put`].
    pub fn get<T: Any + Send>(&self) -> Option<&T> {
        self.properties
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref())
    }

    /// Remove and return a typed property.
    pub fn remove<T: Any + Send>(&mut self) -> Option<T> {
        self.properties
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast().ok())
            .map(|value| *value)
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("method", &self.method)
            .field("address", &self.address)
            .field("headers", &self.headers)
            .field("properties", &self.properties.len())
            .finish()
    }
}
