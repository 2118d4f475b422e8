//! The transport-neutral inbound request.

use crate::body::Body;
use crate::errors::Status;
use crate::headers::Headers;

/// Opaque tag naming the body codec.
///
/// The dispatch core never inspects the encoding; it is a key for higher
/// layers, and the HTTP transport uses it to derive the response
/// `Content-Type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Encoding(String);

/// Well-known encoding names.
pub mod encodings {
    pub const RAW: &str = "raw";
    pub const JSON: &str = "json";
    pub const THRIFT: &str = "thrift";
    pub const PROTO: &str = "proto";
}

impl Encoding {
    /// Create an encoding tag.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The tag as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Encoding {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Encoding {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One inbound call, normalized away from its wire framing.
///
/// Immutable once handed to a handler. The deadline is not part of the
/// request; it rides on the ambient [`crate::CallContext`].
#[derive(Debug)]
pub struct Request {
    /// Identity of the calling service.
    pub caller: String,
    /// Destination service name.
    pub service: String,
    /// Tag naming the inbound transport that received the call.
    pub transport: &'static str,
    /// Opaque body codec tag.
    pub encoding: Encoding,
    /// Target procedure name.
    pub procedure: String,
    /// User headers.
    pub headers: Headers,
    /// Optional routing hint: shard key.
    pub shard_key: Option<String>,
    /// Optional routing hint: routing key.
    pub routing_key: Option<String>,
    /// Optional routing hint: routing delegate.
    pub routing_delegate: Option<String>,
    /// Read-once body stream. Ownership transfers to the handler.
    pub body: Body,
}

impl Request {
    /// Check the required identity fields.
    ///
    /// Transports call this after parsing their framing, before routing.
    pub fn validate(&self) -> Result<(), Status> {
        if self.caller.is_empty() {
            return Err(Status::invalid_argument("missing caller name"));
        }
        if self.service.is_empty() {
            return Err(Status::invalid_argument("missing service name"));
        }
        if self.procedure.is_empty() {
            return Err(Status::invalid_argument("missing procedure"));
        }
        if self.encoding.as_str().is_empty() {
            return Err(Status::invalid_argument("missing encoding"));
        }
        Ok(())
    }
}
