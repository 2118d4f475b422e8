//! Transport-neutral error taxonomy.
//!
//! Handlers and the dispatch pipeline report failures as a [`Status`]: a
//! [`Code`] plus a human-readable message. Each transport maps the code onto
//! its native error signal (HTTP status line, system-error frame).

use std::fmt;

/// Transport-neutral failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// Missing or malformed required call metadata (caller, service,
    /// procedure, TTL).
    InvalidArgument,
    /// No handler is registered for the requested (service, procedure).
    Unimplemented,
    /// The deadline passed before the handler returned.
    DeadlineExceeded,
    /// Handler panic or otherwise unclassified failure.
    Unknown,
    /// Framework invariant violation, e.g. adding headers after the body
    /// started.
    Internal,
    /// The transport layer refused the call or the connection broke mid-call.
    Unavailable,
}

impl Code {
    /// Stable lower-case name of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            Code::InvalidArgument => "invalid-argument",
            Code::Unimplemented => "unimplemented",
            Code::DeadlineExceeded => "deadline-exceeded",
            Code::Unknown => "unknown",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified error carried through the dispatch pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    /// Create a status from a code and message.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Missing or malformed required metadata.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// No handler registered for the target procedure.
    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    /// The call's deadline expired.
    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    /// Unclassified failure, including handler panics.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Code::Unknown, message)
    }

    /// Framework invariant violation.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    /// Transport refused the call or broke mid-call.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    /// The failure classification.
    pub fn code(&self) -> Code {
        self.code
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Status {}

/// Format an error message scoped to the call that produced it.
///
/// This is the canonical text peers see on the wire:
/// `error for service "svc" and procedure "proc": <message>`.
pub fn request_error_message(service: &str, procedure: &str, message: &str) -> String {
    format!("error for service {service:?} and procedure {procedure:?}: {message}")
}

/// Render a panic payload into something printable.
///
/// Used by the dispatcher panic barrier to turn a handler fault into an
/// `Unknown` status message.
pub fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_owned()
    }
}
