//! Handler and response-writer contracts shared by every transport.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::CallContext;
use crate::errors::Status;
use crate::headers::Headers;
use crate::request::Request;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handler-facing view of the in-flight response.
///
/// Headers may be added any number of times before the first body write;
/// the first write freezes them. Implementations keep the first I/O failure
/// sticky: once a call fails, every subsequent call returns the stored error
/// without retrying.
pub trait ResponseWriter: Send {
    /// Merge headers into the pending response headers.
    ///
    /// Calling this after the first body write is a programmer error; the
    /// writer refuses with [`crate::Code::Internal`] and the response still
    /// completes with the already-frozen headers.
    fn add_headers(&mut self, headers: Headers) -> Result<(), Status>;

    /// Append body bytes, flushing pending headers first.
    fn write<'a>(&'a mut self, body: &'a [u8]) -> BoxFuture<'a, Result<(), Status>>;
}

/// User code implementing a single unary procedure.
///
/// Handlers must be reentrant: one registered handler may be invoked from
/// many tasks at once. The request (body included) is owned by the handler
/// for the duration of the call; the writer borrow ends when the returned
/// future completes, so nothing can be retained past return.
pub trait UnaryHandler: Send + Sync {
    /// Handle one call.
    ///
    /// Returning `Ok(())` with no writes is legal (empty body). On `Err` the
    /// body may have been partially written; the transport decides how the
    /// error reaches the wire. `ctx.done()` should be treated as a prompt
    /// stop signal.
    fn handle<'a>(
        &'a self,
        ctx: &'a CallContext,
        request: Request,
        response: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, Result<(), Status>>;
}

/// A registered, typed handler reference.
///
/// Unary is the only variant in this core; the enum leaves room for other
/// call shapes without changing the router.
#[derive(Clone)]
pub enum HandlerSpec {
    /// A unary request/response handler.
    Unary(Arc<dyn UnaryHandler>),
}

impl HandlerSpec {
    /// Wrap a unary handler.
    pub fn unary(handler: impl UnaryHandler + 'static) -> Self {
        Self::Unary(Arc::new(handler))
    }
}

impl std::fmt::Debug for HandlerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerSpec::Unary(_) => f.write_str("HandlerSpec::Unary"),
        }
    }
}
