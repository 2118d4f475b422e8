//! HTTP inbound: listener, call parsing, and dispatch.
//!
//! Every RPC arrives as a `POST` whose `Rpc-*` headers carry the call
//! metadata and whose body is the raw payload. The inbound parses that
//! framing into a transport-neutral request, routes it, and runs the handler
//! under a deadline and a panic barrier.

use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router as AxumRouter;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use yarpc_core::{
    panic_message, request_error_message, Body, CallContext, Encoding, HandlerSpec, Request,
    Router, Status,
};

use crate::headers::{
    application_headers, http_status, optional_header, required_header, CALLER_HEADER,
    ENCODING_HEADER, PROCEDURE_HEADER, ROUTING_DELEGATE_HEADER, ROUTING_KEY_HEADER,
    SERVICE_HEADER, SHARD_KEY_HEADER, TTL_MS_HEADER,
};
use crate::response::HttpResponseWriter;

/// Default cap on request body size.
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

const PLAIN_TEXT: &str = "text/plain; charset=utf8";

/// Configuration for an HTTP inbound, consumed by [`Inbound::start`].
pub struct Inbound {
    router: Arc<dyn Router>,
    grab_headers: HashSet<String>,
    max_body_bytes: usize,
}

impl Inbound {
    /// Create an inbound serving procedures from `router`.
    pub fn new(router: Arc<dyn Router>) -> Self {
        Self {
            router,
            grab_headers: HashSet::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Pass the named headers through as user headers without the
    /// `Rpc-Header-` prefix.
    pub fn with_grab_headers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.grab_headers
            .extend(names.into_iter().map(|name| name.as_ref().to_ascii_lowercase()));
        self
    }

    /// Cap the accepted request body size.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Bind `addr` and start serving.
    pub async fn start(self, addr: impl ToSocketAddrs) -> io::Result<RunningInbound> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let state = Arc::new(InboundState {
            router: self.router,
            grab_headers: self.grab_headers,
        });
        let app = AxumRouter::new()
            .fallback(handle_rpc)
            .layer(DefaultBodyLimit::max(self.max_body_bytes))
            .with_state(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            if let Err(error) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(%error, "http inbound terminated");
            }
        });

        tracing::info!(%local_addr, "http inbound listening");
        Ok(RunningInbound {
            local_addr,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

/// A started HTTP inbound.
pub struct RunningInbound {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RunningInbound {
    /// The bound listen address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and wait for the server task to finish.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = self.task.await;
    }
}

struct InboundState {
    router: Arc<dyn Router>,
    grab_headers: HashSet<String>,
}

/// A parse failure, scoped to the call when enough metadata was readable.
struct CallError {
    scope: Option<(String, String)>,
    status: Status,
}

impl CallError {
    fn unscoped(status: Status) -> Self {
        Self {
            scope: None,
            status,
        }
    }
}

fn error_response(scope: Option<(&str, &str)>, status: &Status) -> Response {
    let text = match scope {
        Some((service, procedure)) => request_error_message(service, procedure, status.message()),
        None => status.message().to_owned(),
    };
    (
        http_status(status.code()),
        [(header::CONTENT_TYPE, PLAIN_TEXT)],
        format!("{text}\n"),
    )
        .into_response()
}

async fn handle_rpc(
    State(state): State<Arc<InboundState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, PLAIN_TEXT)],
            "404 page not found\n".to_owned(),
        )
            .into_response();
    }

    let (request, deadline) = match parse_call(&state, &headers, body) {
        Ok(parsed) => parsed,
        Err(error) => {
            let scope = error
                .scope
                .as_ref()
                .map(|(service, procedure)| (service.as_str(), procedure.as_str()));
            return error_response(scope, &error.status);
        }
    };

    let spec = match state.router.choose(&request) {
        Ok(spec) => spec,
        Err(status) => {
            return error_response(
                Some((request.service.as_str(), request.procedure.as_str())),
                &status,
            );
        }
    };

    let service = request.service.clone();
    let procedure = request.procedure.clone();

    // The handler runs on its own task so a panic surfaces as a join error
    // instead of tearing down the connection task. Holding the cancel handle
    // here ties client disconnect to the call context.
    let (ctx, _cancel) = CallContext::with_deadline(deadline);
    let call = tokio::spawn(invoke(spec, ctx, request, deadline));
    match call.await {
        Ok(response) => response,
        Err(join_error) if join_error.is_panic() => {
            let info = panic_message(join_error.into_panic());
            tracing::warn!(%service, %procedure, panic = %info, "handler panicked");
            error_response(
                Some((service.as_str(), procedure.as_str())),
                &Status::unknown(format!("panic: {info}")),
            )
        }
        Err(_) => error_response(
            Some((service.as_str(), procedure.as_str())),
            &Status::unavailable("call aborted"),
        ),
    }
}

fn parse_call(
    state: &InboundState,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<(Request, Instant), CallError> {
    let service = required_header(headers, SERVICE_HEADER, "missing service name")
        .map_err(CallError::unscoped)?;
    let procedure = required_header(headers, PROCEDURE_HEADER, "missing procedure")
        .map_err(CallError::unscoped)?;
    let scoped = |status: Status| CallError {
        scope: Some((service.clone(), procedure.clone())),
        status,
    };

    let caller = required_header(headers, CALLER_HEADER, "missing caller name").map_err(&scoped)?;
    let encoding = required_header(headers, ENCODING_HEADER, "missing encoding").map_err(&scoped)?;

    let ttl_text = required_header(headers, TTL_MS_HEADER, "missing TTL").map_err(&scoped)?;
    let ttl_ms: u64 = ttl_text
        .parse()
        .map_err(|_| scoped(Status::invalid_argument(format!("invalid TTL {ttl_text:?}"))))?;
    let deadline = Instant::now() + Duration::from_millis(ttl_ms);

    let user_headers = application_headers(headers, &state.grab_headers).map_err(&scoped)?;

    let request = Request {
        caller,
        service: service.clone(),
        transport: "http",
        encoding: Encoding::from(encoding),
        procedure: procedure.clone(),
        headers: user_headers,
        shard_key: optional_header(headers, SHARD_KEY_HEADER).map_err(&scoped)?,
        routing_key: optional_header(headers, ROUTING_KEY_HEADER).map_err(&scoped)?,
        routing_delegate: optional_header(headers, ROUTING_DELEGATE_HEADER).map_err(&scoped)?,
        body: Body::from_bytes(body),
    };
    request.validate().map_err(&scoped)?;
    Ok((request, deadline))
}

async fn invoke(
    spec: HandlerSpec,
    ctx: CallContext,
    request: Request,
    deadline: Instant,
) -> Response {
    let HandlerSpec::Unary(handler) = spec;

    let service = request.service.clone();
    let procedure = request.procedure.clone();
    let caller = request.caller.clone();
    let encoding = request.encoding.clone();

    let span = tracing::info_span!(
        "inbound_call",
        transport = "http",
        service = %service,
        procedure = %procedure,
        caller = %caller,
    );

    let mut writer = HttpResponseWriter::new();
    let outcome = tokio::time::timeout_at(
        deadline,
        handler.handle(&ctx, request, &mut writer).instrument(span),
    )
    .await;

    match outcome {
        Err(_elapsed) => {
            tracing::debug!(%service, %procedure, "handler missed the deadline");
            error_response(
                Some((service.as_str(), procedure.as_str())),
                &Status::deadline_exceeded(format!(
                    "call to procedure {procedure:?} of service {service:?} from caller {caller:?} timed out"
                )),
            )
        }
        Ok(Err(status)) => {
            error_response(Some((service.as_str(), procedure.as_str())), &status)
        }
        Ok(Ok(())) => writer.into_response(&encoding),
    }
}
