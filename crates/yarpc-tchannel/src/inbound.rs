//! Framed TCP inbound: listener, connection loops, and call dispatch.
//!
//! One task reads frames off each connection and one drains response frames
//! back onto it; every call runs on its own task behind a panic barrier, so
//! calls on a connection proceed concurrently and a handler fault cannot
//! tear the connection or the listener down.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use yarpc_core::{
    panic_message, request_error_message, Body, CallContext, Encoding, HandlerSpec, Request,
    Router,
};

use crate::call::{CallResponse, InboundCall, WireCall};
use crate::headers::decode_headers;
use crate::response::TchannelResponseWriter;
use crate::wire::{read_frame, write_frame, Frame, SystemErrorCode, DEFAULT_MAX_FRAME_BYTES};

/// Connection-level limits.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Cap on a single frame's payload.
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Configuration for a framed TCP inbound, consumed by [`Inbound::start`].
pub struct Inbound {
    router: Arc<dyn Router>,
    config: ServerConfig,
}

impl Inbound {
    /// Create an inbound serving procedures from `router`.
    pub fn new(router: Arc<dyn Router>) -> Self {
        Self {
            router,
            config: ServerConfig::default(),
        }
    }

    /// Override the connection-level limits.
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Bind `addr` and start accepting connections.
    pub async fn start(self, addr: impl ToSocketAddrs) -> io::Result<RunningInbound> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let router = self.router;
        let config = self.config;
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            tokio::spawn(run_connection(
                                router.clone(),
                                config.clone(),
                                stream,
                                peer,
                            ));
                        }
                        Err(error) => {
                            tracing::warn!(%error, "accept failed");
                        }
                    },
                }
            }
        });

        tracing::info!(%local_addr, "tchannel inbound listening");
        Ok(RunningInbound {
            local_addr,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

/// A started framed TCP inbound.
///
/// Stopping closes the listener; connections already accepted drain on
/// their own.
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

    /// Stop accepting and wait for the accept loop to finish.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = self.task.await;
    }
}

async fn run_connection(
    router: Arc<dyn Router>,
    config: ServerConfig,
    stream: TcpStream,
    peer: SocketAddr,
) {
    let (mut read_half, write_half) = stream.into_split();

    // Responses from concurrent call tasks funnel through one channel so
    // frames never interleave on the socket.
    let (outbound_tx, outbound_rx) = mpsc::channel::<Frame>(32);
    let writer = tokio::spawn(write_outbound(write_half, outbound_rx));

    loop {
        match read_frame(&mut read_half, config.max_frame_bytes).await {
            Ok(None) => break,
            Ok(Some(Frame::CallReq {
                id,
                ttl_ms,
                service,
                caller,
                method,
                format,
                arg2,
                arg3,
            })) => {
                let call = WireCall::new(
                    id,
                    ttl_ms,
                    service,
                    caller,
                    method,
                    format,
                    arg2,
                    arg3,
                    outbound_tx.clone(),
                );
                spawn_dispatch(router.clone(), call);
            }
            Ok(Some(frame)) => {
                tracing::warn!(%peer, id = frame.id(), "unexpected frame from client");
                break;
            }
            Err(error) => {
                tracing::warn!(%peer, %error, "closing connection");
                break;
            }
        }
    }

    // In-flight calls hold clones of the sender; the writer drains until the
    // last of them terminates.
    drop(outbound_tx);
    let _ = writer.await;
}

async fn write_outbound(mut write_half: OwnedWriteHalf, mut outbound_rx: mpsc::Receiver<Frame>) {
    while let Some(frame) = outbound_rx.recv().await {
        if let Err(error) = write_frame(&mut write_half, &frame).await {
            tracing::debug!(%error, "response write failed");
            break;
        }
    }
}

/// Run one call on its own task, with a second task converting a panic into
/// a system error so the response is still terminated on the wire.
fn spawn_dispatch<C: InboundCall>(router: Arc<dyn Router>, call: C) {
    let response = call.response();
    let service = call.service_name().to_owned();
    let procedure = call.method().to_owned();

    let task = tokio::spawn(dispatch(router, call));
    tokio::spawn(async move {
        if let Err(join_error) = task.await {
            if join_error.is_panic() {
                let info = panic_message(join_error.into_panic());
                tracing::warn!(%service, %procedure, panic = %info, "handler panicked");
                let message =
                    request_error_message(&service, &procedure, &format!("panic: {info}"));
                report(&response, SystemErrorCode::Unexpected, message).await;
            }
        }
    });
}

/// Normalize one call, route it, and run the handler to a terminal frame.
pub(crate) async fn dispatch<C: InboundCall>(router: Arc<dyn Router>, mut call: C) {
    let response = call.response();

    let Some(ttl) = call.ttl() else {
        report(
            &response,
            SystemErrorCode::Timeout,
            "timeout required: no deadline on call".to_owned(),
        )
        .await;
        return;
    };
    let deadline = Instant::now() + ttl;

    let format = Encoding::from(call.format());
    let service = call.service_name().to_owned();
    let procedure = call.method().to_owned();
    let caller = call.caller_name().to_owned();

    let arg2 = call.take_arg2().unwrap_or_default();
    let headers = match decode_headers(&format, &arg2) {
        Ok(headers) => headers,
        Err(status) => {
            report(
                &response,
                SystemErrorCode::BadRequest,
                format!("failed to read headers: {}", status.message()),
            )
            .await;
            return;
        }
    };
    let body = Body::from_bytes(call.take_arg3().unwrap_or_default());

    let request = Request {
        caller: caller.clone(),
        service: service.clone(),
        transport: "tchannel",
        encoding: format.clone(),
        procedure: procedure.clone(),
        headers,
        shard_key: None,
        routing_key: None,
        routing_delegate: None,
        body,
    };

    if let Err(status) = request.validate() {
        report(
            &response,
            SystemErrorCode::for_status(status.code()),
            request_error_message(&service, &procedure, status.message()),
        )
        .await;
        return;
    }

    let spec = match router.choose(&request) {
        Ok(spec) => spec,
        Err(status) => {
            report(
                &response,
                SystemErrorCode::for_status(status.code()),
                request_error_message(&service, &procedure, status.message()),
            )
            .await;
            return;
        }
    };
    let HandlerSpec::Unary(handler) = spec;

    let (ctx, _cancel) = CallContext::with_deadline(deadline);
    let span = tracing::info_span!(
        "inbound_call",
        transport = "tchannel",
        service = %service,
        procedure = %procedure,
        caller = %caller,
    );

    let mut writer = TchannelResponseWriter::new(response.clone(), format);
    let outcome = tokio::time::timeout_at(
        deadline,
        handler.handle(&ctx, request, &mut writer).instrument(span),
    )
    .await;

    match outcome {
        Err(_elapsed) => {
            tracing::debug!(%service, %procedure, "handler missed the deadline");
            report(
                &response,
                SystemErrorCode::Timeout,
                request_error_message(
                    &service,
                    &procedure,
                    &format!(
                        "call to procedure {procedure:?} of service {service:?} from caller {caller:?} timed out"
                    ),
                ),
            )
            .await;
        }
        Ok(Err(status)) => {
            report(
                &response,
                SystemErrorCode::for_status(status.code()),
                request_error_message(&service, &procedure, status.message()),
            )
            .await;
        }
        Ok(Ok(())) => {
            if let Err(status) = writer.close().await {
                tracing::debug!(%status, "failed to finalize response");
            }
        }
    }
}

async fn report<R: CallResponse>(response: &R, code: SystemErrorCode, message: String) {
    if response.send_system_error(code, message).await.is_err() {
        tracing::debug!("peer connection is gone; dropping error report");
    }
}
