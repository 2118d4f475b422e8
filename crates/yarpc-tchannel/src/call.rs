//! Capability view of one inbound call.
//!
//! The dispatcher consumes calls through these traits rather than the wire
//! types directly, so tests can substitute fakes with full control over the
//! call's behavior.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use yarpc_core::{BoxFuture, Status};

use crate::wire::{Frame, SystemErrorCode};

/// Request side of one inbound call.
///
/// arg2 and arg3 are read-once: the first take consumes them.
pub trait InboundCall: Send + 'static {
    /// The response sink paired with this call.
    type Response: CallResponse;

    fn caller_name(&self) -> &str;
    fn service_name(&self) -> &str;
    /// arg1: the procedure name.
    fn method(&self) -> &str;
    /// The call format, naming the body codec and the arg2 schema.
    fn format(&self) -> &str;
    /// Remaining time budget; `None` when the caller sent no deadline.
    fn ttl(&self) -> Option<Duration>;

    fn take_arg2(&mut self) -> Option<Bytes>;
    fn take_arg3(&mut self) -> Option<Bytes>;

    /// A handle for terminating the call on the wire.
    fn response(&self) -> Self::Response;
}

/// Response side of one inbound call.
///
/// Exactly one terminal send is allowed per call - either `send_ok` or
/// `send_system_error`. A second send fails without touching the wire, which
/// is what keeps "exactly one terminal wire event" true even when the
/// dispatcher and the panic barrier race.
pub trait CallResponse: Clone + Send + Sync + 'static {
    /// Terminate the call successfully with arg2 (headers) and arg3 (body).
    fn send_ok(&self, arg2: Bytes, arg3: Bytes) -> BoxFuture<'static, Result<(), Status>>;

    /// Terminate the call with a system error.
    fn send_system_error(
        &self,
        code: SystemErrorCode,
        message: String,
    ) -> BoxFuture<'static, Result<(), Status>>;
}

/// A call parsed off a live connection.
pub(crate) struct WireCall {
    pub(crate) caller: String,
    pub(crate) service: String,
    pub(crate) method: String,
    pub(crate) format: String,
    pub(crate) ttl_ms: u32,
    pub(crate) arg2: Option<Bytes>,
    pub(crate) arg3: Option<Bytes>,
    pub(crate) response: WireResponse,
}

impl WireCall {
    pub(crate) fn new(
        id: u32,
        ttl_ms: u32,
        service: String,
        caller: String,
        method: String,
        format: String,
        arg2: Bytes,
        arg3: Bytes,
        outbound: mpsc::Sender<Frame>,
    ) -> Self {
        Self {
            caller,
            service,
            method,
            format,
            ttl_ms,
            arg2: Some(arg2),
            arg3: Some(arg3),
            response: WireResponse {
                id,
                outbound,
                sent: Arc::new(AtomicBool::new(false)),
            },
        }
    }
}

impl InboundCall for WireCall {
    type Response = WireResponse;

    fn caller_name(&self) -> &str {
        &self.caller
    }

    fn service_name(&self) -> &str {
        &self.service
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn format(&self) -> &str {
        &self.format
    }

    fn ttl(&self) -> Option<Duration> {
        if self.ttl_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.ttl_ms as u64))
        }
    }

    fn take_arg2(&mut self) -> Option<Bytes> {
        self.arg2.take()
    }

    fn take_arg3(&mut self) -> Option<Bytes> {
        self.arg3.take()
    }

    fn response(&self) -> WireResponse {
        self.response.clone()
    }
}

/// Terminal-frame sink for one call on a live connection.
///
/// Clones share the one-shot send guard, so any number of holders may race
/// to terminate the call and only the first frame reaches the wire.
#[derive(Clone)]
pub(crate) struct WireResponse {
    id: u32,
    outbound: mpsc::Sender<Frame>,
    sent: Arc<AtomicBool>,
}

impl WireResponse {
    async fn send(&self, frame: Frame) -> Result<(), Status> {
        if self.sent.swap(true, Ordering::SeqCst) {
            return Err(Status::internal("response already sent"));
        }
        self.outbound
            .send(frame)
            .await
            .map_err(|_| Status::unavailable("connection closed"))
    }
}

impl CallResponse for WireResponse {
    fn send_ok(&self, arg2: Bytes, arg3: Bytes) -> BoxFuture<'static, Result<(), Status>> {
        let this = self.clone();
        Box::pin(async move {
            let id = this.id;
            this.send(Frame::CallRes { id, arg2, arg3 }).await
        })
    }

    fn send_system_error(
        &self,
        code: SystemErrorCode,
        message: String,
    ) -> BoxFuture<'static, Result<(), Status>> {
        let this = self.clone();
        Box::pin(async move {
            let id = this.id;
            this.send(Frame::SystemError { id, code, message }).await
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fakes implementing the call capability set.

    use std::sync::Mutex;

    use super::*;

    /// Records terminal sends; optionally fails them.
    #[derive(Clone, Default)]
    pub(crate) struct FakeResponse {
        pub(crate) state: Arc<Mutex<FakeResponseState>>,
    }

    #[derive(Default)]
    pub(crate) struct FakeResponseState {
        pub(crate) ok: Option<(Bytes, Bytes)>,
        pub(crate) errors: Vec<(SystemErrorCode, String)>,
        pub(crate) fail_sends: bool,
    }

    impl FakeResponse {
        pub(crate) fn failing() -> Self {
            let fake = Self::default();
            fake.state.lock().unwrap().fail_sends = true;
            fake
        }

        pub(crate) fn sent_ok(&self) -> Option<(Bytes, Bytes)> {
            self.state.lock().unwrap().ok.clone()
        }

        pub(crate) fn sent_errors(&self) -> Vec<(SystemErrorCode, String)> {
            self.state.lock().unwrap().errors.clone()
        }
    }

    impl CallResponse for FakeResponse {
        fn send_ok(&self, arg2: Bytes, arg3: Bytes) -> BoxFuture<'static, Result<(), Status>> {
            let state = self.state.clone();
            Box::pin(async move {
                let mut state = state.lock().unwrap();
                if state.fail_sends {
                    return Err(Status::unavailable("sink failed"));
                }
                state.ok = Some((arg2, arg3));
                Ok(())
            })
        }

        fn send_system_error(
            &self,
            code: SystemErrorCode,
            message: String,
        ) -> BoxFuture<'static, Result<(), Status>> {
            let state = self.state.clone();
            Box::pin(async move {
                let mut state = state.lock().unwrap();
                if state.fail_sends {
                    return Err(Status::unavailable("sink failed"));
                }
                state.errors.push((code, message));
                Ok(())
            })
        }
    }

    /// An in-memory inbound call.
    pub(crate) struct FakeCall {
        pub(crate) caller: String,
        pub(crate) service: String,
        pub(crate) method: String,
        pub(crate) format: String,
        pub(crate) ttl: Option<Duration>,
        pub(crate) arg2: Option<Bytes>,
        pub(crate) arg3: Option<Bytes>,
        pub(crate) response: FakeResponse,
    }

    impl FakeCall {
        pub(crate) fn new(method: &str) -> Self {
            Self {
                caller: "caller".to_owned(),
                service: "service".to_owned(),
                method: method.to_owned(),
                format: "raw".to_owned(),
                ttl: Some(Duration::from_secs(1)),
                arg2: Some(Bytes::new()),
                arg3: Some(Bytes::new()),
                response: FakeResponse::default(),
            }
        }
    }

    impl InboundCall for FakeCall {
        type Response = FakeResponse;

        fn caller_name(&self) -> &str {
            &self.caller
        }

        fn service_name(&self) -> &str {
            &self.service
        }

        fn method(&self) -> &str {
            &self.method
        }

        fn format(&self) -> &str {
            &self.format
        }

        fn ttl(&self) -> Option<Duration> {
            self.ttl
        }

        fn take_arg2(&mut self) -> Option<Bytes> {
            self.arg2.take()
        }

        fn take_arg3(&mut self) -> Option<Bytes> {
            self.arg3.take()
        }

        fn response(&self) -> FakeResponse {
            self.response.clone()
        }
    }
}
