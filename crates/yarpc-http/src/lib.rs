#![deny(unsafe_code)]

//! HTTP inbound transport for the yarpc runtime.
//!
//! RPCs travel as plain HTTP: a `POST` whose reserved `Rpc-*` headers carry
//! the call metadata (caller, service, procedure, encoding, TTL), whose
//! `Rpc-Header-*` headers carry user metadata, and whose body is the opaque
//! payload. Responses answer with `Content-Type: application/<encoding>`,
//! echo user headers with the same prefix, and map the transport-neutral
//! error taxonomy onto HTTP status codes.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use yarpc_core::{HandlerSpec, MapRouter, Procedure};
//! use yarpc_http::Inbound;
//!
//! let mut router = MapRouter::new("my-service");
//! router.register([Procedure::unary("echo", HandlerSpec::unary(Echo))])?;
//!
//! let inbound = Inbound::new(Arc::new(router)).start("127.0.0.1:0").await?;
//! println!("listening on {}", inbound.local_addr());
//! ```

mod headers;
mod inbound;
mod response;

pub use headers::{
    APPLICATION_HEADER_PREFIX, CALLER_HEADER, ENCODING_HEADER, PROCEDURE_HEADER,
    ROUTING_DELEGATE_HEADER, ROUTING_KEY_HEADER, SERVICE_HEADER, SHARD_KEY_HEADER, TTL_MS_HEADER,
};
pub use inbound::{Inbound, RunningInbound, DEFAULT_MAX_BODY_BYTES};
