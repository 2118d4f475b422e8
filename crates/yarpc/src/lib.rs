#![deny(unsafe_code)]

//! Multi-transport RPC runtime.
//!
//! A process registers named procedures once and exposes them over several
//! wire transports simultaneously. Each transport normalizes its framing
//! into the same transport-neutral [`Request`], routes it by
//! (service, procedure), and runs the registered handler under a deadline
//! and a panic barrier.
//!
//! - [`http`] speaks plain HTTP: call metadata in reserved `Rpc-*` headers,
//!   user metadata in `Rpc-Header-*` headers, payload in the body.
//! - [`tchannel`] speaks length-delimited frames with the tri-arg layout
//!   (arg1 method, arg2 headers, arg3 body) and coded system errors.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use yarpc::{HandlerSpec, MapRouter, Procedure};
//!
//! let mut router = MapRouter::new("hello-service");
//! router.register([Procedure::unary("echo", HandlerSpec::unary(Echo))])?;
//! let router = Arc::new(router);
//!
//! let http = yarpc::http::Inbound::new(router.clone())
//!     .start("127.0.0.1:8080")
//!     .await?;
//! let tch = yarpc::tchannel::Inbound::new(router)
//!     .start("127.0.0.1:4040")
//!     .await?;
//! ```

pub use yarpc_core::*;

pub use yarpc_http as http;
pub use yarpc_tchannel as tchannel;
