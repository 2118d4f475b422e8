#![deny(unsafe_code)]

//! Transport-neutral core of the yarpc request-dispatch runtime.
//!
//! A process exposes named procedures over several wire transports at once;
//! each transport normalizes its framing into the same in-memory
//! [`Request`], routes it through a [`Router`], and invokes the registered
//! [`UnaryHandler`] against a per-transport [`ResponseWriter`].
//!
//! This crate holds the contracts every transport shares:
//!
//! - [`Headers`] — ordered case-insensitive multimap of user metadata
//! - [`Request`] / [`Body`] — the normalized call and its read-once payload
//! - [`CallContext`] — ambient deadline and cooperative cancellation
//! - [`Status`] / [`Code`] — transport-neutral error taxonomy
//! - [`UnaryHandler`] / [`ResponseWriter`] / [`HandlerSpec`] — the handler
//!   contract
//! - [`Router`] / [`MapRouter`] — populate-then-freeze procedure table
//!
//! The transports themselves live in sibling crates (`yarpc-http`,
//! `yarpc-tchannel`).

mod body;
mod context;
mod errors;
mod handler;
mod headers;
mod request;
mod router;

pub use body::Body;
pub use context::{CallContext, CancelHandle};
pub use errors::{panic_message, request_error_message, Code, Status};
pub use handler::{BoxFuture, HandlerSpec, ResponseWriter, UnaryHandler};
pub use headers::Headers;
pub use request::{encodings, Encoding, Request};
pub use router::{MapRouter, Procedure, RegisterError, Router};
