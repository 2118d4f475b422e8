#![deny(unsafe_code)]

//! Framed TCP (tchannel-style) inbound transport for the yarpc runtime.
//!
//! Calls travel as length-delimited frames carrying the tri-arg layout:
//! arg1 is the procedure name, arg2 the headers, arg3 the opaque body. The
//! arg2 schema follows the call format (`json` calls use a JSON object,
//! everything else the binary pair list), the deadline arrives as a TTL on
//! the call frame, and failures terminate calls with coded system-error
//! frames.
//!
//! The dispatcher consumes calls through the [`InboundCall`]/[`CallResponse`]
//! capability traits; the wire connection provides one implementation and
//! tests substitute fakes.

mod call;
mod headers;
mod inbound;
mod response;
mod wire;

pub use call::{CallResponse, InboundCall};
pub use headers::{decode_headers, encode_headers};
pub use inbound::{Inbound, RunningInbound, ServerConfig};
pub use response::TchannelResponseWriter;
pub use wire::{
    read_frame, write_frame, Frame, SystemErrorCode, WireError, DEFAULT_MAX_FRAME_BYTES,
};
