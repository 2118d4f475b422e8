//! HTTP header to rpc metadata translation.
//!
//! Call metadata travels in reserved `Rpc-*` headers; user headers travel
//! with an `Rpc-Header-` prefix, plus an optional allowlist of exact names
//! ("grab headers") that pass through unprefixed. Either way the receiver
//! sees the lowercased key.

use std::collections::HashSet;

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use yarpc_core::{Code, Headers, Status};

pub const CALLER_HEADER: &str = "rpc-caller";
pub const SERVICE_HEADER: &str = "rpc-service";
pub const PROCEDURE_HEADER: &str = "rpc-procedure";
pub const ENCODING_HEADER: &str = "rpc-encoding";
pub const TTL_MS_HEADER: &str = "context-ttl-ms";
pub const SHARD_KEY_HEADER: &str = "rpc-shard-key";
pub const ROUTING_KEY_HEADER: &str = "rpc-routing-key";
pub const ROUTING_DELEGATE_HEADER: &str = "rpc-routing-delegate";

/// Prefix marking user headers on requests and responses.
pub const APPLICATION_HEADER_PREFIX: &str = "rpc-header-";

/// A header that must be present on every RPC request.
pub(crate) fn required_header(
    headers: &HeaderMap,
    name: &str,
    missing: &str,
) -> Result<String, Status> {
    match headers.get(name) {
        None => Err(Status::invalid_argument(missing)),
        Some(value) => value
            .to_str()
            .map(str::to_owned)
            .map_err(|_| Status::invalid_argument(format!("invalid value for header {name:?}"))),
    }
}

/// An optional header; absent or blank means unset.
pub(crate) fn optional_header(headers: &HeaderMap, name: &str) -> Result<Option<String>, Status> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => {
            let text = value.to_str().map_err(|_| {
                Status::invalid_argument(format!("invalid value for header {name:?}"))
            })?;
            if text.is_empty() {
                Ok(None)
            } else {
                Ok(Some(text.to_owned()))
            }
        }
    }
}

/// Extract user headers from an HTTP request.
///
/// `Rpc-Header-<name>` becomes `<name>`; names on the grab list pass through
/// as-is. Everything else is ignored.
pub(crate) fn application_headers(
    headers: &HeaderMap,
    grab_headers: &HashSet<String>,
) -> Result<Headers, Status> {
    let mut out = Headers::new();
    for (name, value) in headers.iter() {
        let name = name.as_str();
        let key = if let Some(stripped) = name.strip_prefix(APPLICATION_HEADER_PREFIX) {
            stripped
        } else if grab_headers.contains(name) {
            name
        } else {
            continue;
        };
        let text = value
            .to_str()
            .map_err(|_| Status::invalid_argument(format!("invalid value for header {name:?}")))?;
        out.add(key, text);
    }
    Ok(out)
}

/// Emit user headers onto an HTTP response, `Rpc-Header-` prefixed.
///
/// Pairs that cannot be encoded as HTTP header names or values are skipped.
pub(crate) fn emit_application_headers(headers: &Headers, out: &mut HeaderMap) {
    for (key, value) in headers.iter() {
        let name = match HeaderName::try_from(format!("{APPLICATION_HEADER_PREFIX}{key}")) {
            Ok(name) => name,
            Err(_) => {
                tracing::warn!(key, "skipping response header with unencodable name");
                continue;
            }
        };
        let value = match HeaderValue::from_str(value) {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, "skipping response header with unencodable value");
                continue;
            }
        };
        out.append(name, value);
    }
}

/// Map the transport-neutral code onto an HTTP status.
pub(crate) fn http_status(code: Code) -> StatusCode {
    match code {
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::Unimplemented => StatusCode::NOT_FOUND,
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::Unknown | Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}
