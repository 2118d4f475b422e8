//! Response writer adapter for the HTTP inbound.

use axum::response::{IntoResponse, Response};
use bytes::BytesMut;
use http::{header, HeaderMap, HeaderValue, StatusCode};
use yarpc_core::{BoxFuture, Encoding, Headers, ResponseWriter, Status};

use crate::headers::emit_application_headers;

/// Buffers headers and body for one call.
///
/// The terminal HTTP status is only known once the handler returns, so the
/// wire commit is deferred until [`HttpResponseWriter::into_response`]. The
/// handler-observable state machine is unchanged: the first body write
/// freezes the headers, and later `add_headers` calls are refused.
pub(crate) struct HttpResponseWriter {
    headers: Headers,
    body: BytesMut,
    headers_frozen: bool,
    failed: Option<Status>,
}

impl HttpResponseWriter {
    pub(crate) fn new() -> Self {
        Self {
            headers: Headers::new(),
            body: BytesMut::new(),
            headers_frozen: false,
            failed: None,
        }
    }

    /// Finalize with status 200, flushing headers even if nothing was
    /// written.
    pub(crate) fn into_response(self, encoding: &Encoding) -> Response {
        let mut header_map = HeaderMap::new();
        match HeaderValue::from_str(&format!("application/{encoding}")) {
            Ok(value) => {
                header_map.insert(header::CONTENT_TYPE, value);
            }
            Err(_) => {
                tracing::warn!(%encoding, "skipping unencodable content-type");
            }
        }
        emit_application_headers(&self.headers, &mut header_map);
        (StatusCode::OK, header_map, self.body.freeze()).into_response()
    }
}

impl ResponseWriter for HttpResponseWriter {
    fn add_headers(&mut self, headers: Headers) -> Result<(), Status> {
        if self.headers_frozen {
            return Err(Status::internal(
                "cannot add headers after the body started",
            ));
        }
        self.headers.extend_from(&headers);
        Ok(())
    }

    fn write<'a>(&'a mut self, body: &'a [u8]) -> BoxFuture<'a, Result<(), Status>> {
        Box::pin(async move {
            if let Some(status) = &self.failed {
                return Err(status.clone());
            }
            self.headers_frozen = true;
            self.body.extend_from_slice(body);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_write_freezes_headers() {
        let mut writer = HttpResponseWriter::new();
        writer
            .add_headers(Headers::from_pairs([("foo", "bar")]))
            .unwrap();
        writer.write(b"hi").await.unwrap();

        let refused = writer
            .add_headers(Headers::from_pairs([("x", "y")]))
            .unwrap_err();
        assert_eq!(refused.code(), yarpc_core::Code::Internal);

        let response = writer.into_response(&Encoding::from("raw"));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("rpc-header-foo").unwrap(), "bar");
        assert!(response.headers().get("rpc-header-x").is_none());
    }

    #[tokio::test]
    async fn close_without_write_still_flushes_headers() {
        let mut writer = HttpResponseWriter::new();
        writer
            .add_headers(Headers::from_pairs([("foo", "bar")]))
            .unwrap();

        let response = writer.into_response(&Encoding::from("json"));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(response.headers().get("rpc-header-foo").unwrap(), "bar");
    }

    #[tokio::test]
    async fn writes_accumulate() {
        let mut writer = HttpResponseWriter::new();
        writer.write(b"hello ").await.unwrap();
        writer.write(b"world").await.unwrap();
        assert_eq!(&writer.body[..], b"hello world");
    }
}
