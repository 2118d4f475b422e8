//! Response writer adapter for the framed transport.

use bytes::{Bytes, BytesMut};

use yarpc_core::{BoxFuture, Encoding, Headers, ResponseWriter, Status};

use crate::call::CallResponse;
use crate::headers::encode_headers;

/// Builds one call response: arg2 from the pending headers, arg3 from body
/// writes.
///
/// The first body write encodes and freezes the headers; adding headers
/// afterwards is refused. The first failure (header encoding or terminal
/// send) is sticky: every subsequent call returns the stored error without
/// retrying.
pub struct TchannelResponseWriter<R: CallResponse> {
    response: R,
    format: Encoding,
    headers: Headers,
    arg2: Option<Bytes>,
    body: BytesMut,
    failed: Option<Status>,
}

impl<R: CallResponse> TchannelResponseWriter<R> {
    /// Create a writer that terminates the call through `response`.
    pub fn new(response: R, format: Encoding) -> Self {
        Self {
            response,
            format,
            headers: Headers::new(),
            arg2: None,
            body: BytesMut::new(),
            failed: None,
        }
    }

    /// Terminate the call, flushing headers even if nothing was written.
    pub async fn close(mut self) -> Result<(), Status> {
        if let Some(status) = self.failed {
            return Err(status);
        }
        let arg2 = match self.arg2.take() {
            Some(arg2) => arg2,
            None => encode_headers(&self.format, &self.headers)?,
        };
        self.response.send_ok(arg2, self.body.freeze()).await
    }
}

impl<R: CallResponse> ResponseWriter for TchannelResponseWriter<R> {
    fn add_headers(&mut self, headers: Headers) -> Result<(), Status> {
        if self.arg2.is_some() {
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
            if self.arg2.is_none() {
                match encode_headers(&self.format, &self.headers) {
                    Ok(encoded) => self.arg2 = Some(encoded),
                    Err(status) => {
                        self.failed = Some(status.clone());
                        return Err(status);
                    }
                }
            }
            self.body.extend_from_slice(body);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::testing::FakeResponse;
    use crate::headers::decode_headers;
    use yarpc_core::encodings;

    fn raw() -> Encoding {
        Encoding::from(encodings::RAW)
    }

    #[tokio::test]
    async fn first_write_freezes_headers() {
        let response = FakeResponse::default();
        let mut writer = TchannelResponseWriter::new(response.clone(), raw());

        writer
            .add_headers(Headers::from_pairs([("foo", "bar")]))
            .unwrap();
        writer.write(b"hi").await.unwrap();

        let refused = writer
            .add_headers(Headers::from_pairs([("x", "y")]))
            .unwrap_err();
        assert_eq!(refused.code(), yarpc_core::Code::Internal);

        writer.close().await.unwrap();

        let (arg2, arg3) = response.sent_ok().expect("response was sent");
        let headers = decode_headers(&raw(), &arg2).unwrap();
        assert_eq!(headers.get("foo"), Some("bar"));
        assert_eq!(headers.get("x"), None);
        assert_eq!(&arg3[..], b"hi");
    }

    #[tokio::test]
    async fn close_without_write_still_flushes_headers() {
        let response = FakeResponse::default();
        let mut writer = TchannelResponseWriter::new(response.clone(), raw());
        writer
            .add_headers(Headers::from_pairs([("a", "b")]))
            .unwrap();
        writer.close().await.unwrap();

        let (arg2, arg3) = response.sent_ok().expect("response was sent");
        let headers = decode_headers(&raw(), &arg2).unwrap();
        assert_eq!(headers.get("a"), Some("b"));
        assert!(arg3.is_empty());
    }

    #[tokio::test]
    async fn writes_accumulate_into_arg3() {
        let response = FakeResponse::default();
        let mut writer = TchannelResponseWriter::new(response.clone(), raw());
        writer.write(b"hello ").await.unwrap();
        writer.write(b"world").await.unwrap();
        writer.close().await.unwrap();

        let (_, arg3) = response.sent_ok().unwrap();
        assert_eq!(&arg3[..], b"hello world");
    }

    #[tokio::test]
    async fn failed_terminal_send_surfaces_at_close() {
        let response = FakeResponse::failing();
        let mut writer = TchannelResponseWriter::new(response.clone(), raw());
        writer.write(b"body").await.unwrap();
        let status = writer.close().await.unwrap_err();
        assert_eq!(status.code(), yarpc_core::Code::Unavailable);
        assert!(response.sent_ok().is_none());
    }
}
