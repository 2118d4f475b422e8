//! Request and response body streams.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

enum Inner {
    /// Fully buffered payload; reads drain the front.
    Buffered(Bytes),
    /// Streaming payload handed over by the transport.
    Reader(Pin<Box<dyn AsyncRead + Send>>),
}

/// A finite, read-once byte stream.
///
/// Ownership transfers to the handler along with the request; dropping the
/// body closes it. Reads consume: a second read after draining yields no
/// further bytes.
pub struct Body {
    inner: Inner,
}

impl Body {
    /// An empty body.
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    /// A body over an in-memory payload.
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self {
            inner: Inner::Buffered(bytes),
        }
    }

    /// A body that streams from an async reader.
    pub fn from_reader(reader: impl AsyncRead + Send + 'static) -> Self {
        Self {
            inner: Inner::Reader(Box::pin(reader)),
        }
    }

    /// Drain the remaining bytes into one buffer.
    pub async fn read_to_end(&mut self) -> io::Result<Bytes> {
        match &mut self.inner {
            Inner::Buffered(bytes) => Ok(std::mem::take(bytes)),
            Inner::Reader(reader) => {
                let mut out = Vec::new();
                reader.read_to_end(&mut out).await?;
                Ok(out.into())
            }
        }
    }
}

impl AsyncRead for Body {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            Inner::Buffered(bytes) => {
                let n = bytes.len().min(buf.remaining());
                buf.put_slice(&bytes.split_to(n));
                Poll::Ready(Ok(()))
            }
            Inner::Reader(reader) => reader.as_mut().poll_read(cx, buf),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes.into())
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Self::from_bytes(Bytes::from_static(bytes))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::from_bytes(Bytes::from_static(text.as_bytes()))
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Inner::Buffered(bytes) => write!(f, "Body({} bytes)", bytes.len()),
            Inner::Reader(_) => write!(f, "Body(stream)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buffered_body_reads_once() {
        let mut body = Body::from("hello");
        assert_eq!(body.read_to_end().await.unwrap(), Bytes::from("hello"));
        assert!(body.read_to_end().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn buffered_body_supports_partial_reads() {
        let mut body = Body::from("hello world");
        let mut first = [0u8; 5];
        body.read_exact(&mut first).await.unwrap();
        assert_eq!(&first, b"hello");
        assert_eq!(
            body.read_to_end().await.unwrap(),
            Bytes::from(" world")
        );
    }

    #[tokio::test]
    async fn streaming_body_drains_reader() {
        let (mut tx, rx) = tokio::io::duplex(64);
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            tx.write_all(b"streamed payload").await.unwrap();
        });
        let mut body = Body::from_reader(rx);
        assert_eq!(
            body.read_to_end().await.unwrap(),
            Bytes::from("streamed payload")
        );
    }
}
