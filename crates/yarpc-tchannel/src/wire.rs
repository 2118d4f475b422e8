//! Length-delimited frame codec for the tchannel-style transport.
//!
//! Each unary message is one frame: a `u32` payload length, a one-byte frame
//! type, then the typed fields. Call requests carry arg1 (the method name)
//! inline with the call metadata, arg2 (headers), and arg3 (body). This
//! module is generic over the transport stream - anything implementing
//! `AsyncRead`/`AsyncWrite` works, including in-memory duplex pairs in tests.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use yarpc_core::Code;

/// Default cap on a single frame's payload.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

const TYPE_CALL_REQ: u8 = 0x03;
const TYPE_CALL_RES: u8 = 0x04;
const TYPE_ERROR: u8 = 0xFF;

/// One message on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// An inbound call: metadata, arg1 (method), arg2 (headers), arg3 (body).
    CallReq {
        id: u32,
        /// Time budget in milliseconds; zero means the caller sent none.
        ttl_ms: u32,
        service: String,
        caller: String,
        method: String,
        format: String,
        arg2: Bytes,
        arg3: Bytes,
    },
    /// A successful response: arg2 (headers), arg3 (body).
    CallRes { id: u32, arg2: Bytes, arg3: Bytes },
    /// A terminal failure signal for one call.
    SystemError {
        id: u32,
        code: SystemErrorCode,
        message: String,
    },
}

impl Frame {
    /// The call id this frame belongs to.
    pub fn id(&self) -> u32 {
        match self {
            Frame::CallReq { id, .. } | Frame::CallRes { id, .. } | Frame::SystemError { id, .. } => {
                *id
            }
        }
    }
}

/// Error codes carried by system-error frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemErrorCode {
    Timeout,
    Cancelled,
    Busy,
    Declined,
    Unexpected,
    BadRequest,
    NetworkError,
    Unhealthy,
    ProtocolError,
}

impl SystemErrorCode {
    /// Wire value of the code.
    pub fn as_u8(self) -> u8 {
        match self {
            SystemErrorCode::Timeout => 0x01,
            SystemErrorCode::Cancelled => 0x02,
            SystemErrorCode::Busy => 0x03,
            SystemErrorCode::Declined => 0x04,
            SystemErrorCode::Unexpected => 0x05,
            SystemErrorCode::BadRequest => 0x06,
            SystemErrorCode::NetworkError => 0x07,
            SystemErrorCode::Unhealthy => 0x08,
            SystemErrorCode::ProtocolError => 0xFF,
        }
    }

    /// Decode a wire value.
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x01 => SystemErrorCode::Timeout,
            0x02 => SystemErrorCode::Cancelled,
            0x03 => SystemErrorCode::Busy,
            0x04 => SystemErrorCode::Declined,
            0x05 => SystemErrorCode::Unexpected,
            0x06 => SystemErrorCode::BadRequest,
            0x07 => SystemErrorCode::NetworkError,
            0x08 => SystemErrorCode::Unhealthy,
            0xFF => SystemErrorCode::ProtocolError,
            _ => return None,
        })
    }

    /// Map the transport-neutral code onto a system-error code.
    pub fn for_status(code: Code) -> Self {
        match code {
            Code::InvalidArgument | Code::Unimplemented => SystemErrorCode::BadRequest,
            Code::DeadlineExceeded => SystemErrorCode::Timeout,
            Code::Unavailable => SystemErrorCode::Declined,
            Code::Unknown | Code::Internal => SystemErrorCode::Unexpected,
        }
    }
}

impl std::fmt::Display for SystemErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SystemErrorCode::Timeout => "timeout",
            SystemErrorCode::Cancelled => "cancelled",
            SystemErrorCode::Busy => "busy",
            SystemErrorCode::Declined => "declined",
            SystemErrorCode::Unexpected => "unexpected",
            SystemErrorCode::BadRequest => "bad-request",
            SystemErrorCode::NetworkError => "network-error",
            SystemErrorCode::Unhealthy => "unhealthy",
            SystemErrorCode::ProtocolError => "protocol-error",
        };
        f.write_str(name)
    }
}

/// Error reading or decoding a frame.
#[derive(Debug)]
pub enum WireError {
    /// IO error on the underlying stream.
    Io(io::Error),
    /// Frame payload exceeds the configured limit.
    Oversize { size: usize, max: usize },
    /// Frame type byte is not recognized.
    UnknownFrameType(u8),
    /// System-error code byte is not recognized.
    UnknownErrorCode(u8),
    /// Payload structure is invalid.
    Malformed(&'static str),
}

impl From<io::Error> for WireError {
    fn from(error: io::Error) -> Self {
        WireError::Io(error)
    }
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireError::Io(error) => write!(f, "io: {error}"),
            WireError::Oversize { size, max } => {
                write!(f, "frame of {size} bytes exceeds the {max} byte limit")
            }
            WireError::UnknownFrameType(value) => write!(f, "unknown frame type {value:#04x}"),
            WireError::UnknownErrorCode(value) => write!(f, "unknown error code {value:#04x}"),
            WireError::Malformed(context) => write!(f, "malformed frame: {context}"),
        }
    }
}

impl std::error::Error for WireError {}

/// Read one frame.
///
/// Returns `Ok(None)` on a clean end of stream (no partial length prefix).
pub async fn read_frame<R>(reader: &mut R, max_frame_bytes: usize) -> Result<Option<Frame>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut len = [0u8; 4];
    match reader.read_exact(&mut len).await {
        Ok(_) => {}
        Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(error) => return Err(error.into()),
    }
    let size = u32::from_be_bytes(len) as usize;
    if size == 0 {
        return Err(WireError::Malformed("empty frame"));
    }
    if size > max_frame_bytes {
        return Err(WireError::Oversize {
            size,
            max: max_frame_bytes,
        });
    }
    let mut payload = vec![0u8; size];
    reader.read_exact(&mut payload).await?;
    decode(Bytes::from(payload)).map(Some)
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = encode(frame)?;
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(&payload).await?;
    writer.flush().await
}

fn encode(frame: &Frame) -> io::Result<BytesMut> {
    let mut buf = BytesMut::new();
    match frame {
        Frame::CallReq {
            id,
            ttl_ms,
            service,
            caller,
            method,
            format,
            arg2,
            arg3,
        } => {
            buf.put_u8(TYPE_CALL_REQ);
            buf.put_u32(*id);
            buf.put_u32(*ttl_ms);
            put_str16(&mut buf, service)?;
            put_str16(&mut buf, caller)?;
            put_str16(&mut buf, method)?;
            put_str16(&mut buf, format)?;
            put_bytes32(&mut buf, arg2);
            put_bytes32(&mut buf, arg3);
        }
        Frame::CallRes { id, arg2, arg3 } => {
            buf.put_u8(TYPE_CALL_RES);
            buf.put_u32(*id);
            put_bytes32(&mut buf, arg2);
            put_bytes32(&mut buf, arg3);
        }
        Frame::SystemError { id, code, message } => {
            buf.put_u8(TYPE_ERROR);
            buf.put_u32(*id);
            buf.put_u8(code.as_u8());
            put_str16(&mut buf, message)?;
        }
    }
    Ok(buf)
}

fn decode(mut buf: Bytes) -> Result<Frame, WireError> {
    let frame = match take_u8(&mut buf)? {
        TYPE_CALL_REQ => Frame::CallReq {
            id: take_u32(&mut buf)?,
            ttl_ms: take_u32(&mut buf)?,
            service: take_str16(&mut buf)?,
            caller: take_str16(&mut buf)?,
            method: take_str16(&mut buf)?,
            format: take_str16(&mut buf)?,
            arg2: take_bytes32(&mut buf)?,
            arg3: take_bytes32(&mut buf)?,
        },
        TYPE_CALL_RES => Frame::CallRes {
            id: take_u32(&mut buf)?,
            arg2: take_bytes32(&mut buf)?,
            arg3: take_bytes32(&mut buf)?,
        },
        TYPE_ERROR => {
            let id = take_u32(&mut buf)?;
            let raw = take_u8(&mut buf)?;
            let code =
                SystemErrorCode::from_u8(raw).ok_or(WireError::UnknownErrorCode(raw))?;
            Frame::SystemError {
                id,
                code,
                message: take_str16(&mut buf)?,
            }
        }
        other => return Err(WireError::UnknownFrameType(other)),
    };
    if buf.has_remaining() {
        return Err(WireError::Malformed("trailing bytes after frame"));
    }
    Ok(frame)
}

fn put_str16(buf: &mut BytesMut, value: &str) -> io::Result<()> {
    if value.len() > u16::MAX as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "string field too long for frame",
        ));
    }
    buf.put_u16(value.len() as u16);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn put_bytes32(buf: &mut BytesMut, value: &Bytes) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value);
}

fn take_u8(buf: &mut Bytes) -> Result<u8, WireError> {
    if buf.remaining() < 1 {
        return Err(WireError::Malformed("truncated frame"));
    }
    Ok(buf.get_u8())
}

fn take_u16(buf: &mut Bytes) -> Result<u16, WireError> {
    if buf.remaining() < 2 {
        return Err(WireError::Malformed("truncated frame"));
    }
    Ok(buf.get_u16())
}

fn take_u32(buf: &mut Bytes) -> Result<u32, WireError> {
    if buf.remaining() < 4 {
        return Err(WireError::Malformed("truncated frame"));
    }
    Ok(buf.get_u32())
}

fn take_str16(buf: &mut Bytes) -> Result<String, WireError> {
    let len = take_u16(buf)? as usize;
    if buf.remaining() < len {
        return Err(WireError::Malformed("truncated string field"));
    }
    String::from_utf8(buf.split_to(len).to_vec())
        .map_err(|_| WireError::Malformed("invalid utf-8 in string field"))
}

fn take_bytes32(buf: &mut Bytes) -> Result<Bytes, WireError> {
    let len = take_u32(buf)? as usize;
    if buf.remaining() < len {
        return Err(WireError::Malformed("truncated arg field"));
    }
    Ok(buf.split_to(len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    async fn round_trip(frame: Frame) -> Frame {
        let (mut left, mut right) = duplex(64 * 1024);
        write_frame(&mut left, &frame).await.unwrap();
        read_frame(&mut right, DEFAULT_MAX_FRAME_BYTES)
            .await
            .unwrap()
            .expect("expected a frame")
    }

    #[tokio::test]
    async fn call_req_round_trips() {
        let frame = Frame::CallReq {
            id: 7,
            ttl_ms: 1000,
            service: "curly".to_owned(),
            caller: "moe".to_owned(),
            method: "nyuck".to_owned(),
            format: "raw".to_owned(),
            arg2: Bytes::from_static(b"\x00\x01"),
            arg3: Bytes::from_static(b"hello"),
        };
        assert_eq!(round_trip(frame.clone()).await, frame);
    }

    #[tokio::test]
    async fn call_res_round_trips() {
        let frame = Frame::CallRes {
            id: 42,
            arg2: Bytes::new(),
            arg3: Bytes::from_static(b"world"),
        };
        assert_eq!(round_trip(frame.clone()).await, frame);
    }

    #[tokio::test]
    async fn system_error_round_trips() {
        let frame = Frame::SystemError {
            id: 3,
            code: SystemErrorCode::BadRequest,
            message: "failed to read headers".to_owned(),
        };
        assert_eq!(round_trip(frame.clone()).await, frame);
    }

    #[tokio::test]
    async fn oversize_frames_are_rejected() {
        let frame = Frame::CallRes {
            id: 1,
            arg2: Bytes::new(),
            arg3: Bytes::from(vec![0u8; 1024]),
        };
        let (mut left, mut right) = duplex(64 * 1024);
        write_frame(&mut left, &frame).await.unwrap();
        let err = read_frame(&mut right, 16).await.unwrap_err();
        assert!(matches!(err, WireError::Oversize { .. }));
    }

    #[tokio::test]
    async fn unknown_frame_type_is_rejected() {
        let (mut left, mut right) = duplex(1024);
        left.write_u32(1).await.unwrap();
        left.write_u8(0x77).await.unwrap();
        let err = read_frame(&mut right, DEFAULT_MAX_FRAME_BYTES)
            .await
            .unwrap_err();
        assert!(matches!(err, WireError::UnknownFrameType(0x77)));
    }

    #[tokio::test]
    async fn truncated_payload_is_malformed() {
        let (mut left, mut right) = duplex(1024);
        // call-res frame claiming a 5-byte arg2 that is not there
        left.write_u32(9).await.unwrap();
        left.write_u8(0x04).await.unwrap();
        left.write_u32(1).await.unwrap();
        left.write_u32(5).await.unwrap();
        let err = read_frame(&mut right, DEFAULT_MAX_FRAME_BYTES)
            .await
            .unwrap_err();
        assert!(matches!(err, WireError::Malformed(_)));
    }

    #[tokio::test]
    async fn clean_eof_reads_as_none() {
        let (left, mut right) = duplex(1024);
        drop(left);
        let frame = read_frame(&mut right, DEFAULT_MAX_FRAME_BYTES)
            .await
            .unwrap();
        assert!(frame.is_none());
    }

    #[test]
    fn status_codes_map_onto_system_errors() {
        assert_eq!(
            SystemErrorCode::for_status(Code::InvalidArgument),
            SystemErrorCode::BadRequest
        );
        assert_eq!(
            SystemErrorCode::for_status(Code::Unimplemented),
            SystemErrorCode::BadRequest
        );
        assert_eq!(
            SystemErrorCode::for_status(Code::DeadlineExceeded),
            SystemErrorCode::Timeout
        );
        assert_eq!(
            SystemErrorCode::for_status(Code::Unknown),
            SystemErrorCode::Unexpected
        );
        assert_eq!(
            SystemErrorCode::for_status(Code::Unavailable),
            SystemErrorCode::Declined
        );
    }
}
