//! arg2 header codecs.
//!
//! How headers travel in arg2 depends on the call format: `json` calls carry
//! a JSON object of string pairs; every other format (`raw`, `thrift`,
//! `proto`) carries the binary pair list - a `u16` pair count followed by
//! `u16`-length-prefixed keys and values. An empty arg2 always decodes to no
//! headers.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use yarpc_core::{encodings, Encoding, Headers, Status};

/// Encode headers into arg2 bytes for the given call format.
pub fn encode_headers(format: &Encoding, headers: &Headers) -> Result<Bytes, Status> {
    match format.as_str() {
        encodings::JSON => encode_json(headers),
        _ => encode_binary(headers),
    }
}

/// Decode arg2 bytes into headers for the given call format.
pub fn decode_headers(format: &Encoding, arg2: &[u8]) -> Result<Headers, Status> {
    if arg2.is_empty() {
        return Ok(Headers::new());
    }
    match format.as_str() {
        encodings::JSON => decode_json(arg2),
        _ => decode_binary(arg2),
    }
}

fn encode_binary(headers: &Headers) -> Result<Bytes, Status> {
    if headers.len() > u16::MAX as usize {
        return Err(Status::internal("too many headers for arg2"));
    }
    let mut buf = BytesMut::new();
    buf.put_u16(headers.len() as u16);
    for (key, value) in headers.iter() {
        put_pair_field(&mut buf, key)?;
        put_pair_field(&mut buf, value)?;
    }
    Ok(buf.freeze())
}

fn put_pair_field(buf: &mut BytesMut, value: &str) -> Result<(), Status> {
    if value.len() > u16::MAX as usize {
        return Err(Status::internal("header field too long for arg2"));
    }
    buf.put_u16(value.len() as u16);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn decode_binary(arg2: &[u8]) -> Result<Headers, Status> {
    let mut buf = arg2;
    if buf.remaining() < 2 {
        return Err(Status::invalid_argument("truncated arg2 header block"));
    }
    let count = buf.get_u16() as usize;
    let mut headers = Headers::with_capacity(count);
    for _ in 0..count {
        let key = take_pair_field(&mut buf)?;
        let value = take_pair_field(&mut buf)?;
        headers.add(&key, value);
    }
    if buf.has_remaining() {
        return Err(Status::invalid_argument("trailing bytes in arg2"));
    }
    Ok(headers)
}

fn take_pair_field(buf: &mut &[u8]) -> Result<String, Status> {
    if buf.remaining() < 2 {
        return Err(Status::invalid_argument("truncated arg2 header block"));
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(Status::invalid_argument("truncated arg2 header block"));
    }
    let (raw, rest) = buf.split_at(len);
    let text = std::str::from_utf8(raw)
        .map_err(|_| Status::invalid_argument("invalid utf-8 in arg2 header"))?
        .to_owned();
    *buf = rest;
    Ok(text)
}

fn encode_json(headers: &Headers) -> Result<Bytes, Status> {
    let mut map = serde_json::Map::new();
    for (key, value) in headers.iter() {
        map.insert(key.to_owned(), serde_json::Value::String(value.to_owned()));
    }
    serde_json::to_vec(&map)
        .map(Bytes::from)
        .map_err(|error| Status::internal(format!("failed to encode json headers: {error}")))
}

fn decode_json(arg2: &[u8]) -> Result<Headers, Status> {
    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(arg2)
        .map_err(|error| Status::invalid_argument(format!("invalid json headers: {error}")))?;
    let mut headers = Headers::with_capacity(map.len());
    for (key, value) in map {
        let value = value
            .as_str()
            .ok_or_else(|| Status::invalid_argument("non-string json header value"))?;
        headers.set(&key, value);
    }
    Ok(headers)
}
