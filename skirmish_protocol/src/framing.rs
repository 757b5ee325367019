// Length-delimited message framing.
//
// Wire format: a 4-byte big-endian length prefix followed by a JSON payload.
// `write_frame`/`read_frame` move raw bytes; `send_json`/`recv_json` wrap them
// with serde_json encoding of protocol messages. All of it works over any
// `Read`/`Write`, so the same code serves blocking TCP streams and in-memory
// buffers in tests.
//
// `MAX_FRAME_SIZE` (4 MB) bounds the allocation a malformed length prefix can
// trigger. Full snapshots are the largest frames and stay far below it.

use std::io::{self, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Largest accepted frame payload.
pub const MAX_FRAME_SIZE: u32 = 4 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too large: {len} bytes (max {MAX_FRAME_SIZE})")]
    TooLarge { len: usize },
    #[error("frame i/o: {0}")]
    Io(#[from] io::Error),
    #[error("frame payload is not valid protocol JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl FrameError {
    /// True if the peer closed the stream (cleanly or mid-frame).
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

/// Write one frame: length prefix, payload, flush.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError> {
    let len = payload.len();
    let len_u32 = match u32::try_from(len) {
        Ok(n) if n <= MAX_FRAME_SIZE => n,
        _ => return Err(FrameError::TooLarge { len }),
    };
    writer.write_all(&len_u32.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame. `UnexpectedEof` if the stream closes before a full frame.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, FrameError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge { len: len as usize });
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Serialize `msg` to JSON and write it as one frame.
pub fn send_json<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> Result<(), FrameError> {
    let json = serde_json::to_vec(msg)?;
    write_frame(writer, &json)
}

/// Read one frame and decode it from JSON.
pub fn recv_json<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T, FrameError> {
    let bytes = read_frame(reader)?;
    Ok(serde_json::from_slice(&bytes)?)
}
