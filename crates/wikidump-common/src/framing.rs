//! Line-number framing for queued dump payloads
//!
//! A frame is a 4-byte little-endian line number followed by the opaque
//! payload bytes. Producers tag each dump line before handing it to a worker
//! so the worker can report its position back to the checkpoint.

use crate::error::{CommonError, Result};

/// Size of the line-number prefix in bytes
pub const LINE_NUMBER_LEN: usize = 4;

/// Prefix `payload` with `line_number`
pub fn add_line_number(line_number: u32, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(LINE_NUMBER_LEN + payload.len());
    frame.extend_from_slice(&line_number.to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Split a frame into its line number and payload
pub fn parse_line_number(frame: &[u8]) -> Result<(u32, &[u8])> {
    let Some((prefix, payload)) = frame.split_first_chunk::<LINE_NUMBER_LEN>() else {
        return Err(CommonError::Framing(format!(
            "data too short to contain line number: {} bytes",
            frame.len()
        )));
    };
    Ok((u32::from_le_bytes(*prefix), payload))
}
