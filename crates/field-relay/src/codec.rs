//! N3FJP relay framing
//!
//! A frame is a start sentinel, a UTF-16LE body and an end sentinel:
//!
//! ```text
//! 00 01 | <BAMS><STATION>K1LI</STATION>...</BAMS> (UTF-16LE) | 00 03 00 04 00 07
//! ```
//!
//! The end sentinel alone terminates a frame. The start sentinel is optional:
//! some clients omit it, and a body may legitimately contain U+0100, whose
//! code unit encodes as `00 01`. A frame that never ends runs on into the
//! next one until the buffer cap is reached.

use std::collections::VecDeque;

use tracing::{debug, warn};

/// Start of record
pub const BOR: [u8; 2] = [0x00, 0x01];

/// End of record
pub const EOR: [u8; 6] = [0x00, 0x03, 0x00, 0x04, 0x00, 0x07];

/// End of record as UTF-16LE code units
const EOR_UNITS: [u16; 3] = [0x0300, 0x0400, 0x0700];

/// Buffered bytes allowed without a frame boundary
pub const MAX_BUFFER: usize = 64 * 1024;

/// Per-peer frame splitter
///
/// Push raw socket bytes in with [`push_bytes`](Self::push_bytes) and take
/// complete frames out with [`next_frame`](Self::next_frame). Frames are
/// returned verbatim (sentinels included) so they can be relayed unchanged.
/// Bytes wait in the buffer until an end sentinel arrives.
#[derive(Debug, Default)]
pub struct RelayFrameCodec {
    buffer: Vec<u8>,
    frames: VecDeque<Vec<u8>>,
}

impl RelayFrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push raw bytes into the codec buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        self.split_frames();
    }

    /// Extract the next complete frame, if available
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        self.frames.pop_front()
    }

    /// Bytes held back waiting for a frame boundary
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop buffered bytes and pending frames
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.frames.clear();
    }

    fn split_frames(&mut self) {
        while let Some(pos) = find(&self.buffer, &EOR) {
            let end = pos + EOR.len();
            let start = frame_start(&self.buffer[..pos]);
            if start > 0 {
                debug!("Discarding {} bytes before frame start", start);
            }
            let frame: Vec<u8> = self.buffer.drain(..end).skip(start).collect();
            self.frames.push_back(frame);
        }

        if self.buffer.len() > MAX_BUFFER {
            warn!(
                "Discarding {} buffered bytes without a frame boundary",
                self.buffer.len()
            );
            self.buffer.clear();
        }
    }
}

/// Offset where the frame ending at the end of `record` begins
///
/// A record opening with a start sentinel, or holding none on a code unit
/// boundary, is a frame as a whole. Otherwise the bytes before the first
/// aligned start sentinel are noise.
fn frame_start(record: &[u8]) -> usize {
    if record.starts_with(&BOR) {
        return 0;
    }
    (0..record.len().saturating_sub(1))
        .find(|&i| record[i..].starts_with(&BOR) && (record.len() - i) % 2 == 0)
        .unwrap_or(0)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Wrap a message body in relay framing
pub fn encode_frame(body: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(BOR.len() + body.len() * 2 + EOR.len());
    frame.extend_from_slice(&BOR);
    for unit in body.encode_utf16() {
        frame.extend_from_slice(&unit.to_le_bytes());
    }
    frame.extend_from_slice(&EOR);
    frame
}

/// Decode the text body of a frame
///
/// Strips the start sentinel if present, stops at the end sentinel or a NUL
/// code unit, and trims whitespace. Invalid UTF-16 is replaced.
pub fn decode_body(frame: &[u8]) -> String {
    let body = frame.strip_prefix(&BOR[..]).unwrap_or(frame);
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    let mut end = units.len();
    for (i, unit) in units.iter().enumerate() {
        if *unit == 0 || units[i..].starts_with(&EOR_UNITS) {
            end = i;
            break;
        }
    }

    String::from_utf16_lossy(&units[..end]).trim().to_string()
}
