//! Chunked message framing.
//!
//! A Bolt message on the wire is split into one or more chunks, each
//! prefixed with a big-endian `u16` length, and terminated by a zero-length
//! chunk. Splitting is purely a transport concern — it has nothing to do
//! with PackStream value boundaries, so a chunk can (and in practice often
//! does) split a value in half.

use bytes::{Bytes, BytesMut};

use crate::config::CodecConfig;

/// A zero-length chunk marks the end of a message.
pub const END_MARKER: [u8; 2] = [0x00, 0x00];

/// Splits an encoded message into length-prefixed chunks, writing them to an
/// output buffer.
///
/// Used on both sides: the client chunks outgoing `RUN`/`PULL_ALL` messages,
/// the server chunks outgoing `SUCCESS`/`RECORD`/`FAILURE` messages.
pub struct ChunkWriter {
    max_chunk_size: u16,
}

impl ChunkWriter {
    pub fn new(config: &CodecConfig) -> Self {
        ChunkWriter {
            max_chunk_size: config.max_chunk_size,
        }
    }

    /// Append `message` to `out` as one or more length-prefixed chunks,
    /// followed by the end-of-message marker.
    pub fn write_message(&self, message: &[u8], out: &mut Vec<u8>) {
        let max = self.max_chunk_size as usize;
        if message.is_empty() {
            // A message with no bytes still needs a single empty chunk so
            // the end marker that follows isn't mistaken for "no message".
            out.extend_from_slice(&0u16.to_be_bytes());
        } else {
            for piece in message.chunks(max.max(1)) {
                out.extend_from_slice(&(piece.len() as u16).to_be_bytes());
                out.extend_from_slice(piece);
            }
        }
        out.extend_from_slice(&END_MARKER);
    }
}

/// Reassembles chunks back into complete messages, byte by byte, so it can
/// be fed directly from an `AsyncRead` without needing to know in advance
/// how many bytes are available.
#[derive(Debug)]
pub struct ChunkReader {
    state: ReadState,
    message: BytesMut,
}

#[derive(Debug)]
enum ReadState {
    ReadingLenHi,
    ReadingLenLo { hi: u8 },
    ReadingPayload { remaining: u16 },
}

impl Default for ChunkReader {
    fn default() -> Self {
        ChunkReader {
            state: ReadState::ReadingLenHi,
            message: BytesMut::new(),
        }
    }
}

impl ChunkReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte of wire data. Returns `Some(message)` when a
    /// zero-length chunk completes a message, taking ownership of the
    /// accumulated bytes and resetting internal state for the next message.
    pub fn feed_byte(&mut self, byte: u8) -> Option<Bytes> {
        match self.state {
            ReadState::ReadingLenHi => {
                self.state = ReadState::ReadingLenLo { hi: byte };
                None
            }
            ReadState::ReadingLenLo { hi } => {
                let len = u16::from_be_bytes([hi, byte]);
                if len == 0 {
                    self.state = ReadState::ReadingLenHi;
                    if self.message.is_empty() {
                        // no-op chunk before any payload; not a message end
                        None
                    } else {
                        Some(std::mem::take(&mut self.message).freeze())
                    }
                } else {
                    self.state = ReadState::ReadingPayload { remaining: len };
                    None
                }
            }
            ReadState::ReadingPayload { remaining } => {
                self.message.extend_from_slice(&[byte]);
                let remaining = remaining - 1;
                if remaining == 0 {
                    self.state = ReadState::ReadingLenHi;
                } else {
                    self.state = ReadState::ReadingPayload { remaining };
                }
                None
            }
        }
    }

    /// Feed a slice of wire bytes, returning every complete message found.
    /// A single read from the socket can contain more than one message, or
    /// a fraction of one — this drains as many complete messages as the
    /// slice yields.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Bytes> {
        let mut messages = Vec::new();
        for &b in bytes {
            if let Some(msg) = self.feed_byte(b) {
                messages.push(msg);
            }
        }
        messages
    }
}
