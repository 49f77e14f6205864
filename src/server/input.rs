//! Input framing for chat connections.
//!
//! TCP delivers an arbitrary chunking of the client's bytes. In line mode the
//! framer buffers bytes and hands out one message per terminated line; in
//! read mode every chunk is one message, as simple line-at-a-time clients
//! expect.

use crate::config::Framing;

const LF: u8 = b'\n';

/// Splits a connection's byte stream into chat messages.
#[derive(Debug)]
pub struct LineFramer {
    framing: Framing,
    buffer: Vec<u8>,
    max_line_bytes: usize,
}

impl LineFramer {
    /// Create a framer. `max_line_bytes` bounds an unterminated line.
    pub fn new(framing: Framing, max_line_bytes: usize) -> Self {
        Self {
            framing,
            buffer: Vec::with_capacity(max_line_bytes.min(1024)),
            max_line_bytes: max_line_bytes.max(1),
        }
    }

    /// Get the number of buffered bytes not yet part of a complete line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feed bytes read from the socket and collect complete messages.
    ///
    /// Lines keep their terminator. An unterminated line that reaches
    /// `max_line_bytes` is emitted up to the last complete UTF-8 character;
    /// a character cut by the limit stays buffered for the next message.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        match self.framing {
            Framing::Read => {
                if bytes.is_empty() {
                    Vec::new()
                } else {
                    vec![decode(bytes)]
                }
            }
            Framing::Line => self.push_lines(bytes),
        }
    }

    fn push_lines(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut messages = Vec::new();
        let mut scan_from = self.buffer.len();
        self.buffer.extend_from_slice(bytes);

        loop {
            match self.buffer[scan_from..].iter().position(|&b| b == LF) {
                Some(offset) => {
                    let end = scan_from + offset + 1;
                    let line: Vec<u8> = self.buffer.drain(..end).collect();
                    messages.push(decode(&line));
                    scan_from = 0;
                }
                None if self.buffer.len() >= self.max_line_bytes => {
                    let cut = char_boundary(&self.buffer, self.max_line_bytes);
                    let line: Vec<u8> = self.buffer.drain(..cut).collect();
                    messages.push(decode(&line));
                    scan_from = 0;
                }
                None => break,
            }
        }

        messages
    }
}

/// Largest cut at or below `limit` that does not split a UTF-8 character.
///
/// Invalid bytes are not a character to protect, and a limit smaller than the
/// first character is honoured as is so the buffer always shrinks.
fn char_boundary(bytes: &[u8], limit: usize) -> usize {
    match std::str::from_utf8(&bytes[..limit]) {
        Err(e) if e.error_len().is_none() && e.valid_up_to() > 0 => e.valid_up_to(),
        _ => limit,
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
