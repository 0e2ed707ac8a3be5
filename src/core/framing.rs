//! Rendering of received bytes
//!
//! In text framing the bytes are decoded as UTF-8. Malformed input never
//! raises: the offending chunk is shown as `[<escaped bytes>]` so nothing
//! received is silently dropped. A multi-byte sequence cut off at the end of
//! a read is held back until the next read completes it.
//!
//! In binary framing every byte becomes `0xNN ` (lower-case hex, trailing
//! space included).

use std::fmt::Write as _;

/// Longest possible incomplete UTF-8 tail
const MAX_UTF8_TAIL: usize = 3;

/// How received bytes are presented
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Framing {
    #[default]
    Text,
    Binary,
}

impl Framing {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "text" | "utf8" | "utf-8" => Some(Framing::Text),
            "binary" | "bin" | "hex" => Some(Framing::Binary),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Framing::Text => "text",
            Framing::Binary => "binary",
        }
    }
}

/// Stateful decoder turning received chunks into display text
#[derive(Debug, Default)]
pub struct Decoder {
    framing: Framing,
    /// Incomplete UTF-8 sequence from the previous chunk
    pending: Vec<u8>,
}

impl Decoder {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            pending: Vec::new(),
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Decode one received chunk. Returns an empty string only when every
    /// byte was held back as an incomplete sequence.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        match self.framing {
            Framing::Text => self.decode_text(bytes),
            Framing::Binary => hex_dump(bytes),
        }
    }

    /// Release a held-back tail that was never completed, rendered as
    /// malformed. Called when a poll brings no new bytes and on close.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.pending);
        Some(malformed(&tail))
    }

    fn decode_text(&mut self, bytes: &[u8]) -> String {
        let mut data = std::mem::take(&mut self.pending);
        data.extend_from_slice(bytes);

        match std::str::from_utf8(&data) {
            Ok(text) => text.to_string(),
            Err(e) if e.error_len().is_none() && data.len() - e.valid_up_to() <= MAX_UTF8_TAIL => {
                // Sequence truncated by the read boundary
                let valid = e.valid_up_to();
                self.pending = data.split_off(valid);
                // Safe: the prefix was validated above
                String::from_utf8(data).unwrap_or_default()
            }
            Err(_) => malformed(&data),
        }
    }
}

/// Bracketed escaped representation of bytes that are not valid UTF-8
pub fn malformed(bytes: &[u8]) -> String {
    format!("[{}]", bytes.escape_ascii())
}

/// `0x23 0x42 ` style dump
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 5);
    for byte in bytes {
        let _ = write!(out, "0x{:02x} ", byte);
    }
    out
}
