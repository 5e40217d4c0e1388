// src/pipeline/lines.rs

//! Reassembles stdout chunks into lines.
//!
//! The OS hands out reads of arbitrary size: one read may carry several lines,
//! and one line (or one UTF-8 character) may straddle two reads. Bytes are
//! buffered until a `\n` is seen, so decoding and error matching always work
//! on whole lines.

/// Strip one trailing `\n` or `\r\n`.
pub fn strip_line_terminator(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

/// Incremental `\n` splitter over raw bytes.
#[derive(Debug, Clone, Default)]
pub struct LineFramer {
    partial: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held back waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.partial.len()
    }

    /// Feed one chunk; returns the lines it completed, terminators stripped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(chunk);

        let Some(last_newline) = self.partial.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);

        complete
            .split_inclusive(|b| *b == b'\n')
            .map(decode_line)
            .collect()
    }

    /// Take the unterminated remainder, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.partial);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    strip_line_terminator(&String::from_utf8_lossy(bytes)).to_string()
}
