//! Incremental decoding of the primary backend's line-oriented event stream.
//!
//! [`LineProtocolDecoder`] is the transport-agnostic half: append bytes,
//! scan for the `\n` delimiter, carry the trailing partial line over to the
//! next chunk, flush once at end-of-input. [`decode_event_line`] is the
//! grammar half: `data: `-prefixed payloads, the completion sentinel, JSON
//! parsing, and extraction of the nested text field. Malformed payloads are
//! skipped, never fatal.

use serde::Deserialize;

/// Literal payload prefix of the event protocol.
pub const DATA_PREFIX: &str = "data: ";
/// Sentinel payload marking stream completion; carries no text.
pub const COMPLETION_SENTINEL: &str = "[DONE]";

/// Incremental byte-to-line decoder.
///
/// Only complete (`\n`-terminated) lines are ever returned from
/// [`push`](Self::push); a trailing partial line is buffered and prefixed to
/// the next chunk. A trailing `\r` is stripped from every line. Call
/// [`finish`](Self::finish) exactly once at end-of-input to flush a final
/// unterminated line.
///
/// # Examples
///
/// ```
/// use astrochat::decoder::LineProtocolDecoder;
///
/// let mut decoder = LineProtocolDecoder::new();
/// assert!(decoder.push(b"hel").is_empty());
/// assert_eq!(decoder.push(b"lo\r\nwor"), vec!["hello".to_string()]);
/// assert_eq!(decoder.finish(), Some("wor".to_string()));
/// ```
#[derive(Debug, Default)]
pub struct LineProtocolDecoder {
    buf: Vec<u8>,
}

impl LineProtocolDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Flush the trailing partial line, if any. Consumes the decoder; at
    /// end-of-input remaining bytes are treated as a final line.
    #[must_use]
    pub fn finish(self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let mut line = self.buf;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// Apply the event grammar to one complete line, returning the text to emit.
///
/// Returns `None` for blank lines, comment lines (leading `:`), non-`data:`
/// lines, empty or sentinel payloads, unparseable JSON (logged and skipped),
/// and events without a non-empty `candidates[0].content.parts[0].text`.
#[must_use]
pub fn decode_event_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload.is_empty() || payload == COMPLETION_SENTINEL {
        return None;
    }

    let chunk: StreamChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(err) => {
            tracing::warn!(error = %err, "unparseable event payload; skipping line");
            return None;
        }
    };

    chunk
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.text)
        .filter(|text| !text.is_empty())
}
