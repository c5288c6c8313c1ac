//! Incremental reader for `text/event-stream` response bodies.
//!
//! Chunks arrive with arbitrary boundaries, so complete lines are cut out of a
//! byte buffer and the unterminated tail is kept for the next chunk. Lines are
//! folded into events by [`SseEventParser`]; the first event whose `data`
//! payload answers the request ends the read.

use crate::error::UpstreamError;
use crate::protocol::ResponseEnvelope;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseEventParser {
    current_event: Option<String>,
    data: String,
    has_data: bool,
}

impl SseEventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line (without its terminator). Returns an event when `line`
    /// is the blank line that closes it.
    pub fn feed_line(&mut self, raw_line: &str) -> Option<SseEvent> {
        let line = raw_line.trim_end_matches(['\r', '\n']);

        if line.is_empty() {
            if self.current_event.is_none() && !self.has_data {
                return None;
            }
            self.has_data = false;
            return Some(SseEvent {
                event_type: self.current_event.take(),
                data: std::mem::take(&mut self.data),
            });
        }

        if line.starts_with(':') {
            return None;
        }

        if let Some(stripped) = line.strip_prefix("event:") {
            let value = stripped.trim_start();
            self.current_event = (!value.is_empty()).then(|| value.to_string());
            return None;
        }

        if let Some(stripped) = line.strip_prefix("data:") {
            if self.has_data {
                self.data.push('\n');
            }
            self.data.push_str(stripped.trim_start());
            self.has_data = true;
        }

        None
    }

    /// Closes an event left open by a stream that ended without a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        self.feed_line("")
    }
}

/// Splits a byte stream into lines, holding back a trailing fragment.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Bytes of `pending` already known to contain no newline.
    scanned: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[self.scanned..].iter().position(|&b| b == b'\n') {
            let end = self.scanned + offset;
            let line = String::from_utf8_lossy(&self.pending[start..end]);
            lines.push(line.trim_end_matches('\r').to_string());
            start = end + 1;
            self.scanned = start;
        }
        self.pending.drain(..start);
        self.scanned = self.pending.len();
        lines
    }

    /// Returns the unterminated remainder, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        self.scanned = 0;
        let raw = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string())
    }
}

fn answer_from_event(event: &SseEvent) -> Result<Option<ResponseEnvelope>, UpstreamError> {
    if event.data.trim().is_empty() {
        return Ok(None);
    }
    let value: Value = match serde_json::from_str(&event.data) {
        Ok(value) => value,
        Err(e) => {
            debug!(event_type = ?event.event_type, "Skipping undecodable event payload: {}", e);
            return Ok(None);
        }
    };
    if !ResponseEnvelope::is_answer(&value) {
        debug!(event_type = ?event.event_type, "Skipping event that is not a response");
        return Ok(None);
    }
    ResponseEnvelope::from_value(value).map(Some)
}

/// Reads `stream` until the first event that answers the request.
///
/// The remaining stream is dropped as soon as the answer is found, which
/// cancels the underlying body.
pub async fn read_first_answer<S, B, E>(stream: S) -> Result<ResponseEnvelope, UpstreamError>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<UpstreamError>,
{
    futures::pin_mut!(stream);
    let mut lines = LineBuffer::new();
    let mut parser = SseEventParser::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(Into::into)?;
        for line in lines.push(chunk.as_ref()) {
            if let Some(event) = parser.feed_line(&line)
                && let Some(answer) = answer_from_event(&event)?
            {
                return Ok(answer);
            }
        }
    }

    if let Some(line) = lines.finish()
        && let Some(event) = parser.feed_line(&line)
        && let Some(answer) = answer_from_event(&event)?
    {
        return Ok(answer);
    }
    if let Some(event) = parser.finish()
        && let Some(answer) = answer_from_event(&event)?
    {
        return Ok(answer);
    }

    Err(UpstreamError::Protocol(
        "stream ended without a result".to_string(),
    ))
}
