//! Incremental Server-Sent-Events decoder for streamed chat completions.
//!
//! The decoder is a plain state machine ([`SseDecoder`]) fed with raw network
//! chunks; [`delta_stream`] drives it from an HTTP body and turns it into a
//! lazy stream of text deltas.
//!
//! Framing rules:
//! - events are separated by a blank line (`"\n\n"`);
//! - every `data:` line inside an event is handled on its own, lines of one
//!   event are never joined into a single payload;
//! - a `[DONE]` payload ends the stream, anything buffered after it is dropped;
//! - a payload that is not valid JSON is skipped without ending the stream.

use std::time::Duration;

use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::debug;

use super::client::TransportError;

const EVENT_DELIMITER: &str = "\n\n";
const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// A single SSE payload that could not be decoded. Recovered locally.
#[derive(Debug, thiserror::Error)]
#[error("malformed event payload: {source}")]
pub struct DecodeError {
    #[from]
    source: serde_json::Error,
}

/// UTF-8 decoder that keeps an incomplete trailing code point for the next
/// chunk instead of corrupting it.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid);
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more bytes.
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Number of bytes held back waiting for the rest of a code point.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Decoder state for one streaming response.
#[derive(Debug, Default)]
pub struct SseDecoder {
    utf8: Utf8Decoder,
    buffer: String,
    /// Bytes of `buffer` already searched for a delimiter.
    scanned: usize,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the `[DONE]` sentinel was seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one network chunk and return the deltas of every event it completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut deltas = Vec::new();
        if self.done {
            return deltas;
        }
        let text = self.utf8.decode(bytes);
        self.buffer.push_str(&text);

        while let Some(idx) = self.next_delimiter() {
            let block: String = self.buffer[..idx].trim().to_string();
            self.buffer.drain(..idx + EVENT_DELIMITER.len());
            self.scanned = 0;
            if block.is_empty() {
                continue;
            }
            for line in block.split('\n') {
                let Some(payload) = data_payload(line) else {
                    continue;
                };
                if payload == DONE_SENTINEL {
                    self.done = true;
                    self.buffer.clear();
                    return deltas;
                }
                match parse_payload(payload) {
                    Ok(Some(delta)) => deltas.push(delta),
                    Ok(None) => {}
                    Err(err) => debug!(%err, "Skipping SSE event"),
                }
            }
        }
        deltas
    }

    /// Byte index of the next delimiter, resuming where the last search
    /// stopped. A delimiter may straddle the previous end of the buffer.
    fn next_delimiter(&mut self) -> Option<usize> {
        let delimiter = EVENT_DELIMITER.as_bytes();
        let start = self.scanned;
        let found = self.buffer.as_bytes()[start..]
            .windows(delimiter.len())
            .position(|window| window == delimiter)
            .map(|pos| start + pos);
        if found.is_none() {
            self.scanned = self.buffer.len().saturating_sub(delimiter.len() - 1);
        }
        found
    }

    /// Best-effort parse of whatever is left once the body ends.
    pub fn finish(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        self.done = true;
        if self.utf8.pending_len() > 0 {
            debug!(bytes = self.utf8.pending_len(), "Dropping incomplete UTF-8 tail");
        }
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            return None;
        }
        let payload = match rest.strip_prefix(DATA_PREFIX) {
            Some(stripped) => stripped.trim_start(),
            None => rest.as_str(),
        };
        match parse_payload(payload.trim()) {
            Ok(delta) => delta,
            Err(err) => {
                debug!(%err, "Discarding unterminated SSE tail");
                None
            }
        }
    }
}

/// `data:` payload of a line, with the whitespace after the colon removed.
fn data_payload(line: &str) -> Option<&str> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    line.strip_prefix(DATA_PREFIX).map(str::trim_start)
}

fn parse_payload(payload: &str) -> Result<Option<String>, DecodeError> {
    let json: Value = serde_json::from_str(payload)?;
    Ok(extract_delta(&json).map(str::to_string))
}

/// Incremental content of the first choice, falling back to the full message.
pub fn extract_delta(json: &Value) -> Option<&str> {
    let choice = json.get("choices")?.get(0)?;
    [choice.pointer("/delta/content"), choice.pointer("/message/content")]
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|text| !text.is_empty())
}

/// Decode an HTTP body into text deltas.
///
/// With `idle_timeout`, waiting longer than that for the next chunk fails the
/// stream with [`TransportError::Timeout`].
pub fn delta_stream<S, B, E>(
    body: S,
    idle_timeout: Option<Duration>,
) -> impl Stream<Item = Result<String, TransportError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<TransportError> + Send,
{
    async_stream::try_stream! {
        let mut body = std::pin::pin!(body);
        let mut decoder = SseDecoder::new();
        loop {
            let next = match idle_timeout {
                Some(limit) => tokio::time::timeout(limit, body.next())
                    .await
                    .map_err(|_| TransportError::Timeout(limit))?,
                None => body.next().await,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(Into::<TransportError>::into)?;
            for delta in decoder.push(chunk.as_ref()) {
                yield delta;
            }
            if decoder.is_done() {
                break;
            }
        }
        if let Some(delta) = decoder.finish() {
            yield delta;
        }
    }
}
