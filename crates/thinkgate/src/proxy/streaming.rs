//! Newline-delimited JSON stream rewriting
//!
//! This module turns an upstream NDJSON byte stream into a filtered one:
//! - Reassembles lines split across transport chunks
//! - Runs each decoded line through a [`ResponseTransform`]
//! - Skips lines that are not valid JSON instead of aborting the stream
//! - Flushes held-back text when the upstream stream ends

use std::io;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::thinking::ResponseTransform;

/// Incremental NDJSON line rewriter for one response
#[derive(Debug)]
pub struct NdjsonTransformer {
    transform: ResponseTransform,
    pending: Vec<u8>,
    request_id: Uuid,
    skipped: usize,
}

impl NdjsonTransformer {
    pub fn new(transform: ResponseTransform, request_id: Uuid) -> Self {
        Self {
            transform,
            pending: Vec::new(),
            request_id,
            skipped: 0,
        }
    }

    /// Number of malformed lines dropped so far
    pub fn skipped_lines(&self) -> usize {
        self.skipped
    }

    /// Feed raw upstream bytes, returning the rewritten complete lines
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Bytes {
        self.pending.extend_from_slice(chunk);

        let mut out = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let line = self.pending[start..end].to_vec();
            self.process_line(&line, &mut out);
            start = end + 1;
        }
        self.pending.drain(..start);

        Bytes::from(out)
    }

    /// Handle end of the upstream stream.
    ///
    /// Processes a final line that had no trailing newline, then lets the
    /// transform release any text it was still holding back.
    pub fn finish(&mut self) -> Bytes {
        let mut out = Vec::new();

        let rest = std::mem::take(&mut self.pending);
        self.process_line(&rest, &mut out);

        if let Some(chunk) = self.transform.finish() {
            write_line(&chunk, &mut out);
        }

        if self.skipped > 0 {
            debug!(request_id = %self.request_id, skipped = self.skipped, "Stream finished with skipped lines");
        }
        Bytes::from(out)
    }

    fn process_line(&mut self, line: &[u8], out: &mut Vec<u8>) {
        let line = line.trim_ascii();
        if line.is_empty() {
            return;
        }

        let chunk: Value = match serde_json::from_slice(line) {
            Ok(value) => value,
            Err(e) => {
                self.skipped += 1;
                warn!(
                    request_id = %self.request_id,
                    error = %e,
                    line = %String::from_utf8_lossy(&line[..line.len().min(120)]),
                    "Skipping malformed stream line"
                );
                return;
            }
        };

        if let Some(chunk) = self.transform.transform_chunk(chunk) {
            write_line(&chunk, out);
        }
    }
}

fn write_line(chunk: &Value, out: &mut Vec<u8>) {
    // Serializing a Value cannot fail
    if serde_json::to_writer(&mut *out, chunk).is_ok() {
        out.push(b'\n');
    }
}

/// Wrap an upstream byte stream so every line passes through `transformer`.
///
/// Output chunks keep the arrival order of their input lines. An upstream
/// transport error ends the output stream with that error.
pub fn transform_stream<S, E>(
    upstream: S,
    transformer: NdjsonTransformer,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let state = Some((Box::pin(upstream), transformer));

    stream::unfold(state, |state| async move {
        let (mut upstream, mut transformer) = state?;
        loop {
            match upstream.next().await {
                Some(Ok(chunk)) => {
                    let out = transformer.push_bytes(&chunk);
                    if !out.is_empty() {
                        return Some((Ok(out), Some((upstream, transformer))));
                    }
                }
                Some(Err(e)) => {
                    warn!(request_id = %transformer.request_id, error = %e, "Upstream stream failed");
                    return Some((Err(io::Error::other(e)), None));
                }
                None => {
                    let out = transformer.finish();
                    return (!out.is_empty()).then_some((Ok(out), None));
                }
            }
        }
    })
}
