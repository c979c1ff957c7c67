//! SSE framing for the notification stream.
//!
//! Server side: [`encode_data`] renders the JSON payload axum writes as the
//! `data:` line of each frame. Client side: [`FrameDecoder`] accepts
//! arbitrary byte chunks, reassembles lines, and yields one decoded event per
//! complete frame. Comment lines (`: keep-alive`), `event:`/`id:`/`retry:`
//! fields and frames that fail to parse are skipped without ending the stream.

use crate::models::event::NotificationEvent;

/// Longest line the decoder buffers while waiting for a newline.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

pub fn encode_data(event: &NotificationEvent) -> serde_json::Result<String> {
    serde_json::to_string(event)
}

#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes received after the last newline.
    partial: Vec<u8>,
    /// Prefix of `partial` already known to hold no newline.
    scanned: usize,
    /// `data:` lines of the frame being assembled.
    data: Vec<String>,
    malformed: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk from the transport; returns every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<NotificationEvent> {
        self.partial.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(offset) = self.partial[self.scanned..].iter().position(|b| *b == b'\n') {
            let pos = self.scanned + offset;
            let raw: Vec<u8> = self.partial.drain(..=pos).collect();
            self.scanned = 0;

            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.finish_frame() {
                    events.push(event);
                }
                continue;
            }

            if line.starts_with(':') {
                continue;
            }

            if let Some(payload) = line.strip_prefix("data:") {
                self.data
                    .push(payload.strip_prefix(' ').unwrap_or(payload).to_string());
            }
        }
        self.scanned = self.partial.len();

        if self.partial.len() > MAX_LINE_BYTES {
            tracing::warn!(
                pending = self.partial.len(),
                limit = MAX_LINE_BYTES,
                "notification line exceeds limit, discarding frame"
            );
            self.malformed += 1;
            self.reset();
        }

        events
    }

    /// Number of frames dropped because their payload did not parse or a
    /// line ran past [`MAX_LINE_BYTES`].
    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    /// Drop any half-received frame, e.g. after a reconnect.
    pub fn reset(&mut self) {
        self.partial.clear();
        self.scanned = 0;
        self.data.clear();
    }

    fn finish_frame(&mut self) -> Option<NotificationEvent> {
        if self.data.is_empty() {
            return None;
        }
        let payload = self.data.join("\n");
        self.data.clear();

        match serde_json::from_str::<NotificationEvent>(&payload) {
            Ok(event) => Some(event),
            Err(e) => {
                self.malformed += 1;
                tracing::warn!(error = %e, "skipping malformed notification frame");
                None
            }
        }
    }
}
