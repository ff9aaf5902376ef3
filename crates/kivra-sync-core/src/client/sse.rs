//! Incremental Server-Sent Events decoder.

use crate::error::Result;
use crate::lines::LineBuffer;

/// Turns body chunks into event payloads.
///
/// Only `data:` fields are kept; several in one event are joined with `\n`.
/// Comments, `event:`, `id:` and `retry:` fields are ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    lines: LineBuffer,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed a chunk and return the payloads of the events it completed.
    ///
    /// Fails when the server sends an oversized line; the decoder is reset.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        let lines = match self.lines.push(chunk) {
            Ok(lines) => lines,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };

        let mut events = Vec::new();
        for line in lines {
            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }
            if let Some(rest) = line.strip_prefix("data:") {
                self.data
                    .push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            }
        }
        Ok(events)
    }

    /// Drop any partial event, e.g. after the connection was replaced.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b"data: {\"status\":\"idle\"}\n\n").unwrap();
        assert_eq!(events, vec![r#"{"status":"idle"}"#]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"heart").unwrap().is_empty());
        assert!(decoder.push(b"beat\":true}\n").unwrap().is_empty());
        assert_eq!(decoder.push(b"\n").unwrap(), vec![r#"{"heartbeat":true}"#]);
    }

    #[test]
    fn test_comments_and_other_fields_ignored() {
        let mut decoder = SseDecoder::default();
        let events = decoder
            .push(b": keep-alive\n\nevent: status\nid: 7\ndata:a\ndata: b\n\n")
            .unwrap();
        assert_eq!(events, vec!["a\nb"]);
    }

    #[test]
    fn test_reset_drops_partial_event() {
        let mut decoder = SseDecoder::default();
        decoder.push(b"data: partial\n").unwrap();
        decoder.reset();
        assert!(decoder.push(b"\n").unwrap().is_empty());
    }

    #[test]
    fn test_oversized_line_fails_and_resets() {
        let mut decoder = SseDecoder::default();
        decoder.push(b"data: kept\n").unwrap();
        let endless = vec![b'a'; crate::lines::MAX_LINE_BYTES + 1];
        assert!(decoder.push(&endless).is_err());
        // Neither the partial event nor the long line survive.
        assert!(decoder.push(b"\n").unwrap().is_empty());
        assert_eq!(decoder.push(b"data: next\n\n").unwrap(), vec!["next"]);
    }
}
