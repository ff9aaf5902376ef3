//! Newline splitting for streamed HTTP bodies.

use crate::error::{Error, Result};

/// Longest line kept before the stream is treated as broken.
pub(crate) const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Accumulates body chunks and yields complete lines.
///
/// Chunk boundaries may fall anywhere, including inside a multi-byte
/// character or between `\r` and `\n`.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
    /// Bytes of `buf` already known to hold no newline
    scanned: usize,
}

impl LineBuffer {
    /// Feed a chunk and return the lines it completed, without terminators.
    ///
    /// Fails once an unterminated line grows past [`MAX_LINE_BYTES`]; the
    /// buffer is emptied so it can be reused on a fresh connection.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[start + self.scanned..]
            .iter()
            .position(|b| *b == b'\n')
        {
            let end = start + self.scanned + offset;
            let mut line = &self.buf[start..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            lines.push(String::from_utf8_lossy(line).into_owned());
            start = end + 1;
            self.scanned = 0;
        }
        self.buf.drain(..start);
        self.scanned = self.buf.len();

        if self.buf.len() > MAX_LINE_BYTES {
            self.clear();
            return Err(Error::Protocol(format!(
                "line longer than {MAX_LINE_BYTES} bytes"
            )));
        }
        Ok(lines)
    }

    /// Drop any partial line.
    pub(crate) fn clear(&mut self) {
        self.buf.clear();
        self.scanned = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_across_chunks() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"data: {\"a\"").unwrap().is_empty());
        assert_eq!(
            buffer.push(b":1}\r\n\r\nnext").unwrap(),
            vec!["data: {\"a\":1}", ""]
        );
        assert_eq!(buffer.push(b"\n").unwrap(), vec!["next"]);
    }

    #[test]
    fn test_split_multibyte_char() {
        let mut buffer = LineBuffer::default();
        let text = "Åhléns\n".as_bytes();
        assert!(buffer.push(&text[..1]).unwrap().is_empty());
        assert_eq!(buffer.push(&text[1..]).unwrap(), vec!["Åhléns"]);
    }

    #[test]
    fn test_crlf_split_between_chunks() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"one\r").unwrap().is_empty());
        assert_eq!(buffer.push(b"\ntwo\n").unwrap(), vec!["one", "two"]);
    }

    #[test]
    fn test_endless_line_is_rejected_and_buffer_reset() {
        let mut buffer = LineBuffer::default();
        let chunk = vec![b'x'; 64 * 1024];
        let mut failed = false;
        for _ in 0..(MAX_LINE_BYTES / chunk.len() + 1) {
            match buffer.push(&chunk) {
                Ok(lines) => assert!(lines.is_empty()),
                Err(e) => {
                    assert!(matches!(e, Error::Protocol(_)), "{e}");
                    failed = true;
                    break;
                }
            }
        }
        assert!(failed);

        // Usable again afterwards.
        assert_eq!(buffer.push(b"ok\n").unwrap(), vec!["ok"]);
    }
}
