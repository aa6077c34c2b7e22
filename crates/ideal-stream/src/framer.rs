//! Splits the raw response body into newline-terminated lines.

/// Splits `remainder + chunk` on `\n`. Every piece but the last is a complete
/// line; the last piece (possibly empty) is returned as the new remainder.
pub fn frame(remainder: &str, chunk: &str) -> (Vec<String>, String) {
    let combined = format!("{}{}", remainder, chunk);
    let mut pieces: Vec<String> = combined.split('\n').map(str::to_string).collect();
    let new_remainder = pieces.pop().unwrap_or_default();
    (pieces, new_remainder)
}

/// Decodes as much of `byte_buffer` as possible, leaving an incomplete
/// multi-byte sequence at the end in the buffer for the next chunk.
/// Invalid sequences in the middle are replaced with U+FFFD.
fn decode_utf8_streaming(byte_buffer: &mut Vec<u8>) -> String {
    let mut decoded = String::new();
    loop {
        match std::str::from_utf8(byte_buffer) {
            Ok(s) => {
                decoded.push_str(s);
                byte_buffer.clear();
                return decoded;
            }
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                decoded.push_str(&String::from_utf8_lossy(&byte_buffer[..valid_up_to]));
                match e.error_len() {
                    Some(invalid_len) => {
                        decoded.push(char::REPLACEMENT_CHARACTER);
                        byte_buffer.drain(..valid_up_to + invalid_len);
                    }
                    None => {
                        // Incomplete sequence, wait for more bytes
                        byte_buffer.drain(..valid_up_to);
                        return decoded;
                    }
                }
            }
        }
    }
}

/// Holds the partial trailing line (and any partial UTF-8 sequence) between
/// network chunks.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending_bytes: Vec<u8>,
    remainder: String,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the lines it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending_bytes.extend_from_slice(chunk);
        let text = decode_utf8_streaming(&mut self.pending_bytes);

        // Only the new text is scanned; the held line is joined once it completes
        let Some(newline) = text.find('\n') else {
            self.remainder.push_str(&text);
            return Vec::new();
        };
        self.remainder.push_str(&text[..newline]);
        let (lines, remainder) = frame(&std::mem::take(&mut self.remainder), &text[newline..]);
        self.remainder = remainder;
        lines
    }

    /// The partial line currently held back.
    pub fn remainder(&self) -> &str {
        &self.remainder
    }

    /// Ends the stream. Returns the trailing unterminated line, unless it is
    /// blank. Leftover bytes that never formed valid UTF-8 are decoded lossily.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending_bytes.is_empty() {
            self.remainder
                .push_str(&String::from_utf8_lossy(&self.pending_bytes));
            self.pending_bytes.clear();
        }

        let line = std::mem::take(&mut self.remainder);
        if line.trim().is_empty() {
            None
        } else {
            Some(line)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_contract() {
        let (lines, rest) = frame("{\"a\":", "1}\n{\"b\":2}\n{\"c\"");
        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
        assert_eq!(rest, "{\"c\"");

        let (lines, rest) = frame("", "complete\n");
        assert_eq!(lines, vec!["complete"]);
        assert_eq!(rest, "");

        let (lines, rest) = frame("partial", "");
        assert!(lines.is_empty());
        assert_eq!(rest, "partial");
    }

    #[test]
    fn test_empty_lines_are_kept_in_order() {
        let (lines, rest) = frame("", "a\n\nb\n");
        assert_eq!(lines, vec!["a", "", "b"]);
        assert_eq!(rest, "");
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"{\"role\":\"assis").is_empty());
        assert_eq!(framer.remainder(), "{\"role\":\"assis");

        let lines = framer.push(b"tant\"}\nnext");
        assert_eq!(lines, vec!["{\"role\":\"assistant\"}"]);
        assert_eq!(framer.remainder(), "next");
    }

    #[test]
    fn test_long_line_in_tiny_chunks() {
        let content = "x".repeat(50_000);
        let body = format!("{}\nnext", content);
        let mut framer = LineFramer::new();
        let mut lines = Vec::new();
        for chunk in body.as_bytes().chunks(3) {
            lines.extend(framer.push(chunk));
        }
        assert_eq!(lines, vec![content]);
        assert_eq!(framer.remainder(), "next");
    }

    #[test]
    fn test_several_lines_in_one_chunk_after_partial() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"par").is_empty());
        assert_eq!(framer.push(b"tial\nmid\n\nend"), vec!["partial", "mid", ""]);
        assert_eq!(framer.remainder(), "end");
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let bytes = "héllo\n".as_bytes();
        // Split inside the two-byte 'é'
        let mut framer = LineFramer::new();
        assert!(framer.push(&bytes[..2]).is_empty());
        let lines = framer.push(&bytes[2..]);
        assert_eq!(lines, vec!["héllo"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"ab\xFFcd\n");
        assert_eq!(lines, vec!["ab\u{FFFD}cd"]);
    }

    #[test]
    fn test_finish_returns_trailing_line() {
        let mut framer = LineFramer::new();
        framer.push(b"line one\nline two");
        assert_eq!(framer.finish().as_deref(), Some("line two"));
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn test_finish_skips_blank_remainder() {
        let mut framer = LineFramer::new();
        framer.push(b"line\n   ");
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn test_finish_decodes_truncated_bytes_lossily() {
        let mut framer = LineFramer::new();
        // First byte of a two-byte sequence, never completed
        framer.push(b"abc\xC3");
        assert_eq!(framer.finish().as_deref(), Some("abc\u{FFFD}"));
    }
}
