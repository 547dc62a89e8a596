//! Turning raw session bytes into display text, and retaining a bounded copy.

use regex::Regex;
use std::sync::OnceLock;

// ── ANSI stripping ──

const ANSI_PATTERN: &str = concat!(
    r"\x1b\[[0-?]*[ -/]*[@-~]",           // CSI: colors, cursor movement
    r"|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)", // OSC: window titles, hyperlinks
    r"|\x1b[()][0-9A-Za-z]",               // charset selection
    r"|\x1b[0-?@-Z\\-_]",                  // two-byte escapes
);

fn ansi_regex() -> Option<&'static Regex> {
    static ANSI: OnceLock<Option<Regex>> = OnceLock::new();
    ANSI.get_or_init(|| Regex::new(ANSI_PATTERN).ok()).as_ref()
}

/// Remove terminal escape sequences. Display only: retained buffers keep them.
pub fn strip_ansi(text: &str) -> String {
    if !text.contains('\x1b') {
        return text.to_string();
    }
    match ansi_regex() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

/// Longest unfinished escape held back between chunks; past this it is
/// passed through as text.
const MAX_PENDING_ESCAPE: usize = 4096;

/// [`strip_ansi`] for a chunked stream: a trailing escape sequence that is
/// not finished yet is held until the next chunk completes it.
#[derive(Debug, Default)]
pub struct AnsiStripper {
    pending: String,
}

impl AnsiStripper {
    pub fn strip(&mut self, text: &str) -> String {
        let mut joined = std::mem::take(&mut self.pending);
        joined.push_str(text);
        if let Some(start) = unfinished_escape(&joined) {
            if joined.len() - start <= MAX_PENDING_ESCAPE {
                self.pending = joined.split_off(start);
            }
        }
        strip_ansi(&joined)
    }

    /// Flush whatever is held back (at EOF).
    pub fn finish(&mut self) -> String {
        strip_ansi(&std::mem::take(&mut self.pending))
    }
}

/// Start of a trailing escape sequence that has not reached its final byte.
fn unfinished_escape(text: &str) -> Option<usize> {
    if let Some(osc) = text.rfind("\x1b]") {
        let body = &text[osc + 2..];
        if !body.contains('\x07') && !body.contains("\x1b\\") {
            return Some(osc);
        }
    }
    let start = text.rfind('\x1b')?;
    let tail = &text[start..];
    let unfinished = match tail.as_bytes().get(1) {
        None => true,
        Some(b'[') => !tail[2..].bytes().any(|b| (0x40..=0x7e).contains(&b)),
        Some(b'(' | b')') => tail.len() == 2,
        Some(_) => false,
    };
    unfinished.then_some(start)
}

// ── UTF-8 decoding across chunk boundaries ──

/// Decodes a byte stream chunk by chunk, holding back an incomplete trailing
/// multi-byte sequence until the next chunk arrives. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush whatever is held back (at EOF).
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

// ── Bounded retained buffer ──

/// Raw session output, capped at `cap` bytes; the oldest bytes go first.
#[derive(Debug)]
pub struct OutputBuffer {
    bytes: Vec<u8>,
    cap: usize,
}

impl OutputBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            bytes: Vec::new(),
            cap,
        }
    }

    pub fn append(&mut self, chunk: &[u8]) {
        if self.cap == 0 {
            return;
        }
        if chunk.len() >= self.cap {
            self.bytes.clear();
            self.bytes.extend_from_slice(&chunk[chunk.len() - self.cap..]);
            return;
        }
        let total = self.bytes.len() + chunk.len();
        if total > self.cap {
            self.bytes.drain(..total - self.cap);
        }
        self.bytes.extend_from_slice(chunk);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_colors_and_cursor_moves() {
        assert_eq!(strip_ansi("\x1b[1;32mok\x1b[0m done"), "ok done");
        assert_eq!(strip_ansi("\x1b[2K\x1b[1Gline"), "line");
        assert_eq!(strip_ansi("\x1b[?25lhidden cursor\x1b[?25h"), "hidden cursor");
    }

    #[test]
    fn strips_osc_titles() {
        assert_eq!(strip_ansi("\x1b]0;my title\x07prompt> "), "prompt> ");
        assert_eq!(strip_ansi("\x1b]8;;http://x\x1b\\link\x1b]8;;\x1b\\"), "link");
    }

    #[test]
    fn plain_text_untouched() {
        assert_eq!(strip_ansi("hello [world]"), "hello [world]");
    }

    #[test]
    fn escapes_split_across_chunks_are_stripped() {
        let stream = "\x1b[1;31mred\x1b[0m \x1b]0;title\x07done";
        for cut in 0..=stream.len() {
            let mut stripper = AnsiStripper::default();
            let mut out = stripper.strip(&stream[..cut]);
            out.push_str(&stripper.strip(&stream[cut..]));
            out.push_str(&stripper.finish());
            assert_eq!(out, "red done", "split at {cut}");
        }
    }

    #[test]
    fn osc_terminated_by_st_across_chunks() {
        let mut stripper = AnsiStripper::default();
        assert_eq!(stripper.strip("a\x1b]8;;http://x\x1b"), "a");
        assert_eq!(stripper.strip("\\link"), "link");
        assert_eq!(stripper.finish(), "");
    }

    #[test]
    fn complete_text_is_not_held() {
        let mut stripper = AnsiStripper::default();
        assert_eq!(stripper.strip("plain \x1b[0mtext"), "plain text");
        assert_eq!(stripper.finish(), "");
    }

    #[test]
    fn decoder_joins_split_multibyte() {
        let bytes = "héllo ✓".as_bytes();
        let mut dec = Utf8Decoder::default();
        let mut out = String::new();
        for b in bytes {
            out.push_str(&dec.decode(std::slice::from_ref(b)));
        }
        out.push_str(&dec.finish());
        assert_eq!(out, "héllo ✓");
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut dec = Utf8Decoder::default();
        assert_eq!(dec.decode(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn buffer_drops_oldest_bytes() {
        let mut buf = OutputBuffer::new(8);
        buf.append(b"12345");
        buf.append(b"6789");
        assert_eq!(buf.contents(), "23456789");
        buf.append(b"abcdefghijk");
        assert_eq!(buf.contents(), "defghijk");
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn buffer_keeps_escapes() {
        let mut buf = OutputBuffer::new(64);
        buf.append(b"\x1b[31mred\x1b[0m");
        assert!(buf.contents().contains("\x1b[31m"));
    }
}
