//! Incremental line framing: frames are UTF-8 JSON texts separated by
//! `\n`, reassembled across arbitrary read boundaries.

use bytes::{Buf, BytesMut};

#[derive(Debug, Default)]
pub struct LineCodec {
    buf: BytesMut,
}

impl LineCodec {
    pub fn new() -> LineCodec {
        LineCodec::default()
    }

    /// Feed raw bytes from the socket.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete frame, without its terminator. A trailing `\r` is
    /// stripped.
    pub fn next_frame(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line = self.buf.split_to(pos + 1);
        line.truncate(pos);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Some(String::from_utf8_lossy(line.chunk()).into_owned())
    }

    /// Bytes buffered but not yet terminated.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_frames_regardless_of_chunking() {
        let mut codec = LineCodec::new();
        codec.extend(b"{\"type\":");
        assert_eq!(codec.next_frame(), None);
        codec.extend(b"\"step\"}\n{\"type\":\"ins");
        assert_eq!(codec.next_frame().as_deref(), Some("{\"type\":\"step\"}"));
        assert_eq!(codec.next_frame(), None);
        codec.extend(b"ert\",\"id\":1}\n");
        assert_eq!(
            codec.next_frame().as_deref(),
            Some("{\"type\":\"insert\",\"id\":1}")
        );
        assert_eq!(codec.pending(), 0);
    }

    #[test]
    fn strips_carriage_returns() {
        let mut codec = LineCodec::new();
        codec.extend(b"hello\r\nworld\n");
        assert_eq!(codec.next_frame().as_deref(), Some("hello"));
        assert_eq!(codec.next_frame().as_deref(), Some("world"));
    }

    #[test]
    fn several_frames_in_one_chunk() {
        let mut codec = LineCodec::new();
        codec.extend(b"a\nb\nc\n");
        assert_eq!(codec.next_frame().as_deref(), Some("a"));
        assert_eq!(codec.next_frame().as_deref(), Some("b"));
        assert_eq!(codec.next_frame().as_deref(), Some("c"));
        assert_eq!(codec.next_frame(), None);
    }
}
