//! Newline framing
//!
//! `LineCodec` turns a connection's byte stream into text lines and back.
//! Used through `FramedRead` / `FramedWrite` on the two socket halves.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::AppError;

/// Default upper bound for a single inbound line
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8 * 1024;

/// `\n`-delimited text lines
///
/// A trailing `\r` is stripped, invalid UTF-8 is replaced lossily and
/// an unterminated fragment left at end of stream is dropped.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
    /// Bytes of the buffer already scanned for a newline
    next_index: usize,
}

impl LineCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
            next_index: 0,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let newline = src[self.next_index..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|offset| self.next_index + offset);

        let Some(index) = newline else {
            if src.len() > self.max_length {
                return Err(AppError::LineTooLong(self.max_length));
            }
            self.next_index = src.len();
            return Ok(None);
        };

        self.next_index = 0;
        if index > self.max_length {
            return Err(AppError::LineTooLong(self.max_length));
        }

        let frame = src.split_to(index + 1);
        let mut line = &frame[..index];
        if let [rest @ .., b'\r'] = line {
            line = rest;
        }
        Ok(Some(String::from_utf8_lossy(line).into_owned()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        // Stream ended mid-line: the fragment is never delivered
        src.clear();
        self.next_index = 0;
        Ok(None)
    }
}

impl Encoder<String> for LineCodec {
    type Error = AppError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    #[test]
    fn test_partial_line_is_buffered() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from(&b"hel"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"lo\nwor");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("hello".to_string()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], b"wor");
    }

    #[test]
    fn test_empty_lines_and_crlf() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from(&b"\n\r\nhi\r\n"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(String::new()));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(String::new()));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("hi".to_string()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from(&b"a\xffb\n"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some("a\u{fffd}b".to_string()));
    }

    #[test]
    fn test_line_too_long() {
        let mut codec = LineCodec::new(4);
        let mut buf = BytesMut::from(&b"abcdef"[..]);

        assert!(matches!(codec.decode(&mut buf), Err(AppError::LineTooLong(4))));
    }

    #[tokio::test]
    async fn test_eof_drops_unterminated_fragment() {
        let input: &[u8] = b"one\ntwo\nthree";
        let lines: Vec<String> = FramedRead::new(input, LineCodec::default())
            .map(|line| line.unwrap())
            .collect()
            .await;

        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn test_lines_across_reads() {
        let (client, server) = tokio::io::duplex(64);
        let mut lines = FramedRead::new(server, LineCodec::default());

        tokio::spawn(async move {
            let mut client = client;
            client.write_all(b"first pa").await.unwrap();
            client.write_all(b"rt\nsecond\n").await.unwrap();
        });

        assert_eq!(lines.next().await.unwrap().unwrap(), "first part");
        assert_eq!(lines.next().await.unwrap().unwrap(), "second");
        assert!(lines.next().await.is_none());
    }

    #[tokio::test]
    async fn test_encode_appends_newline() {
        let mut out = FramedWrite::new(Vec::new(), LineCodec::default());
        out.send("Bye.".to_string()).await.unwrap();
        out.send(String::from("again")).await.unwrap();

        assert_eq!(out.get_ref().as_slice(), b"Bye.\nagain\n");
    }

    #[tokio::test]
    async fn test_close_flushes_and_shuts_down() {
        let (client, server) = tokio::io::duplex(64);
        let mut out = FramedWrite::new(server, LineCodec::default());
        let mut lines = FramedRead::new(client, LineCodec::default());

        out.send("last".to_string()).await.unwrap();
        out.close().await.unwrap();

        assert_eq!(lines.next().await.unwrap().unwrap(), "last");
        assert!(lines.next().await.is_none());
    }
}
