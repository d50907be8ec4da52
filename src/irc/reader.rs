//! Line framing over the raw byte stream.

use std::io;

use bytes::BytesMut;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, FramedRead};
use tracing::warn;

/// Longest line kept: Twitch's 8191 byte tag budget plus a 512 byte IRC
/// message.
pub const MAX_LINE_LENGTH: usize = 8191 + 512;

/// Newline-delimited decoder with a length cap.
///
/// Invalid UTF-8 is replaced rather than rejected, and a line over the cap
/// is discarded up to its newline, so a single bad line never kills the
/// connection.
#[derive(Debug)]
pub struct LineCodec {
    /// Index of next byte to check for newline
    next_index: usize,
    max_length: usize,
    /// Inside an over-long line, dropping bytes until its newline.
    discarding: bool,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length,
            discarding: false,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<String>> {
        loop {
            let newline = src[self.next_index..].iter().position(|b| *b == b'\n');
            let Some(offset) = newline else {
                if self.discarding {
                    src.clear();
                    self.next_index = 0;
                } else if src.len() > self.max_length {
                    warn!("Discarding line longer than {} bytes", self.max_length);
                    src.clear();
                    self.next_index = 0;
                    self.discarding = true;
                } else {
                    self.next_index = src.len();
                }
                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if line.len() > self.max_length {
                warn!("Discarding line of {} bytes", line.len());
                continue;
            }
            return Ok(Some(decode_line(&line)));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<String>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if self.discarding || src.is_empty() {
            self.discarding = false;
            src.clear();
            return Ok(None);
        }
        // Unterminated last line.
        let line = src.split();
        Ok(Some(decode_line(&line)))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

/// Splits an async byte stream into lines with [`LineCodec`].
pub struct LineReader<R> {
    inner: FramedRead<R, LineCodec>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: FramedRead::new(inner, LineCodec::new()),
        }
    }

    /// Read the next line with its `\r\n`/`\n` terminator removed.
    /// `Ok(None)` means the peer closed the stream.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.inner.next().await.transpose()
    }
}
