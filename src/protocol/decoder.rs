use crate::prelude::*;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Longest line we are willing to buffer while waiting for its terminator.
pub const MAX_LINE_LENGTH: usize = 65536;

/// Splits an incoming byte stream into `\n` terminated lines.
///
/// A trailing partial line stays in the buffer until more bytes arrive. Blank
/// lines are skipped. A partial line that outgrows `MAX_LINE_LENGTH` is thrown
/// away and everything up to the next terminator is ignored.
#[derive(Debug, Default)]
pub struct LineDecoder {
    // bytes of `src` already known not to contain a newline
    scanned: usize,
    discarding: bool,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for LineDecoder {
    type Item = BytesMut;
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>> {
        loop {
            let newline = src[self.scanned..].iter().position(|b| *b == b'\n');

            match newline {
                Some(offset) => {
                    let end = self.scanned + offset;
                    self.scanned = 0;

                    if self.discarding {
                        src.advance(end + 1);
                        self.discarding = false;
                        continue;
                    }

                    let mut line = src.split_to(end + 1);
                    line.truncate(end);

                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }

                    return Ok(Some(line));
                }
                None if src.len() > MAX_LINE_LENGTH => {
                    if !self.discarding {
                        warn!(
                            "Discarding line longer than {} bytes without a terminator",
                            MAX_LINE_LENGTH
                        );
                    }
                    self.discarding = true;
                    self.scanned = 0;
                    src.clear();
                    return Ok(None);
                }
                None => {
                    self.scanned = src.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        if !src.is_empty() {
            debug!("Dropping {} bytes of unterminated data at end of stream", src.len());
            src.clear();
        }
        self.scanned = 0;
        self.discarding = false;

        Ok(None)
    }
}
