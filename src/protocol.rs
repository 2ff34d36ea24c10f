//! AMI frame decoding
//!
//! AMI frames are CRLF-terminated `Key: Value` lines closed by a blank line:
//!
//! ```text
//! Event: Hangup\r\n
//! Channel: PJSIP/100-00000001\r\n
//! Cause: 16\r\n
//! \r\n
//! ```
//!
//! The parser is fed raw socket reads and keeps partial lines and partial
//! frames between calls, so frame boundaries need not line up with reads.

use crate::{
    constants::{HEADER_SEPARATOR, MAX_BUFFER_SIZE, MAX_FRAME_SIZE},
    error::{AmiError, AmiResult},
    event::AmiEvent,
};
use tracing::trace;

/// Streaming AMI frame decoder
#[derive(Debug, Default)]
pub struct AmiParser {
    /// Bytes received but not yet terminated by a line feed
    buffer: Vec<u8>,
    /// Fields of the frame currently being assembled
    current: AmiEvent,
    /// Line bytes consumed into `current`
    current_size: usize,
}

impl AmiParser {
    /// Create new parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Add data to the parser buffer.
    ///
    /// NUL padding is dropped. Fails if an unterminated line grows past
    /// [`MAX_BUFFER_SIZE`], which only happens on a corrupt stream.
    pub fn add_data(&mut self, data: &[u8]) -> AmiResult<()> {
        self.buffer
            .extend(
                data.iter()
                    .copied()
                    .filter(|b| *b != 0),
            );
        if self
            .buffer
            .len()
            > MAX_BUFFER_SIZE
        {
            return Err(AmiError::protocol_error(format!(
                "Buffer size {} exceeds limit {} without a line terminator",
                self.buffer
                    .len(),
                MAX_BUFFER_SIZE
            )));
        }
        Ok(())
    }

    /// Try to decode the next complete frame from buffered data.
    ///
    /// Returns `Ok(None)` when more data is needed. Blank lines with no
    /// fields before them produce nothing. Fails once the frame being
    /// assembled passes [`MAX_FRAME_SIZE`] without its blank line.
    pub fn parse_frame(&mut self) -> AmiResult<Option<AmiEvent>> {
        loop {
            let Some(end) = self
                .buffer
                .iter()
                .position(|b| *b == b'\n')
            else {
                return Ok(None);
            };
            let raw: Vec<u8> = self
                .buffer
                .drain(..=end)
                .collect();
            let line = String::from_utf8_lossy(trim_line_ending(&raw));

            if line.is_empty() {
                if self
                    .current
                    .is_empty()
                {
                    continue;
                }
                self.current_size = 0;
                return Ok(Some(std::mem::take(&mut self.current)));
            }

            self.current_size += raw.len();
            if self.current_size > MAX_FRAME_SIZE {
                return Err(AmiError::protocol_error(format!(
                    "Frame size {} exceeds limit {} without a blank line",
                    self.current_size, MAX_FRAME_SIZE
                )));
            }

            match split_field(&line) {
                Some((key, value)) => self
                    .current
                    .set_header(key, value),
                None => trace!("[RECV] Discarding line without field separator: {:?}", line),
            }
        }
    }

    /// Feed one read and collect every frame it completes.
    pub fn feed(&mut self, data: &[u8]) -> AmiResult<Vec<AmiEvent>> {
        self.add_data(data)?;
        let mut frames = Vec::new();
        while let Some(frame) = self.parse_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Bytes buffered but not yet consumed as lines.
    pub fn buffered_len(&self) -> usize {
        self.buffer
            .len()
    }
}

/// Strip the trailing `\n` and any `\r` before it.
fn trim_line_ending(raw: &[u8]) -> &[u8] {
    let mut end = raw.len();
    while end > 0 && matches!(raw[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &raw[..end]
}

/// Split a field line once at the first `": "`.
///
/// Lines without the separator, or with an empty key or value, yield `None`.
fn split_field(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(HEADER_SEPARATOR)?;
    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key, value))
}
