//! Stream framing.
//!
//! Outbound: one compact JSON document followed by `\n`.
//!
//! Inbound: the byte stream is scanned for complete top-level JSON objects
//! by tracking brace depth outside string literals. Newlines are treated as
//! whitespace, so a peer that omits the delimiter or packs several documents
//! into one write is still understood. Scan state survives between reads, so
//! a frame split across arbitrary chunk boundaries is rescanned only from
//! where the previous read stopped.

use bridge_types::Envelope;
use bytes::{Buf, Bytes, BytesMut};

use crate::domain::FrameError;

/// Frame delimiter appended after every encoded envelope.
pub const DELIMITER: u8 = b'\n';

/// Encode an envelope as one delimited frame.
pub fn encode(envelope: &Envelope, max_frame_size: usize) -> Result<Vec<u8>, FrameError> {
    let mut frame = serde_json::to_vec(envelope).map_err(FrameError::Encode)?;
    if frame.len() > max_frame_size {
        return Err(FrameError::TooLarge {
            size: frame.len(),
            max: max_frame_size,
        });
    }
    frame.push(DELIMITER);
    Ok(frame)
}

#[derive(Debug, Default, Clone, Copy)]
struct ScanState {
    /// Bytes of the current frame already scanned
    offset: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

/// Incremental decoder for one inbound stream.
#[derive(Debug)]
pub struct EnvelopeFramer {
    buffer: BytesMut,
    scan: ScanState,
    max_frame_size: usize,
}

impl EnvelopeFramer {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            scan: ScanState::default(),
            max_frame_size,
        }
    }

    /// Append bytes read from the stream.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append a chunk and return every envelope it completes.
    ///
    /// Stops at the first malformed frame; the framer cannot resynchronise
    /// after that and the stream should be closed.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Envelope>, FrameError> {
        self.extend(chunk);
        let mut envelopes = Vec::new();
        while let Some(envelope) = self.next_envelope()? {
            envelopes.push(envelope);
        }
        Ok(envelopes)
    }

    /// Pop the next complete envelope, if the buffer holds one.
    pub fn next_envelope(&mut self) -> Result<Option<Envelope>, FrameError> {
        match self.next_frame()? {
            Some(frame) => serde_json::from_slice(&frame)
                .map(Some)
                .map_err(|e| FrameError::Decode(e.to_string())),
            None => Ok(None),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        if self.scan.offset == 0 {
            let skip = self
                .buffer
                .iter()
                .take_while(|b| b.is_ascii_whitespace())
                .count();
            self.buffer.advance(skip);
            match self.buffer.first() {
                None => return Ok(None),
                Some(b'{') => {}
                Some(&other) => {
                    return Err(FrameError::Decode(format!(
                        "expected '{{' at start of frame, found {:?}",
                        char::from(other)
                    )))
                }
            }
        }

        let mut scan = self.scan;
        let mut end = None;
        for (index, &byte) in self.buffer.iter().enumerate().skip(scan.offset) {
            if scan.in_string {
                if scan.escaped {
                    scan.escaped = false;
                } else if byte == b'\\' {
                    scan.escaped = true;
                } else if byte == b'"' {
                    scan.in_string = false;
                }
                continue;
            }
            match byte {
                b'"' => scan.in_string = true,
                b'{' | b'[' => scan.depth += 1,
                b'}' | b']' => {
                    scan.depth -= 1;
                    if scan.depth == 0 {
                        end = Some(index + 1);
                        break;
                    }
                }
                _ => {}
            }
        }

        match end {
            Some(end) if end > self.max_frame_size => Err(FrameError::TooLarge {
                size: end,
                max: self.max_frame_size,
            }),
            Some(end) => {
                self.scan = ScanState::default();
                Ok(Some(self.buffer.split_to(end).freeze()))
            }
            None if self.buffer.len() > self.max_frame_size => Err(FrameError::TooLarge {
                size: self.buffer.len(),
                max: self.max_frame_size,
            }),
            None => {
                scan.offset = self.buffer.len();
                self.scan = scan;
                Ok(None)
            }
        }
    }
}
