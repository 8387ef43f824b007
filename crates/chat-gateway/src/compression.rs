//! Frame decompression
//!
//! Binary frames are zlib data. In payload mode every frame is a complete zlib
//! message. In `zlib-stream` mode one inflate context lives for the whole
//! connection and a message is complete once the buffered bytes end with the
//! `Z_SYNC_FLUSH` marker.

use crate::error::GatewayError;
use chat_common::Compression;
use flate2::read::ZlibDecoder;
use flate2::{Decompress, FlushDecompress};
use std::io::Read;

/// Trailer that ends every complete message in a zlib stream
const ZLIB_SUFFIX: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// Per-connection inflater
pub struct Inflater {
    mode: Compression,
    stream: Decompress,
    buffer: Vec<u8>,
}

impl Inflater {
    pub fn new(mode: Compression) -> Self {
        Self {
            mode,
            stream: Decompress::new(true),
            buffer: Vec::new(),
        }
    }

    /// Feed one binary frame
    ///
    /// Returns the decoded text once a whole message is available, `None` while
    /// a streamed message is still incomplete.
    pub fn inflate(&mut self, frame: &[u8]) -> Result<Option<String>, GatewayError> {
        match self.mode {
            Compression::ZlibStream => self.inflate_stream(frame),
            Compression::None | Compression::Payload => inflate_payload(frame).map(Some),
        }
    }

    /// Bytes buffered for an incomplete streamed message
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn inflate_stream(&mut self, frame: &[u8]) -> Result<Option<String>, GatewayError> {
        self.buffer.extend_from_slice(frame);
        if !self.buffer.ends_with(&ZLIB_SUFFIX) {
            return Ok(None);
        }

        let mut out = Vec::with_capacity(self.buffer.len() * 4);
        let mut offset = 0;
        loop {
            let before_in = self.stream.total_in();
            let before_out = out.len();
            self.stream
                .decompress_vec(&self.buffer[offset..], &mut out, FlushDecompress::Sync)
                .map_err(|e| GatewayError::Compression(e.to_string()))?;
            offset += (self.stream.total_in() - before_in) as usize;

            if offset >= self.buffer.len() && out.len() < out.capacity() {
                break;
            }
            if offset < self.buffer.len() && out.len() == before_out && out.len() < out.capacity() {
                self.buffer.clear();
                return Err(GatewayError::Compression("inflate made no progress".to_string()));
            }
            out.reserve(out.capacity().max(1024));
        }
        self.buffer.clear();

        String::from_utf8(out)
            .map(Some)
            .map_err(|e| GatewayError::Compression(e.to_string()))
    }
}

fn inflate_payload(frame: &[u8]) -> Result<String, GatewayError> {
    let mut text = String::new();
    ZlibDecoder::new(frame)
        .read_to_string(&mut text)
        .map_err(|e| GatewayError::Compression(e.to_string()))?;
    Ok(text)
}

impl std::fmt::Debug for Inflater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inflater")
            .field("mode", &self.mode)
            .field("pending", &self.buffer.len())
            .finish()
    }
}
