//! Frame decoder adapter.
//!
//! The streaming engine treats decoding as opaque: compressed bytes go
//! in, zero or more [`FrameBuffer`]s come out, in stream order. A video
//! codec binding implements [`FrameDecoder`]; this module ships only
//! [`RawFrameDecoder`], which reads uncompressed frames.

use bytes::{Buf, BytesMut};

use crate::error::MirrorError;
use crate::frame::{BYTES_PER_PIXEL, FrameBuffer};

/// Stateful decoder fed with arbitrary chunks of the video stream.
pub trait FrameDecoder: Send {
    /// Consume `chunk` and return every frame it completes.
    ///
    /// Chunk boundaries carry no meaning: a frame may span several
    /// calls and one call may complete several frames.
    fn feed(&mut self, chunk: &[u8]) -> Result<Vec<FrameBuffer>, MirrorError>;
}

impl<D: FrameDecoder + ?Sized> FrameDecoder for Box<D> {
    fn feed(&mut self, chunk: &[u8]) -> Result<Vec<FrameBuffer>, MirrorError> {
        (**self).feed(chunk)
    }
}

// ── RawFrameDecoder ──────────────────────────────────────────────

/// Decoder for an uncompressed stream of BGR24 frames.
///
/// ## Wire format
///
/// ```text
/// width:   u16 BE  (2)
/// height:  u16 BE  (2)
/// pixels:  [u8]    (width * height * 3)
/// ```
#[derive(Debug, Default)]
pub struct RawFrameDecoder {
    pending: BytesMut,
}

impl RawFrameDecoder {
    /// Size of the per-frame header.
    pub const HEADER_SIZE: usize = 4;

    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes buffered towards an incomplete frame.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Serialize a frame in this decoder's wire format.
    pub fn encode(frame: &FrameBuffer) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::HEADER_SIZE + frame.data().len());
        out.extend_from_slice(&frame.width().to_be_bytes());
        out.extend_from_slice(&frame.height().to_be_bytes());
        out.extend_from_slice(frame.data());
        out
    }

    /// Split one complete frame off the front of the buffer, if present.
    fn next_frame(&mut self) -> Result<Option<FrameBuffer>, MirrorError> {
        if self.pending.len() < Self::HEADER_SIZE {
            return Ok(None);
        }
        let width = u16::from_be_bytes([self.pending[0], self.pending[1]]);
        let height = u16::from_be_bytes([self.pending[2], self.pending[3]]);
        let body = width as usize * height as usize * BYTES_PER_PIXEL;
        if self.pending.len() < Self::HEADER_SIZE + body {
            return Ok(None);
        }

        self.pending.advance(Self::HEADER_SIZE);
        let pixels = self.pending.split_to(body).freeze();
        FrameBuffer::new(width, height, pixels).map(Some)
    }
}

impl FrameDecoder for RawFrameDecoder {
    fn feed(&mut self, chunk: &[u8]) -> Result<Vec<FrameBuffer>, MirrorError> {
        self.pending.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_split_across_chunks() {
        let frame = FrameBuffer::filled(4, 2, 0x5A);
        let wire = RawFrameDecoder::encode(&frame);
        let mut dec = RawFrameDecoder::new();

        assert!(dec.feed(&wire[..3]).unwrap().is_empty());
        assert!(dec.feed(&wire[3..10]).unwrap().is_empty());
        assert_eq!(dec.buffered(), 10);

        let out = dec.feed(&wire[10..]).unwrap();
        assert_eq!(out, vec![frame]);
        assert_eq!(dec.buffered(), 0);
    }

    #[test]
    fn several_frames_in_one_chunk_keep_order() {
        let a = FrameBuffer::filled(2, 2, 1);
        let b = FrameBuffer::filled(3, 1, 2);
        let mut wire = RawFrameDecoder::encode(&a);
        wire.extend(RawFrameDecoder::encode(&b));
        // trailing partial header
        wire.extend_from_slice(&[0, 2]);

        let mut dec = RawFrameDecoder::new();
        let out = dec.feed(&wire).unwrap();
        assert_eq!(out, vec![a, b]);
        assert_eq!(dec.buffered(), 2);
    }

    #[test]
    fn empty_frame_header_yields_empty_frame() {
        let mut dec = RawFrameDecoder::new();
        let out = dec.feed(&[0, 0, 0, 0]).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].data().is_empty());
    }

    #[test]
    fn boxed_decoder_delegates() {
        let mut dec: Box<dyn FrameDecoder> = Box::new(RawFrameDecoder::new());
        let wire = RawFrameDecoder::encode(&FrameBuffer::filled(1, 1, 9));
        assert_eq!(dec.feed(&wire).unwrap().len(), 1);
    }
}
