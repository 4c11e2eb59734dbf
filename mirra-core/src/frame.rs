//! Decoded raster frames and screen resolution.
//!
//! A [`FrameBuffer`] is immutable once built: the streaming engine
//! publishes a fresh buffer for every decoded frame and never patches
//! one in place, so subscribers may keep a clone around for as long as
//! they like.

use std::fmt;

use bytes::Bytes;

use crate::error::MirrorError;

/// Bytes per pixel of a decoded frame (blue, green, red).
pub const BYTES_PER_PIXEL: usize = 3;

// ── Resolution ───────────────────────────────────────────────────

/// Screen dimensions in pixels, as announced by the server or taken
/// from the most recent decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u16,
    pub height: u16,
}

impl Resolution {
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// Number of pixels covered by this resolution.
    pub fn pixels(self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u16, u16)> for Resolution {
    fn from((width, height): (u16, u16)) -> Self {
        Self { width, height }
    }
}

// ── FrameBuffer ──────────────────────────────────────────────────

/// A decoded BGR24 frame, tightly packed, row-major.
///
/// `data` holds exactly `width * height * 3` bytes. Cloning shares the
/// underlying buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u16,
    height: u16,
    data: Bytes,
}

impl FrameBuffer {
    /// Wrap a pixel buffer, checking that its length matches the dimensions.
    pub fn new(width: u16, height: u16, data: impl Into<Bytes>) -> Result<Self, MirrorError> {
        let data = data.into();
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(MirrorError::Decoder(format!(
                "frame buffer {width}x{height} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame where every byte is `value`.
    pub fn filled(width: u16, height: u16, value: u8) -> Self {
        let len = width as usize * height as usize * BYTES_PER_PIXEL;
        Self {
            width,
            height,
            data: Bytes::from(vec![value; len]),
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Raw pixel bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes of one row.
    pub fn row(&self, y: u16) -> &[u8] {
        let stride = self.width as usize * BYTES_PER_PIXEL;
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// The `[b, g, r]` triple at `(x, y)`, or `None` when out of bounds.
    pub fn pixel(&self, x: u16, y: u16) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length() {
        let err = FrameBuffer::new(4, 4, vec![0u8; 10]).unwrap_err();
        assert!(matches!(err, MirrorError::Decoder(_)));
        assert!(FrameBuffer::new(4, 4, vec![0u8; 48]).is_ok());
    }

    #[test]
    fn pixel_and_row_access() {
        let mut data = vec![0u8; 2 * 2 * 3];
        // pixel (1, 1)
        data[9..12].copy_from_slice(&[1, 2, 3]);
        let frame = FrameBuffer::new(2, 2, data).unwrap();

        assert_eq!(frame.pixel(1, 1), Some([1, 2, 3]));
        assert_eq!(frame.pixel(0, 0), Some([0, 0, 0]));
        assert_eq!(frame.pixel(2, 0), None);
        assert_eq!(frame.row(1), &[0, 0, 0, 1, 2, 3]);
        assert_eq!(frame.resolution(), Resolution::new(2, 2));
    }

    #[test]
    fn resolution_display() {
        assert_eq!(Resolution::new(1080, 720).to_string(), "1080x720");
        assert_eq!(Resolution::from((3, 4)).pixels(), 12);
    }

    #[test]
    fn debug_omits_pixels() {
        let frame = FrameBuffer::filled(8, 8, 0xAB);
        let dbg = format!("{frame:?}");
        assert!(dbg.contains("192"));
        assert!(!dbg.contains("171"));
    }
}
