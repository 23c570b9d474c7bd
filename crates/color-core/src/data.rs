//! Raw frame buffers delivered by a sensor.

use crate::color::Rgb;

/// Bytes per pixel of an interleaved RGB8 buffer.
pub const RGB8_CHANNELS: u32 = 3;

/// A single channel-interleaved frame (`R G B R G B ...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Interleaved samples per pixel
    pub channels: u32,

    /// Raw pixel data
    pub data: Vec<u8>,

    /// Sequence number assigned by the device
    pub frame_number: u64,
}

impl Frame {
    /// Create an RGB8 frame.
    pub fn rgb8(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels: RGB8_CHANNELS,
            data,
            frame_number: 0,
        }
    }

    /// Create an RGB8 frame where every pixel has the same color.
    pub fn solid(width: u32, height: u32, pixel: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let data = pixel.iter().copied().cycle().take(pixels * 3).collect();
        Self::rgb8(width, height, data)
    }

    /// Set the frame number.
    #[must_use]
    pub fn with_frame_number(mut self, frame_number: u64) -> Self {
        self.frame_number = frame_number;
        self
    }

    /// Number of pixels according to the frame geometry.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// True if the frame is a non-empty RGB8 buffer whose length matches its geometry.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.channels == RGB8_CHANNELS
            && self.pixel_count() > 0
            && self.data.len() == self.pixel_count() * RGB8_CHANNELS as usize
    }

    /// Mean of each interleaved channel over all pixels.
    ///
    /// Returns `None` for zero-size or malformed frames.
    #[must_use]
    pub fn channel_means(&self) -> Option<Rgb> {
        if !self.is_well_formed() {
            return None;
        }
        let mut sums = [0u64; 3];
        for pixel in self.data.chunks_exact(3) {
            sums[0] += u64::from(pixel[0]);
            sums[1] += u64::from(pixel[1]);
            sums[2] += u64::from(pixel[2]);
        }
        let n = self.pixel_count() as f64;
        Some(Rgb::new(
            sums[0] as f64 / n,
            sums[1] as f64 / n,
            sums[2] as f64 / n,
        ))
    }
}
