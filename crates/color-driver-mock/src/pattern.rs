//! Frame generation for the mock sensor.

use crate::common::MockRng;
use color_core::Frame;

/// Quantize a channel value to a byte, saturating at both ends.
#[inline]
fn to_u8(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// RGB8 frame of `base` with independent uniform noise on every channel sample.
///
/// With `noise == 0` every pixel is exactly `base` (after rounding), so the frame's
/// channel means are exact.
pub fn noisy_frame(width: u32, height: u32, base: [f64; 3], noise: f64, rng: &MockRng) -> Frame {
    let len = width as usize * height as usize * 3;
    if noise <= 0.0 {
        return Frame::solid(width, height, base.map(to_u8));
    }
    let mut offsets = vec![0.0; len];
    rng.fill_noise(&mut offsets, noise);
    let data = offsets
        .iter()
        .enumerate()
        .map(|(i, offset)| to_u8(base[i % 3] + offset))
        .collect();
    Frame::rgb8(width, height, data)
}

/// Frame whose buffer is shorter than its geometry claims.
pub fn truncated_frame(width: u32, height: u32) -> Frame {
    let len = (width as usize * height as usize * 3).saturating_sub(1);
    Frame::rgb8(width, height, vec![0; len])
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_core::Rgb;

    #[test]
    fn test_noise_free_frame_is_exact() {
        let rng = MockRng::new(Some(1));
        let frame = noisy_frame(8, 4, [10.0, 20.4, 300.0], 0.0, &rng);
        assert_eq!(frame.channel_means(), Some(Rgb::new(10.0, 20.0, 255.0)));
    }

    #[test]
    fn test_noisy_frame_stays_near_base() {
        let rng = MockRng::new(Some(1));
        let frame = noisy_frame(32, 32, [100.0, 150.0, 50.0], 4.0, &rng);
        assert!(frame.is_well_formed());
        let means = frame.channel_means().unwrap();
        assert!((means.r - 100.0).abs() < 1.0);
        assert!((means.g - 150.0).abs() < 1.0);
        assert!((means.b - 50.0).abs() < 1.0);
    }

    #[test]
    fn test_truncated_frame_is_malformed() {
        assert!(!truncated_frame(4, 4).is_well_formed());
    }
}
