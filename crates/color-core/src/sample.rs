//! Measurement value types.
//!
//! A [`ColorSample`] is one reduced, converted measurement produced from a single frame.
//! Its derived triplets are computed in the constructor from the RGB means and the
//! session's [`ColorTransform`]; nothing else can influence them and the value is
//! immutable afterwards.

use crate::color::{ColorTransform, Lab, Rgb, Xyz};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

// =============================================================================
// Timestamp
// =============================================================================

/// Capture time of a sample.
///
/// The monotonic part orders samples and measures latency; the wall clock part is what
/// ends up in the durable log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    monotonic: Instant,
    wall: DateTime<Local>,
}

impl Timestamp {
    /// Capture the current time.
    #[must_use]
    pub fn now() -> Self {
        Self {
            monotonic: Instant::now(),
            wall: Local::now(),
        }
    }

    /// Build a timestamp from explicit parts.
    pub fn from_parts(monotonic: Instant, wall: DateTime<Local>) -> Self {
        Self { monotonic, wall }
    }

    /// Monotonic capture instant.
    #[must_use]
    pub fn monotonic(&self) -> Instant {
        self.monotonic
    }

    /// Local wall clock capture time.
    #[must_use]
    pub fn wall(&self) -> DateTime<Local> {
        self.wall
    }
}

// =============================================================================
// ColorSample
// =============================================================================

/// One converted measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorSample {
    captured: Timestamp,
    rgb: Rgb,
    xyz: Xyz,
    lab: Lab,
}

impl ColorSample {
    /// Convert RGB channel means captured now.
    pub fn from_rgb(rgb: Rgb, transform: &ColorTransform) -> Self {
        Self::captured_at(Timestamp::now(), rgb, transform)
    }

    /// Convert RGB channel means captured at `captured`.
    pub fn captured_at(captured: Timestamp, rgb: Rgb, transform: &ColorTransform) -> Self {
        let (xyz, lab) = transform.convert(rgb);
        Self {
            captured,
            rgb,
            xyz,
            lab,
        }
    }

    /// Capture time
    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.captured
    }

    /// Linear RGB channel means
    #[must_use]
    pub fn rgb(&self) -> Rgb {
        self.rgb
    }

    /// CIEXYZ values
    #[must_use]
    pub fn xyz(&self) -> Xyz {
        self.xyz
    }

    /// CIELAB values
    #[must_use]
    pub fn lab(&self) -> Lab {
        self.lab
    }

    /// Value of a single channel.
    #[must_use]
    pub fn value(&self, channel: Channel) -> f64 {
        match channel {
            Channel::R => self.rgb.r,
            Channel::G => self.rgb.g,
            Channel::B => self.rgb.b,
            Channel::X => self.xyz.x,
            Channel::Y => self.xyz.y,
            Channel::Z => self.xyz.z,
            Channel::LStar => self.lab.l,
            Channel::AStar => self.lab.a,
            Channel::BStar => self.lab.b,
        }
    }

    /// All nine values in [`Channel::ALL`] order.
    #[must_use]
    pub fn values(&self) -> [f64; 9] {
        Channel::ALL.map(|c| self.value(c))
    }
}

// =============================================================================
// Channel
// =============================================================================

/// One of the nine quantities carried by a sample.
///
/// Serialized with the same labels as the log header (`R`, `L*`, `a*`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Red mean
    #[serde(rename = "R")]
    R,
    /// Green mean
    #[serde(rename = "G")]
    G,
    /// Blue mean
    #[serde(rename = "B")]
    B,
    /// CIE X
    #[serde(rename = "X")]
    X,
    /// CIE Y
    #[serde(rename = "Y")]
    Y,
    /// CIE Z
    #[serde(rename = "Z")]
    Z,
    /// Lightness
    #[serde(rename = "L*")]
    LStar,
    /// Green-red chroma
    #[serde(rename = "a*")]
    AStar,
    /// Blue-yellow chroma
    #[serde(rename = "b*")]
    BStar,
}

impl Channel {
    /// Every channel in log column order.
    pub const ALL: [Channel; 9] = [
        Channel::R,
        Channel::G,
        Channel::B,
        Channel::X,
        Channel::Y,
        Channel::Z,
        Channel::LStar,
        Channel::AStar,
        Channel::BStar,
    ];

    /// Channels every publisher has to relay.
    pub const REQUIRED: [Channel; 6] = [
        Channel::R,
        Channel::G,
        Channel::B,
        Channel::LStar,
        Channel::AStar,
        Channel::BStar,
    ];

    /// Column label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Channel::R => "R",
            Channel::G => "G",
            Channel::B => "B",
            Channel::X => "X",
            Channel::Y => "Y",
            Channel::Z => "Z",
            Channel::LStar => "L*",
            Channel::AStar => "a*",
            Channel::BStar => "b*",
        }
    }

    fn index(self) -> usize {
        match self {
            Channel::R => 0,
            Channel::G => 1,
            Channel::B => 2,
            Channel::X => 3,
            Channel::Y => 4,
            Channel::Z => 5,
            Channel::LStar => 6,
            Channel::AStar => 7,
            Channel::BStar => 8,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.label() == s.trim())
            .ok_or_else(|| format!("Unknown channel '{}'", s))
    }
}

// =============================================================================
// Averaging
// =============================================================================

/// Arithmetic means of every channel over a bounded run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelMeans {
    values: [f64; 9],
    count: u64,
}

impl ChannelMeans {
    /// Mean of one channel.
    #[must_use]
    pub fn get(&self, channel: Channel) -> f64 {
        self.values[channel.index()]
    }

    /// Number of samples averaged.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// All nine means in [`Channel::ALL`] order.
    #[must_use]
    pub fn values(&self) -> [f64; 9] {
        self.values
    }
}

/// Running sums for [`ChannelMeans`].
#[derive(Debug, Clone, Default)]
pub struct SampleAccumulator {
    sums: [f64; 9],
    count: u64,
}

impl SampleAccumulator {
    /// Empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample.
    pub fn push(&mut self, sample: &ColorSample) {
        for (sum, value) in self.sums.iter_mut().zip(sample.values()) {
            *sum += value;
        }
        self.count += 1;
    }

    /// Number of samples pushed so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Means of everything pushed, or `None` if nothing was.
    #[must_use]
    pub fn means(&self) -> Option<ChannelMeans> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(ChannelMeans {
            values: self.sums.map(|s| s / n),
            count: self.count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::WhitePoint;

    #[test]
    fn test_derived_values_follow_transform() {
        let transform = ColorTransform::new(WhitePoint::D65);
        let sample = ColorSample::from_rgb(Rgb::new(10.0, 20.0, 30.0), &transform);
        let (xyz, lab) = transform.convert(Rgb::new(10.0, 20.0, 30.0));
        assert_eq!(sample.xyz(), xyz);
        assert_eq!(sample.lab(), lab);
        assert_eq!(sample.value(Channel::G), 20.0);
        assert_eq!(sample.value(Channel::LStar), lab.l);
    }

    #[test]
    fn test_timestamp_does_not_affect_derived_values() {
        let transform = ColorTransform::default();
        let rgb = Rgb::new(200.0, 100.0, 50.0);
        let a = ColorSample::from_rgb(rgb, &transform);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = ColorSample::from_rgb(rgb, &transform);
        assert_ne!(a.timestamp(), b.timestamp());
        assert_eq!(a.values(), b.values());
    }

    #[test]
    fn test_channel_labels_round_trip() {
        for channel in Channel::ALL {
            assert_eq!(channel.label().parse::<Channel>(), Ok(channel));
        }
        assert!("Q".parse::<Channel>().is_err());
        assert_eq!("b*".parse::<Channel>(), Ok(Channel::BStar));
        assert_eq!("B".parse::<Channel>(), Ok(Channel::B));
    }

    #[test]
    fn test_accumulator_means() {
        let transform = ColorTransform::default();
        let mut acc = SampleAccumulator::new();
        assert!(acc.means().is_none());

        let a = ColorSample::from_rgb(Rgb::new(10.0, 20.0, 30.0), &transform);
        let b = ColorSample::from_rgb(Rgb::new(30.0, 40.0, 50.0), &transform);
        acc.push(&a);
        acc.push(&b);

        let means = acc.means().unwrap();
        assert_eq!(means.count(), 2);
        assert_eq!(means.get(Channel::R), 20.0);
        assert_eq!(means.get(Channel::B), 40.0);
        let expected_l = (a.lab().l + b.lab().l) / 2.0;
        assert!((means.get(Channel::LStar) - expected_l).abs() < 1e-12);
    }
}
