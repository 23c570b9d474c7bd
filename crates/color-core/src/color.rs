//! Color space conversion.
//!
//! Two-stage, stateless conversion from averaged sensor channels to CIELAB:
//!
//! 1. [`rgb_to_xyz`]: channels in `[0, 255]` are scaled to `[0, 1]` and multiplied by the
//!    sRGB primaries matrix (D65 referenced). The input is treated as already linear, so
//!    no gamma decoding is applied.
//! 2. [`xyz_to_lab`]: each tristimulus value is divided by the matching [`WhitePoint`]
//!    component and passed through the piecewise response `f(t)`.
//!
//! Nothing is rounded between the stages; rounding happens only when a sample is
//! formatted for the durable log.
//!
//! # Response Variants
//!
//! [`LabResponse::Uniform`] (the default) uses `δ = 16/116` for the breakpoint, the slope
//! and the offset alike: cube root above `δ³`, `t / (3·δ²) + δ` at or below it. This is
//! the response every deployed tracker logs with, so values stay comparable with
//! historical logs. It jumps from `δ` to `4δ/3` at `t = δ³`.
//!
//! [`LabResponse::Cie1976`] is opt-in: cube root above `(6/29)³` and the tangent line
//! `t / (3·(6/29)²) + 16/116` below it, continuous at the breakpoint.

use crate::error::ColorError;
use serde::{Deserialize, Serialize};

// =============================================================================
// Constants
// =============================================================================

/// Linear sRGB → CIEXYZ primaries, rows are X, Y, Z.
pub const RGB_TO_XYZ: [[f64; 3]; 3] = [
    [0.4124, 0.3576, 0.1805],
    [0.2126, 0.7152, 0.0722],
    [0.0193, 0.1192, 0.9505],
];

/// `δ` of the default LAB response (`16/116`), also the offset of every linear segment.
pub const LAB_DELTA: f64 = 16.0 / 116.0;

/// Cube root of the CIE breakpoint (`6/29`).
pub const CIE_DELTA: f64 = 6.0 / 29.0;

/// Full-scale channel value of the 8-bit sensor.
pub const CHANNEL_MAX: f64 = 255.0;

// =============================================================================
// Triplets
// =============================================================================

/// Linear RGB channel means in `[0, 255]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgb {
    /// Red channel
    pub r: f64,
    /// Green channel
    pub g: f64,
    /// Blue channel
    pub b: f64,
}

impl Rgb {
    /// Build a triplet.
    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }
}

/// CIEXYZ tristimulus values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Xyz {
    /// X
    pub x: f64,
    /// Y (luminance)
    pub y: f64,
    /// Z
    pub z: f64,
}

/// CIELAB coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Lab {
    /// Lightness L*
    pub l: f64,
    /// Green-red axis a*
    pub a: f64,
    /// Blue-yellow axis b*
    pub b: f64,
}

// =============================================================================
// White Point
// =============================================================================

/// Reference white used by the XYZ → LAB step.
///
/// All components are strictly positive; this is enforced by [`WhitePoint::new`] and by
/// deserialization, so the conversion never divides by zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 3]", into = "[f64; 3]")]
pub struct WhitePoint {
    x: f64,
    y: f64,
    z: f64,
}

impl WhitePoint {
    /// D65 standard illuminant as used by the tracker.
    pub const D65: WhitePoint = WhitePoint {
        x: 0.94811,
        y: 1.0,
        z: 1.07304,
    };

    /// Validate and build a white point.
    pub fn new(x: f64, y: f64, z: f64) -> Result<Self, ColorError> {
        for (axis, value) in [('x', x), ('y', y), ('z', z)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ColorError::InvalidWhitePoint { axis, value });
            }
        }
        Ok(Self { x, y, z })
    }

    /// X component
    #[must_use]
    pub fn x(&self) -> f64 {
        self.x
    }

    /// Y component
    #[must_use]
    pub fn y(&self) -> f64 {
        self.y
    }

    /// Z component
    #[must_use]
    pub fn z(&self) -> f64 {
        self.z
    }
}

impl Default for WhitePoint {
    fn default() -> Self {
        Self::D65
    }
}

impl TryFrom<[f64; 3]> for WhitePoint {
    type Error = ColorError;

    fn try_from(value: [f64; 3]) -> Result<Self, Self::Error> {
        Self::new(value[0], value[1], value[2])
    }
}

impl From<WhitePoint> for [f64; 3] {
    fn from(wp: WhitePoint) -> Self {
        [wp.x, wp.y, wp.z]
    }
}

// =============================================================================
// Response Function
// =============================================================================

/// Which piecewise cube-root response the XYZ → LAB step uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabResponse {
    /// `δ = 16/116` for breakpoint, slope and offset.
    #[default]
    Uniform,
    /// CIE 1976 response, continuous at `(6/29)³`.
    Cie1976,
}

impl LabResponse {
    /// Breakpoint below which the linear segment applies.
    #[must_use]
    pub fn breakpoint(self) -> f64 {
        let d = self.slope_delta();
        d * d * d
    }

    fn slope_delta(self) -> f64 {
        match self {
            LabResponse::Uniform => LAB_DELTA,
            LabResponse::Cie1976 => CIE_DELTA,
        }
    }

    /// Evaluate `f(t)` for a white-point-relative ratio.
    #[must_use]
    pub fn apply(self, t: f64) -> f64 {
        let d = self.slope_delta();
        if t > d * d * d {
            t.cbrt()
        } else {
            t / (3.0 * d * d) + LAB_DELTA
        }
    }
}

// =============================================================================
// Conversion
// =============================================================================

/// Convert linear RGB channel means to CIEXYZ.
#[must_use]
pub fn rgb_to_xyz(rgb: Rgb) -> Xyz {
    let r = rgb.r / CHANNEL_MAX;
    let g = rgb.g / CHANNEL_MAX;
    let b = rgb.b / CHANNEL_MAX;
    let m = &RGB_TO_XYZ;
    Xyz {
        x: m[0][0] * r + m[0][1] * g + m[0][2] * b,
        y: m[1][0] * r + m[1][1] * g + m[1][2] * b,
        z: m[2][0] * r + m[2][1] * g + m[2][2] * b,
    }
}

/// Convert CIEXYZ to CIELAB relative to `white` with the default response.
#[must_use]
pub fn xyz_to_lab(xyz: Xyz, white: &WhitePoint) -> Lab {
    xyz_to_lab_with(xyz, white, LabResponse::Uniform)
}

/// Convert CIEXYZ to CIELAB with an explicit response variant.
#[must_use]
pub fn xyz_to_lab_with(xyz: Xyz, white: &WhitePoint, response: LabResponse) -> Lab {
    let fx = response.apply(xyz.x / white.x);
    let fy = response.apply(xyz.y / white.y);
    let fz = response.apply(xyz.z / white.z);
    Lab {
        l: 116.0 * fy - 16.0,
        a: 500.0 * (fx - fy),
        b: 200.0 * (fy - fz),
    }
}

/// Convert linear RGB straight to CIELAB.
#[must_use]
pub fn rgb_to_lab(rgb: Rgb, white: &WhitePoint) -> Lab {
    xyz_to_lab(rgb_to_xyz(rgb), white)
}

/// Session-wide conversion settings.
///
/// Configured once before acquisition starts; every sample of a session is derived
/// with the same transform.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ColorTransform {
    /// Reference white
    #[serde(default)]
    pub white_point: WhitePoint,
    /// Response variant
    #[serde(default)]
    pub response: LabResponse,
}

impl ColorTransform {
    /// Transform with the default response.
    pub fn new(white_point: WhitePoint) -> Self {
        Self {
            white_point,
            response: LabResponse::Uniform,
        }
    }

    /// Select the response variant.
    #[must_use]
    pub fn with_response(mut self, response: LabResponse) -> Self {
        self.response = response;
        self
    }

    /// Run both stages.
    #[must_use]
    pub fn convert(&self, rgb: Rgb) -> (Xyz, Lab) {
        let xyz = rgb_to_xyz(rgb);
        let lab = xyz_to_lab_with(xyz, &self.white_point, self.response);
        (xyz, lab)
    }
}
