//! Device Capabilities
//!
//! Traits implemented by the two kinds of external collaborator the pipeline talks to:
//!
//! - A **sensor** implements [`FrameSource`] (and usually [`DeviceSettings`]). These
//!   calls are blocking with a bounded timeout; the acquisition loop runs them on its own
//!   OS thread, so the traits are synchronous.
//! - A **control endpoint** is reached through an [`EndpointConnector`], which produces
//!   an [`EndpointSession`]. These are async (`#[async_trait]`) because publishers run on
//!   the tokio runtime.
//!
//! Every call may fail with a [`DeviceError`]; callers decide whether the failure is a
//! transient miss or a session fault.

use crate::data::Frame;
use crate::error::{ColorError, DeviceError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// Sensor Settings
// =============================================================================

/// Sensor region of interest in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    /// Horizontal offset
    pub offset_x: u32,
    /// Vertical offset
    pub offset_y: u32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

/// ROI coordinates must be multiples of this.
pub const ROI_ALIGNMENT: u32 = 4;

fn align(value: u32) -> u32 {
    (value.saturating_add(ROI_ALIGNMENT / 2) / ROI_ALIGNMENT) * ROI_ALIGNMENT
}

impl Roi {
    /// Full-sensor ROI.
    #[must_use]
    pub fn full(sensor_width: u32, sensor_height: u32) -> Self {
        Self {
            offset_x: 0,
            offset_y: 0,
            width: sensor_width,
            height: sensor_height,
        }
    }

    /// Round every coordinate to the nearest multiple of four and fit the region into
    /// the sensor. Width and height are shrunk first, then offsets are pulled back so the
    /// region stays on the sensor.
    #[must_use]
    pub fn aligned_to(self, sensor_width: u32, sensor_height: u32) -> Self {
        let width = align(self.width).clamp(ROI_ALIGNMENT, sensor_width.max(ROI_ALIGNMENT));
        let height = align(self.height).clamp(ROI_ALIGNMENT, sensor_height.max(ROI_ALIGNMENT));
        let offset_x = align(self.offset_x).min(sensor_width.saturating_sub(width));
        let offset_y = align(self.offset_y).min(sensor_height.saturating_sub(height));
        Self {
            offset_x: offset_x - offset_x % ROI_ALIGNMENT,
            offset_y: offset_y - offset_y % ROI_ALIGNMENT,
            width,
            height,
        }
    }

    /// Number of pixels covered.
    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// One-shot sensor configuration applied before acquisition starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    /// Region of interest; `None` means the full sensor.
    pub roi: Option<Roi>,
    /// Exposure time in microseconds
    pub exposure_us: f64,
    /// Analog gain in dB
    pub gain: f64,
    /// White-balance ratios for R, G and B
    pub white_balance: [f64; 3],
    /// Transport packet size in bytes
    pub packet_size: u32,
    /// Transport inter-packet delay in ticks
    pub inter_packet_delay: u32,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            roi: None,
            exposure_us: 16_000.0,
            gain: 0.0,
            white_balance: [1.0, 1.0, 1.0],
            packet_size: 8192,
            inter_packet_delay: 0,
        }
    }
}

impl SensorSettings {
    /// Validate value ranges.
    pub fn validate(&self) -> Result<(), ColorError> {
        if !self.exposure_us.is_finite() || self.exposure_us <= 0.0 {
            return Err(ColorError::InvalidSetting(format!(
                "exposure_us must be positive, got {}",
                self.exposure_us
            )));
        }
        if !self.gain.is_finite() || self.gain < 0.0 {
            return Err(ColorError::InvalidSetting(format!(
                "gain must be non-negative, got {}",
                self.gain
            )));
        }
        if let Some(ratio) = self
            .white_balance
            .iter()
            .find(|r| !r.is_finite() || **r <= 0.0)
        {
            return Err(ColorError::InvalidSetting(format!(
                "white_balance ratios must be positive, got {}",
                ratio
            )));
        }
        if let Some(roi) = self.roi {
            if roi.width == 0 || roi.height == 0 {
                return Err(ColorError::InvalidSetting(
                    "roi width and height must be non-zero".to_string(),
                ));
            }
        }
        if self.packet_size == 0 {
            return Err(ColorError::InvalidSetting(
                "packet_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Sensor Traits
// =============================================================================

/// A device that delivers RGB frames on request.
///
/// Implementations are driven from a single acquisition thread and only need to be
/// `Send`.
pub trait FrameSource: Send {
    /// Device name used in logs and events.
    fn name(&self) -> &str;

    /// Begin continuous acquisition.
    fn start_grabbing(&mut self) -> Result<(), DeviceError>;

    /// Wait up to `timeout` for the next frame.
    ///
    /// `Ok(None)` means no frame arrived in time. A frame that is delivered but
    /// incomplete is returned as-is; the caller checks [`Frame::is_well_formed`].
    fn retrieve(&mut self, timeout: Duration) -> Result<Option<Frame>, DeviceError>;

    /// End continuous acquisition. Calling this while idle is a no-op.
    fn stop_grabbing(&mut self) -> Result<(), DeviceError>;

    /// True between `start_grabbing` and `stop_grabbing`.
    fn is_grabbing(&self) -> bool;

    /// Release the device. The default does nothing.
    fn close(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// One-time sensor configuration (exposure, gain, ROI, transport).
pub trait DeviceSettings {
    /// Sensor dimensions in pixels as `(width, height)`.
    fn sensor_size(&self) -> (u32, u32);

    /// Apply settings and return what the device actually accepted (ROI aligned and
    /// clamped).
    fn apply_settings(&mut self, settings: &SensorSettings) -> Result<SensorSettings, DeviceError>;
}

// =============================================================================
// Control Endpoint Traits
// =============================================================================

/// A single value write to a named endpoint target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetWrite {
    /// Endpoint-specific target identifier (for example a node id)
    pub target: String,
    /// Value to write
    pub value: f64,
}

impl TargetWrite {
    /// Build a target write.
    pub fn new(target: impl Into<String>, value: f64) -> Self {
        Self {
            target: target.into(),
            value,
        }
    }
}

/// Factory for endpoint sessions.
///
/// Connectors are long-lived and reused for every reconnect; sessions are thrown away on
/// the first fault.
#[async_trait]
pub trait EndpointConnector: Send + Sync {
    /// Human-readable endpoint address.
    fn address(&self) -> String;

    /// Establish a fresh session.
    async fn connect(&self) -> Result<Box<dyn EndpointSession>, DeviceError>;
}

/// An established session with a control endpoint.
#[async_trait]
pub trait EndpointSession: Send {
    /// Write every value; fails on the first rejected write.
    async fn write_values(&mut self, writes: &[TargetWrite]) -> Result<(), DeviceError>;

    /// Round-trip liveness check.
    async fn probe(&mut self) -> Result<(), DeviceError>;

    /// Close the session. Errors are reported but the session is gone either way.
    async fn close(self: Box<Self>) -> Result<(), DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roi_alignment_rounds_to_four() {
        let roi = Roi {
            offset_x: 545,
            offset_y: 342,
            width: 849,
            height: 301,
        }
        .aligned_to(1936, 1216);
        assert_eq!(
            roi,
            Roi {
                offset_x: 544,
                offset_y: 344,
                width: 848,
                height: 300,
            }
        );
    }

    #[test]
    fn test_roi_clamped_to_sensor() {
        let roi = Roi {
            offset_x: 100,
            offset_y: 100,
            width: 4000,
            height: 4000,
        }
        .aligned_to(1936, 1216);
        assert_eq!(roi, Roi::full(1936, 1216));
    }

    #[test]
    fn test_roi_offset_pulled_back_onto_sensor() {
        let roi = Roi {
            offset_x: 1900,
            offset_y: 0,
            width: 100,
            height: 100,
        }
        .aligned_to(1936, 1216);
        assert_eq!(roi.offset_x + roi.width, 1936);
        assert_eq!(roi.offset_x % ROI_ALIGNMENT, 0);
    }

    #[test]
    fn test_settings_validation() {
        assert!(SensorSettings::default().validate().is_ok());

        let bad_exposure = SensorSettings {
            exposure_us: 0.0,
            ..Default::default()
        };
        assert!(bad_exposure.validate().is_err());

        let bad_wb = SensorSettings {
            white_balance: [1.0, -0.5, 1.0],
            ..Default::default()
        };
        assert!(bad_wb.validate().is_err());

        let bad_roi = SensorSettings {
            roi: Some(Roi {
                offset_x: 0,
                offset_y: 0,
                width: 0,
                height: 10,
            }),
            ..Default::default()
        };
        assert!(bad_roi.validate().is_err());
    }
}
