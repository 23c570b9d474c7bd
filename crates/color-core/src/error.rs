//! Error types shared across the workspace.
//!
//! Two families live here:
//!
//! - [`DeviceError`]: a fault reported by an external collaborator (the sensor or a
//!   control endpoint). It carries a [`DeviceErrorKind`] so callers can tell a transient
//!   timeout apart from a lost connection without string matching.
//! - [`ColorError`]: setup-time validation failures (white point, sensor settings).
//!   These are fatal before any loop starts and are never raised in the hot path.

use thiserror::Error;

// =============================================================================
// Device Errors
// =============================================================================

/// Classification of a [`DeviceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    /// Session could not be established.
    Connection,
    /// An established link failed mid-operation.
    Communication,
    /// The operation did not complete within its deadline.
    Timeout,
    /// The peer answered with something the protocol does not allow.
    Protocol,
    /// The device itself reported a fault.
    Hardware,
    /// A setting was rejected by the device.
    Configuration,
    /// Anything else.
    Unknown,
}

impl std::fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DeviceErrorKind::Connection => "connection",
            DeviceErrorKind::Communication => "communication",
            DeviceErrorKind::Timeout => "timeout",
            DeviceErrorKind::Protocol => "protocol",
            DeviceErrorKind::Hardware => "hardware",
            DeviceErrorKind::Configuration => "configuration",
            DeviceErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// A fault reported by a sensor or a control endpoint.
#[derive(Error, Debug, Clone)]
#[error("Device '{device}' {kind} error: {message}")]
pub struct DeviceError {
    /// Name of the device or endpoint that failed.
    pub device: String,
    /// Fault classification.
    pub kind: DeviceErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl DeviceError {
    /// Build a new device error.
    pub fn new(
        device: impl Into<String>,
        kind: DeviceErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a [`DeviceErrorKind::Timeout`] error.
    pub fn timeout(device: impl Into<String>, operation: &str) -> Self {
        Self::new(
            device,
            DeviceErrorKind::Timeout,
            format!("Operation '{}' timed out", operation),
        )
    }

    /// Returns true if the error is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind == DeviceErrorKind::Timeout
    }
}

// =============================================================================
// Setup Errors
// =============================================================================

/// Setup-time validation errors for color and sensor configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ColorError {
    /// A white point component was zero, negative or not finite.
    ///
    /// The XYZ → LAB step divides by each component, so this is rejected when the
    /// white point is constructed rather than checked per sample.
    #[error("White point component {axis} must be finite and strictly positive, got {value}")]
    InvalidWhitePoint {
        /// Axis name (`x`, `y` or `z`).
        axis: char,
        /// Rejected value.
        value: f64,
    },

    /// Sensor settings failed validation.
    #[error("Invalid sensor setting: {0}")]
    InvalidSetting(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_display() {
        let err = DeviceError::new("plc", DeviceErrorKind::Communication, "broken pipe");
        assert_eq!(err.to_string(), "Device 'plc' communication error: broken pipe");
    }

    #[test]
    fn test_timeout_helper() {
        let err = DeviceError::timeout("camera", "retrieve");
        assert!(err.is_timeout());
        assert!(err.message.contains("retrieve"));

        let other = DeviceError::new("camera", DeviceErrorKind::Hardware, "overheated");
        assert!(!other.is_timeout());
    }

    #[test]
    fn test_white_point_error_display() {
        let err = ColorError::InvalidWhitePoint {
            axis: 'y',
            value: 0.0,
        };
        assert!(err.to_string().contains("component y"));
    }
}
