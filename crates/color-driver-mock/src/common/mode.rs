//! Operational modes for mock devices.
//!
//! - **Instant**: no delays at all; scripted timeouts return immediately
//! - **Realistic**: frames arrive at the configured interval and timeouts block for the
//!   full retrieval timeout
//! - **Chaos**: like Realistic, plus random frame drops at the configured rate

use serde::{Deserialize, Serialize};

/// Operational modes for mock devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MockMode {
    /// Zero delays, deterministic - for unit tests
    #[default]
    Instant,
    /// Device-like timing - for integration tests and demos
    Realistic,
    /// Device-like timing with random drops - for resilience testing
    Chaos,
}

impl MockMode {
    /// True if the device should block like real hardware.
    #[must_use]
    pub fn has_delays(self) -> bool {
        !matches!(self, MockMode::Instant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode() {
        assert_eq!(MockMode::default(), MockMode::Instant);
        assert!(!MockMode::Instant.has_delays());
        assert!(MockMode::Chaos.has_delays());
    }

    #[test]
    fn test_mode_from_config() {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            mode: MockMode,
        }
        let w: Wrapper = toml::from_str("mode = \"realistic\"").unwrap();
        assert_eq!(w.mode, MockMode::Realistic);
    }
}
