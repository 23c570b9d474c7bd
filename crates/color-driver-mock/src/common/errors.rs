//! Error injection framework for mock devices.
//!
//! Enables configurable failures and error scenarios for resilience testing.
//! Every check counts as one call of the named operation; scenarios decide on the
//! 1-based call number.

use super::rng::MockRng;
use color_core::{DeviceError, DeviceErrorKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Error injection configuration for mock devices
#[derive(Clone, Debug)]
pub struct ErrorConfig {
    /// Per-operation failure rate (0.0 to 1.0), `"*"` matches every operation
    failure_rates: Arc<HashMap<&'static str, f64>>,
    /// Specific failure scenarios
    scenarios: Arc<Vec<ErrorScenario>>,
    /// RNG for failure decisions
    rng: Arc<MockRng>,
    /// State tracking for scenarios
    state: Arc<Mutex<ErrorState>>,
}

/// A deterministic failure pattern.
#[derive(Debug, Clone)]
pub enum ErrorScenario {
    /// The first `count` calls fail, later calls succeed.
    FailFirst {
        /// Operation name
        operation: &'static str,
        /// Number of failing calls
        count: u32,
    },
    /// Calls succeed `count` times, then fail forever.
    FailAfterN {
        /// Operation name
        operation: &'static str,
        /// Number of successful calls
        count: u32,
    },
    /// Exactly the listed calls fail (1-based call numbers).
    FailOn {
        /// Operation name
        operation: &'static str,
        /// Failing call numbers
        calls: Vec<u32>,
    },
    /// Every call of the operation times out.
    Timeout {
        /// Operation name
        operation: &'static str,
    },
    /// The first call of any operation loses communication; every later call fails too
    /// until [`ErrorConfig::reset`].
    CommunicationLoss,
}

#[derive(Default, Debug)]
struct ErrorState {
    /// Calls seen per operation
    operation_counts: HashMap<&'static str, u32>,
    /// Whether communication is lost
    communication_lost: bool,
}

impl ErrorConfig {
    /// Create error config with no errors (default)
    pub fn none() -> Self {
        Self::build(HashMap::new(), Vec::new(), None)
    }

    /// Create error config with uniform random failures and an optional seed
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        let mut rates = HashMap::new();
        rates.insert("*", rate);
        Self::build(rates, Vec::new(), seed)
    }

    /// Create error config with a single scenario
    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Create error config with multiple scenarios
    pub fn scenarios(scenarios: Vec<ErrorScenario>) -> Self {
        Self::build(HashMap::new(), scenarios, None)
    }

    /// Create error config with custom failure rates per operation
    pub fn with_rates(rates: HashMap<&'static str, f64>, seed: Option<u64>) -> Self {
        Self::build(rates, Vec::new(), seed)
    }

    fn build(
        rates: HashMap<&'static str, f64>,
        scenarios: Vec<ErrorScenario>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            failure_rates: Arc::new(rates),
            scenarios: Arc::new(scenarios),
            rng: Arc::new(MockRng::new(seed)),
            state: Arc::new(Mutex::new(ErrorState::default())),
        }
    }

    /// Count one call of `operation` and fail it if a scenario or rate says so.
    ///
    /// `fault_kind` is the kind reported for scripted failures, so a connector can
    /// surface connect failures as [`DeviceErrorKind::Connection`] and a session as
    /// [`DeviceErrorKind::Communication`].
    pub fn check_operation(
        &self,
        device: &str,
        operation: &'static str,
        fault_kind: DeviceErrorKind,
    ) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        let call = {
            let count = state.operation_counts.entry(operation).or_insert(0);
            *count += 1;
            *count
        };

        if state.communication_lost {
            return Err(DeviceError::new(
                device,
                DeviceErrorKind::Communication,
                "Communication lost",
            ));
        }

        for scenario in self.scenarios.iter() {
            let injected = match scenario {
                ErrorScenario::FailFirst {
                    operation: op,
                    count,
                } => *op == operation && call <= *count,
                ErrorScenario::FailAfterN {
                    operation: op,
                    count,
                } => *op == operation && call > *count,
                ErrorScenario::FailOn {
                    operation: op,
                    calls,
                } => *op == operation && calls.contains(&call),
                ErrorScenario::Timeout { operation: op } if *op == operation => {
                    return Err(DeviceError::timeout(device, operation));
                }
                ErrorScenario::Timeout { .. } => false,
                ErrorScenario::CommunicationLoss => {
                    state.communication_lost = true;
                    return Err(DeviceError::new(
                        device,
                        DeviceErrorKind::Communication,
                        "Communication lost",
                    ));
                }
            };
            if injected {
                return Err(DeviceError::new(
                    device,
                    fault_kind,
                    format!("Injected failure on '{}' call {}", operation, call),
                ));
            }
        }

        let rate = self
            .failure_rates
            .get(operation)
            .or_else(|| self.failure_rates.get("*"))
            .copied()
            .unwrap_or(0.0);

        if self.rng.should_fail(rate) {
            return Err(DeviceError::new(
                device,
                fault_kind,
                format!("Random failure on operation '{}'", operation),
            ));
        }

        Ok(())
    }

    /// Number of times `operation` was checked.
    pub fn calls(&self, operation: &str) -> u32 {
        self.state
            .lock()
            .operation_counts
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    /// Reset error state (clear counters, faults)
    pub fn reset(&self) {
        *self.state.lock() = ErrorState::default();
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KIND: DeviceErrorKind = DeviceErrorKind::Hardware;

    #[test]
    fn test_no_errors() {
        let config = ErrorConfig::none();
        for _ in 0..100 {
            assert!(config.check_operation("dev", "retrieve", KIND).is_ok());
        }
        assert_eq!(config.calls("retrieve"), 100);
    }

    #[test]
    fn test_random_failures() {
        let config = ErrorConfig::random_failures_seeded(0.5, Some(42));
        let failures = (0..1000)
            .filter(|_| config.check_operation("dev", "write", KIND).is_err())
            .count();
        assert!(failures > 400 && failures < 600, "Got {} failures", failures);
    }

    #[test]
    fn test_fail_first() {
        let config = ErrorConfig::scenario(ErrorScenario::FailFirst {
            operation: "connect",
            count: 3,
        });
        for _ in 0..3 {
            let err = config
                .check_operation("plc", "connect", DeviceErrorKind::Connection)
                .unwrap_err();
            assert_eq!(err.kind, DeviceErrorKind::Connection);
        }
        for _ in 0..5 {
            assert!(config
                .check_operation("plc", "connect", DeviceErrorKind::Connection)
                .is_ok());
        }
    }

    #[test]
    fn test_fail_after_n() {
        let config = ErrorConfig::scenario(ErrorScenario::FailAfterN {
            operation: "probe",
            count: 5,
        });
        for i in 0..5 {
            assert!(
                config.check_operation("plc", "probe", KIND).is_ok(),
                "Operation {} should succeed",
                i + 1
            );
        }
        for i in 5..10 {
            assert!(
                config.check_operation("plc", "probe", KIND).is_err(),
                "Operation {} should fail",
                i + 1
            );
        }
    }

    #[test]
    fn test_fail_on_specific_calls() {
        let config = ErrorConfig::scenario(ErrorScenario::FailOn {
            operation: "write",
            calls: vec![2, 4],
        });
        let results: Vec<bool> = (0..5)
            .map(|_| config.check_operation("plc", "write", KIND).is_ok())
            .collect();
        assert_eq!(results, vec![true, false, true, false, true]);
    }

    #[test]
    fn test_timeout_scenario() {
        let config = ErrorConfig::scenario(ErrorScenario::Timeout {
            operation: "retrieve",
        });
        let err = config.check_operation("cam", "retrieve", KIND).unwrap_err();
        assert!(err.is_timeout());
        assert!(config.check_operation("cam", "start", KIND).is_ok());
    }

    #[test]
    fn test_communication_loss_is_sticky() {
        let config = ErrorConfig::scenario(ErrorScenario::CommunicationLoss);
        let err = config.check_operation("plc", "write", KIND).unwrap_err();
        assert_eq!(err.kind, DeviceErrorKind::Communication);
        assert!(config.check_operation("plc", "probe", KIND).is_err());

        config.reset();
        assert_eq!(config.calls("probe"), 0);
    }

    #[test]
    fn test_reset_restarts_call_numbers() {
        let config = ErrorConfig::scenario(ErrorScenario::FailAfterN {
            operation: "write",
            count: 2,
        });
        assert!(config.check_operation("plc", "write", KIND).is_ok());
        assert!(config.check_operation("plc", "write", KIND).is_ok());
        assert!(config.check_operation("plc", "write", KIND).is_err());

        config.reset();

        assert!(config.check_operation("plc", "write", KIND).is_ok());
        assert!(config.check_operation("plc", "write", KIND).is_ok());
        assert!(config.check_operation("plc", "write", KIND).is_err());
    }

    #[test]
    fn test_custom_rates() {
        let mut rates = HashMap::new();
        rates.insert("write", 1.0);
        rates.insert("probe", 0.0);
        let config = ErrorConfig::with_rates(rates, Some(1));

        for _ in 0..10 {
            assert!(config.check_operation("plc", "write", KIND).is_err());
            assert!(config.check_operation("plc", "probe", KIND).is_ok());
        }
    }
}
