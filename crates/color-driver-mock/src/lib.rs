//! Mock devices for color-daq.
//!
//! Simulated collaborators with deterministic behavior and error injection:
//!
//! - [`MockSensor`]: RGB frame source with configurable base color, noise, scripted
//!   timeouts and malformed frames
//! - [`MockEndpoint`]: control endpoint that records every connect, write and probe and
//!   can be told to fail any of them
//!
//! # Example
//!
//! ```rust,ignore
//! let sensor = MockSensor::builder()
//!     .base_rgb([120, 90, 60])
//!     .seed(7)
//!     .build();
//!
//! let endpoint = MockEndpoint::builder("plc")
//!     .error_config(ErrorConfig::scenario(ErrorScenario::FailFirst {
//!         operation: "connect",
//!         count: 3,
//!     }))
//!     .build();
//! ```

pub mod common;
pub mod mock_endpoint;
pub mod mock_sensor;
pub mod pattern;

pub use common::{ErrorConfig, ErrorScenario, MockMode, MockRng};
pub use mock_endpoint::{EndpointRecord, MockEndpoint, MockEndpointBuilder};
pub use mock_sensor::{MockSensor, MockSensorBuilder, MockSensorConfig, SensorCounters, SensorStep};
