//! # color-daq
//!
//! Colorimetric acquisition daemon: samples an RGB sensor, converts every frame to
//! CIEXYZ and CIELAB, keeps the latest measurement for concurrent readers, appends
//! every measurement to a CSV log and relays measurements to control endpoints over
//! self-healing links.
//!
//! ## Crate Structure
//!
//! - **`acquisition`**: the [`AcquisitionLoop`] producer running on its own thread.
//! - **`config`**: figment-based [`TrackerConfig`] (TOML file + `COLOR_DAQ_` environment).
//! - **`daemon`**: wiring of acquisition, publishers and the register server.
//! - **`tracing_setup`**: subscriber installation for the binary.
//!
//! The building blocks live in the workspace crates re-exported below:
//! `color_core` (conversion, sample store, traits), `color_storage` (CSV log),
//! `color_client` (publishers and transports) and `color_driver_mock` (simulated devices).

pub mod acquisition;
pub mod config;
pub mod daemon;
pub mod tracing_setup;

pub use acquisition::{AcquisitionError, AcquisitionLoop, AcquisitionState, AcquisitionStats};
pub use config::TrackerConfig;

pub use color_client;
pub use color_core;
pub use color_driver_mock;
pub use color_storage;
