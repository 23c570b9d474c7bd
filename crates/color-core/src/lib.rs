//! `color-core`
//!
//! Core types and trait definitions for the color-daq acquisition pipeline.
//!
//! This crate holds everything that is shared between the acquisition thread, the
//! storage backend and the publisher tasks:
//!
//! - [`color`]: RGB → CIEXYZ → CIELAB conversion (pure, no I/O)
//! - [`sample`]: [`ColorSample`] value type, [`Channel`] selectors and averaging
//! - [`store`]: [`SampleStore`], the single-writer/multi-reader latest-value register
//! - [`data`]: raw [`Frame`] buffers delivered by a sensor
//! - [`capabilities`]: sensor and control-endpoint traits implemented by drivers
//! - [`events`]: acquisition event notifications and listeners
//! - [`shutdown`]: cooperative stop signals shared by all loops
//! - [`error`]: error types
//!
//! ## Data Flow
//!
//! ```text
//! FrameSource ──Frame──> channel means ──Rgb──> ColorTransform ──ColorSample──> SampleStore
//!                                                                     │
//!                                                          SampleReader (publishers)
//! ```

pub mod capabilities;
pub mod color;
pub mod data;
pub mod error;
pub mod events;
pub mod sample;
pub mod shutdown;
pub mod store;

pub use capabilities::{
    DeviceSettings, EndpointConnector, EndpointSession, FrameSource, Roi, SensorSettings,
    TargetWrite,
};
pub use color::{ColorTransform, Lab, LabResponse, Rgb, WhitePoint, Xyz};
pub use data::Frame;
pub use error::{ColorError, DeviceError, DeviceErrorKind};
pub use events::{
    AcquisitionEvent, AcquisitionListener, ChannelListener, SkipReason, TracingListener,
};
pub use sample::{Channel, ChannelMeans, ColorSample, SampleAccumulator, Timestamp};
pub use shutdown::{stop_channel, StopHandle, StopSignal};
pub use store::{SampleReader, SampleStore};
