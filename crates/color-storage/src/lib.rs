//! `color-storage`
//!
//! Durable, append-only persistence of every [`ColorSample`](color_core::ColorSample).
//!
//! - [`DurableLog`]: CSV writer with a write-once header and one flushed row per sample
//! - [`LogRecord`]: the formatted on-disk row
//! - [`StorageError`]: failures reported back to the acquisition loop

pub mod csv_log;
pub mod error;

pub use csv_log::{DurableLog, LogRecord, LOG_HEADER, TIME_FORMAT};
pub use error::StorageError;
