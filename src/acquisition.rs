//! Sensor acquisition loop.
//!
//! [`AcquisitionLoop`] owns the sensor, the [`SampleStore`] and the [`DurableLog`]. Each
//! retrieval attempt either produces one [`ColorSample`] (stored, logged, announced) or
//! counts as a miss. The loop is synchronous: blocking device calls run on a dedicated
//! OS thread started by [`AcquisitionLoop::spawn`] so they never occupy a runtime worker
//! that publishers need.
//!
//! # States
//!
//! ```text
//! Idle ──start──> Running ──stop──> Stopping ──> Idle
//! ```
//!
//! Only an idle loop can be reconfigured; [`configure_log`](AcquisitionLoop::configure_log)
//! and [`set_white_point`](AcquisitionLoop::set_white_point) take `&mut self`, so they can
//! never overlap an append in flight.

use color_core::{
    AcquisitionEvent, AcquisitionListener, ChannelMeans, ColorSample, ColorTransform,
    DeviceError, FrameSource, SampleAccumulator, SampleReader, SampleStore, SkipReason,
    StopSignal, Timestamp, WhitePoint,
};
use color_storage::{DurableLog, StorageError};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Name of the acquisition thread.
pub const ACQUISITION_THREAD: &str = "color-acquisition";

// =============================================================================
// State, Errors, Statistics
// =============================================================================

/// Lifecycle of an [`AcquisitionLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AcquisitionState {
    /// Not grabbing; may be reconfigured.
    Idle,
    /// Grabbing frames.
    Running,
    /// Stop observed, device being stopped.
    Stopping,
}

/// Acquisition failures.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    /// Operation not allowed in the current state.
    #[error("Acquisition is {actual:?}, expected {expected:?}")]
    InvalidState {
        /// Required state
        expected: AcquisitionState,
        /// Actual state
        actual: AcquisitionState,
    },

    /// The sensor failed to start or stop.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The log could not be configured.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// `run_for` ended on a stop signal before enough samples were collected.
    #[error("Interrupted after {collected} of {requested} samples")]
    Interrupted {
        /// Samples collected
        collected: u64,
        /// Samples requested
        requested: u64,
    },

    /// `run_for(0)`
    #[error("Sample count must be at least 1")]
    NoSamplesRequested,
}

/// Counters kept by the loop across runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AcquisitionStats {
    /// Samples produced
    pub samples: u64,
    /// Retrieval attempts that produced nothing (timeouts, malformed frames, device errors)
    pub misses: u64,
    /// Samples that could not be appended to the log
    pub log_failures: u64,
}

// =============================================================================
// AcquisitionLoop
// =============================================================================

/// Producer side of the pipeline.
pub struct AcquisitionLoop<S: FrameSource> {
    source: S,
    transform: ColorTransform,
    frame_timeout: Duration,
    store: SampleStore,
    log: DurableLog,
    listeners: Vec<Arc<dyn AcquisitionListener>>,
    state: watch::Sender<AcquisitionState>,
    stats: AcquisitionStats,
    grab_samples: u64,
    attached: bool,
}

impl<S: FrameSource> std::fmt::Debug for AcquisitionLoop<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionLoop")
            .field("device", &self.source.name())
            .field("state", &self.state())
            .field("transform", &self.transform)
            .field("log", &self.log.path())
            .field("stats", &self.stats)
            .finish()
    }
}

impl<S: FrameSource> AcquisitionLoop<S> {
    /// Create an idle loop with an empty store and no log.
    pub fn new(source: S, transform: ColorTransform, frame_timeout: Duration) -> Self {
        let (state, _) = watch::channel(AcquisitionState::Idle);
        Self {
            source,
            transform,
            frame_timeout,
            store: SampleStore::new(),
            log: DurableLog::new(),
            listeners: Vec::new(),
            state,
            stats: AcquisitionStats::default(),
            grab_samples: 0,
            attached: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> AcquisitionState {
        *self.state.borrow()
    }

    /// Observe state changes from other threads or tasks.
    pub fn subscribe_state(&self) -> watch::Receiver<AcquisitionState> {
        self.state.subscribe()
    }

    /// Reader handle for publishers.
    pub fn reader(&self) -> SampleReader {
        self.store.reader()
    }

    /// Latest sample.
    pub fn latest(&self) -> Option<ColorSample> {
        self.store.read()
    }

    /// Counters so far.
    pub fn stats(&self) -> AcquisitionStats {
        self.stats
    }

    /// Transform applied to new samples.
    pub fn transform(&self) -> &ColorTransform {
        &self.transform
    }

    /// The sensor.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Mutable access to the sensor (settings are applied while idle).
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Register an event listener.
    pub fn add_listener(&mut self, listener: Arc<dyn AcquisitionListener>) {
        self.listeners.push(listener);
    }

    /// Point the log at `path`, creating it with a header if it does not exist.
    pub fn configure_log(&mut self, path: impl AsRef<Path>) -> Result<(), AcquisitionError> {
        self.log.configure(path)?;
        Ok(())
    }

    /// Append samples to `writer` instead of a file; `name` identifies it in errors.
    pub fn configure_log_writer(
        &mut self,
        name: impl Into<PathBuf>,
        writer: impl Write + Send + 'static,
    ) {
        self.log.configure_writer(name, writer);
    }

    /// Stop appending samples to a file.
    pub fn disable_log(&mut self) {
        self.log.close();
    }

    /// The measurement log.
    pub fn log(&self) -> &DurableLog {
        &self.log
    }

    /// Use `white_point` for every sample produced from now on.
    pub fn set_white_point(&mut self, white_point: WhitePoint) {
        self.transform.white_point = white_point;
    }

    fn emit(&self, event: AcquisitionEvent) {
        for listener in &self.listeners {
            listener.on_event(&event);
        }
    }

    fn require(&self, expected: AcquisitionState) -> Result<(), AcquisitionError> {
        let actual = self.state();
        if actual == expected {
            Ok(())
        } else {
            Err(AcquisitionError::InvalidState { expected, actual })
        }
    }

    /// `Idle → Running`: start grabbing.
    pub fn start(&mut self) -> Result<(), AcquisitionError> {
        self.require(AcquisitionState::Idle)?;
        let device = self.source.name().to_string();
        if !self.attached {
            self.attached = true;
            self.emit(AcquisitionEvent::DeviceAttached {
                device: device.clone(),
            });
        }

        self.source.start_grabbing()?;
        self.grab_samples = 0;
        self.state.send_replace(AcquisitionState::Running);
        tracing::info!(device = %device, timeout_ms = self.frame_timeout.as_millis() as u64, "Acquisition started");
        self.emit(AcquisitionEvent::GrabStarted { device });
        Ok(())
    }

    /// One retrieval attempt. Returns the new sample, or `None` on a miss.
    pub fn step(&mut self) -> Result<Option<ColorSample>, AcquisitionError> {
        self.require(AcquisitionState::Running)?;

        let frame = match self.source.retrieve(self.frame_timeout) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(self.miss(SkipReason::Timeout)),
            Err(e) => {
                tracing::warn!(device = %self.source.name(), error = %e, "Frame retrieval failed");
                return Ok(self.miss(SkipReason::DeviceError(e.to_string())));
            }
        };
        let captured = Timestamp::now();

        let Some(rgb) = frame.channel_means() else {
            tracing::debug!(
                device = %self.source.name(),
                frame_number = frame.frame_number,
                len = frame.data.len(),
                "Discarding malformed frame"
            );
            return Ok(self.miss(SkipReason::Malformed));
        };

        let sample = ColorSample::captured_at(captured, rgb, &self.transform);
        self.store.write(sample);
        if self.log.is_configured() {
            if let Err(e) = self.log.append(&sample) {
                self.stats.log_failures += 1;
                tracing::warn!(error = %e, failures = self.stats.log_failures, "Failed to append sample to log");
            }
        }
        self.stats.samples += 1;
        self.grab_samples += 1;
        self.emit(AcquisitionEvent::FrameGrabbed {
            frame_number: frame.frame_number,
            sample,
        });
        Ok(Some(sample))
    }

    fn miss(&mut self, reason: SkipReason) -> Option<ColorSample> {
        self.stats.misses += 1;
        self.emit(AcquisitionEvent::FrameSkipped { reason });
        None
    }

    /// `Running → Stopping → Idle`. Stopping an idle loop does nothing.
    pub fn stop(&mut self) -> Result<(), AcquisitionError> {
        if self.state() == AcquisitionState::Idle {
            return Ok(());
        }
        self.state.send_replace(AcquisitionState::Stopping);
        let result = self.source.stop_grabbing();
        self.state.send_replace(AcquisitionState::Idle);

        let device = self.source.name().to_string();
        tracing::info!(
            device = %device,
            samples = self.grab_samples,
            misses = self.stats.misses,
            "Acquisition stopped"
        );
        self.emit(AcquisitionEvent::GrabStopped {
            device,
            samples: self.grab_samples,
        });
        result.map_err(AcquisitionError::from)
    }

    /// Grab until `stop` fires, then return to `Idle`.
    ///
    /// The stop signal is checked after every retrieval attempt, so the loop ends within
    /// one frame timeout of the stop.
    pub fn run(&mut self, stop: &StopSignal) -> Result<AcquisitionStats, AcquisitionError> {
        self.start()?;
        while !stop.is_stopped() {
            if let Err(e) = self.step() {
                let _ = self.stop();
                return Err(e);
            }
        }
        self.stop()?;
        Ok(self.stats)
    }

    /// Grab exactly `samples` successful samples and return their means.
    ///
    /// Misses do not count. If `stop` fires first the loop still returns to `Idle` and
    /// the result is [`AcquisitionError::Interrupted`].
    pub fn run_for(
        &mut self,
        samples: u64,
        stop: &StopSignal,
    ) -> Result<ChannelMeans, AcquisitionError> {
        if samples == 0 {
            return Err(AcquisitionError::NoSamplesRequested);
        }
        self.start()?;

        let mut accumulator = SampleAccumulator::new();
        while accumulator.count() < samples && !stop.is_stopped() {
            match self.step() {
                Ok(Some(sample)) => accumulator.push(&sample),
                Ok(None) => {}
                Err(e) => {
                    let _ = self.stop();
                    return Err(e);
                }
            }
        }
        self.stop()?;

        match accumulator.means() {
            Some(means) if means.count() == samples => Ok(means),
            _ => Err(AcquisitionError::Interrupted {
                collected: accumulator.count(),
                requested: samples,
            }),
        }
    }

    /// Release the device. Returns the final statistics.
    pub fn close(mut self) -> Result<AcquisitionStats, AcquisitionError> {
        self.stop()?;
        self.log.close();
        self.source.close()?;
        self.emit(AcquisitionEvent::DeviceClosed {
            device: self.source.name().to_string(),
        });
        Ok(self.stats)
    }
}

/// Result handed back by the acquisition thread.
pub type AcquisitionOutcome<S> = (AcquisitionLoop<S>, Result<AcquisitionStats, AcquisitionError>);

impl<S: FrameSource + 'static> AcquisitionLoop<S> {
    /// Run [`run`](Self::run) on a dedicated named thread.
    ///
    /// The loop is handed back when the thread finishes so the caller can inspect or
    /// close it.
    pub fn spawn(mut self, stop: StopSignal) -> std::io::Result<JoinHandle<AcquisitionOutcome<S>>> {
        std::thread::Builder::new()
            .name(ACQUISITION_THREAD.to_string())
            .spawn(move || {
                let result = self.run(&stop);
                if let Err(e) = &result {
                    tracing::error!(error = %e, "Acquisition ended with error");
                }
                (self, result)
            })
    }
}
