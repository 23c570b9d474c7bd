//! Mock RGB sensor.
//!
//! Simulates an area-scan color camera observing a uniformly colored sample:
//! - Configurable base color and per-sample noise (seeded)
//! - Frame interval and blocking timeouts in Realistic/Chaos mode
//! - Random frame drops in Chaos mode
//! - A script of explicit outcomes (frames, timeouts, malformed frames, faults) that is
//!   played before falling back to generated frames
//! - Error injection through [`ErrorConfig`]

use crate::common::{ErrorConfig, MockMode, MockRng};
use crate::pattern;
use color_core::capabilities::ROI_ALIGNMENT;
use color_core::{
    DeviceError, DeviceErrorKind, DeviceSettings, Frame, FrameSource, Roi, SensorSettings,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Configuration
// =============================================================================

/// Deserializable mock sensor configuration (`[sensor.mock]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockSensorConfig {
    /// Timing mode
    pub mode: MockMode,
    /// Mean color of generated frames
    pub base_rgb: [f64; 3],
    /// Uniform noise amplitude per channel sample
    pub noise: f64,
    /// Time between frames in Realistic/Chaos mode
    pub frame_interval_ms: u64,
    /// Probability of dropping a frame in Chaos mode
    pub drop_rate: f64,
    /// Generated frame size `(width, height)`
    pub frame_size: (u32, u32),
    /// Full sensor size `(width, height)`
    pub sensor_size: (u32, u32),
    /// RNG seed; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for MockSensorConfig {
    fn default() -> Self {
        Self {
            mode: MockMode::Instant,
            base_rgb: [120.0, 90.0, 60.0],
            noise: 0.0,
            frame_interval_ms: 16,
            drop_rate: 0.0,
            frame_size: (64, 48),
            sensor_size: (1936, 1216),
            seed: None,
        }
    }
}

/// One scripted outcome of a `retrieve` call.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorStep {
    /// A solid frame of this color
    Frame([u8; 3]),
    /// No frame within the timeout
    Timeout,
    /// A frame whose buffer does not match its geometry
    Malformed,
    /// An empty 0x0 frame
    Empty,
    /// A device error
    Fault,
}

/// Counters shared with whoever built the sensor.
#[derive(Debug, Default)]
pub struct SensorCounters {
    /// `retrieve` calls
    pub retrieves: AtomicU64,
    /// Well-formed frames delivered
    pub frames: AtomicU64,
    /// `start_grabbing` calls
    pub starts: AtomicU64,
    /// `stop_grabbing` calls
    pub stops: AtomicU64,
    /// `close` calls
    pub closes: AtomicU64,
}

impl SensorCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read a counter.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`MockSensor`]
#[derive(Debug, Clone)]
pub struct MockSensorBuilder {
    name: String,
    config: MockSensorConfig,
    error_config: ErrorConfig,
    script: Vec<SensorStep>,
    cycle_script: bool,
}

impl MockSensorBuilder {
    fn new() -> Self {
        Self {
            name: "mock_sensor".to_string(),
            config: MockSensorConfig::default(),
            error_config: ErrorConfig::none(),
            script: Vec::new(),
            cycle_script: false,
        }
    }

    /// Device name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: MockSensorConfig) -> Self {
        self.config = config;
        self
    }

    /// Timing mode
    pub fn mode(mut self, mode: MockMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Mean color of generated frames
    pub fn base_rgb(mut self, rgb: [u8; 3]) -> Self {
        self.config.base_rgb = rgb.map(f64::from);
        self
    }

    /// Noise amplitude
    pub fn noise(mut self, amplitude: f64) -> Self {
        self.config.noise = amplitude.max(0.0);
        self
    }

    /// Frame interval in Realistic/Chaos mode
    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.config.frame_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Drop probability in Chaos mode
    pub fn drop_rate(mut self, rate: f64) -> Self {
        self.config.drop_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Generated frame size
    pub fn frame_size(mut self, width: u32, height: u32) -> Self {
        self.config.frame_size = (width, height);
        self
    }

    /// RNG seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Error injection
    pub fn error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    /// Outcomes played before generated frames
    pub fn script(mut self, steps: impl IntoIterator<Item = SensorStep>) -> Self {
        self.script = steps.into_iter().collect();
        self
    }

    /// Replay the script forever instead of falling back to generated frames
    pub fn cycle_script(mut self, cycle: bool) -> Self {
        self.cycle_script = cycle;
        self
    }

    /// Build the sensor
    pub fn build(self) -> MockSensor {
        let rng = MockRng::new(self.config.seed);
        let (w, h) = self.config.sensor_size;
        MockSensor {
            name: self.name,
            script: self.script.iter().cloned().collect(),
            original_script: if self.cycle_script {
                self.script
            } else {
                Vec::new()
            },
            config: self.config,
            errors: self.error_config,
            rng,
            grabbing: false,
            frame_number: 0,
            settings: SensorSettings {
                roi: Some(Roi::full(w, h)),
                ..SensorSettings::default()
            },
            counters: Arc::new(SensorCounters::default()),
        }
    }
}

// =============================================================================
// MockSensor
// =============================================================================

/// Simulated RGB sensor.
///
/// # Example
///
/// ```rust,ignore
/// let mut sensor = MockSensor::builder()
///     .base_rgb([200, 100, 50])
///     .script([SensorStep::Timeout, SensorStep::Malformed])
///     .build();
/// sensor.start_grabbing()?;
/// assert!(sensor.retrieve(Duration::from_millis(5))?.is_none());
/// ```
#[derive(Debug)]
pub struct MockSensor {
    name: String,
    config: MockSensorConfig,
    errors: ErrorConfig,
    rng: MockRng,
    script: VecDeque<SensorStep>,
    original_script: Vec<SensorStep>,
    grabbing: bool,
    frame_number: u64,
    settings: SensorSettings,
    counters: Arc<SensorCounters>,
}

impl MockSensor {
    /// Create builder for advanced configuration
    pub fn builder() -> MockSensorBuilder {
        MockSensorBuilder::new()
    }

    /// Build from a deserialized configuration
    pub fn from_config(name: impl Into<String>, config: MockSensorConfig) -> Self {
        Self::builder().name(name).config(config).build()
    }

    /// Shared call counters
    pub fn counters(&self) -> Arc<SensorCounters> {
        Arc::clone(&self.counters)
    }

    /// Settings accepted by the last `apply_settings`
    pub fn settings(&self) -> &SensorSettings {
        &self.settings
    }

    fn next_step(&mut self) -> Option<SensorStep> {
        if self.script.is_empty() && !self.original_script.is_empty() {
            self.script.extend(self.original_script.iter().cloned());
        }
        self.script.pop_front()
    }

    fn wait(&self, duration: Duration) {
        if self.config.mode.has_delays() && !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }

    fn deliver(&mut self, frame: Frame) -> Option<Frame> {
        self.frame_number += 1;
        if frame.is_well_formed() {
            SensorCounters::bump(&self.counters.frames);
        }
        Some(frame.with_frame_number(self.frame_number))
    }

    fn generated_frame(&mut self, timeout: Duration) -> Option<Frame> {
        let interval = Duration::from_millis(self.config.frame_interval_ms);
        if self.config.mode.has_delays() && interval > timeout {
            self.wait(timeout);
            return None;
        }
        self.wait(interval);
        if self.config.mode == MockMode::Chaos && self.rng.should_fail(self.config.drop_rate) {
            return None;
        }
        let (w, h) = self.config.frame_size;
        let frame = pattern::noisy_frame(w, h, self.config.base_rgb, self.config.noise, &self.rng);
        self.deliver(frame)
    }
}

impl FrameSource for MockSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn start_grabbing(&mut self) -> Result<(), DeviceError> {
        self.errors
            .check_operation(&self.name, "start", DeviceErrorKind::Hardware)?;
        SensorCounters::bump(&self.counters.starts);
        self.grabbing = true;
        tracing::debug!(device = %self.name, "Mock sensor grabbing started");
        Ok(())
    }

    fn retrieve(&mut self, timeout: Duration) -> Result<Option<Frame>, DeviceError> {
        if !self.grabbing {
            return Err(DeviceError::new(
                &self.name,
                DeviceErrorKind::Configuration,
                "retrieve called while not grabbing",
            ));
        }
        SensorCounters::bump(&self.counters.retrieves);
        self.errors
            .check_operation(&self.name, "retrieve", DeviceErrorKind::Hardware)?;

        let (w, h) = self.config.frame_size;
        match self.next_step() {
            None => Ok(self.generated_frame(timeout)),
            Some(SensorStep::Frame(rgb)) => {
                self.wait(Duration::from_millis(self.config.frame_interval_ms).min(timeout));
                Ok(self.deliver(Frame::solid(w, h, rgb)))
            }
            Some(SensorStep::Timeout) => {
                self.wait(timeout);
                Ok(None)
            }
            Some(SensorStep::Malformed) => Ok(self.deliver(pattern::truncated_frame(w, h))),
            Some(SensorStep::Empty) => Ok(self.deliver(Frame::rgb8(0, 0, Vec::new()))),
            Some(SensorStep::Fault) => Err(DeviceError::new(
                &self.name,
                DeviceErrorKind::Hardware,
                "Scripted retrieve fault",
            )),
        }
    }

    fn stop_grabbing(&mut self) -> Result<(), DeviceError> {
        if self.grabbing {
            SensorCounters::bump(&self.counters.stops);
            self.grabbing = false;
            tracing::debug!(device = %self.name, "Mock sensor grabbing stopped");
        }
        Ok(())
    }

    fn is_grabbing(&self) -> bool {
        self.grabbing
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.stop_grabbing()?;
        SensorCounters::bump(&self.counters.closes);
        Ok(())
    }
}

impl DeviceSettings for MockSensor {
    fn sensor_size(&self) -> (u32, u32) {
        self.config.sensor_size
    }

    fn apply_settings(&mut self, settings: &SensorSettings) -> Result<SensorSettings, DeviceError> {
        self.errors
            .check_operation(&self.name, "apply_settings", DeviceErrorKind::Configuration)?;
        settings.validate().map_err(|e| {
            DeviceError::new(&self.name, DeviceErrorKind::Configuration, e.to_string())
        })?;

        let (w, h) = self.config.sensor_size;
        let roi = settings.roi.unwrap_or_else(|| Roi::full(w, h)).aligned_to(w, h);
        let accepted = SensorSettings {
            roi: Some(roi),
            ..settings.clone()
        };
        tracing::info!(
            device = %self.name,
            offset_x = roi.offset_x,
            offset_y = roi.offset_y,
            width = roi.width,
            height = roi.height,
            alignment = ROI_ALIGNMENT,
            exposure_us = accepted.exposure_us,
            gain = accepted.gain,
            "Mock sensor settings applied"
        );
        self.settings = accepted.clone();
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorScenario;
    use color_core::Rgb;

    const T: Duration = Duration::from_millis(5);

    #[test]
    fn test_retrieve_requires_grabbing() {
        let mut sensor = MockSensor::builder().build();
        let err = sensor.retrieve(T).unwrap_err();
        assert_eq!(err.kind, DeviceErrorKind::Configuration);
    }

    #[test]
    fn test_generated_frames_have_base_color() {
        let mut sensor = MockSensor::builder().base_rgb([200, 100, 50]).seed(3).build();
        sensor.start_grabbing().unwrap();
        let frame = sensor.retrieve(T).unwrap().unwrap();
        assert_eq!(frame.channel_means(), Some(Rgb::new(200.0, 100.0, 50.0)));
        assert_eq!(frame.frame_number, 1);
    }

    #[test]
    fn test_script_is_played_in_order() {
        let mut sensor = MockSensor::builder()
            .base_rgb([1, 2, 3])
            .script([
                SensorStep::Frame([10, 20, 30]),
                SensorStep::Timeout,
                SensorStep::Malformed,
                SensorStep::Empty,
                SensorStep::Fault,
            ])
            .build();
        sensor.start_grabbing().unwrap();

        let first = sensor.retrieve(T).unwrap().unwrap();
        assert_eq!(first.channel_means(), Some(Rgb::new(10.0, 20.0, 30.0)));
        assert!(sensor.retrieve(T).unwrap().is_none());
        assert!(!sensor.retrieve(T).unwrap().unwrap().is_well_formed());
        assert!(!sensor.retrieve(T).unwrap().unwrap().is_well_formed());
        assert!(sensor.retrieve(T).is_err());

        // script exhausted: back to generated frames
        let next = sensor.retrieve(T).unwrap().unwrap();
        assert_eq!(next.channel_means(), Some(Rgb::new(1.0, 2.0, 3.0)));
        assert_eq!(SensorCounters::get(&sensor.counters().frames), 2);
    }

    #[test]
    fn test_cycled_script_repeats() {
        let mut sensor = MockSensor::builder()
            .script([SensorStep::Timeout, SensorStep::Frame([5, 5, 5])])
            .cycle_script(true)
            .build();
        sensor.start_grabbing().unwrap();
        let delivered = (0..10)
            .filter(|_| sensor.retrieve(T).unwrap().is_some())
            .count();
        assert_eq!(delivered, 5);
    }

    #[test]
    fn test_realistic_timeout_blocks_for_timeout() {
        let mut sensor = MockSensor::builder()
            .mode(MockMode::Realistic)
            .script([SensorStep::Timeout])
            .build();
        sensor.start_grabbing().unwrap();
        let start = std::time::Instant::now();
        assert!(sensor.retrieve(Duration::from_millis(30)).unwrap().is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_injected_retrieve_error() {
        let mut sensor = MockSensor::builder()
            .error_config(ErrorConfig::scenario(ErrorScenario::FailOn {
                operation: "retrieve",
                calls: vec![2],
            }))
            .build();
        sensor.start_grabbing().unwrap();
        assert!(sensor.retrieve(T).is_ok());
        assert!(sensor.retrieve(T).is_err());
        assert!(sensor.retrieve(T).is_ok());
    }

    #[test]
    fn test_stop_and_close_are_counted() {
        let mut sensor = MockSensor::builder().build();
        let counters = sensor.counters();
        sensor.start_grabbing().unwrap();
        sensor.stop_grabbing().unwrap();
        sensor.stop_grabbing().unwrap();
        sensor.close().unwrap();
        assert_eq!(SensorCounters::get(&counters.starts), 1);
        assert_eq!(SensorCounters::get(&counters.stops), 1);
        assert_eq!(SensorCounters::get(&counters.closes), 1);
        assert!(!sensor.is_grabbing());
    }

    #[test]
    fn test_apply_settings_aligns_roi() {
        let mut sensor = MockSensor::builder().build();
        let requested = SensorSettings {
            roi: Some(Roi {
                offset_x: 545,
                offset_y: 340,
                width: 850,
                height: 300,
            }),
            exposure_us: 16_000.0,
            gain: 3.95,
            white_balance: [1.0, 0.551, 1.287],
            packet_size: 8192,
            inter_packet_delay: 7643,
        };
        let accepted = sensor.apply_settings(&requested).unwrap();
        let roi = accepted.roi.unwrap();
        assert_eq!(roi.offset_x % 4, 0);
        assert_eq!(roi.width % 4, 0);
        assert_eq!(accepted.gain, 3.95);
        assert_eq!(sensor.settings(), &accepted);
    }

    #[test]
    fn test_apply_settings_rejects_invalid() {
        let mut sensor = MockSensor::builder().build();
        let bad = SensorSettings {
            exposure_us: -1.0,
            ..SensorSettings::default()
        };
        let err = sensor.apply_settings(&bad).unwrap_err();
        assert_eq!(err.kind, DeviceErrorKind::Configuration);
    }

    #[test]
    fn test_config_deserializes() {
        let config: MockSensorConfig = toml::from_str(
            r#"
            mode = "chaos"
            base_rgb = [10.0, 20.0, 30.0]
            noise = 1.5
            drop_rate = 0.1
            seed = 9
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, MockMode::Chaos);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.frame_size, (64, 48));
    }
}
