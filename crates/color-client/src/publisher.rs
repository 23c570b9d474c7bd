//! Periodic publication of the latest sample to one control endpoint.
//!
//! A [`PublisherLink`] owns an [`EndpointConnector`], a [`SampleReader`] and its own
//! [`ConnectionTracker`]. It never touches the sensor or the measurement log, so a dead
//! or slow endpoint only delays this publisher's own cadence.
//!
//! # Loop
//!
//! 1. `Disconnected`: connect. On failure wait the backoff and try again.
//! 2. `Connected`: every period, read the store. Nothing written yet means the tick is
//!    skipped. Otherwise write every mapped channel in one batch, then probe.
//! 3. Any write or probe failure drops the whole session and goes straight back to 1.
//!
//! Every endpoint operation is bounded by the I/O timeout; the stop signal is observed
//! once per tick and during every wait.

use crate::reconnect::{ConnectionState, ConnectionTracker, ReconnectConfig};
use color_core::{
    Channel, ColorSample, DeviceError, EndpointConnector, EndpointSession, SampleReader,
    StopSignal, TargetWrite,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

// =============================================================================
// Errors
// =============================================================================

/// Publisher failures.
#[derive(Error, Debug, Clone)]
pub enum PublishError {
    /// An endpoint operation did not finish within the I/O timeout.
    #[error("Endpoint operation '{operation}' timed out after {timeout:?}")]
    Timeout {
        /// Operation name
        operation: &'static str,
        /// Configured timeout
        timeout: Duration,
    },

    /// The endpoint reported an error.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The publisher configuration is unusable.
    #[error("Invalid publisher configuration: {0}")]
    InvalidConfig(String),
}

// =============================================================================
// Channel Map
// =============================================================================

/// One published channel and the endpoint target that receives it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTarget {
    /// Sample channel
    pub channel: Channel,
    /// Endpoint target identifier
    pub target: String,
}

/// Ordered list of published channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelMap(Vec<ChannelTarget>);

impl ChannelMap {
    /// Build a map from `(channel, target)` pairs.
    pub fn new<T: Into<String>>(pairs: impl IntoIterator<Item = (Channel, T)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(channel, target)| ChannelTarget {
                    channel,
                    target: target.into(),
                })
                .collect(),
        )
    }

    /// The six channels relayed to the material-delivery PLC.
    #[must_use]
    pub fn plc_default() -> Self {
        Self::new([
            (Channel::R, "ns=4;i=116"),
            (Channel::G, "ns=4;i=94"),
            (Channel::B, "ns=4;i=95"),
            (Channel::LStar, "ns=4;i=96"),
            (Channel::AStar, "ns=4;i=97"),
            (Channel::BStar, "ns=4;i=98"),
        ])
    }

    /// All nine channels, addressed by their labels.
    #[must_use]
    pub fn labels() -> Self {
        Self::new(Channel::ALL.map(|c| (c, c.label())))
    }

    /// Entries in publication order.
    #[must_use]
    pub fn entries(&self) -> &[ChannelTarget] {
        &self.0
    }

    /// Check that every required channel is mapped, targets are unique and contain no
    /// whitespace.
    pub fn validate(&self) -> Result<(), PublishError> {
        for required in Channel::REQUIRED {
            if !self.0.iter().any(|e| e.channel == required) {
                return Err(PublishError::InvalidConfig(format!(
                    "channel map is missing required channel {}",
                    required
                )));
            }
        }
        for (i, entry) in self.0.iter().enumerate() {
            if entry.target.is_empty() || entry.target.chars().any(char::is_whitespace) {
                return Err(PublishError::InvalidConfig(format!(
                    "target '{}' for channel {} must be non-empty and contain no whitespace",
                    entry.target, entry.channel
                )));
            }
            if self.0[..i].iter().any(|e| e.target == entry.target) {
                return Err(PublishError::InvalidConfig(format!(
                    "target '{}' is mapped twice",
                    entry.target
                )));
            }
        }
        Ok(())
    }

    /// Values of `sample` addressed to their targets.
    #[must_use]
    pub fn writes_for(&self, sample: &ColorSample) -> Vec<TargetWrite> {
        self.0
            .iter()
            .map(|e| TargetWrite::new(e.target.clone(), sample.value(e.channel)))
            .collect()
    }
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self::plc_default()
    }
}

// =============================================================================
// Configuration & Statistics
// =============================================================================

/// Publisher timing and channel configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PublisherConfig {
    /// Name used in logs
    pub name: String,
    /// Time between publications
    pub period: Duration,
    /// Reconnect policy
    pub reconnect: ReconnectConfig,
    /// Bound on every single endpoint operation
    pub io_timeout: Duration,
    /// Published channels
    pub channels: ChannelMap,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            name: "publisher".to_string(),
            period: Duration::from_secs(1),
            reconnect: ReconnectConfig::default(),
            io_timeout: Duration::from_secs(5),
            channels: ChannelMap::default(),
        }
    }
}

impl PublisherConfig {
    /// Validate durations and the channel map.
    pub fn validate(&self) -> Result<(), PublishError> {
        if self.period.is_zero() {
            return Err(PublishError::InvalidConfig("period must be non-zero".into()));
        }
        if self.reconnect.backoff.is_zero() {
            return Err(PublishError::InvalidConfig("backoff must be non-zero".into()));
        }
        if self.io_timeout.is_zero() {
            return Err(PublishError::InvalidConfig(
                "io_timeout must be non-zero".into(),
            ));
        }
        self.channels.validate()
    }
}

/// Counters kept by a running publisher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublisherStats {
    /// Connect attempts
    pub connect_attempts: u64,
    /// Failed connect attempts
    pub connect_failures: u64,
    /// Backoff waits completed or interrupted
    pub backoff_waits: u64,
    /// Successful write + probe rounds
    pub publishes: u64,
    /// Ticks skipped because no sample existed yet
    pub skipped_ticks: u64,
    /// Sessions dropped after a write or probe failure
    pub session_faults: u64,
}

/// Shared view of a publisher's statistics.
#[derive(Debug, Clone, Default)]
pub struct StatsHandle(Arc<Mutex<PublisherStats>>);

impl StatsHandle {
    /// Copy of the current counters.
    #[must_use]
    pub fn snapshot(&self) -> PublisherStats {
        self.0.lock().clone()
    }

    fn update(&self, f: impl FnOnce(&mut PublisherStats)) {
        f(&mut self.0.lock());
    }
}

// =============================================================================
// PublisherLink
// =============================================================================

/// Long-lived, self-healing link to one endpoint.
pub struct PublisherLink {
    config: PublisherConfig,
    connector: Arc<dyn EndpointConnector>,
    reader: SampleReader,
    tracker: ConnectionTracker,
    stats: StatsHandle,
}

impl std::fmt::Debug for PublisherLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherLink")
            .field("config", &self.config)
            .field("endpoint", &self.connector.address())
            .field("state", &self.tracker.state())
            .finish()
    }
}

impl PublisherLink {
    /// Create a link. Fails if the configuration does not validate.
    pub fn new(
        config: PublisherConfig,
        connector: Arc<dyn EndpointConnector>,
        reader: SampleReader,
    ) -> Result<Self, PublishError> {
        config.validate()?;
        let tracker = ConnectionTracker::new(config.name.clone());
        Ok(Self {
            config,
            connector,
            reader,
            tracker,
            stats: StatsHandle::default(),
        })
    }

    /// Publisher name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Observe connection state changes.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.tracker.subscribe()
    }

    /// Statistics handle that stays valid while and after the link runs.
    #[must_use]
    pub fn stats(&self) -> StatsHandle {
        self.stats.clone()
    }

    /// Run until `stop` fires. Returns the final statistics.
    pub async fn run(self, mut stop: StopSignal) -> PublisherStats {
        let name = self.config.name.clone();
        tracing::info!(
            publisher = %name,
            endpoint = %self.connector.address(),
            period_ms = self.config.period.as_millis() as u64,
            "Publisher started"
        );

        let mut session: Option<Box<dyn EndpointSession>> = None;
        let mut failed_attempts: u32 = 0;

        while !stop.is_stopped() {
            let Some(active) = session.as_mut() else {
                self.tracker.transition(ConnectionState::Connecting);
                self.stats.update(|s| s.connect_attempts += 1);

                let result = tokio::select! {
                    biased;
                    _ = stop.stopped() => break,
                    r = self.bounded("connect", self.connector.connect()) => r,
                };

                match result {
                    Ok(s) => {
                        self.tracker.transition(ConnectionState::Connected {
                            connected_at: Instant::now(),
                        });
                        tracing::info!(publisher = %name, endpoint = %self.connector.address(), "Publisher connected");
                        failed_attempts = 0;
                        session = Some(s);
                    }
                    Err(e) => {
                        self.tracker.transition(ConnectionState::Disconnected);
                        failed_attempts = failed_attempts.saturating_add(1);
                        self.stats.update(|s| s.connect_failures += 1);

                        if !self.config.reconnect.should_retry(failed_attempts) {
                            tracing::error!(publisher = %name, error = %e, attempts = failed_attempts, "Giving up on endpoint");
                            break;
                        }
                        let delay = self.config.reconnect.delay_for_attempt(failed_attempts);
                        tracing::warn!(
                            publisher = %name,
                            error = %e,
                            retry_in_ms = delay.as_millis() as u64,
                            "Connect failed, retrying"
                        );
                        self.stats.update(|s| s.backoff_waits += 1);
                        if !sleep_or_stop(delay, &mut stop).await {
                            break;
                        }
                    }
                }
                continue;
            };

            match self.reader.read() {
                None => {
                    self.stats.update(|s| s.skipped_ticks += 1);
                    tracing::trace!(publisher = %name, "No sample yet, tick skipped");
                }
                Some(sample) => {
                    let writes = self.config.channels.writes_for(&sample);
                    match self.publish(active.as_mut(), &writes).await {
                        Ok(()) => {
                            self.stats.update(|s| s.publishes += 1);
                        }
                        Err(e) => {
                            self.stats.update(|s| s.session_faults += 1);
                            tracing::warn!(publisher = %name, error = %e, "Session fault, reconnecting");
                            if let Some(dead) = session.take() {
                                self.close_session(dead).await;
                            }
                            self.tracker.transition(ConnectionState::Disconnected);
                            continue;
                        }
                    }
                }
            }

            if !sleep_or_stop(self.config.period, &mut stop).await {
                break;
            }
        }

        if let Some(s) = session.take() {
            self.close_session(s).await;
        }
        self.tracker.reset();

        let stats = self.stats.snapshot();
        tracing::info!(
            publisher = %name,
            publishes = stats.publishes,
            session_faults = stats.session_faults,
            connect_failures = stats.connect_failures,
            "Publisher stopped"
        );
        stats
    }

    async fn publish(
        &self,
        session: &mut dyn EndpointSession,
        writes: &[TargetWrite],
    ) -> Result<(), PublishError> {
        self.bounded("write", session.write_values(writes)).await?;
        self.bounded("probe", session.probe()).await
    }

    async fn close_session(&self, session: Box<dyn EndpointSession>) {
        if let Err(e) = self.bounded("close", session.close()).await {
            tracing::debug!(publisher = %self.config.name, error = %e, "Error while closing session");
        }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, DeviceError>>,
    ) -> Result<T, PublishError> {
        match tokio::time::timeout(self.config.io_timeout, fut).await {
            Ok(result) => result.map_err(PublishError::from),
            Err(_) => Err(PublishError::Timeout {
                operation,
                timeout: self.config.io_timeout,
            }),
        }
    }
}

/// Sleep for `duration` unless `stop` fires first. Returns false on stop.
async fn sleep_or_stop(duration: Duration, stop: &mut StopSignal) -> bool {
    tokio::select! {
        biased;
        _ = stop.stopped() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_core::{ColorTransform, Rgb};

    #[test]
    fn test_plc_default_is_valid() {
        let map = ChannelMap::plc_default();
        assert!(map.validate().is_ok());
        assert_eq!(map.entries().len(), 6);
        assert_eq!(map.entries()[3].channel, Channel::LStar);
    }

    #[test]
    fn test_missing_required_channel() {
        let map = ChannelMap::new([(Channel::R, "r"), (Channel::G, "g")]);
        let err = map.validate().unwrap_err();
        assert!(err.to_string().contains("missing required channel B"));
    }

    #[test]
    fn test_duplicate_and_blank_targets() {
        let mut pairs: Vec<(Channel, String)> = Channel::REQUIRED
            .iter()
            .map(|c| (*c, c.label().to_string()))
            .collect();
        pairs.push((Channel::X, "R".to_string()));
        assert!(ChannelMap::new(pairs.clone()).validate().is_err());

        pairs.pop();
        pairs.push((Channel::X, "has space".to_string()));
        assert!(ChannelMap::new(pairs).validate().is_err());
    }

    #[test]
    fn test_writes_follow_map_order() {
        let sample = ColorSample::from_rgb(Rgb::new(1.0, 2.0, 3.0), &ColorTransform::default());
        let writes = ChannelMap::labels().writes_for(&sample);
        assert_eq!(writes.len(), 9);
        assert_eq!(writes[0], TargetWrite::new("R", 1.0));
        assert_eq!(writes[2], TargetWrite::new("B", 3.0));
        assert_eq!(writes[6].target, "L*");
        assert_eq!(writes[6].value, sample.lab().l);
    }

    #[test]
    fn test_channel_map_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            channels: ChannelMap,
        }
        let w: Wrapper = toml::from_str(
            r#"
            channels = [
                { channel = "R", target = "ns=4;i=116" },
                { channel = "L*", target = "ns=4;i=96" },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(w.channels.entries()[1].channel, Channel::LStar);
    }

    #[test]
    fn test_config_validation() {
        assert!(PublisherConfig::default().validate().is_ok());
        let zero_period = PublisherConfig {
            period: Duration::ZERO,
            ..Default::default()
        };
        assert!(zero_period.validate().is_err());
    }
}
