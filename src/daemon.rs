//! Wiring of the acquisition thread, publishers and the register server.

use crate::acquisition::{AcquisitionLoop, AcquisitionStats};
use crate::config::{SensorConfig, TrackerConfig};
use anyhow::{anyhow, Context, Result};
use color_client::{
    connector_for, EndpointKind, LocalConnector, PublisherConfig, PublisherLink, PublisherStats,
    ReconnectConfig, RegisterServer, RegisterTable,
};
use color_core::{
    stop_channel, ChannelMeans, DeviceSettings, EndpointConnector, SampleReader, StopSignal,
    TracingListener,
};
use color_driver_mock::MockSensor;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Name of the publisher feeding the local register server.
pub const SERVER_PUBLISHER: &str = "register-server";

/// Statistics gathered over one daemon run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Acquisition counters
    pub acquisition: AcquisitionStats,
    /// Per-publisher counters, in start order
    pub publishers: Vec<(String, PublisherStats)>,
}

/// Build the configured sensor and apply its one-shot settings.
pub fn build_sensor(config: &SensorConfig) -> Result<MockSensor> {
    match config.driver.as_str() {
        "mock" => {
            let name = config
                .address
                .clone()
                .unwrap_or_else(|| "mock_sensor".to_string());
            let mut sensor = MockSensor::from_config(name, config.mock.clone());
            let accepted = sensor
                .apply_settings(&config.settings)
                .context("Failed to apply sensor settings")?;
            if let Some(roi) = accepted.roi {
                tracing::info!(
                    offset_x = roi.offset_x,
                    offset_y = roi.offset_y,
                    width = roi.width,
                    height = roi.height,
                    exposure_us = accepted.exposure_us,
                    gain = accepted.gain,
                    "Sensor configured"
                );
            }
            Ok(sensor)
        }
        other => Err(anyhow!("Unknown sensor driver '{}'", other)),
    }
}

/// Build an idle acquisition loop for `config`, with the log configured if enabled.
pub fn build_acquisition(config: &TrackerConfig) -> Result<AcquisitionLoop<MockSensor>> {
    let sensor = build_sensor(&config.sensor)?;
    let mut acquisition = AcquisitionLoop::new(
        sensor,
        config.color.transform(),
        config.sensor.frame_timeout(),
    );
    acquisition.add_listener(Arc::new(TracingListener));
    if config.storage.enabled {
        acquisition
            .configure_log(&config.storage.path)
            .with_context(|| {
                format!("Failed to open log file {}", config.storage.path.display())
            })?;
    }
    Ok(acquisition)
}

/// Register table serving every target written by local publishers.
fn register_table(config: &TrackerConfig) -> Result<RegisterTable> {
    let mut targets = BTreeSet::new();
    if config.server.enabled {
        targets.extend(config.server.channels.entries().iter().map(|e| e.target.clone()));
    }
    for publisher in config.enabled_publishers() {
        if matches!(publisher.endpoint()?.kind(), EndpointKind::Local { .. }) {
            targets.extend(publisher.channels.entries().iter().map(|e| e.target.clone()));
        }
    }
    Ok(RegisterTable::with_targets(targets))
}

fn spawn_publisher(
    config: PublisherConfig,
    connector: Arc<dyn EndpointConnector>,
    reader: SampleReader,
    stop: StopSignal,
) -> Result<(String, JoinHandle<PublisherStats>)> {
    let name = config.name.clone();
    let link = PublisherLink::new(config, connector, reader)
        .with_context(|| format!("Invalid publisher '{}'", name))?;
    Ok((name, tokio::spawn(link.run(stop))))
}

/// Run the pipeline until `shutdown` fires or acquisition ends on its own.
///
/// Setup errors (log path, server bind, publisher configuration) are returned before any
/// loop starts.
pub async fn run(config: TrackerConfig, mut shutdown: StopSignal) -> Result<RunSummary> {
    config.validate()?;
    let acquisition = build_acquisition(&config)?;
    let reader = acquisition.reader();
    let table = register_table(&config)?;

    // One internal stop for every task, fired on shutdown or when acquisition ends.
    let (stop, signal) = stop_channel();
    let mut tasks = Vec::new();

    let server_task = if config.server.enabled {
        let server = RegisterServer::bind(&config.server.bind, table.clone())
            .await
            .with_context(|| format!("Failed to bind register server to {}", config.server.bind))?;
        tracing::info!(addr = %server.local_addr()?, "Register server bound");

        let server_publisher = PublisherConfig {
            name: SERVER_PUBLISHER.to_string(),
            period: Duration::from_millis(config.server.period_ms),
            reconnect: ReconnectConfig::default(),
            io_timeout: Duration::from_secs(5),
            channels: config.server.channels.clone(),
        };
        tasks.push(spawn_publisher(
            server_publisher,
            Arc::new(LocalConnector::new(SERVER_PUBLISHER, table.clone())),
            reader.clone(),
            signal.clone(),
        )?);
        Some(tokio::spawn(server.run(signal.clone())))
    } else {
        None
    };

    for entry in config.enabled_publishers() {
        let connector = connector_for(&entry.endpoint()?, &table)
            .with_context(|| format!("Invalid endpoint for publisher '{}'", entry.name))?;
        tasks.push(spawn_publisher(
            entry.publisher_config(),
            connector,
            reader.clone(),
            signal.clone(),
        )?);
    }

    let acquisition_thread = acquisition
        .spawn(signal.clone())
        .context("Failed to start acquisition thread")?;
    let mut acquisition_join = tokio::task::spawn_blocking(move || acquisition_thread.join());

    let joined = tokio::select! {
        _ = shutdown.stopped() => None,
        joined = &mut acquisition_join => Some(joined),
    };
    stop.stop();
    let joined = match joined {
        Some(joined) => joined,
        None => acquisition_join.await,
    };

    let mut summary = RunSummary::default();
    for (name, task) in tasks {
        match task.await {
            Ok(stats) => summary.publishers.push((name, stats)),
            Err(e) => tracing::error!(publisher = %name, error = %e, "Publisher task failed"),
        }
    }
    if let Some(server) = server_task {
        match server.await {
            Ok(Err(e)) => tracing::warn!(error = %e, "Register server error"),
            Err(e) => tracing::error!(error = %e, "Register server task failed"),
            Ok(Ok(())) => {}
        }
    }

    let (acquisition, result) = joined
        .context("Acquisition join task failed")?
        .map_err(|_| anyhow!("Acquisition thread panicked"))?;
    result.context("Acquisition failed")?;
    summary.acquisition = acquisition.close().context("Failed to close sensor")?;
    Ok(summary)
}

/// Collect `samples` successful samples and return their means.
///
/// The measurement log is not written.
pub async fn measure(config: TrackerConfig, samples: u64, stop: StopSignal) -> Result<ChannelMeans> {
    config.validate()?;
    let sensor = build_sensor(&config.sensor)?;
    let mut acquisition = AcquisitionLoop::new(
        sensor,
        config.color.transform(),
        config.sensor.frame_timeout(),
    );

    let (acquisition, means) = tokio::task::spawn_blocking(move || {
        let means = acquisition.run_for(samples, &stop);
        (acquisition, means)
    })
    .await
    .context("Measurement task failed")?;

    let means = means?;
    acquisition.close()?;
    Ok(means)
}
