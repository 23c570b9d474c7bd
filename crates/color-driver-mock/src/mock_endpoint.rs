//! Mock control endpoint.
//!
//! A connector whose sessions keep the written values in memory and log every
//! operation as an [`EndpointRecord`]. Cloning a [`MockEndpoint`] shares that log, so a
//! test can hand one clone to a publisher and inspect the other.
//!
//! Operations checked against the [`ErrorConfig`]: `connect`, `write`, `probe`.
//! Timestamps come from `tokio::time::Instant`, so they follow a paused test clock.

use crate::common::ErrorConfig;
use async_trait::async_trait;
use color_core::{DeviceError, DeviceErrorKind, EndpointConnector, EndpointSession, TargetWrite};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// One logged endpoint operation.
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointRecord {
    /// A connect attempt; `session` is `None` when it failed.
    Connect {
        /// When the attempt started
        at: Instant,
        /// Session id on success
        session: Option<u64>,
    },
    /// A `write_values` call.
    Write {
        /// Session id
        session: u64,
        /// Values written
        writes: Vec<TargetWrite>,
        /// Whether it succeeded
        ok: bool,
    },
    /// A liveness probe.
    Probe {
        /// Session id
        session: u64,
        /// Whether it succeeded
        ok: bool,
    },
    /// A session was closed.
    Close {
        /// Session id
        session: u64,
    },
}

#[derive(Debug)]
struct EndpointShared {
    records: Mutex<Vec<EndpointRecord>>,
    values: Mutex<HashMap<String, f64>>,
    next_session: AtomicU64,
    errors: ErrorConfig,
    connect_delay: Duration,
    hang_on: Option<&'static str>,
}

impl EndpointShared {
    fn record(&self, record: EndpointRecord) {
        self.records.lock().push(record);
    }

    async fn maybe_hang(&self, operation: &str) {
        if self.hang_on == Some(operation) {
            std::future::pending::<()>().await;
        }
    }
}

/// Builder for [`MockEndpoint`]
#[derive(Debug)]
pub struct MockEndpointBuilder {
    name: String,
    errors: ErrorConfig,
    connect_delay: Duration,
    hang_on: Option<&'static str>,
}

impl MockEndpointBuilder {
    /// Error injection
    pub fn error_config(mut self, config: ErrorConfig) -> Self {
        self.errors = config;
        self
    }

    /// Delay before every connect attempt resolves
    pub fn connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Make every call of `operation` hang forever
    pub fn hang_on(mut self, operation: &'static str) -> Self {
        self.hang_on = Some(operation);
        self
    }

    /// Build the endpoint
    pub fn build(self) -> MockEndpoint {
        MockEndpoint {
            name: self.name,
            shared: Arc::new(EndpointShared {
                records: Mutex::new(Vec::new()),
                values: Mutex::new(HashMap::new()),
                next_session: AtomicU64::new(1),
                errors: self.errors,
                connect_delay: self.connect_delay,
                hang_on: self.hang_on,
            }),
        }
    }
}

/// Simulated control endpoint.
#[derive(Debug, Clone)]
pub struct MockEndpoint {
    name: String,
    shared: Arc<EndpointShared>,
}

impl MockEndpoint {
    /// Endpoint that never fails
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    /// Create builder for advanced configuration
    pub fn builder(name: impl Into<String>) -> MockEndpointBuilder {
        MockEndpointBuilder {
            name: name.into(),
            errors: ErrorConfig::none(),
            connect_delay: Duration::ZERO,
            hang_on: None,
        }
    }

    /// Every operation so far, in order
    pub fn records(&self) -> Vec<EndpointRecord> {
        self.shared.records.lock().clone()
    }

    /// Start times of every connect attempt
    pub fn connect_attempts(&self) -> Vec<Instant> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                EndpointRecord::Connect { at, .. } => Some(at),
                _ => None,
            })
            .collect()
    }

    /// Successful writes
    pub fn successful_writes(&self) -> usize {
        self.records()
            .iter()
            .filter(|r| matches!(r, EndpointRecord::Write { ok: true, .. }))
            .count()
    }

    /// Last value written to `target`
    pub fn value(&self, target: &str) -> Option<f64> {
        self.shared.values.lock().get(target).copied()
    }

    /// Error injection handle
    pub fn errors(&self) -> &ErrorConfig {
        &self.shared.errors
    }
}

#[async_trait]
impl EndpointConnector for MockEndpoint {
    fn address(&self) -> String {
        format!("mock://{}", self.name)
    }

    async fn connect(&self) -> Result<Box<dyn EndpointSession>, DeviceError> {
        let at = Instant::now();
        if !self.shared.connect_delay.is_zero() {
            tokio::time::sleep(self.shared.connect_delay).await;
        }
        self.shared.maybe_hang("connect").await;

        if let Err(e) =
            self.shared
                .errors
                .check_operation(&self.name, "connect", DeviceErrorKind::Connection)
        {
            self.shared.record(EndpointRecord::Connect { at, session: None });
            return Err(e);
        }

        let id = self.shared.next_session.fetch_add(1, Ordering::Relaxed);
        self.shared.record(EndpointRecord::Connect {
            at,
            session: Some(id),
        });
        Ok(Box::new(MockSession {
            id,
            name: self.name.clone(),
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MockSession {
    id: u64,
    name: String,
    shared: Arc<EndpointShared>,
}

#[async_trait]
impl EndpointSession for MockSession {
    async fn write_values(&mut self, writes: &[TargetWrite]) -> Result<(), DeviceError> {
        self.shared.maybe_hang("write").await;
        let result =
            self.shared
                .errors
                .check_operation(&self.name, "write", DeviceErrorKind::Communication);
        self.shared.record(EndpointRecord::Write {
            session: self.id,
            writes: writes.to_vec(),
            ok: result.is_ok(),
        });
        result?;

        let mut values = self.shared.values.lock();
        for w in writes {
            values.insert(w.target.clone(), w.value);
        }
        Ok(())
    }

    async fn probe(&mut self) -> Result<(), DeviceError> {
        self.shared.maybe_hang("probe").await;
        let result =
            self.shared
                .errors
                .check_operation(&self.name, "probe", DeviceErrorKind::Communication);
        self.shared.record(EndpointRecord::Probe {
            session: self.id,
            ok: result.is_ok(),
        });
        result
    }

    async fn close(self: Box<Self>) -> Result<(), DeviceError> {
        self.shared.record(EndpointRecord::Close { session: self.id });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorScenario;

    #[tokio::test]
    async fn test_sessions_write_values() {
        let endpoint = MockEndpoint::new("plc");
        let mut session = endpoint.connect().await.unwrap();
        session
            .write_values(&[TargetWrite::new("ns=4;i=116", 12.5)])
            .await
            .unwrap();
        session.probe().await.unwrap();
        session.close().await.unwrap();

        assert_eq!(endpoint.value("ns=4;i=116"), Some(12.5));
        assert_eq!(endpoint.successful_writes(), 1);
        assert!(matches!(
            endpoint.records().last(),
            Some(EndpointRecord::Close { session: 1 })
        ));
    }

    #[tokio::test]
    async fn test_injected_connect_failures() {
        let endpoint = MockEndpoint::builder("plc")
            .error_config(ErrorConfig::scenario(ErrorScenario::FailFirst {
                operation: "connect",
                count: 2,
            }))
            .build();

        let first = endpoint.connect().await.err().unwrap();
        assert_eq!(first.kind, DeviceErrorKind::Connection);
        assert!(endpoint.connect().await.is_err());
        assert!(endpoint.connect().await.is_ok());
        assert_eq!(endpoint.connect_attempts().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_write_is_recorded() {
        let endpoint = MockEndpoint::builder("plc")
            .error_config(ErrorConfig::scenario(ErrorScenario::FailOn {
                operation: "write",
                calls: vec![1],
            }))
            .build();
        let mut session = endpoint.connect().await.unwrap();
        let err = session
            .write_values(&[TargetWrite::new("a", 1.0)])
            .await
            .unwrap_err();
        assert_eq!(err.kind, DeviceErrorKind::Communication);
        assert_eq!(endpoint.value("a"), None);
        assert!(matches!(
            endpoint.records()[1],
            EndpointRecord::Write { ok: false, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hang_blocks_until_timeout() {
        let endpoint = MockEndpoint::builder("plc").hang_on("probe").build();
        let mut session = endpoint.connect().await.unwrap();
        let result =
            tokio::time::timeout(Duration::from_secs(5), session.probe()).await;
        assert!(result.is_err());
    }
}
