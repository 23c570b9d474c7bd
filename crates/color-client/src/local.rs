//! In-process endpoint backed by a [`RegisterTable`].
//!
//! Lets a publisher feed the daemon's own register server (or a test) without a socket
//! in between. Sessions never fail on their own; writes to undeclared targets are
//! rejected exactly like the TCP server rejects them.

use crate::server::RegisterTable;
use async_trait::async_trait;
use color_core::{DeviceError, DeviceErrorKind, EndpointConnector, EndpointSession, TargetWrite};

/// Connector for `local://` endpoints.
#[derive(Debug, Clone)]
pub struct LocalConnector {
    name: String,
    table: RegisterTable,
}

impl LocalConnector {
    /// Connector writing into `table`.
    pub fn new(name: impl Into<String>, table: RegisterTable) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }

    /// Target table.
    #[must_use]
    pub fn table(&self) -> &RegisterTable {
        &self.table
    }
}

#[async_trait]
impl EndpointConnector for LocalConnector {
    fn address(&self) -> String {
        format!("local://{}", self.name)
    }

    async fn connect(&self) -> Result<Box<dyn EndpointSession>, DeviceError> {
        Ok(Box::new(LocalSession {
            name: self.name.clone(),
            table: self.table.clone(),
        }))
    }
}

struct LocalSession {
    name: String,
    table: RegisterTable,
}

#[async_trait]
impl EndpointSession for LocalSession {
    async fn write_values(&mut self, writes: &[TargetWrite]) -> Result<(), DeviceError> {
        for w in writes {
            self.table
                .set(&w.target, w.value)
                .map_err(|e| DeviceError::new(self.name.clone(), DeviceErrorKind::Protocol, e))?;
        }
        Ok(())
    }

    async fn probe(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DeviceError> {
        Ok(())
    }
}
