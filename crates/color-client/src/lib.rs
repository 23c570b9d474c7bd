//! `color-client`
//!
//! Publisher links that relay the latest [`ColorSample`](color_core::ColorSample) to
//! control endpoints, plus the transports they use.
//!
//! - [`connection`]: endpoint address parsing
//! - [`reconnect`]: connection state machine and backoff policy
//! - [`publisher`]: [`PublisherLink`], one long-lived task per endpoint
//! - [`tcp`]: line-protocol client over TCP
//! - [`server`]: register table and line-protocol server
//! - [`local`]: in-process endpoint writing into a register table

pub mod connection;
pub mod local;
pub mod publisher;
pub mod reconnect;
pub mod server;
pub mod tcp;

use color_core::{DeviceError, EndpointConnector};
use std::sync::Arc;

pub use connection::{AddressError, EndpointAddress, EndpointKind, DEFAULT_PORT};
pub use local::LocalConnector;
pub use publisher::{
    ChannelMap, ChannelTarget, PublishError, PublisherConfig, PublisherLink, PublisherStats,
    StatsHandle,
};
pub use reconnect::{ConnectionState, ConnectionTracker, ReconnectConfig};
pub use server::{handle_command, RegisterServer, RegisterTable};
pub use tcp::{TcpConnector, TcpSession};

/// Build the connector for `address`.
///
/// `local://` addresses resolve to `local_table`, so every local publisher in one process
/// writes into the same table.
pub fn connector_for(
    address: &EndpointAddress,
    local_table: &RegisterTable,
) -> Result<Arc<dyn EndpointConnector>, DeviceError> {
    match address.kind() {
        EndpointKind::Tcp { .. } => Ok(Arc::new(TcpConnector::new(address.clone())?)),
        EndpointKind::Local { name } => {
            Ok(Arc::new(LocalConnector::new(name.clone(), local_table.clone())))
        }
    }
}
