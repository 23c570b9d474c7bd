//! TCP transport for the line protocol served by [`RegisterServer`](crate::server::RegisterServer)
//! and by controllers that speak it.

use crate::connection::EndpointAddress;
use crate::server::{REPLY_ERR, REPLY_OK, REPLY_PONG, REPLY_TARGETS, REPLY_VALUE};
use async_trait::async_trait;
use color_core::{DeviceError, DeviceErrorKind, EndpointConnector, EndpointSession, TargetWrite};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Connector for `tcp://` endpoints.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: EndpointAddress,
    socket_addr: String,
}

impl TcpConnector {
    /// Build a connector. Fails for non-TCP addresses.
    pub fn new(address: EndpointAddress) -> Result<Self, DeviceError> {
        let socket_addr = address.socket_addr().ok_or_else(|| {
            DeviceError::new(
                address.as_str(),
                DeviceErrorKind::Configuration,
                "not a tcp:// address",
            )
        })?;
        Ok(Self {
            address,
            socket_addr,
        })
    }

    /// Open a concrete [`TcpSession`].
    pub async fn open(&self) -> Result<TcpSession, DeviceError> {
        let stream = TcpStream::connect(&self.socket_addr)
            .await
            .map_err(|e| {
                DeviceError::new(self.address.as_str(), DeviceErrorKind::Connection, e.to_string())
            })?;
        // Each write is a small line; don't let Nagle hold it back.
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        let mut session = TcpSession {
            endpoint: self.address.to_string(),
            reader: BufReader::new(read_half),
            writer: write_half,
        };
        // Handshake: a peer that does not answer PING is not a usable endpoint.
        session
            .probe()
            .await
            .map_err(|e| DeviceError::new(e.device, DeviceErrorKind::Connection, e.message))?;
        Ok(session)
    }
}

#[async_trait]
impl EndpointConnector for TcpConnector {
    fn address(&self) -> String {
        self.address.to_string()
    }

    async fn connect(&self) -> Result<Box<dyn EndpointSession>, DeviceError> {
        Ok(Box::new(self.open().await?))
    }
}

/// An open line-protocol session.
#[derive(Debug)]
pub struct TcpSession {
    endpoint: String,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TcpSession {
    fn error(&self, kind: DeviceErrorKind, message: impl Into<String>) -> DeviceError {
        DeviceError::new(self.endpoint.clone(), kind, message)
    }

    /// Send one command and wait for its reply line.
    async fn request(&mut self, command: &str) -> Result<String, DeviceError> {
        let line = format!("{command}\n");
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| self.error(DeviceErrorKind::Communication, e.to_string()))?;

        let mut reply = String::new();
        let n = self
            .reader
            .read_line(&mut reply)
            .await
            .map_err(|e| self.error(DeviceErrorKind::Communication, e.to_string()))?;
        if n == 0 {
            return Err(self.error(DeviceErrorKind::Communication, "connection closed by peer"));
        }
        Ok(reply.trim_end().to_string())
    }

    fn protocol_error(&self, command: &str, reply: &str) -> DeviceError {
        match reply.strip_prefix(REPLY_ERR) {
            Some(msg) => self.error(
                DeviceErrorKind::Protocol,
                format!("{command} rejected: {}", msg.trim()),
            ),
            None => self.error(
                DeviceErrorKind::Protocol,
                format!("unexpected reply to {command}: {reply}"),
            ),
        }
    }

    /// Read back the current value of `target`.
    pub async fn read_value(&mut self, target: &str) -> Result<f64, DeviceError> {
        let reply = self.request(&format!("READ {target}")).await?;
        reply
            .strip_prefix(REPLY_VALUE)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .ok_or_else(|| self.protocol_error("READ", &reply))
    }

    /// Targets the endpoint declares.
    pub async fn list_targets(&mut self) -> Result<Vec<String>, DeviceError> {
        let reply = self.request("LIST").await?;
        match reply.strip_prefix(REPLY_TARGETS) {
            Some(rest) => Ok(rest.split_whitespace().map(str::to_string).collect()),
            None => Err(self.protocol_error("LIST", &reply)),
        }
    }
}

#[async_trait]
impl EndpointSession for TcpSession {
    async fn write_values(&mut self, writes: &[TargetWrite]) -> Result<(), DeviceError> {
        for w in writes {
            let reply = self.request(&format!("WRITE {} {}", w.target, w.value)).await?;
            if reply != REPLY_OK {
                return Err(self.protocol_error("WRITE", &reply));
            }
        }
        Ok(())
    }

    async fn probe(&mut self) -> Result<(), DeviceError> {
        let reply = self.request("PING").await?;
        if reply == REPLY_PONG {
            Ok(())
        } else {
            Err(self.protocol_error("PING", &reply))
        }
    }

    async fn close(mut self: Box<Self>) -> Result<(), DeviceError> {
        self.writer
            .shutdown()
            .await
            .map_err(|e| self.error(DeviceErrorKind::Communication, e.to_string()))
    }
}
