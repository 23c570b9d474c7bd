//! Register table and the line-protocol server that exposes it.
//!
//! A [`RegisterTable`] is a fixed set of named `f64` targets declared up front. Writes to
//! a target that was never declared are rejected, which is how a controller behaves
//! when a node id is mistyped in configuration.
//!
//! # Wire Protocol
//!
//! One UTF-8 command per line, one reply line per command:
//!
//! | Command            | Reply                         |
//! |--------------------|-------------------------------|
//! | `WRITE <t> <v>`    | `OK` or `ERR <message>`       |
//! | `READ <t>`         | `VALUE <v>` or `ERR <message>`|
//! | `PING`             | `PONG`                        |
//! | `LIST`             | `TARGETS <t1> <t2> ...`       |
//!
//! Target identifiers never contain whitespace. A line longer than [`MAX_LINE_LEN`]
//! bytes gets `ERR line too long` and the connection is closed.

use color_core::StopSignal;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

/// Reply to a successful write.
pub const REPLY_OK: &str = "OK";
/// Reply to `PING`.
pub const REPLY_PONG: &str = "PONG";
/// Prefix of an error reply.
pub const REPLY_ERR: &str = "ERR";
/// Prefix of a `READ` reply.
pub const REPLY_VALUE: &str = "VALUE";
/// Prefix of a `LIST` reply.
pub const REPLY_TARGETS: &str = "TARGETS";

/// Longest accepted command line, without the terminator.
pub const MAX_LINE_LEN: usize = 1024;

// =============================================================================
// Register Table
// =============================================================================

/// Shared table of declared targets and their last written values.
#[derive(Debug, Clone, Default)]
pub struct RegisterTable {
    registers: Arc<RwLock<BTreeMap<String, f64>>>,
}

impl RegisterTable {
    /// Declare `targets`, all starting at zero.
    pub fn with_targets<T: Into<String>>(targets: impl IntoIterator<Item = T>) -> Self {
        let registers = targets.into_iter().map(|t| (t.into(), 0.0)).collect();
        Self {
            registers: Arc::new(RwLock::new(registers)),
        }
    }

    /// Write `value` to a declared target.
    pub fn set(&self, target: &str, value: f64) -> Result<(), String> {
        match self.registers.write().get_mut(target) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(format!("unknown target {}", target)),
        }
    }

    /// Current value of a declared target.
    #[must_use]
    pub fn get(&self, target: &str) -> Option<f64> {
        self.registers.read().get(target).copied()
    }

    /// Declared targets in sorted order.
    #[must_use]
    pub fn targets(&self) -> Vec<String> {
        self.registers.read().keys().cloned().collect()
    }

    /// Copy of every target and value.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.registers.read().clone()
    }
}

/// Execute one protocol line against `table` and build the reply (without newline).
pub fn handle_command(table: &RegisterTable, line: &str) -> String {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return format!("{REPLY_ERR} empty command");
    };
    let args: Vec<&str> = parts.collect();

    match (command.to_ascii_uppercase().as_str(), args.as_slice()) {
        ("PING", []) => REPLY_PONG.to_string(),
        ("LIST", []) => {
            let targets = table.targets();
            if targets.is_empty() {
                REPLY_TARGETS.to_string()
            } else {
                format!("{REPLY_TARGETS} {}", targets.join(" "))
            }
        }
        ("READ", [target]) => match table.get(target) {
            Some(v) => format!("{REPLY_VALUE} {v}"),
            None => format!("{REPLY_ERR} unknown target {target}"),
        },
        ("WRITE", [target, value]) => match value.parse::<f64>() {
            Ok(v) => match table.set(target, v) {
                Ok(()) => REPLY_OK.to_string(),
                Err(e) => format!("{REPLY_ERR} {e}"),
            },
            Err(_) => format!("{REPLY_ERR} invalid value {value}"),
        },
        (cmd @ ("PING" | "LIST" | "READ" | "WRITE"), _) => {
            format!("{REPLY_ERR} wrong number of arguments for {cmd}")
        }
        (cmd, _) => format!("{REPLY_ERR} unknown command {cmd}"),
    }
}

// =============================================================================
// TCP Server
// =============================================================================

/// Line-protocol server over TCP.
///
/// Used by the daemon to expose the latest measurement to dashboards and by tests as a
/// stand-in controller.
#[derive(Debug)]
pub struct RegisterServer {
    listener: TcpListener,
    table: RegisterTable,
}

impl RegisterServer {
    /// Bind to `addr`. Port 0 picks a free port.
    pub async fn bind(addr: &str, table: RegisterTable) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, table })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Table served by this server.
    #[must_use]
    pub fn table(&self) -> &RegisterTable {
        &self.table
    }

    /// Accept connections until `stop` fires, then abort every open connection.
    pub async fn run(self, mut stop: StopSignal) -> io::Result<()> {
        let addr = self.listener.local_addr()?;
        tracing::info!(%addr, targets = self.table.targets().len(), "Register server listening");
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "Client connected");
                        connections.spawn(serve_connection(stream, peer, self.table.clone()));
                    }
                    Err(e) => tracing::warn!(error = %e, "Accept failed"),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        connections.shutdown().await;
        tracing::info!(%addr, "Register server stopped");
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
enum Incoming {
    Line(String),
    TooLong,
    Closed,
}

/// Read one command line, never buffering more than `MAX_LINE_LEN + 1` bytes.
async fn read_command<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<Incoming> {
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(MAX_LINE_LEN as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;
    if n == 0 {
        return Ok(Incoming::Closed);
    }
    if buf.last() != Some(&b'\n') && buf.len() > MAX_LINE_LEN {
        return Ok(Incoming::TooLong);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    String::from_utf8(buf)
        .map(Incoming::Line)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, table: RegisterTable) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let (mut reply, close) = match read_command(&mut reader).await {
            Ok(Incoming::Line(line)) => (handle_command(&table, &line), false),
            Ok(Incoming::TooLong) => {
                tracing::warn!(%peer, limit = MAX_LINE_LEN, "Command line too long, closing");
                (format!("{REPLY_ERR} line too long"), true)
            }
            Ok(Incoming::Closed) => break,
            Err(e) => {
                tracing::debug!(%peer, error = %e, "Read failed");
                break;
            }
        };
        reply.push('\n');
        if let Err(e) = write_half.write_all(reply.as_bytes()).await {
            tracing::debug!(%peer, error = %e, "Write failed");
            break;
        }
        if close {
            break;
        }
    }
    tracing::debug!(%peer, "Client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RegisterTable {
        RegisterTable::with_targets(["ns=4;i=116", "ns=4;i=94"])
    }

    #[test]
    fn test_write_then_read() {
        let t = table();
        assert_eq!(handle_command(&t, "WRITE ns=4;i=116 42.5"), "OK");
        assert_eq!(handle_command(&t, "READ ns=4;i=116"), "VALUE 42.5");
        assert_eq!(t.get("ns=4;i=116"), Some(42.5));
    }

    #[test]
    fn test_unknown_target_rejected() {
        let t = table();
        assert_eq!(
            handle_command(&t, "WRITE ns=4;i=999 1"),
            "ERR unknown target ns=4;i=999"
        );
        assert_eq!(t.get("ns=4;i=999"), None);
    }

    #[test]
    fn test_ping_and_list() {
        let t = table();
        assert_eq!(handle_command(&t, "ping"), "PONG");
        assert_eq!(handle_command(&t, "LIST"), "TARGETS ns=4;i=116 ns=4;i=94");
        assert_eq!(
            handle_command(&RegisterTable::default(), "LIST"),
            "TARGETS"
        );
    }

    #[test]
    fn test_malformed_commands() {
        let t = table();
        assert!(handle_command(&t, "").starts_with("ERR"));
        assert!(handle_command(&t, "WRITE ns=4;i=116").starts_with("ERR wrong number"));
        assert!(handle_command(&t, "WRITE ns=4;i=116 abc").starts_with("ERR invalid value"));
        assert!(handle_command(&t, "DELETE x").starts_with("ERR unknown command"));
    }

    #[tokio::test]
    async fn test_read_command_caps_line_length() {
        let mut input: &[u8] = b"PING\r\nLIST";
        assert_eq!(read_command(&mut input).await.unwrap(), Incoming::Line("PING".into()));
        assert_eq!(read_command(&mut input).await.unwrap(), Incoming::Line("LIST".into()));
        assert_eq!(read_command(&mut input).await.unwrap(), Incoming::Closed);

        let exact = format!("{}\n", "x".repeat(MAX_LINE_LEN));
        let mut input = exact.as_bytes();
        assert!(matches!(read_command(&mut input).await.unwrap(), Incoming::Line(l) if l.len() == MAX_LINE_LEN));

        let endless = vec![b'x'; MAX_LINE_LEN * 8];
        let mut input = endless.as_slice();
        assert_eq!(read_command(&mut input).await.unwrap(), Incoming::TooLong);
    }
}
