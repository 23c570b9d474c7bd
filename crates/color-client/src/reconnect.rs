//! Connection state machine and reconnect policy.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──attempt──> Connecting ──success──> Connected
//!      ▲                        │                       │
//!      └──────handshake failure─┘                       │
//!      └──────────────────I/O or protocol fault─────────┘
//! ```
//!
//! There is no `Connected → Connecting` edge: a live session has to fail completely
//! before a new attempt starts. [`ConnectionTracker`] enforces the edges and publishes
//! every change on a watch channel.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Connection state of one publisher.
#[derive(Debug, Clone, Copy)]
pub enum ConnectionState {
    /// No session.
    Disconnected,

    /// A connect attempt is in flight.
    Connecting,

    /// A session is established.
    Connected {
        /// When the session was established
        connected_at: Instant,
    },
}

impl ConnectionState {
    /// Returns true if a session is established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Returns true while a connect attempt is in flight.
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }

    /// Returns a short status label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected { .. } => "Connected",
        }
    }

    /// True if `next` is a legal successor of this state.
    #[must_use]
    pub fn can_transition_to(&self, next: &ConnectionState) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected, Self::Connecting)
                | (Self::Connecting, Self::Connected { .. })
                | (Self::Connecting, Self::Disconnected)
                | (Self::Connected { .. }, Self::Disconnected)
        )
    }
}

impl PartialEq for ConnectionState {
    fn eq(&self, other: &Self) -> bool {
        // Compare variants without comparing Instant fields
        matches!(
            (self, other),
            (Self::Disconnected, Self::Disconnected)
                | (Self::Connecting, Self::Connecting)
                | (Self::Connected { .. }, Self::Connected { .. })
        )
    }
}

impl Eq for ConnectionState {}

/// Fixed-backoff reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Wait after every failed connect attempt.
    pub backoff: Duration,
    /// Maximum consecutive failed attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(2),
            max_attempts: 0,
        }
    }
}

impl ReconnectConfig {
    /// Delay after the given failed attempt (1-based). Constant.
    #[must_use]
    pub fn delay_for_attempt(&self, _attempt: u32) -> Duration {
        self.backoff
    }

    /// Check if another attempt should follow `failed` consecutive failures.
    #[must_use]
    pub fn should_retry(&self, failed: u32) -> bool {
        self.max_attempts == 0 || failed < self.max_attempts
    }
}

/// Owns the current [`ConnectionState`] and rejects illegal transitions.
#[derive(Debug)]
pub struct ConnectionTracker {
    name: String,
    tx: watch::Sender<ConnectionState>,
}

impl ConnectionTracker {
    /// Start in `Disconnected`.
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            name: name.into(),
            tx,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Receiver that sees every accepted transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Move to `next` if the edge is legal.
    ///
    /// Illegal transitions are logged and ignored; returns whether the state changed.
    pub fn transition(&self, next: ConnectionState) -> bool {
        let current = self.state();
        if !current.can_transition_to(&next) {
            tracing::error!(
                publisher = %self.name,
                from = current.label(),
                to = next.label(),
                "Ignored illegal connection state transition"
            );
            return false;
        }
        tracing::debug!(
            publisher = %self.name,
            from = current.label(),
            to = next.label(),
            "Connection state changed"
        );
        self.tx.send_replace(next);
        true
    }

    /// Force `Disconnected` from any state (used on shutdown).
    pub fn reset(&self) {
        self.tx.send_replace(ConnectionState::Disconnected);
    }
}
