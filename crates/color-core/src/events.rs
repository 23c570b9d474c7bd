//! Acquisition event notifications.
//!
//! The acquisition loop reports what happens to the device through a small set of named
//! [`AcquisitionEvent`]s. Anything that wants to observe them implements
//! [`AcquisitionListener`] and is registered on the loop.
//!
//! Listeners are called synchronously from the acquisition thread. Like frame observers,
//! they must return quickly; anything slow belongs behind a [`ChannelListener`].

use crate::sample::ColorSample;
use std::fmt;
use tokio::sync::mpsc;

/// Why a frame attempt produced no sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing arrived within the retrieval timeout.
    Timeout,
    /// A frame arrived but was empty or had the wrong length.
    Malformed,
    /// The device reported an error for this attempt.
    DeviceError(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Timeout => write!(f, "timeout"),
            SkipReason::Malformed => write!(f, "malformed frame"),
            SkipReason::DeviceError(msg) => write!(f, "device error: {}", msg),
        }
    }
}

/// Something that happened to the sensor during acquisition.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionEvent {
    /// The loop took ownership of a device.
    DeviceAttached {
        /// Device name
        device: String,
    },
    /// Continuous grabbing started.
    GrabStarted {
        /// Device name
        device: String,
    },
    /// A frame was converted into a sample.
    FrameGrabbed {
        /// Device frame number
        frame_number: u64,
        /// Resulting sample
        sample: ColorSample,
    },
    /// A frame attempt produced nothing.
    FrameSkipped {
        /// Why
        reason: SkipReason,
    },
    /// Continuous grabbing stopped.
    GrabStopped {
        /// Device name
        device: String,
        /// Samples produced during this grab
        samples: u64,
    },
    /// The device was released.
    DeviceClosed {
        /// Device name
        device: String,
    },
}

impl AcquisitionEvent {
    /// Short event name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            AcquisitionEvent::DeviceAttached { .. } => "device_attached",
            AcquisitionEvent::GrabStarted { .. } => "grab_started",
            AcquisitionEvent::FrameGrabbed { .. } => "frame_grabbed",
            AcquisitionEvent::FrameSkipped { .. } => "frame_skipped",
            AcquisitionEvent::GrabStopped { .. } => "grab_stopped",
            AcquisitionEvent::DeviceClosed { .. } => "device_closed",
        }
    }
}

/// Receives [`AcquisitionEvent`]s from the acquisition thread.
pub trait AcquisitionListener: Send + Sync {
    /// Called for every event. Must not block.
    fn on_event(&self, event: &AcquisitionEvent);

    /// Name for debugging.
    fn name(&self) -> &'static str {
        "unnamed_listener"
    }
}

/// Writes every event to `tracing`.
///
/// Per-frame events go to `trace`, skips to `debug`, lifecycle events to `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl AcquisitionListener for TracingListener {
    fn on_event(&self, event: &AcquisitionEvent) {
        match event {
            AcquisitionEvent::DeviceAttached { device } => {
                tracing::info!(device = %device, "Device attached");
            }
            AcquisitionEvent::GrabStarted { device } => {
                tracing::info!(device = %device, "Grabbing started");
            }
            AcquisitionEvent::FrameGrabbed {
                frame_number,
                sample,
            } => {
                let lab = sample.lab();
                tracing::trace!(
                    frame_number,
                    l = lab.l,
                    a = lab.a,
                    b = lab.b,
                    "Frame grabbed"
                );
            }
            AcquisitionEvent::FrameSkipped { reason } => {
                tracing::debug!(reason = %reason, "Frame skipped");
            }
            AcquisitionEvent::GrabStopped { device, samples } => {
                tracing::info!(device = %device, samples, "Grabbing stopped");
            }
            AcquisitionEvent::DeviceClosed { device } => {
                tracing::info!(device = %device, "Device closed");
            }
        }
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

/// Forwards events into an unbounded tokio channel.
///
/// Sending never blocks; events are dropped silently once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<AcquisitionEvent>,
}

impl ChannelListener {
    /// Create a listener and the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AcquisitionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AcquisitionListener for ChannelListener {
    fn on_event(&self, event: &AcquisitionEvent) {
        let _ = self.tx.send(event.clone());
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_listener_forwards_events() {
        let (listener, mut rx) = ChannelListener::new();
        listener.on_event(&AcquisitionEvent::GrabStarted {
            device: "cam".into(),
        });
        listener.on_event(&AcquisitionEvent::FrameSkipped {
            reason: SkipReason::Timeout,
        });

        assert_eq!(rx.try_recv().unwrap().name(), "grab_started");
        assert_eq!(
            rx.try_recv().unwrap(),
            AcquisitionEvent::FrameSkipped {
                reason: SkipReason::Timeout
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_listener_survives_dropped_receiver() {
        let (listener, rx) = ChannelListener::new();
        drop(rx);
        listener.on_event(&AcquisitionEvent::DeviceClosed {
            device: "cam".into(),
        });
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::Malformed.to_string(), "malformed frame");
        assert_eq!(
            SkipReason::DeviceError("bus reset".into()).to_string(),
            "device error: bus reset"
        );
    }
}
