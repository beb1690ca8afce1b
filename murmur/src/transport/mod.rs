//! Realtime transport layer.
//!
//! Defines the [`RealtimeLink`] seam the coordinator talks through, plus the
//! connection status model and reconnect backoff policy. Concrete
//! implementations:
//! - [`socket::SocketClient`] -- the reconnecting WebSocket client with
//!   heartbeat and liveness watchdog
//! - [`loopback::LoopbackLink`] -- in-process link for testing

pub mod loopback;
pub mod socket;

use std::fmt;
use std::time::Duration;

use tokio::sync::broadcast;

use murmur_proto::frame::{ClientFrame, ServerFrame};

/// State of the realtime connection; one instance per active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No connection and none being attempted.
    Disconnected,
    /// First connection attempt in progress.
    Connecting,
    /// Live connection established.
    Connected,
    /// Connection lost (or credential missing); retrying automatically.
    Reconnecting,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Tunable parameters for [`socket::SocketClient`].
///
/// Defaults match production behavior; tests shrink the intervals.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Socket base URL, e.g. `ws://127.0.0.1:9000`. The client appends
    /// `/ws/chat?token=<credential>`.
    pub url: String,
    /// How often to send a liveness probe while connected.
    pub heartbeat_interval: Duration,
    /// How often the liveness watchdog checks the connection.
    pub watchdog_interval: Duration,
    /// Maximum silence (no `pong`) before the watchdog force-closes.
    pub liveness_timeout: Duration,
    /// First reconnect delay; doubles per attempt.
    pub backoff_base: Duration,
    /// Ceiling for the reconnect delay.
    pub backoff_cap: Duration,
    /// Attempt counter stops growing here; attempts continue indefinitely.
    pub backoff_attempt_cap: u32,
    /// Upper bound for the random jitter added to each delay.
    pub jitter_max: Duration,
    /// Maximum frames held in the in-memory outbound buffer. When full the
    /// oldest frame is dropped with a warning; message durability never
    /// depends on this buffer (messages travel via REST plus the persisted
    /// outbox), so only announcements, typing and receipts are at risk.
    pub outbound_buffer_cap: usize,
    /// Capacity of the frame/status broadcast channels.
    pub channel_capacity: usize,
}

impl SocketConfig {
    /// Production defaults for the given socket base URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat_interval: Duration::from_secs(25),
            watchdog_interval: Duration::from_secs(20),
            liveness_timeout: Duration::from_secs(75),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            backoff_attempt_cap: 10,
            jitter_max: Duration::from_millis(500),
            outbound_buffer_cap: 512,
            channel_capacity: 256,
        }
    }
}

/// Base reconnect delay (pre-jitter) for the given 1-based attempt number.
///
/// Exponential: `base * 2^(attempt-1)`, capped at `cap`; the exponent stops
/// growing past `attempt_cap` so the counter cannot overflow while attempts
/// continue indefinitely.
#[must_use]
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration, attempt_cap: u32) -> Duration {
    let exponent = attempt.clamp(1, attempt_cap) - 1;
    let delay = base.saturating_mul(2u32.saturating_pow(exponent));
    delay.min(cap)
}

/// The realtime-connection surface the coordinator consumes.
///
/// None of these operations error: transient failure is absorbed by the
/// implementation and surfaces only as status transitions, and frames sent
/// while disconnected are buffered.
pub trait RealtimeLink: Send + Sync + 'static {
    /// Opens the connection; no-op if already connected or connecting.
    fn connect(&self);

    /// Intentionally closes the connection, suppressing auto-reconnect.
    fn disconnect(&self);

    /// Sends a frame now if connected, otherwise buffers it and triggers
    /// [`connect`](Self::connect).
    fn send(&self, frame: ClientFrame);

    /// Current connection status.
    fn status(&self) -> ConnectionStatus;

    /// Subscribes to status transitions; every subscriber sees every change.
    fn subscribe_status(&self) -> broadcast::Receiver<ConnectionStatus>;

    /// Subscribes to decoded inbound frames. Liveness acknowledgments
    /// (`pong`) are consumed at the transport boundary and never appear
    /// here.
    fn subscribe_frames(&self) -> broadcast::Receiver<ServerFrame>;
}

impl<T: RealtimeLink> RealtimeLink for std::sync::Arc<T> {
    fn connect(&self) {
        (**self).connect();
    }

    fn disconnect(&self) {
        (**self).disconnect();
    }

    fn send(&self, frame: ClientFrame) {
        (**self).send(frame);
    }

    fn status(&self) -> ConnectionStatus {
        (**self).status()
    }

    fn subscribe_status(&self) -> broadcast::Receiver<ConnectionStatus> {
        (**self).subscribe_status()
    }

    fn subscribe_frames(&self) -> broadcast::Receiver<ServerFrame> {
        (**self).subscribe_frames()
    }
}
