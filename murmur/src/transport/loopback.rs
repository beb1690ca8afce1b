//! In-process [`RealtimeLink`] for tests.
//!
//! Records outbound frames, lets tests inject inbound frames and force
//! status transitions. No I/O, no timers.

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use murmur_proto::frame::{ClientFrame, ServerFrame};

use super::{ConnectionStatus, RealtimeLink};

pub struct LoopbackLink {
    auto_connect: bool,
    status: RwLock<ConnectionStatus>,
    status_tx: broadcast::Sender<ConnectionStatus>,
    frame_tx: broadcast::Sender<ServerFrame>,
    sent: Mutex<Vec<ClientFrame>>,
}

impl LoopbackLink {
    /// Link that reports `Connected` as soon as `connect()` is called.
    #[must_use]
    pub fn new() -> Self {
        Self::with_auto_connect(true)
    }

    /// Link that stays in whatever status the test last set; `connect()`
    /// becomes a no-op so offline scenarios can be scripted.
    #[must_use]
    pub fn offline() -> Self {
        Self::with_auto_connect(false)
    }

    fn with_auto_connect(auto_connect: bool) -> Self {
        let (status_tx, _) = broadcast::channel(64);
        let (frame_tx, _) = broadcast::channel(64);
        Self {
            auto_connect,
            status: RwLock::new(ConnectionStatus::Disconnected),
            status_tx,
            frame_tx,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Forces a status transition, notifying subscribers on change.
    pub fn set_status(&self, next: ConnectionStatus) {
        let mut status = self.status.write();
        if *status != next {
            *status = next;
            drop(status);
            let _ = self.status_tx.send(next);
        }
    }

    /// Injects an inbound frame as if the server had sent it.
    pub fn push_frame(&self, frame: ServerFrame) {
        let _ = self.frame_tx.send(frame);
    }

    /// Everything sent through the link so far, oldest first.
    #[must_use]
    pub fn sent_frames(&self) -> Vec<ClientFrame> {
        self.sent.lock().clone()
    }

    /// Drops the record of sent frames.
    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }
}

impl Default for LoopbackLink {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeLink for LoopbackLink {
    fn connect(&self) {
        if self.auto_connect {
            self.set_status(ConnectionStatus::Connected);
        }
    }

    fn disconnect(&self) {
        self.set_status(ConnectionStatus::Disconnected);
    }

    fn send(&self, frame: ClientFrame) {
        self.sent.lock().push(frame);
        if self.auto_connect {
            self.set_status(ConnectionStatus::Connected);
        }
    }

    fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    fn subscribe_status(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    fn subscribe_frames(&self) -> broadcast::Receiver<ServerFrame> {
        self.frame_tx.subscribe()
    }
}
