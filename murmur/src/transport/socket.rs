//! Reconnecting WebSocket client.
//!
//! A single driver task owns the connection lifecycle: dialing, the
//! connected session (heartbeat, liveness watchdog, inbound decode), and
//! exponential-backoff reconnects. The public handle is cheap to clone into
//! closures and never blocks: operations are commands posted to the driver.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use murmur_proto::codec;
use murmur_proto::frame::{ClientFrame, ServerFrame};

use super::{ConnectionStatus, RealtimeLink, SocketConfig, backoff_delay};
use crate::token::TokenProvider;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = futures_util::stream::SplitSink<WsStream, Message>;

enum Command {
    Connect,
    Send(ClientFrame),
    Disconnect,
}

/// Why a connected session ended.
enum SessionEnd {
    /// `disconnect()` was called; do not reconnect.
    Intentional,
    /// The connection dropped or went silent; reconnect with backoff.
    Lost,
    /// All handles were dropped; the driver should exit.
    Shutdown,
}

/// Outcome of waiting out a backoff delay.
enum Wait {
    Elapsed,
    Cancelled,
    Shutdown,
}

struct Shared {
    status: RwLock<ConnectionStatus>,
    status_tx: broadcast::Sender<ConnectionStatus>,
    frame_tx: broadcast::Sender<ServerFrame>,
}

impl Shared {
    /// Records a status transition, notifying subscribers only on change.
    fn set_status(&self, next: ConnectionStatus) {
        let mut status = self.status.write();
        if *status != next {
            *status = next;
            drop(status);
            let _ = self.status_tx.send(next);
        }
    }
}

/// Handle to the reconnecting WebSocket client.
///
/// Dropping the last handle shuts the driver task down; prefer an explicit
/// [`disconnect`](RealtimeLink::disconnect) first so the server sees a clean
/// close.
pub struct SocketClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl SocketClient {
    /// Spawns the driver task. The connection is not opened until
    /// [`connect`](RealtimeLink::connect) (or the first
    /// [`send`](RealtimeLink::send)).
    pub fn spawn<P: TokenProvider + 'static>(config: SocketConfig, tokens: Arc<P>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = broadcast::channel(config.channel_capacity);
        let (frame_tx, _) = broadcast::channel(config.channel_capacity);
        let shared = Arc::new(Shared {
            status: RwLock::new(ConnectionStatus::Disconnected),
            status_tx,
            frame_tx,
        });

        let driver = Driver {
            config,
            tokens,
            shared: Arc::clone(&shared),
            cmd_rx,
            buffer: VecDeque::new(),
        };
        tokio::spawn(driver.run());

        Self { cmd_tx, shared }
    }

    fn post(&self, command: Command) {
        if self.cmd_tx.send(command).is_err() {
            debug!("socket driver is gone, command dropped");
        }
    }
}

impl RealtimeLink for SocketClient {
    fn connect(&self) {
        self.post(Command::Connect);
    }

    fn disconnect(&self) {
        self.post(Command::Disconnect);
    }

    fn send(&self, frame: ClientFrame) {
        self.post(Command::Send(frame));
    }

    fn status(&self) -> ConnectionStatus {
        *self.shared.status.read()
    }

    fn subscribe_status(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.shared.status_tx.subscribe()
    }

    fn subscribe_frames(&self) -> broadcast::Receiver<ServerFrame> {
        self.shared.frame_tx.subscribe()
    }
}

struct Driver<P> {
    config: SocketConfig,
    tokens: Arc<P>,
    shared: Arc<Shared>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    buffer: VecDeque<ClientFrame>,
}

impl<P: TokenProvider> Driver<P> {
    async fn run(mut self) {
        while let Some(command) = self.cmd_rx.recv().await {
            match command {
                Command::Disconnect => {
                    // Already disconnected.
                }
                Command::Send(frame) => {
                    // Sending while offline implies a connection is wanted.
                    self.buffer_frame(frame);
                    if self.session().await.is_break() {
                        break;
                    }
                }
                Command::Connect => {
                    if self.session().await.is_break() {
                        break;
                    }
                }
            }
        }
        self.shared.set_status(ConnectionStatus::Disconnected);
        debug!("socket driver stopped");
    }

    /// Dials and serves the connection, reconnecting on loss, until an
    /// intentional disconnect (`Continue`) or handle drop (`Break`).
    async fn session(&mut self) -> ControlFlow<()> {
        let mut attempt: u32 = 0;
        loop {
            self.shared.set_status(if attempt == 0 {
                ConnectionStatus::Connecting
            } else {
                ConnectionStatus::Reconnecting
            });

            let Some(token) = self.tokens.access_token().await else {
                // No credential is not an error: keep retrying quietly until
                // a sign-in makes one available.
                debug!("no credential available, delaying connect");
                attempt = attempt.saturating_add(1);
                match self.wait_backoff(attempt).await {
                    Wait::Elapsed => continue,
                    Wait::Cancelled => {
                        self.shared.set_status(ConnectionStatus::Disconnected);
                        return ControlFlow::Continue(());
                    }
                    Wait::Shutdown => return ControlFlow::Break(()),
                }
            };

            let url = format!(
                "{}/ws/chat?token={token}",
                self.config.url.trim_end_matches('/')
            );
            match connect_async(url.as_str()).await {
                Ok((ws, _)) => {
                    info!(url = %self.config.url, "socket connected");
                    self.shared.set_status(ConnectionStatus::Connected);
                    match self.serve(ws).await {
                        SessionEnd::Intentional => {
                            info!("socket disconnected by request");
                            self.shared.set_status(ConnectionStatus::Disconnected);
                            return ControlFlow::Continue(());
                        }
                        SessionEnd::Lost => {
                            attempt = 1;
                        }
                        SessionEnd::Shutdown => return ControlFlow::Break(()),
                    }
                }
                Err(err) => {
                    attempt = attempt.saturating_add(1);
                    warn!(%err, attempt, "socket connect failed");
                }
            }

            self.shared.set_status(ConnectionStatus::Reconnecting);
            match self.wait_backoff(attempt).await {
                Wait::Elapsed => {}
                Wait::Cancelled => {
                    self.shared.set_status(ConnectionStatus::Disconnected);
                    return ControlFlow::Continue(());
                }
                Wait::Shutdown => return ControlFlow::Break(()),
            }
        }
    }

    /// Runs one connected session until it ends.
    async fn serve(&mut self, ws: WsStream) -> SessionEnd {
        let (mut sink, mut stream) = ws.split();

        // Flush frames buffered while offline, oldest first.
        while let Some(frame) = self.buffer.pop_front() {
            if send_frame(&mut sink, &frame).await.is_err() {
                self.buffer.push_front(frame);
                return SessionEnd::Lost;
            }
        }

        let mut last_alive = Instant::now();
        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + self.config.heartbeat_interval,
            self.config.heartbeat_interval,
        );
        let mut watchdog = tokio::time::interval_at(
            Instant::now() + self.config.watchdog_interval,
            self.config.watchdog_interval,
        );
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        watchdog.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = self.cmd_rx.recv() => match command {
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::Shutdown;
                    }
                    Some(Command::Disconnect) => {
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::Intentional;
                    }
                    Some(Command::Connect) => {
                        // Already connected.
                    }
                    Some(Command::Send(frame)) => {
                        if send_frame(&mut sink, &frame).await.is_err() {
                            self.buffer_frame(frame);
                            return SessionEnd::Lost;
                        }
                    }
                },
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        // Any inbound frame proves the connection is alive.
                        last_alive = Instant::now();
                        match codec::decode_server(text.as_str()) {
                            Ok(ServerFrame::Pong) => {
                                // Liveness acknowledgment; consumed here.
                            }
                            Ok(frame) => {
                                let _ = self.shared.frame_tx.send(frame);
                            }
                            Err(err) => {
                                debug!(%err, "dropping malformed frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        warn!("socket closed by server");
                        return SessionEnd::Lost;
                    }
                    Some(Ok(_)) => {
                        // Protocol-level ping/pong is answered by
                        // tungstenite; binary frames are not part of the
                        // wire protocol.
                    }
                    Some(Err(err)) => {
                        warn!(%err, "socket read error");
                        return SessionEnd::Lost;
                    }
                },
                _ = heartbeat.tick() => {
                    if send_frame(&mut sink, &ClientFrame::Ping).await.is_err() {
                        return SessionEnd::Lost;
                    }
                }
                _ = watchdog.tick() => {
                    if last_alive.elapsed() > self.config.liveness_timeout {
                        warn!(
                            silent_for = ?last_alive.elapsed(),
                            "liveness watchdog expired, forcing reconnect"
                        );
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::Lost;
                    }
                }
            }
        }
    }

    /// Sleeps out the backoff for `attempt`, still accepting commands so
    /// queued sends keep accumulating and `disconnect()` cancels the retry.
    async fn wait_backoff(&mut self, attempt: u32) -> Wait {
        let delay = self.jittered_delay(attempt);
        debug!(attempt, ?delay, "reconnect backoff");
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return Wait::Elapsed,
                command = self.cmd_rx.recv() => match command {
                    None => return Wait::Shutdown,
                    Some(Command::Disconnect) => return Wait::Cancelled,
                    Some(Command::Send(frame)) => self.buffer_frame(frame),
                    Some(Command::Connect) => {
                        // A retry is already scheduled.
                    }
                },
            }
        }
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = backoff_delay(
            attempt,
            self.config.backoff_base,
            self.config.backoff_cap,
            self.config.backoff_attempt_cap,
        );
        let jitter_ms = self.config.jitter_max.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::rng().random_range(0..jitter_ms))
    }

    /// Buffers an outbound frame for the next session, dropping the oldest
    /// when full.
    fn buffer_frame(&mut self, frame: ClientFrame) {
        if self.buffer.len() >= self.config.outbound_buffer_cap {
            self.buffer.pop_front();
            warn!(
                cap = self.config.outbound_buffer_cap,
                "outbound buffer full, dropped oldest frame"
            );
        }
        self.buffer.push_back(frame);
    }
}

async fn send_frame(sink: &mut WsSink, frame: &ClientFrame) -> Result<(), ()> {
    let text = match codec::encode_client(frame) {
        Ok(text) => text,
        Err(err) => {
            // Frames are plain data; encoding cannot realistically fail.
            warn!(%err, "failed to encode outbound frame, dropping");
            return Ok(());
        }
    };
    sink.send(Message::Text(text.into())).await.map_err(|err| {
        warn!(%err, "socket write failed");
    })
}
