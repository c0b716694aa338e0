//! Connection manager with tokio mpsc command/event pattern.
//!
//! One dedicated tokio task owns the transport for the whole session.
//! External code talks to it through a typed command channel and receives
//! decoded frames plus link-state changes on an event channel, so nothing
//! outside this module ever holds the socket.
//!
//! The task is also the reconnection state machine: on unexpected closure it
//! schedules exactly one retry (exponential backoff, capped) and keeps
//! retrying for as long as the session lives.  Commands are serviced while a
//! retry timer runs, which is how `send` can report `NotConnected` instead
//! of blocking until the link is back.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use parley_shared::constants::CHANNEL_CAPACITY;
use parley_shared::protocol::{ClientFrame, ServerFrame};

use crate::dialer::{Dialer, FrameSink, Transport};
use crate::error::NetError;
use crate::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// Command / event types
// ---------------------------------------------------------------------------

/// Commands sent *into* the connection task.
#[derive(Debug)]
pub enum ConnectionCommand {
    /// Establish the link.  Idempotent: while an attempt is in flight or the
    /// link is open, this is a no-op.
    Open,
    /// Transmit one frame.  The reply reports `NotConnected` when the link
    /// is not open; there is no outbound queue.
    Send {
        frame: ClientFrame,
        reply: oneshot::Sender<Result<(), NetError>>,
    },
    /// Tear the link down for good.  No reconnect is scheduled.
    Close,
}

/// Events sent *from* the connection task to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The link is open.
    Up,
    /// The link dropped.  Unless the closure was caller-initiated, a
    /// reconnect is already scheduled when this is observed.
    Down,
    /// A decoded inbound frame.
    Frame(ServerFrame),
}

/// Configuration for spawning the connection task.
pub struct ConnectionConfig {
    /// WebSocket URL of the messaging server.
    pub server_url: String,
    /// Reconnect backoff schedule.
    pub retry: RetryPolicy,
    /// Capacity of the command and event channels.
    pub channel_capacity: usize,
}

impl ConnectionConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            retry: RetryPolicy::default(),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

/// Handle to the connection task.  Cheap to clone.
#[derive(Clone)]
pub struct Connection {
    cmd_tx: mpsc::Sender<ConnectionCommand>,
}

impl Connection {
    /// Request that the link be established.
    pub async fn open(&self) -> Result<(), NetError> {
        self.cmd_tx
            .send(ConnectionCommand::Open)
            .await
            .map_err(|_| NetError::ChannelClosed)
    }

    /// Transmit one frame, or learn synchronously that the link is down.
    pub async fn send(&self, frame: ClientFrame) -> Result<(), NetError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(ConnectionCommand::Send {
                frame,
                reply: reply_tx,
            })
            .await
            .map_err(|_| NetError::ChannelClosed)?;
        reply_rx.await.map_err(|_| NetError::ChannelClosed)?
    }

    /// Close the link and stop the task.
    pub async fn close(&self) -> Result<(), NetError> {
        self.cmd_tx
            .send(ConnectionCommand::Close)
            .await
            .map_err(|_| NetError::ChannelClosed)
    }
}

/// Spawn the connection task.
///
/// Returns the command handle and the event receiver.  The task stays idle
/// until the first `open()`; it exits when `close()` is called, when every
/// handle is dropped, or when the event receiver goes away.
pub fn spawn_connection<D: Dialer>(
    dialer: D,
    config: ConnectionConfig,
) -> (Connection, mpsc::Receiver<ConnectionEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(config.channel_capacity);
    let (event_tx, event_rx) = mpsc::channel(config.channel_capacity);

    tokio::spawn(run(dialer, config, cmd_rx, event_tx));

    (Connection { cmd_tx }, event_rx)
}

// ---------------------------------------------------------------------------
// Task internals
// ---------------------------------------------------------------------------

enum Exit {
    /// Caller-initiated closure; do not reconnect.
    Closed,
    /// Unexpected closure; schedule a reconnect.
    Lost,
}

async fn run<D: Dialer>(
    dialer: D,
    config: ConnectionConfig,
    mut cmd_rx: mpsc::Receiver<ConnectionCommand>,
    event_tx: mpsc::Sender<ConnectionEvent>,
) {
    // Idle until the first open request.
    loop {
        match cmd_rx.recv().await {
            Some(ConnectionCommand::Open) => break,
            Some(ConnectionCommand::Send { reply, .. }) => {
                let _ = reply.send(Err(NetError::NotConnected));
            }
            Some(ConnectionCommand::Close) | None => return,
        }
    }

    // Each dial attempt gets a fresh generation number; everything logged by
    // an older transport is identifiable as superseded.
    let mut generation: u64 = 0;
    let mut retry_delay: Option<Duration> = None;

    loop {
        if let Some(delay) = retry_delay.take() {
            debug!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
            if !idle_wait(delay, &mut cmd_rx).await {
                info!("connection task stopped while waiting to reconnect");
                return;
            }
        }

        let transport = match establish(&dialer, &config, &mut cmd_rx, &mut generation).await {
            Some(t) => t,
            None => return,
        };

        info!(generation, url = %config.server_url, "connection open");
        if event_tx.send(ConnectionEvent::Up).await.is_err() {
            return;
        }

        match drive(transport, &mut cmd_rx, &event_tx, generation).await {
            Exit::Closed => {
                let _ = event_tx.send(ConnectionEvent::Down).await;
                info!(generation, "connection closed by caller");
                return;
            }
            Exit::Lost => {
                if event_tx.send(ConnectionEvent::Down).await.is_err() {
                    return;
                }
                retry_delay = Some(config.retry.delay_for_attempt(0));
            }
        }
    }
}

/// Dial until a transport is established, backing off between failures.
/// Returns `None` if the task was asked to stop while trying.
async fn establish<D: Dialer>(
    dialer: &D,
    config: &ConnectionConfig,
    cmd_rx: &mut mpsc::Receiver<ConnectionCommand>,
    generation: &mut u64,
) -> Option<Transport> {
    let mut attempt: u32 = 0;
    loop {
        *generation += 1;
        debug!(generation = *generation, attempt, url = %config.server_url, "connecting");

        // Keep answering commands while the dial is in flight; a Close here
        // abandons the attempt, and its late completion is simply dropped.
        let outcome = {
            let dial = dialer.dial(&config.server_url);
            tokio::pin!(dial);
            loop {
                tokio::select! {
                    result = &mut dial => break result,
                    cmd = cmd_rx.recv() => match cmd {
                        Some(ConnectionCommand::Open) => {
                            // An attempt is already in flight; open() stays idempotent.
                        }
                        Some(ConnectionCommand::Send { reply, .. }) => {
                            let _ = reply.send(Err(NetError::NotConnected));
                        }
                        Some(ConnectionCommand::Close) | None => return None,
                    }
                }
            }
        };

        match outcome {
            Ok(transport) => return Some(transport),
            Err(e) => {
                let delay = config.retry.delay_for_attempt(attempt);
                warn!(
                    error = %e,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "connection attempt failed"
                );
                attempt = attempt.saturating_add(1);
                if !idle_wait(delay, cmd_rx).await {
                    return None;
                }
            }
        }
    }
}

/// Service the open link until it drops or the caller closes it.
async fn drive(
    transport: Transport,
    cmd_rx: &mut mpsc::Receiver<ConnectionCommand>,
    event_tx: &mpsc::Sender<ConnectionEvent>,
    generation: u64,
) -> Exit {
    let Transport {
        mut sink,
        mut stream,
    } = transport;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(ConnectionCommand::Open) => {
                    debug!(generation, "open requested while connected; ignoring");
                }
                Some(ConnectionCommand::Send { frame, reply }) => {
                    let result = transmit(&mut sink, &frame).await;
                    let failed = result.is_err();
                    let _ = reply.send(result);
                    if failed {
                        return Exit::Lost;
                    }
                }
                Some(ConnectionCommand::Close) | None => {
                    let _ = sink.close().await;
                    return Exit::Closed;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(raw)) => match ServerFrame::decode(&raw) {
                    Ok(frame) => {
                        if event_tx.send(ConnectionEvent::Frame(frame)).await.is_err() {
                            return Exit::Closed;
                        }
                    }
                    // Malformed inbound data never tears the link down.
                    Err(e) => warn!(generation, error = %e, "dropping malformed frame"),
                },
                Some(Err(e)) => {
                    warn!(generation, error = %e, "transport error");
                    return Exit::Lost;
                }
                None => {
                    info!(generation, "connection closed by server");
                    return Exit::Lost;
                }
            },
        }
    }
}

async fn transmit(sink: &mut FrameSink, frame: &ClientFrame) -> Result<(), NetError> {
    let raw = frame.encode()?;
    let len = raw.len();
    sink.send(raw).await?;
    debug!(len, "frame sent");
    Ok(())
}

/// Run the retry timer while still answering commands.  Returns `false`
/// when the task should stop instead of dialing again.
async fn idle_wait(delay: Duration, cmd_rx: &mut mpsc::Receiver<ConnectionCommand>) -> bool {
    let timer = sleep(delay);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            _ = &mut timer => return true,
            cmd = cmd_rx.recv() => match cmd {
                Some(ConnectionCommand::Open) => {
                    // An attempt is already scheduled; open() stays idempotent.
                }
                Some(ConnectionCommand::Send { reply, .. }) => {
                    let _ = reply.send(Err(NetError::NotConnected));
                }
                Some(ConnectionCommand::Close) | None => return false,
            }
        }
    }
}
