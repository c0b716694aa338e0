//! Connection manager behavior against a scripted in-memory transport.
//!
//! No sockets and no wall-clock sleeps: the dialer hands the task
//! channel-backed transports, and timer-driven tests run under tokio's
//! paused virtual time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use futures::channel::mpsc as fmpsc;
use futures::{SinkExt, StreamExt};
use tokio::time::Instant;

use parley_net::{spawn_connection, ConnectionConfig, ConnectionEvent, Dialer, NetError, Transport};
use parley_shared::protocol::{ClientFrame, ServerFrame};
use parley_shared::types::UserId;

/// Server-side handle of one fake connection.
struct FakeRemote {
    to_client: fmpsc::UnboundedSender<Result<String, NetError>>,
    from_client: fmpsc::UnboundedReceiver<String>,
}

impl FakeRemote {
    fn push(&self, raw: &str) {
        self.to_client
            .unbounded_send(Ok(raw.to_string()))
            .expect("client side went away");
    }

    async fn sent(&mut self) -> String {
        self.from_client.next().await.expect("client sent nothing")
    }
}

/// Dialer that answers each attempt from a script of accept/refuse
/// outcomes, then keeps accepting.
#[derive(Clone)]
struct FakeDialer {
    script: Arc<Mutex<VecDeque<bool>>>,
    remotes: Arc<Mutex<Vec<FakeRemote>>>,
    dials: Arc<AtomicU32>,
}

impl FakeDialer {
    fn scripted(outcomes: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: Arc::new(Mutex::new(outcomes.into_iter().collect())),
            remotes: Arc::new(Mutex::new(Vec::new())),
            dials: Arc::new(AtomicU32::new(0)),
        }
    }

    fn accepting() -> Self {
        Self::scripted([])
    }

    fn dial_count(&self) -> u32 {
        self.dials.load(Ordering::SeqCst)
    }

    /// Take the remote end of the most recently established connection.
    fn take_remote(&self) -> FakeRemote {
        self.remotes
            .lock()
            .unwrap()
            .pop()
            .expect("no connection was established")
    }
}

impl Dialer for FakeDialer {
    async fn dial(&self, _url: &str) -> Result<Transport, NetError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let accept = self.script.lock().unwrap().pop_front().unwrap_or(true);
        if !accept {
            return Err(NetError::Transport("connection refused".to_string()));
        }

        let (to_client, inbound) = fmpsc::unbounded::<Result<String, NetError>>();
        let (outbound, from_client) = fmpsc::unbounded::<String>();

        self.remotes.lock().unwrap().push(FakeRemote {
            to_client,
            from_client,
        });

        Ok(Transport {
            sink: Box::pin(outbound.sink_map_err(|e| NetError::Transport(e.to_string()))),
            stream: Box::pin(inbound),
        })
    }
}

fn config() -> ConnectionConfig {
    ConnectionConfig::new("ws://test.invalid/ws")
}

fn presence_frame(user_id: &str, username: &str) -> String {
    format!(r#"{{"online":[{{"userId":"{user_id}","username":"{username}"}}]}}"#)
}

#[tokio::test]
async fn send_before_open_reports_not_connected() {
    let dialer = FakeDialer::accepting();
    let (conn, _events) = spawn_connection(dialer.clone(), config());

    let err = conn
        .send(ClientFrame {
            recipient: UserId::from("u2"),
            text: "hi".to_string(),
        })
        .await
        .expect_err("send must fail before open");

    assert!(matches!(err, NetError::NotConnected));
    assert_eq!(dialer.dial_count(), 0);
}

#[tokio::test]
async fn open_is_idempotent() {
    let dialer = FakeDialer::accepting();
    let (conn, mut events) = spawn_connection(dialer.clone(), config());

    conn.open().await.unwrap();
    assert_eq!(events.recv().await, Some(ConnectionEvent::Up));

    // A second open must not create a second concurrent connection.  The
    // following send round-trips through the command queue, so by the time
    // it returns the Open has been processed.
    conn.open().await.unwrap();
    conn.send(ClientFrame {
        recipient: UserId::from("u2"),
        text: "hi".to_string(),
    })
    .await
    .unwrap();

    assert_eq!(dialer.dial_count(), 1);
}

#[tokio::test]
async fn send_transmits_encoded_frame() {
    let dialer = FakeDialer::accepting();
    let (conn, mut events) = spawn_connection(dialer.clone(), config());

    conn.open().await.unwrap();
    assert_eq!(events.recv().await, Some(ConnectionEvent::Up));
    let mut remote = dialer.take_remote();

    conn.send(ClientFrame {
        recipient: UserId::from("u2"),
        text: "yo".to_string(),
    })
    .await
    .unwrap();

    assert_eq!(remote.sent().await, r#"{"recipient":"u2","text":"yo"}"#);
}

#[tokio::test]
async fn inbound_frames_are_decoded_and_delivered() {
    let dialer = FakeDialer::accepting();
    let (conn, mut events) = spawn_connection(dialer.clone(), config());

    conn.open().await.unwrap();
    assert_eq!(events.recv().await, Some(ConnectionEvent::Up));
    let remote = dialer.take_remote();

    remote.push(&presence_frame("u2", "Bea"));

    match events.recv().await {
        Some(ConnectionEvent::Frame(ServerFrame::Presence { online })) => {
            assert_eq!(online.len(), 1);
            assert_eq!(online[0].user_id, UserId::from("u2"));
            assert_eq!(online[0].username, "Bea");
        }
        other => panic!("expected presence frame, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_frames_are_dropped_without_killing_the_link() {
    let dialer = FakeDialer::accepting();
    let (conn, mut events) = spawn_connection(dialer.clone(), config());

    conn.open().await.unwrap();
    assert_eq!(events.recv().await, Some(ConnectionEvent::Up));
    let remote = dialer.take_remote();

    remote.push("{\"garbage\":true}");
    remote.push("not even json");
    remote.push(&presence_frame("u3", "Cal"));

    // Only the well-formed frame comes through, and the link is still up.
    match events.recv().await {
        Some(ConnectionEvent::Frame(ServerFrame::Presence { online })) => {
            assert_eq!(online[0].user_id, UserId::from("u3"));
        }
        other => panic!("expected presence frame, got {other:?}"),
    }

    conn.send(ClientFrame {
        recipient: UserId::from("u3"),
        text: "still here".to_string(),
    })
    .await
    .unwrap();
}

#[tokio::test(start_paused = true)]
async fn reconnects_once_after_unexpected_close() {
    let dialer = FakeDialer::accepting();
    let (conn, mut events) = spawn_connection(dialer.clone(), config());

    conn.open().await.unwrap();
    assert_eq!(events.recv().await, Some(ConnectionEvent::Up));
    let first = dialer.take_remote();

    // Server drops the connection.
    drop(first);
    assert_eq!(events.recv().await, Some(ConnectionEvent::Down));
    let lost_at = Instant::now();

    // While the retry timer runs, sends fail fast instead of queueing.
    let err = conn
        .send(ClientFrame {
            recipient: UserId::from("u2"),
            text: "hi".to_string(),
        })
        .await
        .expect_err("send must fail while reconnecting");
    assert!(matches!(err, NetError::NotConnected));

    // Exactly one reconnect attempt, scheduled a full base delay out.
    assert_eq!(events.recv().await, Some(ConnectionEvent::Up));
    assert!(lost_at.elapsed() >= std::time::Duration::from_secs(1));
    assert_eq!(dialer.dial_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn resumes_presence_updates_after_reconnect() {
    let dialer = FakeDialer::accepting();
    let (conn, mut events) = spawn_connection(dialer.clone(), config());

    conn.open().await.unwrap();
    assert_eq!(events.recv().await, Some(ConnectionEvent::Up));
    drop(dialer.take_remote());
    assert_eq!(events.recv().await, Some(ConnectionEvent::Down));

    assert_eq!(events.recv().await, Some(ConnectionEvent::Up));
    let remote = dialer.take_remote();
    remote.push(&presence_frame("u2", "Bea"));

    match events.recv().await {
        Some(ConnectionEvent::Frame(ServerFrame::Presence { online })) => {
            assert_eq!(online.len(), 1);
            assert_eq!(online[0].user_id, UserId::from("u2"));
            assert_eq!(online[0].username, "Bea");
        }
        other => panic!("expected presence frame after reconnect, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn open_failures_back_off_exponentially() {
    let dialer = FakeDialer::scripted([false, false, true]);
    let (conn, mut events) = spawn_connection(dialer.clone(), config());

    let started = Instant::now();
    conn.open().await.unwrap();
    assert_eq!(events.recv().await, Some(ConnectionEvent::Up));

    // 1 s after the first failure, 2 s after the second.
    assert!(started.elapsed() >= std::time::Duration::from_secs(3));
    assert_eq!(dialer.dial_count(), 3);
}

#[tokio::test]
async fn close_stops_the_task_without_reconnecting() {
    let dialer = FakeDialer::accepting();
    let (conn, mut events) = spawn_connection(dialer.clone(), config());

    conn.open().await.unwrap();
    assert_eq!(events.recv().await, Some(ConnectionEvent::Up));

    conn.close().await.unwrap();
    assert_eq!(events.recv().await, Some(ConnectionEvent::Down));
    assert_eq!(events.recv().await, None);
    assert_eq!(dialer.dial_count(), 1);
}
