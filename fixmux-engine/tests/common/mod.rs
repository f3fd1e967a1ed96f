/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Scriptable loopback FIX counterparty for the engine tests.

#![allow(dead_code)]

use bytes::Bytes;
use fixmux_core::message::{MsgType, OutboundMessage};
use fixmux_core::tags;
use fixmux_core::types::Timestamp;
use fixmux_engine::SessionEvent;
use fixmux_session::{EndpointRole, SessionSettingsBuilder};
use fixmux_tagvalue::{Decoder, Encoder};
use fixmux_transport::FixCodec;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

pub const WAIT: Duration = Duration::from_secs(5);

/// How the venue reacts to session-level traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Accepts Logon, confirms Logout.
    Normal,
    /// Answers Logon with a Logout.
    RejectLogon,
    /// Accepts Logon, never confirms Logout.
    IgnoreLogout,
    /// Accepts connections and never answers.
    Silent,
}

/// A message the venue received, with owned fields.
#[derive(Debug, Clone)]
pub struct Received {
    pub msg_type: MsgType,
    pub fields: Vec<(u32, String)>,
}

impl Received {
    fn parse(frame: &[u8]) -> Self {
        let message = Decoder::new(frame)
            .decode()
            .expect("venue received an undecodable frame");
        Self {
            msg_type: message.msg_type().clone(),
            fields: message
                .fields()
                .map(|f| (f.tag, String::from_utf8_lossy(f.value).into_owned()))
                .collect(),
        }
    }

    pub fn field(&self, tag: u32) -> Option<&str> {
        self.fields
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_str())
    }
}

struct Peer {
    outbound: mpsc::UnboundedSender<Bytes>,
    kill: CancellationToken,
}

struct VenueState {
    behaviour: Behaviour,
    received: Mutex<Vec<Received>>,
    connections: AtomicUsize,
    next_seq: AtomicU64,
    peer: Mutex<Option<Peer>>,
}

impl VenueState {
    fn encode(&self, mut message: OutboundMessage, seq: u64) -> Bytes {
        message.set_header_field(tags::SENDER_COMP_ID, "VENUE");
        message.set_header_field(tags::TARGET_COMP_ID, "CLIENT");
        message.set_header_field(tags::MSG_SEQ_NUM, seq.to_string());
        message.set_header_field(
            tags::SENDING_TIME,
            Timestamp::now().format_millis().as_str(),
        );
        Encoder::encode("FIX.4.4", &message).freeze()
    }

    fn stamp(&self, message: OutboundMessage) -> Bytes {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.encode(message, seq)
    }
}

/// Loopback counterparty bound to an ephemeral port.
pub struct MockVenue {
    port: u16,
    state: Arc<VenueState>,
    acceptor: JoinHandle<()>,
}

impl MockVenue {
    pub async fn start(behaviour: Behaviour) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(VenueState {
            behaviour,
            received: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
            next_seq: AtomicU64::new(1),
            peer: Mutex::new(None),
        });

        let accepting = Arc::clone(&state);
        let acceptor = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accepting.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, Arc::clone(&accepting)));
            }
        });

        Self {
            port,
            state,
            acceptor,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Received> {
        self.state.received.lock().clone()
    }

    /// Sends `message` with the venue's next MsgSeqNum.
    pub fn push(&self, message: OutboundMessage) {
        let raw = self.state.stamp(message);
        self.push_raw(raw);
    }

    /// Sends `message` with an explicit MsgSeqNum.
    pub fn push_with_seq(&self, message: OutboundMessage, seq: u64) {
        let raw = self.state.encode(message, seq);
        self.state.next_seq.store(seq.wrapping_add(1), Ordering::SeqCst);
        self.push_raw(raw);
    }

    pub fn push_raw(&self, raw: Bytes) {
        let peer = self.state.peer.lock();
        let peer = peer.as_ref().expect("no live connection");
        peer.outbound.send(raw).unwrap();
    }

    /// Closes the live connection without a Logout.
    pub fn drop_connection(&self) {
        if let Some(peer) = self.state.peer.lock().take() {
            peer.kill.cancel();
        }
    }

    /// Waits until a received message matches `pred`.
    pub async fn wait_for(&self, pred: impl Fn(&Received) -> bool) -> Received {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if let Some(found) = self.state.received.lock().iter().find(|m| pred(m)) {
                return found.clone();
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "venue did not receive the expected message"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn wait_for_type(&self, msg_type: MsgType) -> Received {
        self.wait_for(move |m| m.msg_type == msg_type).await
    }
}

impl Drop for MockVenue {
    fn drop(&mut self) {
        self.acceptor.abort();
        self.drop_connection();
    }
}

async fn serve(stream: TcpStream, state: Arc<VenueState>) {
    let (read, write) = stream.into_split();
    let mut frames = FramedRead::new(read, FixCodec::new());
    let mut writer = FramedWrite::new(write, FixCodec::new());
    let (tx, mut outbound) = mpsc::unbounded_channel::<Bytes>();
    let kill = CancellationToken::new();
    *state.peer.lock() = Some(Peer {
        outbound: tx,
        kill: kill.clone(),
    });

    loop {
        tokio::select! {
            () = kill.cancelled() => break,
            Some(raw) = outbound.recv() => {
                if writer.send(raw).await.is_err() {
                    break;
                }
            }
            frame = frames.next() => {
                let Some(Ok(frame)) = frame else { break };
                let received = Received::parse(&frame);
                let msg_type = received.msg_type.clone();
                state.received.lock().push(received);

                let reply = match (state.behaviour, msg_type) {
                    (Behaviour::Silent, _) => None,
                    (Behaviour::RejectLogon, MsgType::Logon) => Some(
                        OutboundMessage::new(MsgType::Logout)
                            .with_field(tags::TEXT, "invalid credentials"),
                    ),
                    (_, MsgType::Logon) => Some(
                        OutboundMessage::new(MsgType::Logon)
                            .with_field(tags::ENCRYPT_METHOD, "0")
                            .with_field(tags::HEART_BT_INT, "30"),
                    ),
                    (Behaviour::Normal, MsgType::Logout) => {
                        Some(OutboundMessage::new(MsgType::Logout))
                    }
                    _ => None,
                };
                if let Some(reply) = reply
                    && writer.send(state.stamp(reply)).await.is_err()
                {
                    break;
                }
            }
        }
    }
}

/// Settings builder for a session with one endpoint per given venue.
pub fn session(sender: &str, log_dir: &Path, venues: &[(u16, EndpointRole)]) -> SessionSettingsBuilder {
    let mut builder = SessionSettingsBuilder::new("FIX.4.4", sender, "VENUE")
        .auth_payload(format!("{sender}-secret"))
        .connect_timeout(Duration::from_secs(1))
        .logon_timeout(Duration::from_secs(2))
        .logout_timeout(Duration::from_secs(2))
        .retry_delay(Duration::from_millis(10))
        .attempts_per_endpoint(1)
        .log_dir(log_dir);
    for (port, role) in venues {
        builder = builder.endpoint("127.0.0.1", *port, *role);
    }
    builder
}

/// A port nothing listens on.
pub async fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// A complete ExecutionReport body.
pub fn execution_report(exec_id: &str) -> OutboundMessage {
    OutboundMessage::new(MsgType::ExecutionReport)
        .with_field(tags::EXEC_ID, exec_id)
        .with_field(tags::SYMBOL, "EURUSD")
        .with_field(tags::SIDE, "1")
        .with_field(tags::ORDER_QTY, "100")
        .with_field(tags::LAST_PX, "1.0850")
        .with_field(tags::LAST_QTY, "100")
        .with_field(tags::TRANSACT_TIME, "20261016-09:30:00.000")
        .with_field(tags::EXEC_TYPE, "F")
        .with_field(tags::ORD_STATUS, "2")
}

/// Waits for the first event matching `pred`.
pub async fn next_event(
    events: &mut broadcast::Receiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("expected event not published")
}

/// Concatenated content of every session log file ending in `suffix`.
pub fn read_logs(dir: &Path, suffix: &str) -> String {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(suffix))
        })
        .collect();
    paths.sort();
    paths
        .iter()
        .map(|path| std::fs::read_to_string(path).unwrap())
        .collect()
}

/// ExecIDs (17) of the log lines, in file order.
pub fn exec_ids(log: &str) -> Vec<String> {
    log.lines()
        .filter_map(|line| {
            let start = line.find("\u{1}17=")? + 4;
            let rest = &line[start..];
            let end = rest.find('\u{1}').unwrap_or(rest.len());
            Some(rest[..end].to_string())
        })
        .collect()
}
