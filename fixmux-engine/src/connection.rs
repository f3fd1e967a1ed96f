/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Per-connection session task.
//!
//! Each live connection gets two tasks: a reader that frames the read half
//! and forwards frames over a bounded channel, and the session task that owns
//! the write half. The session task consumes frames strictly in arrival
//! order, answers session-level traffic and executes commands from the
//! [`Initiator`](crate::Initiator).

use crate::events::{EventPublisher, SessionEvent};
use crate::pipeline::Pipeline;
use bytes::{Bytes, BytesMut};
use fixmux_core::error::{FixError, SessionError, StoreError};
use fixmux_core::message::{MsgType, OutboundMessage, RawMessage};
use fixmux_core::tags;
use fixmux_core::types::{SeqNum, Timestamp};
use fixmux_session::{
    Classifier, Endpoint, HeartbeatAction, HeartbeatManager, SequenceManager, SequenceResult,
    SessionId, SessionSettings,
};
use fixmux_tagvalue::Encoder;
use fixmux_transport::{BoxedStream, CodecError, FixCodec};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, sleep_until};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

const INBOUND_CAPACITY: usize = 1024;
const COMMAND_CAPACITY: usize = 64;

/// Outcome reported to the initiator once the counterparty answers our Logon.
pub(crate) type LogonAck = oneshot::Sender<Result<(), String>>;

/// Session state that outlives individual connections.
pub(crate) struct SessionCore {
    pub(crate) settings: SessionSettings,
    pub(crate) classifier: Classifier,
    pub(crate) sequences: SequenceManager,
    pub(crate) pipeline: Mutex<Pipeline>,
    pub(crate) events: EventPublisher,
}

impl SessionCore {
    pub(crate) fn session(&self) -> &SessionId {
        self.events.session()
    }

    /// Fills SenderCompID, TargetCompID, MsgSeqNum and SendingTime.
    pub(crate) fn stamp(&self, message: &mut OutboundMessage, seq: SeqNum) {
        let identity = &self.settings.identity;
        let mut buf = itoa::Buffer::new();
        message.set_header_field(tags::SENDER_COMP_ID, identity.sender_comp_id().as_str());
        message.set_header_field(tags::TARGET_COMP_ID, identity.target_comp_id().as_str());
        message.set_header_field(tags::MSG_SEQ_NUM, buf.format(seq.value()));
        message.set_header_field(
            tags::SENDING_TIME,
            Timestamp::now().format_millis().as_str(),
        );
    }

    fn store(&self, result: Result<(), StoreError>) {
        if let Err(error) = result {
            warn!(session = %self.session(), %error, "sequence store update failed");
        }
    }
}

/// Request from the initiator to the session task.
pub(crate) enum Command {
    /// Stamp, encode, write and log a message.
    Send {
        message: OutboundMessage,
        reply: oneshot::Sender<Result<SeqNum, FixError>>,
    },
    /// Send Logout; `reply` fires when the counterparty's Logout arrives.
    Logout { reply: oneshot::Sender<()> },
}

/// Why a session task stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConnectionExit {
    /// Our Logout was confirmed.
    LoggedOut,
    /// The counterparty logged out and was answered.
    CounterpartyLogout,
    /// The counterparty answered our Logon with a Logout.
    LogonRejected(String),
    /// The initiator dropped its handle.
    Closed,
    /// Read, write or liveness failure.
    TransportLost(String),
}

/// The initiator's handle on a live connection.
///
/// Dropping it aborts the session task, which closes the transport.
#[derive(Debug)]
pub(crate) struct Connection {
    pub(crate) commands: mpsc::Sender<Command>,
    pub(crate) endpoint: Endpoint,
    pub(crate) generation: u64,
    abort: AbortHandle,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

/// Starts the reader and session tasks on `stream`; the session task sends
/// Logon immediately.
pub(crate) fn open(
    core: Arc<SessionCore>,
    stream: BoxedStream,
    endpoint: Endpoint,
    generation: u64,
    logon_ack: LogonAck,
) -> (Connection, JoinHandle<ConnectionExit>) {
    let (read_half, write_half) = tokio::io::split(stream);
    let (frames_tx, frames_rx) = mpsc::channel(INBOUND_CAPACITY);
    let reader = tokio::spawn(read_frames(
        FramedRead::new(read_half, FixCodec::new()),
        frames_tx,
    ));
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);

    let task = SessionTask {
        heartbeat: HeartbeatManager::new(core.settings.heartbeat_interval),
        core,
        writer: FramedWrite::new(write_half, FixCodec::new()),
        frames: frames_rx,
        commands: commands_rx,
        logon_ack: Some(logon_ack),
        pending_logout: None,
        _reader: AbortOnDrop(reader),
    };
    let handle = tokio::spawn(task.run());
    let connection = Connection {
        commands: commands_tx,
        endpoint,
        generation,
        abort: handle.abort_handle(),
    };
    (connection, handle)
}

async fn read_frames(
    mut frames: FramedRead<ReadHalf<BoxedStream>, FixCodec>,
    tx: mpsc::Sender<Result<BytesMut, CodecError>>,
) {
    while let Some(frame) = frames.next().await {
        let failed = frame.is_err();
        if tx.send(frame).await.is_err() || failed {
            break;
        }
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Owned copy of the fields the session task acts on.
struct Inbound {
    msg_type: MsgType,
    seq: Option<u64>,
    poss_dup: bool,
    gap_fill: bool,
    new_seq_no: Option<u64>,
    begin_seq_no: Option<u64>,
    test_req_id: Option<String>,
    text: Option<String>,
}

impl Inbound {
    fn read(message: &RawMessage<'_>) -> Self {
        let flag = |tag: u32| message.get_field_str(tag) == Some("Y");
        let number = |tag: u32| message.get_field_as::<u64>(tag).ok();
        let text = |tag: u32| message.get_field_str(tag).map(str::to_owned);
        Self {
            msg_type: message.msg_type().clone(),
            seq: number(tags::MSG_SEQ_NUM),
            poss_dup: flag(tags::POSS_DUP_FLAG),
            gap_fill: flag(tags::GAP_FILL_FLAG),
            new_seq_no: number(tags::NEW_SEQ_NO),
            begin_seq_no: number(tags::BEGIN_SEQ_NO),
            test_req_id: text(tags::TEST_REQ_ID),
            text: text(tags::TEXT),
        }
    }
}

/// Returns the reason if `result` failed because the transport is gone.
fn transport_failure<T>(result: &Result<T, FixError>) -> Option<String> {
    match result {
        Err(FixError::Session(SessionError::Transport(reason))) => Some(reason.clone()),
        _ => None,
    }
}

struct SessionTask {
    core: Arc<SessionCore>,
    writer: FramedWrite<WriteHalf<BoxedStream>, FixCodec>,
    frames: mpsc::Receiver<Result<BytesMut, CodecError>>,
    commands: mpsc::Receiver<Command>,
    heartbeat: HeartbeatManager,
    logon_ack: Option<LogonAck>,
    pending_logout: Option<oneshot::Sender<()>>,
    _reader: AbortOnDrop,
}

impl SessionTask {
    async fn run(mut self) -> ConnectionExit {
        let logon = self.logon_message();
        let sent = self.transmit(logon).await;
        if let Some(reason) = transport_failure(&sent) {
            return self.lost(reason);
        }
        if let Err(error) = sent {
            return self.lost(format!("logon not sent: {error}"));
        }

        loop {
            let deadline = self.heartbeat.next_deadline();
            let step = tokio::select! {
                frame = self.frames.recv() => match frame {
                    Some(Ok(frame)) => self.on_frame(frame.freeze()).await,
                    Some(Err(error)) => Some(self.lost(error.to_string())),
                    None => Some(self.lost("connection closed by counterparty".to_string())),
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => Some(ConnectionExit::Closed),
                },
                () = sleep_until(deadline) => self.on_timer().await,
            };
            if let Some(exit) = step {
                return exit;
            }
        }
    }

    fn logon_message(&self) -> OutboundMessage {
        let settings = &self.core.settings;
        let mut logon = OutboundMessage::new(MsgType::Logon)
            .with_field(tags::ENCRYPT_METHOD, "0")
            .with_field(
                tags::HEART_BT_INT,
                settings.heartbeat_interval.as_secs().max(1).to_string(),
            );
        if settings.reset_on_logon {
            logon.set_field(tags::RESET_SEQ_NUM_FLAG, "Y");
        }
        logon
    }

    async fn on_frame(&mut self, raw: Bytes) -> Option<ConnectionExit> {
        self.heartbeat.on_message_received();
        let inbound = {
            let mut pipeline = self.core.pipeline.lock();
            match pipeline.process_inbound(&raw) {
                Ok((_, message)) => Inbound::read(&message),
                Err(_) => return None,
            }
        };

        if inbound.msg_type == MsgType::SequenceReset {
            self.on_sequence_reset(&inbound);
            return None;
        }
        if !self.check_sequence(&inbound) {
            return None;
        }

        match inbound.msg_type {
            MsgType::Logon => {
                if let Some(ack) = self.logon_ack.take() {
                    let _ = ack.send(Ok(()));
                }
                None
            }
            MsgType::Logout => Some(self.on_logout(inbound.text).await),
            MsgType::TestRequest => {
                let mut heartbeat = OutboundMessage::new(MsgType::Heartbeat);
                if let Some(id) = inbound.test_req_id {
                    heartbeat.set_field(tags::TEST_REQ_ID, id);
                }
                let sent = self.transmit(heartbeat).await;
                transport_failure(&sent).map(|reason| self.lost(reason))
            }
            MsgType::ResendRequest => self.on_resend_request(inbound.begin_seq_no).await,
            _ => None,
        }
    }

    /// Validates MsgSeqNum; returns false if the message must not be acted on.
    fn check_sequence(&self, inbound: &Inbound) -> bool {
        let core = &self.core;
        let Some(received) = inbound.seq else {
            warn!(session = %core.session(), msg_type = %inbound.msg_type, "inbound message without MsgSeqNum");
            return false;
        };

        match core.sequences.validate_incoming(received) {
            SequenceResult::Ok => core.store(core.sequences.increment_target_seq()),
            SequenceResult::Gap { expected, received } => {
                warn!(session = %core.session(), expected, received, "inbound sequence gap");
                core.events.emit(|session| SessionEvent::SequenceGap {
                    session,
                    expected,
                    received,
                });
                if let Err(error) = core.sequences.skip_past(received) {
                    warn!(session = %core.session(), received, %error, "inbound sequence number not accepted");
                    return false;
                }
            }
            SequenceResult::TooLow { received, .. } if inbound.poss_dup => {
                debug!(session = %core.session(), received, "replayed message");
            }
            SequenceResult::TooLow { expected, received } => {
                warn!(session = %core.session(), expected, received, "inbound sequence too low");
                core.events.emit(|session| SessionEvent::SequenceTooLow {
                    session,
                    expected,
                    received,
                });
                return matches!(inbound.msg_type, MsgType::Logon | MsgType::Logout);
            }
        }
        true
    }

    fn on_sequence_reset(&self, inbound: &Inbound) {
        let core = &self.core;
        let Some(new_seq_no) = inbound.new_seq_no else {
            warn!(session = %core.session(), "SequenceReset without NewSeqNo");
            return;
        };
        let expected = core.sequences.next_target_seq().value();
        if inbound.gap_fill && new_seq_no <= expected {
            debug!(session = %core.session(), new_seq_no, expected, "stale gap fill ignored");
            return;
        }
        info!(session = %core.session(), from = expected, to = new_seq_no, gap_fill = inbound.gap_fill, "sequence reset");
        core.store(core.sequences.set_target_seq(new_seq_no));
    }

    async fn on_logout(&mut self, text: Option<String>) -> ConnectionExit {
        if let Some(reply) = self.pending_logout.take() {
            let _ = reply.send(());
            return ConnectionExit::LoggedOut;
        }

        let reason = text.unwrap_or_else(|| "no reason given".to_string());
        if let Some(ack) = self.logon_ack.take() {
            let _ = ack.send(Err(format!("logon rejected: {reason}")));
            return ConnectionExit::LogonRejected(reason);
        }

        info!(session = %self.core.session(), %reason, "counterparty logout");
        if let Err(error) = self.transmit(OutboundMessage::new(MsgType::Logout)).await {
            warn!(session = %self.core.session(), %error, "logout reply failed");
        }
        ConnectionExit::CounterpartyLogout
    }

    /// Answers a ResendRequest with a SequenceReset-GapFill up to our next
    /// sequence number: only session-level messages are ever sent, and those
    /// are not replayed.
    async fn on_resend_request(&mut self, begin: Option<u64>) -> Option<ConnectionExit> {
        let Some(begin) = begin.filter(|b| *b > 0) else {
            warn!(session = %self.core.session(), "ResendRequest without a usable BeginSeqNo");
            return None;
        };
        let next = self.core.sequences.next_sender_seq().value();
        info!(session = %self.core.session(), begin, new_seq_no = next, "answering resend request with gap fill");

        let gap_fill = OutboundMessage::new(MsgType::SequenceReset)
            .with_field(tags::GAP_FILL_FLAG, "Y")
            .with_field(tags::NEW_SEQ_NO, next.to_string());
        let sent = self.write(gap_fill, SeqNum::new(begin), true).await;
        transport_failure(&sent).map(|reason| self.lost(reason))
    }

    async fn on_command(&mut self, command: Command) -> Option<ConnectionExit> {
        match command {
            Command::Send { message, reply } => {
                let sent = self.transmit(message).await;
                let failure = transport_failure(&sent);
                let _ = reply.send(sent);
                failure.map(|reason| self.lost(reason))
            }
            Command::Logout { reply } => {
                let sent = self.transmit(OutboundMessage::new(MsgType::Logout)).await;
                if let Some(reason) = transport_failure(&sent) {
                    return Some(self.lost(reason));
                }
                self.pending_logout = Some(reply);
                None
            }
        }
    }

    async fn on_timer(&mut self) -> Option<ConnectionExit> {
        let message = match self.heartbeat.poll(Instant::now()) {
            HeartbeatAction::Idle => return None,
            HeartbeatAction::SendHeartbeat => OutboundMessage::new(MsgType::Heartbeat),
            HeartbeatAction::SendTestRequest(id) => {
                debug!(session = %self.core.session(), test_req_id = %id, "probing counterparty");
                OutboundMessage::new(MsgType::TestRequest).with_field(tags::TEST_REQ_ID, id)
            }
            HeartbeatAction::TimedOut { silent_for } => {
                return Some(self.lost(format!(
                    "no inbound traffic for {} ms",
                    silent_for.as_millis()
                )));
            }
        };
        let sent = self.transmit(message).await;
        transport_failure(&sent).map(|reason| self.lost(reason))
    }

    /// Allocates the next sender sequence number and writes `message`.
    async fn transmit(&mut self, message: OutboundMessage) -> Result<SeqNum, FixError> {
        let seq = self.core.sequences.allocate_sender_seq()?;
        self.write(message, seq, false).await?;
        Ok(seq)
    }

    async fn write(
        &mut self,
        mut message: OutboundMessage,
        seq: SeqNum,
        poss_dup: bool,
    ) -> Result<(), FixError> {
        self.core.stamp(&mut message, seq);
        if poss_dup {
            message.set_header_field(tags::POSS_DUP_FLAG, "Y");
        }
        self.core.classifier.prepare_outbound(&mut message);

        let raw = Encoder::encode(self.core.settings.identity.begin_string(), &message).freeze();
        self.writer
            .send(raw.clone())
            .await
            .map_err(|error| SessionError::Transport(error.to_string()))?;
        self.heartbeat.on_message_sent();
        self.core.pipeline.lock().record_outbound(&raw);
        Ok(())
    }

    fn lost(&mut self, reason: String) -> ConnectionExit {
        if let Some(ack) = self.logon_ack.take() {
            let _ = ack.send(Err(reason.clone()));
        }
        debug!(session = %self.core.session(), %reason, "connection ended");
        ConnectionExit::TransportLost(reason)
    }
}
