/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Session events.
//!
//! Every wire message, extracted executions, contained failures (log writes,
//! malformed messages, sequence anomalies) and lifecycle changes are
//! published on a `tokio::sync::broadcast` channel shared by every session of
//! a coordinator.

use fixmux_core::error::{DecodeError, LogWriteError};
use fixmux_core::execution::ExecutionRecord;
use fixmux_core::message::WireMessage;
use fixmux_session::{Endpoint, SessionId, SessionState};
use std::fmt;
use tokio::sync::broadcast;

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Something that happened to one session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The connectivity state changed.
    StateChanged {
        /// Session key.
        session: SessionId,
        /// Previous state.
        from: SessionState,
        /// New state.
        to: SessionState,
    },
    /// One logon attempt against one endpoint failed.
    LogonAttemptFailed {
        /// Session key.
        session: SessionId,
        /// Endpoint tried.
        endpoint: Endpoint,
        /// Attempt number on that endpoint, starting at 1.
        attempt: u32,
        /// Failure description.
        reason: String,
    },
    /// The counterparty acknowledged our Logon.
    LoggedOn {
        /// Session key.
        session: SessionId,
        /// Endpoint in use.
        endpoint: Endpoint,
    },
    /// The session ended with a Logout exchange.
    LoggedOut {
        /// Session key.
        session: SessionId,
        /// True if the counterparty started the exchange.
        by_counterparty: bool,
    },
    /// A message crossed the wire and was logged.
    Message {
        /// Session key.
        session: SessionId,
        /// The message as sent or received.
        message: WireMessage,
    },
    /// An ExecutionReport was extracted and logged.
    Execution {
        /// Session key.
        session: SessionId,
        /// The extracted record.
        record: ExecutionRecord,
    },
    /// An inbound message could not be decoded or extracted.
    MalformedMessage {
        /// Session key.
        session: SessionId,
        /// Decode failure.
        error: DecodeError,
    },
    /// A durable log write failed; processing continued.
    LogWriteFailed {
        /// Session key.
        session: SessionId,
        /// Write failure.
        error: LogWriteError,
    },
    /// Inbound MsgSeqNum skipped ahead.
    SequenceGap {
        /// Session key.
        session: SessionId,
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
    /// Inbound MsgSeqNum was lower than expected without PossDupFlag.
    SequenceTooLow {
        /// Session key.
        session: SessionId,
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
    /// The transport of a logged-on session was lost.
    TransportLost {
        /// Session key.
        session: SessionId,
        /// Failure description.
        reason: String,
    },
}

impl SessionEvent {
    /// Returns the session the event belongs to.
    #[must_use]
    pub fn session(&self) -> &SessionId {
        match self {
            Self::StateChanged { session, .. }
            | Self::LogonAttemptFailed { session, .. }
            | Self::LoggedOn { session, .. }
            | Self::LoggedOut { session, .. }
            | Self::Message { session, .. }
            | Self::Execution { session, .. }
            | Self::MalformedMessage { session, .. }
            | Self::LogWriteFailed { session, .. }
            | Self::SequenceGap { session, .. }
            | Self::SequenceTooLow { session, .. }
            | Self::TransportLost { session, .. } => session,
        }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateChanged { session, from, to } => write!(f, "{session}: {from} -> {to}"),
            Self::LogonAttemptFailed {
                session,
                endpoint,
                attempt,
                reason,
            } => write!(
                f,
                "{session}: logon attempt {attempt} on {endpoint} failed: {reason}"
            ),
            Self::LoggedOn { session, endpoint } => {
                write!(f, "{session}: logged on via {endpoint}")
            }
            Self::LoggedOut {
                session,
                by_counterparty,
            } => {
                if *by_counterparty {
                    write!(f, "{session}: logged out by counterparty")
                } else {
                    write!(f, "{session}: logged out")
                }
            }
            Self::Message { session, message } => write!(
                f,
                "{session}: {} {}: {}",
                message.direction(),
                message.classification(),
                message.display_text()
            ),
            Self::Execution { session, record } => write!(f, "{session}: {record}"),
            Self::MalformedMessage { session, error } => {
                write!(f, "{session}: malformed message: {error}")
            }
            Self::LogWriteFailed { session, error } => {
                write!(f, "{session}: degraded durability: {error}")
            }
            Self::SequenceGap {
                session,
                expected,
                received,
            } => write!(
                f,
                "{session}: sequence gap, expected {expected} received {received}"
            ),
            Self::SequenceTooLow {
                session,
                expected,
                received,
            } => write!(
                f,
                "{session}: sequence too low, expected {expected} received {received}"
            ),
            Self::TransportLost { session, reason } => {
                write!(f, "{session}: transport lost: {reason}")
            }
        }
    }
}

/// Publishes events for one session.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    session: SessionId,
    tx: broadcast::Sender<SessionEvent>,
}

impl EventPublisher {
    /// Creates a publisher tagging events with `session`.
    #[must_use]
    pub fn new(session: SessionId, tx: broadcast::Sender<SessionEvent>) -> Self {
        Self { session, tx }
    }

    /// Returns the session key.
    #[must_use]
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Publishes an event built from the session key.
    ///
    /// Having no subscriber is not an error.
    pub fn emit(&self, build: impl FnOnce(SessionId) -> SessionEvent) {
        let _ = self.tx.send(build(self.session.clone()));
    }

    /// Returns a new receiver on the shared channel.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}
