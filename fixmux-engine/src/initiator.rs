/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Connectivity manager of one FIX session.
//!
//! The [`Initiator`] owns the session's transport. `logon` walks the endpoint
//! candidates in priority order, `logout` closes the session with a bounded
//! wait, and `send` hands application messages to the live connection.
//!
//! A supervisor task watches every established connection. When a logged-on
//! connection dies the session becomes `Faulted`, a
//! [`SessionEvent::TransportLost`] is published and, if configured, one
//! failover round is run.

use crate::connection::{self, Command, Connection, ConnectionExit, SessionCore};
use crate::events::{EventPublisher, SessionEvent};
use crate::pipeline::Pipeline;
use fixmux_core::error::{FixError, Result, SessionError};
use fixmux_core::message::OutboundMessage;
use fixmux_core::types::SeqNum;
use fixmux_session::{
    Classifier, Endpoint, SequenceManager, SessionId, SessionSettings, SessionState, StateCell,
};
use fixmux_store::{CommunalLog, FileStore, MemoryStore, SessionLog, SessionStore};
use fixmux_transport::Connector;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on the session task acknowledging a send.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

type Established = (Connection, JoinHandle<ConnectionExit>);

/// Connectivity manager of one session.
///
/// Cloning yields another handle on the same session.
#[derive(Clone)]
pub struct Initiator {
    inner: Arc<Inner>,
}

struct Inner {
    core: Arc<SessionCore>,
    session_id: SessionId,
    state: StateCell,
    connector: Arc<dyn Connector>,
    cancel: CancellationToken,
    connection: Mutex<Option<Connection>>,
    generation: AtomicU64,
}

impl Initiator {
    /// Creates a disconnected session.
    ///
    /// Sequence numbers come from a [`FileStore`] under the store directory
    /// when one is configured, otherwise from memory.
    ///
    /// # Arguments
    /// * `settings` - Validated session settings
    /// * `communal` - Communal log sinks shared with the other sessions
    /// * `connector` - Transport factory
    /// * `events` - Event channel
    /// * `cancel` - Aborts in-flight logons when cancelled
    ///
    /// # Errors
    /// Returns `FixError::Store` if the sequence file cannot be opened.
    pub fn new(
        settings: SessionSettings,
        communal: Arc<CommunalLog>,
        connector: Arc<dyn Connector>,
        events: broadcast::Sender<SessionEvent>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let session_id = settings.session_id();
        let file_key = session_id.file_key();
        let store: Arc<dyn SessionStore> = match &settings.store_dir {
            Some(dir) => Arc::new(FileStore::open(dir, &file_key)?),
            None => Arc::new(MemoryStore::new()),
        };

        let events = EventPublisher::new(session_id.clone(), events);
        let classifier = Classifier::for_identity(&settings.identity);
        let log = SessionLog::new(settings.log_dir.clone(), file_key, communal);
        let pipeline = Pipeline::new(classifier.clone(), log, events.clone());
        info!(
            session = %session_id,
            endpoints = settings.endpoints.len(),
            persistent = settings.store_dir.is_some(),
            "session created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                core: Arc::new(SessionCore {
                    settings,
                    classifier,
                    sequences: SequenceManager::new(store),
                    pipeline: Mutex::new(pipeline),
                    events,
                }),
                session_id,
                state: StateCell::new(),
                connector,
                cancel,
                connection: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        })
    }

    /// Returns the session key.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    /// Returns the session settings.
    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.inner.core.settings
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state.current()
    }

    /// Returns a receiver observing every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Returns the endpoint of the live connection, if any.
    #[must_use]
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.inner
            .connection
            .lock()
            .as_ref()
            .map(|c| c.endpoint.clone())
    }

    /// Returns the next outbound sequence number.
    #[must_use]
    pub fn next_sender_seq(&self) -> SeqNum {
        self.inner.core.sequences.next_sender_seq()
    }

    /// Returns the next expected inbound sequence number.
    #[must_use]
    pub fn next_target_seq(&self) -> SeqNum {
        self.inner.core.sequences.next_target_seq()
    }

    /// Logs on, trying each endpoint candidate in priority order.
    ///
    /// Every endpoint gets `attempts_per_endpoint` attempts separated by
    /// `retry_delay`; each attempt is bounded by the connect and logon
    /// timeouts. Only one attempt is in flight at a time.
    ///
    /// # Returns
    /// The endpoint that accepted the Logon.
    ///
    /// # Errors
    /// - `SessionError::InvalidState` unless `Disconnected` or `Faulted`
    /// - `SessionError::LogonFailed` naming every endpoint tried, once all
    ///   candidates are exhausted; the session is left `Faulted`
    /// - `SessionError::Cancelled` if the cancellation token fires; the
    ///   session is left `Faulted`
    pub async fn logon(&self) -> Result<Endpoint> {
        self.transition(
            &[SessionState::Disconnected, SessionState::Faulted],
            SessionState::Connecting,
        )?;
        info!(session = %self.inner.session_id, "logon started");

        let outcome = tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => Err(SessionError::Cancelled),
            outcome = self.failover() => outcome,
        };

        match outcome {
            Ok((connection, task)) => self.established(connection, task),
            Err(error) => {
                self.advance(SessionState::Faulted);
                warn!(session = %self.inner.session_id, %error, "logon failed");
                Err(error.into())
            }
        }
    }

    /// Logs out and closes the transport.
    ///
    /// # Errors
    /// - `SessionError::InvalidState` unless `LoggedOn`; nothing is sent
    /// - `SessionError::LogoutTimeout` if the counterparty's Logout does not
    ///   arrive within the logout timeout; the transport is closed anyway and
    ///   the session ends `Disconnected`
    pub async fn logout(&self) -> Result<()> {
        self.transition(&[SessionState::LoggedOn], SessionState::LoggingOut)?;
        let started = Instant::now();
        let connection = self.inner.connection.lock().take();

        let confirmed = match &connection {
            Some(connection) => {
                let commands = connection.commands.clone();
                timeout(self.settings().logout_timeout, async move {
                    let (reply, confirmation) = oneshot::channel();
                    if commands.send(Command::Logout { reply }).await.is_ok() {
                        let _ = confirmation.await;
                    }
                })
                .await
                .is_ok()
            }
            None => true,
        };
        drop(connection);
        let _ = self.transition(&[SessionState::LoggingOut], SessionState::Disconnected);

        if confirmed {
            info!(session = %self.inner.session_id, "logged out");
            self.inner.core.events.emit(|session| SessionEvent::LoggedOut {
                session,
                by_counterparty: false,
            });
            Ok(())
        } else {
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            warn!(session = %self.inner.session_id, elapsed_ms, "logout not confirmed, transport closed");
            Err(SessionError::LogoutTimeout { elapsed_ms }.into())
        }
    }

    /// Sends an application or administrative message.
    ///
    /// MsgSeqNum, SendingTime and the CompIDs are filled in; Logon messages
    /// are authenticated. The message is logged once written.
    ///
    /// # Returns
    /// The MsgSeqNum assigned to the message.
    ///
    /// # Errors
    /// - `SessionError::InvalidState` unless `LoggedOn`; nothing is sent
    /// - `SessionError::Transport` if the connection fails or does not
    ///   acknowledge within [`COMMAND_TIMEOUT`]
    /// - `FixError::Store` if the sequence number cannot be persisted
    pub async fn send(&self, message: OutboundMessage) -> Result<SeqNum> {
        let state = self.state();
        let commands = self
            .inner
            .connection
            .lock()
            .as_ref()
            .map(|c| c.commands.clone());
        let (SessionState::LoggedOn, Some(commands)) = (state, commands) else {
            return Err(SessionError::InvalidState {
                expected: SessionState::LoggedOn.to_string(),
                current: state.to_string(),
            }
            .into());
        };

        match timeout(COMMAND_TIMEOUT, request(commands, message)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SessionError::Transport(format!(
                "send not acknowledged within {} ms",
                COMMAND_TIMEOUT.as_millis()
            ))
            .into()),
        }
    }

    async fn failover(&self) -> std::result::Result<Established, SessionError> {
        let settings = self.settings();
        let mut attempted = Vec::with_capacity(settings.endpoints.len());
        let mut first = true;

        for endpoint in &settings.endpoints {
            let mut last_failure = String::new();
            for attempt in 1..=settings.attempts_per_endpoint {
                if !first {
                    sleep(settings.retry_delay).await;
                }
                first = false;

                match self.attempt(endpoint).await {
                    Ok(established) => return Ok(established),
                    Err(reason) => {
                        warn!(session = %self.inner.session_id, %endpoint, attempt, %reason, "logon attempt failed");
                        last_failure.clone_from(&reason);
                        self.inner
                            .core
                            .events
                            .emit(|session| SessionEvent::LogonAttemptFailed {
                                session,
                                endpoint: endpoint.clone(),
                                attempt,
                                reason,
                            });
                    }
                }
            }
            attempted.push(format!("{endpoint}: {last_failure}"));
        }
        Err(SessionError::LogonFailed { attempted })
    }

    /// One connect-and-logon attempt. A failed attempt drops its connection,
    /// which tears the transport down.
    async fn attempt(&self, endpoint: &Endpoint) -> std::result::Result<Established, String> {
        let core = &self.inner.core;
        let settings = &core.settings;
        if settings.reset_on_logon {
            core.sequences
                .reset()
                .await
                .map_err(|error| format!("sequence reset failed: {error}"))?;
        }

        let stream = self
            .inner
            .connector
            .connect(&endpoint.host, endpoint.port, settings.connect_timeout)
            .await
            .map_err(|error| format!("connect failed: {error}"))?;
        debug!(session = %self.inner.session_id, %endpoint, "connected, sending logon");

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (ack, acknowledged) = oneshot::channel();
        let (connection, task) =
            connection::open(Arc::clone(core), stream, endpoint.clone(), generation, ack);

        match timeout(settings.logon_timeout, acknowledged).await {
            Ok(Ok(Ok(()))) => Ok((connection, task)),
            Ok(Ok(Err(reason))) => Err(reason),
            Ok(Err(_)) => Err("session task ended before logon".to_string()),
            Err(_) => Err(format!(
                "no logon response within {} ms",
                settings.logon_timeout.as_millis()
            )),
        }
    }

    fn established(
        &self,
        connection: Connection,
        task: JoinHandle<ConnectionExit>,
    ) -> Result<Endpoint> {
        let endpoint = connection.endpoint.clone();
        let generation = connection.generation;
        *self.inner.connection.lock() = Some(connection);

        if let Err(error) = self.transition(&[SessionState::Connecting], SessionState::LoggedOn) {
            self.inner.connection.lock().take();
            return Err(error.into());
        }
        info!(session = %self.inner.session_id, %endpoint, "logged on");
        self.inner.core.events.emit(|session| SessionEvent::LoggedOn {
            session,
            endpoint: endpoint.clone(),
        });
        tokio::spawn(supervise(Arc::downgrade(&self.inner), task, generation));
        Ok(endpoint)
    }

    async fn on_connection_exit(&self, generation: u64, exit: ConnectionExit) {
        {
            let mut current = self.inner.connection.lock();
            if current.as_ref().map(|c| c.generation) != Some(generation) {
                return;
            }
            current.take();
        }

        let session = &self.inner.session_id;
        match exit {
            ConnectionExit::CounterpartyLogout => {
                if self
                    .transition(&[SessionState::LoggedOn], SessionState::Disconnected)
                    .is_ok()
                {
                    self.inner.core.events.emit(|session| SessionEvent::LoggedOut {
                        session,
                        by_counterparty: true,
                    });
                }
            }
            ConnectionExit::TransportLost(reason) => {
                if self
                    .transition(&[SessionState::LoggedOn], SessionState::Faulted)
                    .is_err()
                {
                    return;
                }
                warn!(%session, %reason, "transport lost");
                self.inner
                    .core
                    .events
                    .emit(|session| SessionEvent::TransportLost { session, reason });

                if self.settings().reconnect_on_loss && !self.inner.cancel.is_cancelled() {
                    info!(%session, "starting failover after transport loss");
                    if let Err(error) = self.relogon().await {
                        warn!(%session, %error, "failover after transport loss failed");
                    }
                }
            }
            ConnectionExit::LogonRejected(reason) => {
                debug!(%session, %reason, "connection ended by logon reject");
            }
            ConnectionExit::LoggedOut | ConnectionExit::Closed => {}
        }
    }

    fn relogon(&self) -> BoxFuture<'_, Result<Endpoint>> {
        Box::pin(self.logon())
    }

    fn transition(
        &self,
        from: &[SessionState],
        to: SessionState,
    ) -> std::result::Result<SessionState, SessionError> {
        let previous = self.inner.state.transition(from, to)?;
        self.announce(previous, to);
        Ok(previous)
    }

    fn advance(&self, to: SessionState) {
        if let Some(previous) = self.inner.state.advance(to) {
            self.announce(previous, to);
        }
    }

    fn announce(&self, from: SessionState, to: SessionState) {
        debug!(session = %self.inner.session_id, %from, %to, "state change");
        self.inner
            .core
            .events
            .emit(|session| SessionEvent::StateChanged { session, from, to });
    }
}

impl fmt::Debug for Initiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Initiator")
            .field("session", &self.inner.session_id)
            .field("state", &self.state())
            .field("endpoint", &self.endpoint())
            .finish()
    }
}

async fn request(commands: mpsc::Sender<Command>, message: OutboundMessage) -> Result<SeqNum> {
    let stopped = || FixError::from(SessionError::Transport("session task stopped".to_string()));
    let (reply, outcome) = oneshot::channel();
    commands
        .send(Command::Send { message, reply })
        .await
        .map_err(|_| stopped())?;
    outcome.await.map_err(|_| stopped())?
}

/// Waits for a session task to stop and reacts on behalf of the initiator.
async fn supervise(inner: Weak<Inner>, task: JoinHandle<ConnectionExit>, generation: u64) {
    let exit = match task.await {
        Ok(exit) => exit,
        Err(error) if error.is_cancelled() => return,
        Err(error) => ConnectionExit::TransportLost(format!("session task failed: {error}")),
    };
    if let Some(inner) = inner.upgrade() {
        Initiator { inner }.on_connection_exit(generation, exit).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixmux_core::message::MsgType;
    use fixmux_session::{EndpointRole, SessionSettingsBuilder};
    use fixmux_transport::TcpConnector;

    fn initiator(dir: &std::path::Path) -> Initiator {
        let settings = SessionSettingsBuilder::new("FIX.4.4", "CLIENT", "VENUE")
            .endpoint("127.0.0.1", 1, EndpointRole::Primary)
            .log_dir(dir)
            .build()
            .unwrap();
        let (tx, _rx) = broadcast::channel(16);
        Initiator::new(
            settings,
            Arc::new(CommunalLog::open(dir).unwrap()),
            Arc::new(TcpConnector::new()),
            tx,
            CancellationToken::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_requires_logged_on() {
        let dir = tempfile::tempdir().unwrap();
        let initiator = initiator(dir.path());
        let err = initiator
            .send(OutboundMessage::new(MsgType::Heartbeat))
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_session(),
            Some(SessionError::InvalidState { current, .. }) if current == "Disconnected"
        ));
        assert_eq!(initiator.next_sender_seq().value(), 1);
    }

    #[tokio::test]
    async fn test_logout_requires_logged_on() {
        let dir = tempfile::tempdir().unwrap();
        let initiator = initiator(dir.path());
        let err = initiator.logout().await.unwrap_err();
        assert!(matches!(
            err.as_session(),
            Some(SessionError::InvalidState { .. })
        ));
        assert_eq!(initiator.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_cancelled_logon_ends_faulted() {
        let dir = tempfile::tempdir().unwrap();
        let initiator = initiator(dir.path());
        initiator.inner.cancel.cancel();

        let err = initiator.logon().await.unwrap_err();
        assert_eq!(err.as_session(), Some(&SessionError::Cancelled));
        assert_eq!(initiator.state(), SessionState::Faulted);
    }
}
