/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Multi-session coordinator.
//!
//! Fans operator commands out to every session concurrently and aggregates
//! the outcomes. Sessions are independent: one session failing never stops
//! the others, and the only state they share is the communal log.

use crate::events::SessionEvent;
use crate::initiator::Initiator;
use crate::recovery::GapRecovery;
use fixmux_core::error::{FixError, Result};
use fixmux_session::{Endpoint, SessionId, SessionState};
use fixmux_store::CommunalLog;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Outcome of [`Coordinator::logon_all`].
#[derive(Debug, Default)]
pub struct LogonReport {
    /// Sessions that logged on, with the endpoint used.
    pub succeeded: BTreeMap<SessionId, Endpoint>,
    /// Sessions that did not, with the reason.
    pub failed: BTreeMap<SessionId, FixError>,
}

impl LogonReport {
    /// Returns true if every session logged on.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of a fan-out operation other than logon.
#[derive(Debug, Default)]
pub struct OperationReport {
    /// Sessions where the operation succeeded.
    pub succeeded: Vec<SessionId>,
    /// Sessions where it failed, with the reason.
    pub failed: BTreeMap<SessionId, FixError>,
}

impl OperationReport {
    /// Returns true if the operation succeeded everywhere.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn collect<T>(outcomes: Vec<(SessionId, Result<T>)>) -> Self {
        let mut report = Self::default();
        for (session, outcome) in outcomes {
            match outcome {
                Ok(_) => report.succeeded.push(session),
                Err(error) => {
                    report.failed.insert(session, error);
                }
            }
        }
        report
    }
}

/// Owns every configured session.
pub struct Coordinator {
    sessions: Vec<Initiator>,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
    communal: Arc<CommunalLog>,
}

impl Coordinator {
    pub(crate) fn new(
        sessions: Vec<Initiator>,
        events: broadcast::Sender<SessionEvent>,
        cancel: CancellationToken,
        communal: Arc<CommunalLog>,
    ) -> Self {
        Self {
            sessions,
            events,
            cancel,
            communal,
        }
    }

    /// Returns the sessions in configuration order.
    #[must_use]
    pub fn sessions(&self) -> &[Initiator] {
        &self.sessions
    }

    /// Looks up one session.
    #[must_use]
    pub fn session(&self, id: &SessionId) -> Option<&Initiator> {
        self.sessions.iter().find(|s| s.session_id() == id)
    }

    /// Returns the state of every session.
    #[must_use]
    pub fn states(&self) -> Vec<(SessionId, SessionState)> {
        self.sessions
            .iter()
            .map(|s| (s.session_id().clone(), s.state()))
            .collect()
    }

    /// Returns a receiver of the events of every session.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Returns the shared communal log.
    #[must_use]
    pub fn communal_log(&self) -> &Arc<CommunalLog> {
        &self.communal
    }

    /// Returns the token cancelled by [`Self::shutdown`].
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Logs on every session concurrently.
    pub async fn logon_all(&self) -> LogonReport {
        self.logon_sessions(&self.sessions).await
    }

    /// Logs on the sessions that are `Disconnected` or `Faulted`, leaving
    /// live and in-progress sessions alone.
    pub async fn logon_idle(&self) -> LogonReport {
        let idle: Vec<Initiator> = self
            .sessions
            .iter()
            .filter(|s| matches!(s.state(), SessionState::Disconnected | SessionState::Faulted))
            .cloned()
            .collect();
        self.logon_sessions(&idle).await
    }

    async fn logon_sessions(&self, sessions: &[Initiator]) -> LogonReport {
        let outcomes = fan_out(sessions, |s| async move { s.logon().await }).await;

        let mut report = LogonReport::default();
        for (session, outcome) in outcomes {
            match outcome {
                Ok(endpoint) => {
                    report.succeeded.insert(session, endpoint);
                }
                Err(error) => {
                    report.failed.insert(session, error);
                }
            }
        }
        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "logon round finished"
        );
        report
    }

    /// Sends a ResendRequest for `begin..=end` on every session.
    pub async fn resend_all(&self, begin: u64, end: u64) -> OperationReport {
        let outcomes = fan_out(&self.sessions, |s| async move {
            GapRecovery::new(s.clone()).request_resend(begin, end).await
        })
        .await;
        OperationReport::collect(outcomes)
    }

    /// Logs out every session. Each logout is bounded by its session's
    /// logout timeout, so a hung counterparty cannot block the others.
    pub async fn logout_all(&self) -> OperationReport {
        let outcomes = fan_out(&self.sessions, |s| async move { s.logout().await }).await;
        OperationReport::collect(outcomes)
    }

    /// Cancels in-flight logons and logs out every logged-on session.
    ///
    /// Sessions caught mid-logon end `Faulted`.
    pub async fn shutdown(&self) -> OperationReport {
        info!("shutting down");
        self.cancel.cancel();
        let active: Vec<Initiator> = self
            .sessions
            .iter()
            .filter(|s| s.state() == SessionState::LoggedOn)
            .cloned()
            .collect();
        let outcomes = fan_out(&active, |s| async move { s.logout().await }).await;
        OperationReport::collect(outcomes)
    }
}

async fn fan_out<'a, T, F, Fut>(sessions: &'a [Initiator], op: F) -> Vec<(SessionId, Result<T>)>
where
    F: Fn(&'a Initiator) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    join_all(sessions.iter().map(|s| {
        let outcome = op(s);
        async move { (s.session_id().clone(), outcome.await) }
    }))
    .await
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("sessions", &self.sessions)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
