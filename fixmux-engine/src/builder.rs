/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Engine builder for fluent configuration.
//!
//! Collects validated session settings and the shared resources they run
//! against, then wires everything into a [`Coordinator`].

use crate::coordinator::Coordinator;
use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::initiator::Initiator;
use fixmux_core::error::{ConfigError, Result};
use fixmux_session::SessionSettings;
use fixmux_session::config::DEFAULT_LOG_DIR;
use fixmux_store::CommunalLog;
use fixmux_transport::{Connector, TcpConnector};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Builder for a multi-session [`Coordinator`].
pub struct EngineBuilder {
    /// Session settings, in configuration order.
    sessions: Vec<SessionSettings>,
    /// Directory of the communal log.
    log_dir: PathBuf,
    /// Opens connections for every session.
    connector: Arc<dyn Connector>,
    /// Capacity of the event broadcast channel.
    event_capacity: usize,
    /// Parent of every session's cancellation token.
    cancel: CancellationToken,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Creates a builder with plain TCP and the default log directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: Vec::new(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            connector: Arc::new(TcpConnector::new()),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            cancel: CancellationToken::new(),
        }
    }

    /// Adds a session.
    #[must_use]
    pub fn add_session(mut self, settings: SessionSettings) -> Self {
        self.sessions.push(settings);
        self
    }

    /// Adds several sessions, keeping their order.
    #[must_use]
    pub fn add_sessions(mut self, settings: impl IntoIterator<Item = SessionSettings>) -> Self {
        self.sessions.extend(settings);
        self
    }

    /// Sets the directory of the communal log files.
    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// Replaces the connector used by every session.
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Sets the capacity of the event channel.
    ///
    /// Subscribers that fall further behind than this lose the oldest events.
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Ties the engine to a parent token; cancelling it stops every session.
    #[must_use]
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    /// Returns the configured sessions.
    #[must_use]
    pub fn sessions(&self) -> &[SessionSettings] {
        &self.sessions
    }

    /// Returns the communal log directory.
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Opens the communal log and creates one initiator per session.
    ///
    /// # Errors
    /// - `ConfigError::InvalidField` if two sessions share a session key
    /// - `LogWriteError` if the communal log cannot be opened
    /// - `StoreError` if a sequence store cannot be opened
    pub fn build(self) -> Result<Coordinator> {
        let mut seen = HashSet::new();
        for settings in &self.sessions {
            let id = settings.session_id();
            if !seen.insert(id.clone()) {
                return Err(ConfigError::InvalidField {
                    field: "sessions",
                    reason: format!("duplicate session {id}"),
                }
                .into());
            }
        }

        let communal = Arc::new(CommunalLog::open(&self.log_dir)?);
        let (events, _) = broadcast::channel(self.event_capacity);

        let initiators = self
            .sessions
            .into_iter()
            .map(|settings| {
                Initiator::new(
                    settings,
                    Arc::clone(&communal),
                    Arc::clone(&self.connector),
                    events.clone(),
                    self.cancel.child_token(),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            sessions = initiators.len(),
            log_dir = %self.log_dir.display(),
            "engine built"
        );
        Ok(Coordinator::new(initiators, events, self.cancel, communal))
    }
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("sessions", &self.sessions.len())
            .field("log_dir", &self.log_dir)
            .field("event_capacity", &self.event_capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixmux_session::{EndpointRole, SessionSettingsBuilder};

    fn settings(sender: &str, log_dir: &Path) -> SessionSettings {
        SessionSettingsBuilder::new("FIX.4.4", sender, "VENUE")
            .endpoint("127.0.0.1", 9876, EndpointRole::Primary)
            .log_dir(log_dir)
            .build()
            .unwrap()
    }

    #[test]
    fn test_engine_builder_default() {
        let builder = EngineBuilder::new();
        assert!(builder.sessions().is_empty());
        assert_eq!(builder.log_dir(), Path::new("log"));
    }

    #[test]
    fn test_build_coordinator() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = EngineBuilder::new()
            .add_session(settings("A", dir.path()))
            .add_session(settings("B", dir.path()))
            .with_log_dir(dir.path())
            .build()
            .unwrap();

        assert_eq!(coordinator.sessions().len(), 2);
        assert!(coordinator.communal_log().messages_path().exists());
        assert!(
            coordinator
                .states()
                .iter()
                .all(|(_, state)| *state == fixmux_session::SessionState::Disconnected)
        );
    }

    #[test]
    fn test_duplicate_session_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineBuilder::new()
            .add_sessions([settings("A", dir.path()), settings("A", dir.path())])
            .with_log_dir(dir.path())
            .build()
            .unwrap_err();

        assert!(matches!(
            err,
            fixmux_core::error::FixError::Config(ConfigError::InvalidField {
                field: "sessions",
                ..
            })
        ));
    }

    #[test]
    fn test_parent_cancellation_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let parent = CancellationToken::new();
        let coordinator = EngineBuilder::new()
            .add_session(settings("A", dir.path()))
            .with_log_dir(dir.path())
            .with_cancellation(&parent)
            .build()
            .unwrap();

        parent.cancel();
        assert!(coordinator.cancellation().is_cancelled());
    }
}
