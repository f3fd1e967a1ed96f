/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Session connectivity state machine.
//!
//! ```text
//! Disconnected -> Connecting -> LoggedOn -> LoggingOut -> Disconnected
//!                     |            |
//!                     +--> Faulted <+      Faulted -> Connecting (retry)
//! ```
//!
//! The state lives in a [`StateCell`] backed by a `tokio::sync::watch`
//! channel, so observers can await changes while a single owner drives
//! transitions.

use fixmux_core::error::SessionError;
use std::fmt;
use tokio::sync::watch;

/// Connectivity state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No transport.
    Disconnected,
    /// Logon in progress across the endpoint candidates.
    Connecting,
    /// Logon acknowledged; application traffic allowed.
    LoggedOn,
    /// Logout sent, awaiting the counterparty's Logout.
    LoggingOut,
    /// Unrecoverable error; an explicit logon is required.
    Faulted,
}

impl SessionState {
    /// Returns the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::LoggedOn => "LoggedOn",
            Self::LoggingOut => "LoggingOut",
            Self::Faulted => "Faulted",
        }
    }

    /// Returns true if `next` is a legal successor of this state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use SessionState::{Connecting, Disconnected, Faulted, LoggedOn, LoggingOut};
        matches!(
            (self, next),
            (Disconnected | Faulted, Connecting)
                | (Connecting, LoggedOn | Faulted)
                | (LoggedOn, LoggingOut | Faulted | Disconnected)
                | (LoggingOut, Disconnected)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable holder of a session's state.
#[derive(Debug)]
pub struct StateCell {
    tx: watch::Sender<SessionState>,
}

impl StateCell {
    /// Creates a cell in `Disconnected`.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::Disconnected);
        Self { tx }
    }

    /// Returns the current state.
    #[must_use]
    pub fn current(&self) -> SessionState {
        *self.tx.borrow()
    }

    /// Returns a receiver that observes every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Moves to `to` if the current state is one of `from`.
    ///
    /// The check and the update happen atomically.
    ///
    /// # Returns
    /// The state that was replaced.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` without changing anything when
    /// the current state is not in `from` or the move is not legal.
    pub fn transition(
        &self,
        from: &[SessionState],
        to: SessionState,
    ) -> Result<SessionState, SessionError> {
        let mut outcome = Err(SessionState::Disconnected);
        self.tx.send_if_modified(|state| {
            if from.contains(state) && state.can_transition_to(to) {
                outcome = Ok(*state);
                *state = to;
                true
            } else {
                outcome = Err(*state);
                false
            }
        });
        outcome.map_err(|current| SessionError::InvalidState {
            expected: from
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join("|"),
            current: current.to_string(),
        })
    }

    /// Moves to `to` from whatever the current state is, if legal.
    ///
    /// # Returns
    /// The previous state when the move happened, `None` otherwise.
    pub fn advance(&self, to: SessionState) -> Option<SessionState> {
        let mut previous = None;
        self.tx.send_if_modified(|state| {
            if state.can_transition_to(to) {
                previous = Some(*state);
                *state = to;
                true
            } else {
                false
            }
        });
        previous
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
