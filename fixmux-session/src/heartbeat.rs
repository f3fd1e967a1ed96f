/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Heartbeat and TestRequest timing.
//!
//! - a Heartbeat goes out when nothing was sent for one interval
//! - a TestRequest goes out when nothing was received for one interval plus
//!   a one second grace period
//! - a TestRequest left unanswered for another interval means the
//!   counterparty is gone

use fixmux_core::types::Timestamp;
use std::time::Duration;
use tokio::time::Instant;

const TEST_REQUEST_GRACE: Duration = Duration::from_secs(1);

/// What the session task should do after a heartbeat check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Nothing is due.
    Idle,
    /// Send a Heartbeat (35=0).
    SendHeartbeat,
    /// Send a TestRequest (35=1) carrying this TestReqID.
    SendTestRequest(String),
    /// The pending TestRequest went unanswered.
    TimedOut {
        /// Time since the last inbound message.
        silent_for: Duration,
    },
}

/// Tracks heartbeat timing for one connection.
#[derive(Debug)]
pub struct HeartbeatManager {
    interval: Duration,
    last_sent: Instant,
    last_received: Instant,
    test_request_sent_at: Option<Instant>,
}

impl HeartbeatManager {
    /// Creates a new heartbeat manager with the specified interval.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            interval,
            last_sent: now,
            last_received: now,
            test_request_sent_at: None,
        }
    }

    /// Records that a message was sent.
    #[inline]
    pub fn on_message_sent(&mut self) {
        self.last_sent = Instant::now();
    }

    /// Records that a message was received.
    ///
    /// Any inbound traffic proves the counterparty alive, so a pending
    /// TestRequest is cleared as well.
    pub fn on_message_received(&mut self) {
        self.last_received = Instant::now();
        self.test_request_sent_at = None;
    }

    /// Decides what is due at `now`.
    ///
    /// Returning `SendTestRequest` marks the request as pending; returning
    /// `SendHeartbeat` does not touch state until [`Self::on_message_sent`].
    pub fn poll(&mut self, now: Instant) -> HeartbeatAction {
        if let Some(sent_at) = self.test_request_sent_at {
            if now.duration_since(sent_at) >= self.interval {
                return HeartbeatAction::TimedOut {
                    silent_for: now.duration_since(self.last_received),
                };
            }
        } else if now.duration_since(self.last_received) >= self.interval + TEST_REQUEST_GRACE {
            let id = generate_test_req_id();
            self.test_request_sent_at = Some(now);
            return HeartbeatAction::SendTestRequest(id);
        }

        if now.duration_since(self.last_sent) >= self.interval {
            HeartbeatAction::SendHeartbeat
        } else {
            HeartbeatAction::Idle
        }
    }

    /// Returns the earliest instant at which [`Self::poll`] may return
    /// something other than `Idle`.
    #[must_use]
    pub fn next_deadline(&self) -> Instant {
        let heartbeat = self.last_sent + self.interval;
        let liveness = match self.test_request_sent_at {
            Some(sent_at) => sent_at + self.interval,
            None => self.last_received + self.interval + TEST_REQUEST_GRACE,
        };
        heartbeat.min(liveness)
    }

    /// Returns the heartbeat interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

/// Generates a TestReqID from the current time.
#[must_use]
pub fn generate_test_req_id() -> String {
    format!("TEST{}", Timestamp::now().as_nanos())
}
