/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Operator-driven gap recovery.
//!
//! A ResendRequest (35=2) asks the counterparty to replay a range of its
//! messages. The replayed messages arrive through the normal inbound pipeline
//! and are classified, logged and extracted like any other.

use crate::initiator::Initiator;
use fixmux_core::error::{Result, SessionError};
use fixmux_core::message::{MsgType, OutboundMessage};
use fixmux_core::tags;
use fixmux_core::types::SeqNum;
use tracing::info;

/// Validated BeginSeqNo/EndSeqNo pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResendRange {
    begin: u64,
    end: u64,
}

impl ResendRange {
    /// Creates a range; `end == 0` means everything from `begin` onwards.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidResendRange` if `begin` is zero.
    pub fn new(begin: u64, end: u64) -> std::result::Result<Self, SessionError> {
        if begin == 0 {
            return Err(SessionError::InvalidResendRange { begin, end });
        }
        Ok(Self { begin, end })
    }

    /// Returns BeginSeqNo.
    #[must_use]
    pub const fn begin(&self) -> u64 {
        self.begin
    }

    /// Returns EndSeqNo.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.end
    }

    /// Returns true if the range has no upper bound.
    #[must_use]
    pub const fn is_open_ended(&self) -> bool {
        self.end == 0
    }

    /// Builds the ResendRequest body. The header is filled in when sent.
    #[must_use]
    pub fn to_message(&self) -> OutboundMessage {
        let mut begin = itoa::Buffer::new();
        let mut end = itoa::Buffer::new();
        OutboundMessage::new(MsgType::ResendRequest)
            .with_field(tags::BEGIN_SEQ_NO, begin.format(self.begin))
            .with_field(tags::END_SEQ_NO, end.format(self.end))
    }
}

/// Issues ResendRequests through an [`Initiator`].
#[derive(Debug, Clone)]
pub struct GapRecovery {
    initiator: Initiator,
}

impl GapRecovery {
    /// Creates a controller for `initiator`.
    #[must_use]
    pub fn new(initiator: Initiator) -> Self {
        Self { initiator }
    }

    /// Requests a replay of `begin..=end` (`end == 0` for open-ended).
    ///
    /// # Returns
    /// The MsgSeqNum of the ResendRequest, as acknowledgement.
    ///
    /// # Errors
    /// - `SessionError::InvalidResendRange` if `begin` is zero
    /// - anything [`Initiator::send`] fails with, notably
    ///   `SessionError::InvalidState` when the session is not logged on
    pub async fn request_resend(&self, begin: u64, end: u64) -> Result<SeqNum> {
        let range = ResendRange::new(begin, end)?;
        let seq = self.initiator.send(range.to_message()).await?;
        info!(session = %self.initiator.session_id(), begin, end, seq = seq.value(), "resend requested");
        Ok(seq)
    }
}
