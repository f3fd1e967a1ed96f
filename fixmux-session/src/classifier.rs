/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Message classification and Logon authentication.
//!
//! Outbound Logon messages get the session credential in RawData (96) and
//! its byte length in RawDataLength (95). Every message, in either
//! direction, is classified from MsgType (35).

use crate::config::SessionIdentity;
use fixmux_core::message::{Classification, MsgType, OutboundMessage};
use fixmux_core::tags;
use fixmux_tagvalue::scan_msg_type;

/// Classifier and authenticator for one session.
#[derive(Clone)]
pub struct Classifier {
    auth_payload: String,
}

impl Classifier {
    /// Creates a classifier injecting `auth_payload` into Logon messages.
    #[must_use]
    pub fn new(auth_payload: impl Into<String>) -> Self {
        Self {
            auth_payload: auth_payload.into(),
        }
    }

    /// Creates a classifier for the given identity.
    #[must_use]
    pub fn for_identity(identity: &SessionIdentity) -> Self {
        Self::new(identity.auth_payload())
    }

    /// Authenticates an outbound message if it is a Logon, then classifies it.
    ///
    /// Existing RawData/RawDataLength values are replaced, so applying this
    /// twice yields the same fields. An empty payload leaves the message
    /// untouched.
    pub fn prepare_outbound(&self, message: &mut OutboundMessage) -> Classification {
        if *message.msg_type() == MsgType::Logon && !self.auth_payload.is_empty() {
            let mut len = itoa::Buffer::new();
            message.set_field(tags::RAW_DATA_LENGTH, len.format(self.auth_payload.len()));
            message.set_field(tags::RAW_DATA, self.auth_payload.as_str());
        }
        classify_outbound(message)
    }

    /// Classifies raw wire bytes by scanning the header. Never fails.
    #[must_use]
    pub fn classify(&self, raw: &[u8]) -> Classification {
        classify_raw(raw)
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("auth_payload_len", &self.auth_payload.len())
            .finish()
    }
}

/// Classifies raw wire bytes; messages without a readable tag 35 are `Other`.
#[must_use]
pub fn classify_raw(raw: &[u8]) -> Classification {
    scan_msg_type(raw).map_or(Classification::Other, |t| Classification::from(&t))
}

/// Classifies a message under construction.
#[must_use]
pub fn classify_outbound(message: &OutboundMessage) -> Classification {
    Classification::from(message.msg_type())
}
