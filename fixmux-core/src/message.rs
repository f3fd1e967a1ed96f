/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Message types for FIX protocol.
//!
//! This module provides:
//! - [`MsgType`]: FIX message types the initiator deals with
//! - [`Classification`]: coarse message class used for routing and logging
//! - [`RawMessage`]: Zero-copy view into a decoded FIX message buffer
//! - [`OutboundMessage`]: mutable message under construction
//! - [`WireMessage`]: immutable record of a message that crossed the wire

use crate::error::DecodeError;
use crate::field::FieldRef;
use crate::types::Timestamp;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// FIX message types.
///
/// Session-level messages are listed explicitly together with the
/// application messages a trading initiator commonly receives. Anything else
/// is carried as `Custom(String)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MsgType {
    /// Heartbeat (0) - Session level.
    #[default]
    Heartbeat,
    /// Test Request (1) - Session level.
    TestRequest,
    /// Resend Request (2) - Session level.
    ResendRequest,
    /// Reject (3) - Session level.
    Reject,
    /// Sequence Reset (4) - Session level.
    SequenceReset,
    /// Logout (5) - Session level.
    Logout,
    /// Execution Report (8).
    ExecutionReport,
    /// Order Cancel Reject (9).
    OrderCancelReject,
    /// Logon (A) - Session level.
    Logon,
    /// New Order Single (D).
    NewOrderSingle,
    /// Business Message Reject (j).
    BusinessMessageReject,
    /// Custom or unknown message type.
    Custom(String),
}

impl std::str::FromStr for MsgType {
    type Err = std::convert::Infallible;

    /// Creates a MsgType from a string value.
    ///
    /// # Arguments
    /// * `s` - The message type string (e.g., "8" for ExecutionReport)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "0" => Self::Heartbeat,
            "1" => Self::TestRequest,
            "2" => Self::ResendRequest,
            "3" => Self::Reject,
            "4" => Self::SequenceReset,
            "5" => Self::Logout,
            "8" => Self::ExecutionReport,
            "9" => Self::OrderCancelReject,
            "A" => Self::Logon,
            "D" => Self::NewOrderSingle,
            "j" => Self::BusinessMessageReject,
            other => Self::Custom(other.to_string()),
        })
    }
}

impl MsgType {
    /// Returns the string representation of this message type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Heartbeat => "0",
            Self::TestRequest => "1",
            Self::ResendRequest => "2",
            Self::Reject => "3",
            Self::SequenceReset => "4",
            Self::Logout => "5",
            Self::ExecutionReport => "8",
            Self::OrderCancelReject => "9",
            Self::Logon => "A",
            Self::NewOrderSingle => "D",
            Self::BusinessMessageReject => "j",
            Self::Custom(s) => s.as_str(),
        }
    }

    /// Returns true if this is an administrative message.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Self::Heartbeat
                | Self::TestRequest
                | Self::ResendRequest
                | Self::Reject
                | Self::SequenceReset
                | Self::Logout
                | Self::Logon
        )
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse message class derived from MsgType (35).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    /// Logon (A).
    Logon,
    /// Logout (5).
    Logout,
    /// Execution Report (8).
    ExecutionReport,
    /// Resend Request (2).
    ResendRequest,
    /// Everything else, including messages without a readable MsgType.
    Other,
}

impl From<&MsgType> for Classification {
    fn from(msg_type: &MsgType) -> Self {
        match msg_type {
            MsgType::Logon => Self::Logon,
            MsgType::Logout => Self::Logout,
            MsgType::ExecutionReport => Self::ExecutionReport,
            MsgType::ResendRequest => Self::ResendRequest,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Logon => "Logon",
            Self::Logout => "Logout",
            Self::ExecutionReport => "ExecutionReport",
            Self::ResendRequest => "ResendRequest",
            Self::Other => "Other",
        };
        f.write_str(name)
    }
}

/// Zero-copy view into a FIX message buffer.
///
/// Fields are stored as references into the original buffer, in wire order.
#[derive(Debug, Clone)]
pub struct RawMessage<'a> {
    /// The complete message buffer.
    buffer: &'a [u8],
    /// The parsed message type.
    msg_type: MsgType,
    /// Parsed field references (tag and value).
    fields: SmallVec<[FieldRef<'a>; 32]>,
}

impl<'a> RawMessage<'a> {
    /// Creates a new RawMessage from parsed components.
    ///
    /// # Arguments
    /// * `buffer` - The complete message buffer
    /// * `msg_type` - The parsed message type
    /// * `fields` - Parsed field references
    #[must_use]
    pub fn new(buffer: &'a [u8], msg_type: MsgType, fields: SmallVec<[FieldRef<'a>; 32]>) -> Self {
        Self {
            buffer,
            msg_type,
            fields,
        }
    }

    /// Returns the complete message buffer.
    #[inline]
    #[must_use]
    pub const fn buffer(&self) -> &'a [u8] {
        self.buffer
    }

    /// Returns the message type.
    #[inline]
    #[must_use]
    pub fn msg_type(&self) -> &MsgType {
        &self.msg_type
    }

    /// Returns an iterator over all fields.
    #[inline]
    pub fn fields(&self) -> impl Iterator<Item = &FieldRef<'a>> {
        self.fields.iter()
    }

    /// Gets a field by tag number.
    ///
    /// # Returns
    /// The first field with the given tag, or `None` if not found.
    #[must_use]
    pub fn get_field(&self, tag: u32) -> Option<&FieldRef<'a>> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    /// Gets a field value as a string.
    ///
    /// # Returns
    /// The field value as a string, or `None` if not found or invalid UTF-8.
    #[must_use]
    pub fn get_field_str(&self, tag: u32) -> Option<&'a str> {
        self.get_field(tag).and_then(|f| f.as_str().ok())
    }

    /// Gets a required field.
    ///
    /// # Errors
    /// Returns `DecodeError::MissingRequiredField` if the tag is absent.
    pub fn require(&self, tag: u32) -> Result<&FieldRef<'a>, DecodeError> {
        self.get_field(tag)
            .ok_or(DecodeError::MissingRequiredField { tag })
    }

    /// Gets a field value parsed as the specified type.
    ///
    /// # Errors
    /// Returns `DecodeError` if the field is not found or cannot be parsed.
    pub fn get_field_as<T: std::str::FromStr>(&self, tag: u32) -> Result<T, DecodeError> {
        self.require(tag)?.parse()
    }

    /// Returns the message length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if the message is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// A message being built for sending.
///
/// Header and body are kept apart so that session stamping (sequence number,
/// sending time) can happen after the application has filled the body.
/// Setting a tag that is already present replaces its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    msg_type: MsgType,
    header: Vec<(u32, String)>,
    body: Vec<(u32, String)>,
}

impl OutboundMessage {
    /// Creates an empty message of the given type.
    #[must_use]
    pub fn new(msg_type: MsgType) -> Self {
        Self {
            msg_type,
            header: Vec::with_capacity(6),
            body: Vec::new(),
        }
    }

    /// Returns the message type.
    #[inline]
    #[must_use]
    pub fn msg_type(&self) -> &MsgType {
        &self.msg_type
    }

    /// Sets a header field, replacing any previous value.
    pub fn set_header_field(&mut self, tag: u32, value: impl Into<String>) {
        upsert(&mut self.header, tag, value.into());
    }

    /// Sets a body field, replacing any previous value.
    pub fn set_field(&mut self, tag: u32, value: impl Into<String>) {
        upsert(&mut self.body, tag, value.into());
    }

    /// Builder-style variant of [`Self::set_field`].
    #[must_use]
    pub fn with_field(mut self, tag: u32, value: impl Into<String>) -> Self {
        self.set_field(tag, value);
        self
    }

    /// Returns a header field value.
    #[must_use]
    pub fn header_field(&self, tag: u32) -> Option<&str> {
        lookup(&self.header, tag)
    }

    /// Returns a body field value.
    #[must_use]
    pub fn field(&self, tag: u32) -> Option<&str> {
        lookup(&self.body, tag)
    }

    /// Iterates header fields in insertion order.
    pub fn header_fields(&self) -> impl Iterator<Item = (u32, &str)> {
        self.header.iter().map(|(t, v)| (*t, v.as_str()))
    }

    /// Iterates body fields in insertion order.
    pub fn body_fields(&self) -> impl Iterator<Item = (u32, &str)> {
        self.body.iter().map(|(t, v)| (*t, v.as_str()))
    }
}

fn upsert(fields: &mut Vec<(u32, String)>, tag: u32, value: String) {
    match fields.iter_mut().find(|(t, _)| *t == tag) {
        Some(slot) => slot.1 = value,
        None => fields.push((tag, value)),
    }
}

fn lookup(fields: &[(u32, String)], tag: u32) -> Option<&str> {
    fields
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, v)| v.as_str())
}

/// Direction a message travelled relative to this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Received from the counterparty.
    Inbound,
    /// Sent to the counterparty.
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        })
    }
}

/// A message exactly as it crossed the wire.
///
/// Immutable once created; cloning shares the underlying buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    raw: Bytes,
    direction: Direction,
    classification: Classification,
    timestamp: Timestamp,
}

impl WireMessage {
    /// Creates a wire message stamped with the current time.
    #[must_use]
    pub fn new(raw: Bytes, direction: Direction, classification: Classification) -> Self {
        Self {
            raw,
            direction,
            classification,
            timestamp: Timestamp::now(),
        }
    }

    /// Returns the raw wire bytes.
    #[inline]
    #[must_use]
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Returns the direction.
    #[inline]
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the classification.
    #[inline]
    #[must_use]
    pub const fn classification(&self) -> Classification {
        self.classification
    }

    /// Returns when the message crossed the wire.
    #[inline]
    #[must_use]
    pub const fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Renders the message with `|` in place of SOH for human-readable logs.
    #[must_use]
    pub fn display_text(&self) -> String {
        String::from_utf8_lossy(&self.raw)
            .trim_end_matches('\x01')
            .replace('\x01', " | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_type_from_str() {
        assert_eq!("0".parse::<MsgType>().unwrap(), MsgType::Heartbeat);
        assert_eq!("A".parse::<MsgType>().unwrap(), MsgType::Logon);
        assert_eq!("8".parse::<MsgType>().unwrap(), MsgType::ExecutionReport);
        assert_eq!("2".parse::<MsgType>().unwrap(), MsgType::ResendRequest);
    }

    #[test]
    fn test_msg_type_custom() {
        let custom: MsgType = "XX".parse().unwrap();
        assert!(matches!(custom, MsgType::Custom(_)));
        assert_eq!(custom.as_str(), "XX");
        assert!(!custom.is_admin());
    }

    #[test]
    fn test_classification_from_msg_type() {
        assert_eq!(Classification::from(&MsgType::Logon), Classification::Logon);
        assert_eq!(Classification::from(&MsgType::Logout), Classification::Logout);
        assert_eq!(
            Classification::from(&MsgType::ExecutionReport),
            Classification::ExecutionReport
        );
        assert_eq!(
            Classification::from(&MsgType::ResendRequest),
            Classification::ResendRequest
        );
        assert_eq!(Classification::from(&MsgType::Heartbeat), Classification::Other);
    }

    #[test]
    fn test_outbound_set_field_replaces() {
        let mut msg = OutboundMessage::new(MsgType::Logon);
        msg.set_field(96, "secret");
        msg.set_field(96, "other");
        assert_eq!(msg.field(96), Some("other"));
        assert_eq!(msg.body_fields().count(), 1);
    }

    #[test]
    fn test_outbound_header_and_body_are_separate() {
        let mut msg = OutboundMessage::new(MsgType::ResendRequest).with_field(7, "100");
        msg.set_header_field(49, "SENDER");
        assert_eq!(msg.header_field(49), Some("SENDER"));
        assert_eq!(msg.field(49), None);
        assert_eq!(msg.field(7), Some("100"));
    }

    #[test]
    fn test_wire_message_display_text() {
        let msg = WireMessage::new(
            Bytes::from_static(b"8=FIX.4.4\x019=102\x01"),
            Direction::Inbound,
            Classification::Other,
        );
        assert_eq!(msg.display_text(), "8=FIX.4.4 | 9=102");
    }
}
