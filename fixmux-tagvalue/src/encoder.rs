/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! FIX message encoder.
//!
//! BeginString (8), BodyLength (9) and CheckSum (10) are written by the
//! encoder; callers only append the body fields.

use crate::checksum::{calculate_checksum, format_checksum};
use bytes::{BufMut, BytesMut};
use fixmux_core::message::OutboundMessage;
use fixmux_core::tags;

/// SOH (Start of Header) delimiter used in FIX messages.
pub const SOH: u8 = 0x01;

/// FIX message encoder.
#[derive(Debug)]
pub struct Encoder {
    /// Fields between BodyLength and CheckSum.
    body: BytesMut,
    begin_string: String,
}

impl Encoder {
    /// Creates a new encoder for the given BeginString.
    ///
    /// # Arguments
    /// * `begin_string` - The FIX version string (e.g., "FIX.4.4")
    #[must_use]
    pub fn new(begin_string: impl Into<String>) -> Self {
        Self {
            body: BytesMut::with_capacity(256),
            begin_string: begin_string.into(),
        }
    }

    /// Encodes an outbound message: MsgType first, then header fields in
    /// insertion order, then body fields.
    ///
    /// # Arguments
    /// * `begin_string` - The FIX version string
    /// * `message` - The message to encode
    #[must_use]
    pub fn encode(begin_string: &str, message: &OutboundMessage) -> BytesMut {
        let mut encoder = Self::new(begin_string);
        encoder.put_str(tags::MSG_TYPE, message.msg_type().as_str());
        for (tag, value) in message.header_fields().chain(message.body_fields()) {
            encoder.put_str(tag, value);
        }
        encoder.finish()
    }

    /// Appends a field with a string value.
    #[inline]
    pub fn put_str(&mut self, tag: u32, value: &str) {
        self.put_raw(tag, value.as_bytes());
    }

    /// Appends a field with an unsigned integer value.
    #[inline]
    pub fn put_uint(&mut self, tag: u32, value: u64) {
        let mut buf = itoa::Buffer::new();
        self.put_raw(tag, buf.format(value).as_bytes());
    }

    /// Appends a field with raw bytes.
    #[inline]
    pub fn put_raw(&mut self, tag: u32, value: &[u8]) {
        let mut tag_buf = itoa::Buffer::new();
        self.body.put_slice(tag_buf.format(tag).as_bytes());
        self.body.put_u8(b'=');
        self.body.put_slice(value);
        self.body.put_u8(SOH);
    }

    /// Finalizes the message, prepending 8/9 and appending 10.
    #[must_use]
    pub fn finish(self) -> BytesMut {
        let mut len_buf = itoa::Buffer::new();
        let body_len = len_buf.format(self.body.len());

        let mut message =
            BytesMut::with_capacity(self.begin_string.len() + body_len.len() + self.body.len() + 16);
        message.put_slice(b"8=");
        message.put_slice(self.begin_string.as_bytes());
        message.put_u8(SOH);
        message.put_slice(b"9=");
        message.put_slice(body_len.as_bytes());
        message.put_u8(SOH);
        message.put_slice(&self.body);

        let checksum = format_checksum(calculate_checksum(&message));
        message.put_slice(b"10=");
        message.put_slice(&checksum);
        message.put_u8(SOH);

        message
    }

    /// Returns the current body length.
    #[inline]
    #[must_use]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }
}
