/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Tokio codec for FIX message framing.
//!
//! Frames are delimited using BodyLength (9); the trailing CheckSum (10) is
//! validated before a frame is handed out.

use bytes::{BufMut, Bytes, BytesMut};
use fixmux_tagvalue::checksum::{calculate_checksum, parse_checksum};
use memchr::memchr;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Errors that can occur during codec operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Stream does not start with `8=`.
    #[error("invalid begin string: message must start with 8=")]
    InvalidBeginString,

    /// Second field is not BodyLength.
    #[error("missing body length field (tag 9)")]
    MissingBodyLength,

    /// BodyLength value is not a number.
    #[error("invalid body length value")]
    InvalidBodyLength,

    /// Trailer is not a well-formed `10=NNN` field.
    #[error("malformed checksum trailer")]
    InvalidTrailer,

    /// Checksum mismatch.
    #[error("checksum mismatch: calculated {calculated}, declared {declared}")]
    ChecksumMismatch {
        /// Calculated checksum.
        calculated: u8,
        /// Declared checksum in message.
        declared: u8,
    },

    /// Message exceeds maximum size.
    #[error("message too large: {size} bytes exceeds maximum {max_size}")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max_size: usize,
    },

    /// I/O error.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

const SOH: u8 = 0x01;

/// Length of the `10=NNN<SOH>` trailer.
const TRAILER_LEN: usize = 7;

/// Largest frame accepted from a counterparty.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Tokio codec for FIX message framing.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixCodec;

impl FixCodec {
    /// Creates a codec with a [`MAX_MESSAGE_SIZE`] frame limit and checksum
    /// validation.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns the full length of the frame at the start of `src`, or `None`
    /// when more bytes are needed to know it.
    fn frame_length(src: &[u8]) -> Result<Option<usize>, CodecError> {
        if src.len() < 2 {
            return Ok(None);
        }
        if &src[..2] != b"8=" {
            return Err(CodecError::InvalidBeginString);
        }

        let Some(first_soh) = memchr(SOH, src) else {
            return Ok(None);
        };
        let body_len_start = first_soh + 1;
        if src.len() < body_len_start + 2 {
            return Ok(None);
        }
        if &src[body_len_start..body_len_start + 2] != b"9=" {
            return Err(CodecError::MissingBodyLength);
        }
        let Some(rel) = memchr(SOH, &src[body_len_start..]) else {
            return Ok(None);
        };
        let body_len_soh = body_len_start + rel;

        let body_length: usize = std::str::from_utf8(&src[body_len_start + 2..body_len_soh])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(CodecError::InvalidBodyLength)?;

        let total = body_length
            .checked_add(body_len_soh + 1 + TRAILER_LEN)
            .ok_or(CodecError::InvalidBodyLength)?;
        if total > MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge {
                size: total,
                max_size: MAX_MESSAGE_SIZE,
            });
        }
        Ok(Some(total))
    }
}

impl Decoder for FixCodec {
    type Item = BytesMut;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(total) = Self::frame_length(src)? else {
            return Ok(None);
        };
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let trailer = &src[total - TRAILER_LEN..total];
        if &trailer[..3] != b"10=" || trailer[6] != SOH {
            return Err(CodecError::InvalidTrailer);
        }

        let declared = parse_checksum(&trailer[3..6]).ok_or(CodecError::InvalidTrailer)?;
        let calculated = calculate_checksum(&src[..total - TRAILER_LEN]);
        if calculated != declared {
            return Err(CodecError::ChecksumMismatch {
                calculated,
                declared,
            });
        }

        Ok(Some(src.split_to(total)))
    }
}

impl Encoder<&[u8]> for FixCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(item);
        Ok(())
    }
}

impl Encoder<Bytes> for FixCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        <Self as Encoder<&[u8]>>::encode(self, &item, dst)
    }
}
