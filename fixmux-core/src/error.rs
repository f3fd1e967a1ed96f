/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Error types for the fixmux FIX initiator.
//!
//! Every component reports failures through one of the domain enums below;
//! they all convert into [`FixError`] so that the coordinator can surface them
//! verbatim to the operator.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`FixError`] as the error type.
pub type Result<T> = std::result::Result<T, FixError>;

/// Top-level error type for all fixmux operations.
#[derive(Debug, Error)]
pub enum FixError {
    /// Error during message decoding or structured extraction.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Error in session layer operations.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Error in sequence store operations.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid or missing session configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Durable log write or flush failure.
    #[error("log error: {0}")]
    LogWrite(#[from] LogWriteError),

    /// I/O error from underlying transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FixError {
    /// Returns the session error, if this is one.
    #[must_use]
    pub fn as_session(&self) -> Option<&SessionError> {
        match self {
            Self::Session(err) => Some(err),
            _ => None,
        }
    }
}

/// Errors that occur while decoding a FIX message or extracting typed fields.
///
/// Structured extraction failures (an ExecutionReport missing a required
/// field, for example) are reported with this type as well.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Message buffer is incomplete, need more data.
    #[error("incomplete message, need more data")]
    Incomplete,

    /// Invalid BeginString field (tag 8).
    #[error("invalid begin string: expected 8=FIX.x.y")]
    InvalidBeginString,

    /// Missing BodyLength field (tag 9).
    #[error("missing body length field (tag 9)")]
    MissingBodyLength,

    /// Invalid BodyLength value.
    #[error("invalid body length value")]
    InvalidBodyLength,

    /// Missing MsgType field (tag 35).
    #[error("missing msg type field (tag 35)")]
    MissingMsgType,

    /// Checksum mismatch between calculated and declared values.
    #[error("checksum mismatch: calculated {calculated}, declared {declared}")]
    ChecksumMismatch {
        /// Calculated checksum value.
        calculated: u8,
        /// Declared checksum value in message.
        declared: u8,
    },

    /// Missing required field.
    #[error("missing required field: tag {tag}")]
    MissingRequiredField {
        /// The tag number of the missing field.
        tag: u32,
    },

    /// Invalid field value for the expected type.
    #[error("invalid field value for tag {tag}: {reason}")]
    InvalidFieldValue {
        /// The tag number of the field.
        tag: u32,
        /// Description of why the value is invalid.
        reason: String,
    },

    /// Invalid UTF-8 in string field.
    #[error("invalid utf-8 in field: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// Errors in FIX session layer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session is not in the correct state for the operation.
    #[error("invalid session state: expected {expected}, current {current}")]
    InvalidState {
        /// Expected state for the operation.
        expected: String,
        /// Current session state.
        current: String,
    },

    /// Every endpoint candidate was tried without a successful logon.
    #[error("logon failed on every endpoint: {}", attempted.join("; "))]
    LogonFailed {
        /// One entry per attempted endpoint, with the last failure seen there.
        attempted: Vec<String>,
    },

    /// Logon was rejected by counterparty.
    #[error("logon rejected: {reason}")]
    LogonRejected {
        /// Reason for rejection.
        reason: String,
    },

    /// No Logon acknowledgement arrived in time.
    #[error("logon timeout after {elapsed_ms} milliseconds")]
    LogonTimeout {
        /// Time waited in milliseconds.
        elapsed_ms: u64,
    },

    /// No Logout confirmation arrived in time.
    #[error("logout timeout after {elapsed_ms} milliseconds")]
    LogoutTimeout {
        /// Time waited in milliseconds.
        elapsed_ms: u64,
    },

    /// Heartbeat timeout - no response to TestRequest.
    #[error("heartbeat timeout after {elapsed_ms} milliseconds")]
    HeartbeatTimeout {
        /// Elapsed time in milliseconds since last message.
        elapsed_ms: u64,
    },

    /// Resend range rejected before sending.
    #[error("invalid resend range: begin={begin}, end={end}")]
    InvalidResendRange {
        /// Begin sequence number.
        begin: u64,
        /// End sequence number.
        end: u64,
    },

    /// Operation aborted by shutdown.
    #[error("operation cancelled by shutdown")]
    Cancelled,

    /// Connection level failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors in sequence store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store contents could not be parsed.
    #[error("store corrupted: {reason}")]
    Corrupted {
        /// Description of the corruption.
        reason: String,
    },

    /// I/O error in persistent store.
    #[error("store i/o error: {0}")]
    Io(String),

    /// The next sequence number does not fit in 64 bits.
    #[error("sequence numbers exhausted")]
    SequenceExhausted,
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Errors raised while validating session configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting is absent or blank.
    #[error("missing required setting: {field}")]
    MissingField {
        /// Name of the setting.
        field: &'static str,
    },

    /// A setting is present but unusable.
    #[error("invalid setting {field}: {reason}")]
    InvalidField {
        /// Name of the setting.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// No endpoint candidate was configured.
    #[error("no endpoint candidates configured")]
    NoEndpoints,

    /// Configuration file could not be read.
    #[error("cannot read {}: {reason}", path.display())]
    Io {
        /// Path of the file.
        path: PathBuf,
        /// Underlying error text.
        reason: String,
    },

    /// Configuration file could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
}

/// A durable log write or flush failed.
///
/// The message is still held in memory and processing continues, but it is
/// not considered durably logged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("log write to {} failed: {reason}", path.display())]
pub struct LogWriteError {
    /// File that could not be written.
    pub path: PathBuf,
    /// Underlying error text.
    pub reason: String,
}

impl LogWriteError {
    /// Creates a log write error from an I/O failure.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}
