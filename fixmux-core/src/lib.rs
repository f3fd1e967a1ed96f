/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # fixmux Core
//!
//! Core types and error definitions shared by every fixmux crate.
//!
//! - **Error types**: one `thiserror` enum per domain, rolled up into [`FixError`]
//! - **Field access**: zero-copy [`FieldRef`] plus the [`tags`] constants
//! - **Messages**: [`RawMessage`] for decoded input, [`OutboundMessage`] for
//!   messages under construction and [`WireMessage`] for what crossed the wire
//! - **Executions**: the [`ExecutionRecord`] extracted from fills
//! - **Core types**: [`SeqNum`], [`Timestamp`], [`CompId`], [`Side`]

pub mod error;
pub mod execution;
pub mod field;
pub mod message;
pub mod tags;
pub mod types;

pub use error::{
    ConfigError, DecodeError, FixError, LogWriteError, Result, SessionError, StoreError,
};
pub use execution::ExecutionRecord;
pub use field::FieldRef;
pub use message::{Classification, Direction, MsgType, OutboundMessage, RawMessage, WireMessage};
pub use types::{CompId, SeqNum, Side, Timestamp};
