/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # fixmux Engine
//!
//! Runs many independent FIX initiator sessions from one process.
//!
//! This crate provides:
//! - **Initiator**: per-session connectivity state machine with endpoint failover
//! - **Pipeline**: classify, log and extract every message in wire order
//! - **Gap recovery**: operator-driven ResendRequests
//! - **Coordinator**: concurrent fan-out of logon, resend and logout
//! - **Builder API**: fluent configuration for engine setup

mod connection;

pub mod builder;
pub mod coordinator;
pub mod events;
pub mod initiator;
pub mod pipeline;
pub mod recovery;

pub use builder::EngineBuilder;
pub use coordinator::{Coordinator, LogonReport, OperationReport};
pub use events::{DEFAULT_EVENT_CAPACITY, EventPublisher, SessionEvent};
pub use initiator::{COMMAND_TIMEOUT, Initiator};
pub use pipeline::Pipeline;
pub use recovery::{GapRecovery, ResendRange};
