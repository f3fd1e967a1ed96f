/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # fixmux Session
//!
//! FIX session layer building blocks for the fixmux initiator.
//!
//! This crate provides:
//! - **Configuration**: Validated per-session settings and endpoint candidates
//! - **State machine**: Observable connectivity state with checked transitions
//! - **Sequence management**: Persist-before-use sequence numbers
//! - **Heartbeat handling**: Heartbeat/TestRequest timing
//! - **Classification**: Logon authentication and message classes
//! - **Execution extraction**: ExecutionReport field extraction

pub mod classifier;
pub mod config;
pub mod execution;
pub mod heartbeat;
pub mod sequence;
pub mod state;

pub use classifier::{Classifier, classify_outbound, classify_raw};
pub use config::{
    Endpoint, EndpointConfig, EndpointRole, RawSessionConfig, SessionId, SessionIdentity,
    SessionSettings, SessionSettingsBuilder,
};
pub use execution::extract_execution;
pub use heartbeat::{HeartbeatAction, HeartbeatManager};
pub use sequence::{SequenceManager, SequenceResult};
pub use state::{SessionState, StateCell};
