/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # fixmux
//!
//! Runs one or more FIX initiator sessions against trading venues from a
//! single process.
//!
//! ## Features
//!
//! - **Authenticated logon**: per-session RawData (96) injected on Logon
//! - **Endpoint failover**: primaries first, bounded attempts per endpoint
//! - **Durable logging**: every wire message to a daily session file and a
//!   communal file, in wire order
//! - **Execution extraction**: typed records from ExecutionReports
//! - **Gap recovery**: operator-issued ResendRequests fanned out to every session
//! - **Diagnostics**: a daily human-readable log of session lifecycle and every
//!   message, see [`logging`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fixmux::prelude::*;
//!
//! let loaded = fixmux::config::load("fixmux.yaml")?;
//! let coordinator = loaded.engine_builder().build()?;
//! let report = coordinator.logon_all().await;
//! ```
//!
//! ## Crate Organization
//!
//! - [`core`]: Fundamental types and error definitions
//! - [`tagvalue`]: Zero-copy tag=value encoding and decoding
//! - [`session`]: Session settings, state, sequencing and classification
//! - [`store`]: Sequence stores and the durable message log
//! - [`transport`]: Framing codec and connectors
//! - [`engine`]: Initiators and the multi-session coordinator

pub mod config;
pub mod console;
pub mod logging;

pub mod core {
    //! Core types and error definitions.
    pub use fixmux_core::*;
}

pub mod tagvalue {
    //! Zero-copy tag=value encoding and decoding.
    pub use fixmux_tagvalue::*;
}

pub mod session {
    //! Session layer.
    pub use fixmux_session::*;
}

pub mod store {
    //! Sequence stores and durable logs.
    pub use fixmux_store::*;
}

pub mod transport {
    //! Network transport layer.
    pub use fixmux_transport::*;
}

pub mod engine {
    //! Initiators and coordination.
    pub use fixmux_engine::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    // Core types
    pub use fixmux_core::{
        Classification, CompId, ConfigError, DecodeError, Direction, ExecutionRecord, FixError,
        MsgType, OutboundMessage, RawMessage, Result, SeqNum, SessionError, Side, Timestamp,
        WireMessage,
    };

    // Tag-value encoding
    pub use fixmux_tagvalue::{Decoder, Encoder, calculate_checksum};

    // Session
    pub use fixmux_session::{
        Classifier, Endpoint, EndpointRole, SessionId, SessionSettings, SessionSettingsBuilder,
        SessionState,
    };

    // Transport
    pub use fixmux_transport::{Connector, TcpConnector};

    // Engine
    pub use fixmux_engine::{
        Coordinator, EngineBuilder, GapRecovery, Initiator, LogonReport, OperationReport,
        SessionEvent,
    };

    pub use crate::config::{LoadedConfig, load};
}
