/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # fixmux Transport
//!
//! Network transport layer for the fixmux initiator.
//!
//! - **Codec**: Tokio codec for FIX message framing
//! - **Connector**: pluggable outbound connection factory, TCP by default

pub mod codec;
pub mod connector;

pub use codec::{CodecError, FixCodec};
pub use connector::{BoxedStream, Connector, FixStream, TcpConnector};
