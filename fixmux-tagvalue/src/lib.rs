/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # fixmux Tag-Value
//!
//! FIX tag=value encoding and decoding.
//!
//! - **Zero-copy parsing**: field values reference the original buffer
//! - **Header scan**: [`scan_msg_type`] reads MsgType without a full decode
//! - **Framing**: the encoder maintains BodyLength and CheckSum

pub mod checksum;
pub mod decoder;
pub mod encoder;

pub use checksum::calculate_checksum;
pub use decoder::{Decoder, scan_msg_type};
pub use encoder::Encoder;
pub use fixmux_core::message::RawMessage;
