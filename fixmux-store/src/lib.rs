/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # fixmux Store
//!
//! Persistence for the fixmux FIX initiator.
//!
//! This crate provides:
//! - **SessionStore trait**: next sender/target sequence numbers per session
//! - **MemoryStore**: in-process store for sessions without a store directory
//! - **FileStore**: file-backed store that survives restarts
//! - **Durable message log**: [`SessionLog`] and the shared [`CommunalLog`]

pub mod file;
pub mod log;
pub mod memory;
pub mod traits;

pub use file::FileStore;
pub use log::{CommunalLog, SessionLog};
pub use memory::MemoryStore;
pub use traits::SessionStore;
