/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Sequence store trait definition.

use async_trait::async_trait;
use fixmux_core::error::StoreError;

/// Persistent state of one FIX session's sequencing.
///
/// The store holds the next sequence number to send and the next one expected
/// from the counterparty. Setters persist before returning so that a crash
/// never rewinds a sequence number that already went out on the wire.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the next sender sequence number.
    fn next_sender_seq(&self) -> u64;

    /// Returns the next expected target sequence number.
    fn next_target_seq(&self) -> u64;

    /// Sets the next sender sequence number.
    ///
    /// # Errors
    /// Returns `StoreError` if the value cannot be persisted.
    fn set_next_sender_seq(&self, seq: u64) -> Result<(), StoreError>;

    /// Sets the next expected target sequence number.
    ///
    /// # Errors
    /// Returns `StoreError` if the value cannot be persisted.
    fn set_next_target_seq(&self, seq: u64) -> Result<(), StoreError>;

    /// Resets both sequence numbers to 1.
    ///
    /// # Errors
    /// Returns `StoreError` if the reset cannot be persisted.
    async fn reset(&self) -> Result<(), StoreError>;
}
