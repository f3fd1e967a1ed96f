/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Sequence number management.
//!
//! A thin layer over a [`SessionStore`]: every change is persisted before the
//! new value is used, so a restart resumes from the last number on the wire.

use fixmux_core::error::StoreError;
use fixmux_core::types::SeqNum;
use fixmux_store::SessionStore;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Manages sequence numbers for a FIX session.
pub struct SequenceManager {
    store: Arc<dyn SessionStore>,
    /// Serializes read-modify-write cycles on the store.
    update: Mutex<()>,
}

impl SequenceManager {
    /// Creates a manager over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            update: Mutex::new(()),
        }
    }

    /// Returns the next sender sequence number without incrementing.
    #[inline]
    #[must_use]
    pub fn next_sender_seq(&self) -> SeqNum {
        SeqNum::new(self.store.next_sender_seq())
    }

    /// Returns the next expected target sequence number.
    #[inline]
    #[must_use]
    pub fn next_target_seq(&self) -> SeqNum {
        SeqNum::new(self.store.next_target_seq())
    }

    /// Allocates and returns the next sender sequence number.
    ///
    /// # Errors
    /// - `StoreError::SequenceExhausted` if the counter cannot advance
    /// - any other `StoreError` if the incremented value cannot be persisted
    ///
    /// The number is not handed out in either case.
    pub fn allocate_sender_seq(&self) -> Result<SeqNum, StoreError> {
        let _guard = self.update.lock();
        let seq = self.store.next_sender_seq();
        self.store.set_next_sender_seq(successor(seq)?)?;
        Ok(SeqNum::new(seq))
    }

    /// Marks the expected incoming message as processed.
    ///
    /// # Errors
    /// Returns `StoreError` if the counter cannot advance or the new value
    /// cannot be persisted.
    pub fn increment_target_seq(&self) -> Result<(), StoreError> {
        let _guard = self.update.lock();
        let seq = self.store.next_target_seq();
        self.store.set_next_target_seq(successor(seq)?)
    }

    /// Moves the expected target sequence number past `received`.
    ///
    /// # Errors
    /// Returns `StoreError` if `received` is the last representable number or
    /// the new value cannot be persisted.
    pub fn skip_past(&self, received: u64) -> Result<(), StoreError> {
        self.set_target_seq(successor(received)?)
    }

    /// Sets the next expected target sequence number.
    ///
    /// # Errors
    /// Returns `StoreError` if the value cannot be persisted.
    pub fn set_target_seq(&self, seq: u64) -> Result<(), StoreError> {
        let _guard = self.update.lock();
        self.store.set_next_target_seq(seq)
    }

    /// Resets both sequence numbers to 1.
    ///
    /// # Errors
    /// Returns `StoreError` if the reset cannot be persisted.
    pub async fn reset(&self) -> Result<(), StoreError> {
        self.store.reset().await
    }

    /// Classifies an incoming sequence number against the expected one.
    #[must_use]
    pub fn validate_incoming(&self, received: u64) -> SequenceResult {
        let expected = self.store.next_target_seq();

        if received == expected {
            SequenceResult::Ok
        } else if received < expected {
            SequenceResult::TooLow { expected, received }
        } else {
            SequenceResult::Gap { expected, received }
        }
    }
}

fn successor(seq: u64) -> Result<u64, StoreError> {
    seq.checked_add(1).ok_or(StoreError::SequenceExhausted)
}

impl fmt::Debug for SequenceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceManager")
            .field("next_sender_seq", &self.store.next_sender_seq())
            .field("next_target_seq", &self.store.next_target_seq())
            .finish()
    }
}

/// Result of sequence number validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceResult {
    /// Sequence number is as expected.
    Ok,
    /// Lower than expected: a replay if PossDupFlag is set, an error otherwise.
    TooLow {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
    /// Higher than expected: messages were missed.
    Gap {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
}
