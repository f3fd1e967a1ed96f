/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! File-backed sequence store.
//!
//! One file per session, `{key}.seqnums`, holding
//! `SSSSSSSSSSSSSSSSSSSS : TTTTTTTTTTTTTTTTTTTT` (next sender, next target).
//! The record has a fixed width so every update rewrites it in place.

use crate::traits::SessionStore;
use async_trait::async_trait;
use fixmux_core::error::StoreError;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug)]
struct SeqFile {
    file: File,
    sender: u64,
    target: u64,
}

impl SeqFile {
    fn persist(&mut self) -> Result<(), StoreError> {
        let record = format!("{:020} : {:020}", self.sender, self.target);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(record.as_bytes())?;
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    fn load(&mut self) -> Result<bool, StoreError> {
        let mut contents = String::new();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_to_string(&mut contents)?;
        if contents.trim().is_empty() {
            return Ok(false);
        }
        let (sender, target) = parse_record(&contents)?;
        self.sender = sender;
        self.target = target;
        Ok(true)
    }
}

fn parse_record(contents: &str) -> Result<(u64, u64), StoreError> {
    let corrupted = || StoreError::Corrupted {
        reason: format!("unreadable sequence record '{}'", contents.trim()),
    };
    let (sender, target) = contents.split_once(':').ok_or_else(corrupted)?;
    let sender = sender.trim().parse().map_err(|_| corrupted())?;
    let target = target.trim().parse().map_err(|_| corrupted())?;
    Ok((sender, target))
}

/// Sequence store persisted to a single file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: Mutex<SeqFile>,
}

impl FileStore {
    /// Opens (or creates) the store for `key` under `dir`.
    ///
    /// An existing file resumes sequencing where the previous run stopped.
    ///
    /// # Errors
    /// Returns `StoreError` if the directory or file cannot be created or the
    /// existing record is unreadable.
    pub fn open(dir: impl AsRef<Path>, key: &str) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{key}.seqnums"));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let mut seq_file = SeqFile {
            file,
            sender: 1,
            target: 1,
        };
        if seq_file.load()? {
            debug!(
                path = %path.display(),
                sender = seq_file.sender,
                target = seq_file.target,
                "resumed sequence numbers"
            );
        } else {
            seq_file.persist()?;
        }

        Ok(Self {
            path,
            inner: Mutex::new(seq_file),
        })
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionStore for FileStore {
    fn next_sender_seq(&self) -> u64 {
        self.inner.lock().sender
    }

    fn next_target_seq(&self) -> u64 {
        self.inner.lock().target
    }

    fn set_next_sender_seq(&self, seq: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.sender = seq;
        inner.persist()
    }

    fn set_next_target_seq(&self, seq: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.target = seq;
        inner.persist()
    }

    async fn reset(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.sender = 1;
        inner.target = 1;
        inner.persist()
    }
}
