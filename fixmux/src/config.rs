/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! YAML configuration file.
//!
//! ```yaml
//! log_dir: /var/log/fixmux
//! store_dir: /var/lib/fixmux
//! sessions:
//!   - begin_string: FIX.4.4
//!     sender_comp_id: CLIENT
//!     target_comp_id: VENUE
//!     raw_data: s3cret
//!     endpoints:
//!       - { host: fix1.venue.com, port: 9876 }
//!       - { host: fix2.venue.com, port: 9876, role: secondary }
//! ```
//!
//! Top-level `log_dir` and `store_dir` apply to sessions that do not set
//! their own. Sessions are validated independently: one bad session is
//! reported and skipped, the rest still load.

use fixmux_core::error::ConfigError;
use fixmux_engine::EngineBuilder;
use fixmux_session::config::DEFAULT_LOG_DIR;
use fixmux_session::{RawSessionConfig, SessionSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Contents of a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Default log directory; also holds the communal log.
    pub log_dir: Option<PathBuf>,
    /// Default sequence store directory.
    pub store_dir: Option<PathBuf>,
    /// Session definitions.
    pub sessions: Vec<RawSessionConfig>,
}

impl FileConfig {
    /// Parses YAML text.
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` if the text is not a valid document.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reads and parses a file.
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - `ConfigError::Parse` if it is not a valid document
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_yaml(&text)
    }

    /// Applies the top-level defaults and validates every session.
    #[must_use]
    pub fn resolve(self) -> LoadedConfig {
        let log_dir = self
            .log_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));
        let mut sessions = Vec::with_capacity(self.sessions.len());
        let mut rejected = Vec::new();

        for (index, mut raw) in self.sessions.into_iter().enumerate() {
            raw.log_dir.get_or_insert_with(|| log_dir.clone());
            if raw.store_dir.is_none() {
                raw.store_dir.clone_from(&self.store_dir);
            }
            let label = label(index, &raw);
            match SessionSettings::from_raw(raw) {
                Ok(settings) => sessions.push(settings),
                Err(error) => {
                    warn!(session = %label, %error, "session configuration rejected");
                    rejected.push(RejectedSession {
                        index,
                        label,
                        error,
                    });
                }
            }
        }

        LoadedConfig {
            log_dir,
            sessions,
            rejected,
        }
    }
}

fn label(index: usize, raw: &RawSessionConfig) -> String {
    match (&raw.sender_comp_id, &raw.target_comp_id) {
        (Some(sender), Some(target)) => format!("#{index} {sender}->{target}"),
        _ => format!("#{index}"),
    }
}

/// A session that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedSession {
    /// Position in the `sessions` list.
    pub index: usize,
    /// Human-readable identification.
    pub label: String,
    /// Why it was rejected.
    pub error: ConfigError,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Communal log directory.
    pub log_dir: PathBuf,
    /// Sessions that passed validation, in file order.
    pub sessions: Vec<SessionSettings>,
    /// Sessions that did not.
    pub rejected: Vec<RejectedSession>,
}

impl LoadedConfig {
    /// Returns an engine builder loaded with every valid session.
    #[must_use]
    pub fn engine_builder(&self) -> EngineBuilder {
        EngineBuilder::new()
            .with_log_dir(&self.log_dir)
            .add_sessions(self.sessions.iter().cloned())
    }
}

/// Loads and validates a configuration file.
///
/// # Errors
/// - `ConfigError::Io` if the file cannot be read
/// - `ConfigError::Parse` if it is not a valid document
pub fn load(path: impl AsRef<Path>) -> Result<LoadedConfig, ConfigError> {
    let path = path.as_ref();
    let loaded = FileConfig::from_path(path)?.resolve();
    info!(
        path = %path.display(),
        sessions = loaded.sessions.len(),
        rejected = loaded.rejected.len(),
        "configuration loaded"
    );
    Ok(loaded)
}
