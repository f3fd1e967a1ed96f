/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Session identity and settings.
//!
//! [`RawSessionConfig`] is what a configuration file deserializes into;
//! [`SessionSettings::from_raw`] validates it into the immutable identity,
//! the ordered endpoint candidates and the timing policy of one session.

use fixmux_core::error::ConfigError;
use fixmux_core::types::{COMP_ID_MAX_LEN, CompId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default wait for the counterparty's Logon.
pub const DEFAULT_LOGON_TIMEOUT: Duration = Duration::from_secs(10);
/// Default wait for the counterparty's Logout.
pub const DEFAULT_LOGOUT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default number of attempts per endpoint.
pub const DEFAULT_ATTEMPTS_PER_ENDPOINT: u32 = 3;
/// Default delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Default log directory.
pub const DEFAULT_LOG_DIR: &str = "log";

/// Priority class of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointRole {
    /// Tried first.
    Primary,
    /// Tried once every primary is exhausted.
    Secondary,
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        })
    }
}

/// One configured endpoint candidate, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Explicit role. When absent the first listed endpoint is primary and
    /// the rest are secondary.
    #[serde(default)]
    pub role: Option<EndpointRole>,
}

/// Per-session configuration as read from a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSessionConfig {
    /// BeginString (8), e.g. `FIX.4.4`.
    pub begin_string: Option<String>,
    /// SenderCompID (49).
    pub sender_comp_id: Option<String>,
    /// TargetCompID (56).
    pub target_comp_id: Option<String>,
    /// Authentication payload placed in RawData (96) on Logon.
    pub raw_data: String,
    /// Ordered endpoint candidates.
    pub endpoints: Vec<EndpointConfig>,
    /// Shorthand primary host, combined with `port`.
    pub primary_host: Option<String>,
    /// Shorthand secondary host, combined with `port`.
    pub secondary_host: Option<String>,
    /// Port shared by the shorthand hosts.
    pub port: Option<u16>,
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Logon timeout in milliseconds.
    pub logon_timeout_ms: Option<u64>,
    /// Logout timeout in milliseconds.
    pub logout_timeout_ms: Option<u64>,
    /// Attempts per endpoint.
    pub attempts_per_endpoint: Option<u32>,
    /// Delay between attempts in milliseconds.
    pub retry_delay_ms: Option<u64>,
    /// Whether a lost transport triggers one automatic failover round.
    pub reconnect_on_loss: Option<bool>,
    /// Whether Logon asks the counterparty to reset sequence numbers.
    pub reset_on_logon: Option<bool>,
    /// Directory for the durable logs.
    pub log_dir: Option<PathBuf>,
    /// Directory for sequence number files.
    pub store_dir: Option<PathBuf>,
}

/// Key identifying one session: BeginString, SenderCompID and TargetCompID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId {
    /// BeginString (FIX version).
    pub begin_string: String,
    /// Sender CompID.
    pub sender_comp_id: String,
    /// Target CompID.
    pub target_comp_id: String,
}

impl SessionId {
    /// Creates a new session ID.
    #[must_use]
    pub fn new(
        begin_string: impl Into<String>,
        sender_comp_id: impl Into<String>,
        target_comp_id: impl Into<String>,
    ) -> Self {
        Self {
            begin_string: begin_string.into(),
            sender_comp_id: sender_comp_id.into(),
            target_comp_id: target_comp_id.into(),
        }
    }

    /// Returns the key used in file names, `BEGIN-SENDER-TARGET`.
    #[must_use]
    pub fn file_key(&self) -> String {
        format!(
            "{}-{}-{}",
            self.begin_string, self.sender_comp_id, self.target_comp_id
        )
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}->{}",
            self.begin_string, self.sender_comp_id, self.target_comp_id
        )
    }
}

/// Immutable identity of a session plus its credential.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    begin_string: String,
    sender_comp_id: CompId,
    target_comp_id: CompId,
    auth_payload: String,
}

impl SessionIdentity {
    /// Returns BeginString.
    #[must_use]
    pub fn begin_string(&self) -> &str {
        &self.begin_string
    }

    /// Returns SenderCompID.
    #[must_use]
    pub fn sender_comp_id(&self) -> &CompId {
        &self.sender_comp_id
    }

    /// Returns TargetCompID.
    #[must_use]
    pub fn target_comp_id(&self) -> &CompId {
        &self.target_comp_id
    }

    /// Returns the authentication payload.
    #[must_use]
    pub fn auth_payload(&self) -> &str {
        &self.auth_payload
    }

    /// Returns the session key.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        SessionId::new(
            self.begin_string.clone(),
            self.sender_comp_id.as_str(),
            self.target_comp_id.as_str(),
        )
    }
}

// The credential stays out of Debug output.
impl fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionIdentity")
            .field("begin_string", &self.begin_string)
            .field("sender_comp_id", &self.sender_comp_id)
            .field("target_comp_id", &self.target_comp_id)
            .field("auth_payload", &"<redacted>")
            .finish()
    }
}

/// Validated endpoint candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Priority class.
    pub role: EndpointRole,
}

impl Endpoint {
    /// Creates an endpoint.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, role: EndpointRole) -> Self {
        Self {
            host: host.into(),
            port,
            role,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.host, self.port, self.role)
    }
}

/// Validated settings of one session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Identity and credential.
    pub identity: SessionIdentity,
    /// Endpoint candidates, primaries first.
    pub endpoints: Vec<Endpoint>,
    /// Heartbeat interval.
    pub heartbeat_interval: Duration,
    /// Connect timeout per attempt.
    pub connect_timeout: Duration,
    /// Wait for the counterparty's Logon per attempt.
    pub logon_timeout: Duration,
    /// Wait for the counterparty's Logout.
    pub logout_timeout: Duration,
    /// Attempts per endpoint.
    pub attempts_per_endpoint: u32,
    /// Delay between attempts.
    pub retry_delay: Duration,
    /// Whether a lost transport triggers one automatic failover round.
    pub reconnect_on_loss: bool,
    /// Whether Logon carries ResetSeqNumFlag (141=Y).
    pub reset_on_logon: bool,
    /// Directory for the durable logs.
    pub log_dir: PathBuf,
    /// Directory for sequence number files; in-memory sequencing when absent.
    pub store_dir: Option<PathBuf>,
}

impl SessionSettings {
    /// Validates raw configuration.
    ///
    /// # Errors
    /// - `ConfigError::MissingField` if BeginString, SenderCompID or
    ///   TargetCompID is absent or blank
    /// - `ConfigError::InvalidField` if a CompID is too long or a numeric
    ///   setting is zero
    /// - `ConfigError::NoEndpoints` if no endpoint candidate is configured
    pub fn from_raw(raw: RawSessionConfig) -> Result<Self, ConfigError> {
        let begin_string = required(raw.begin_string, "begin_string")?;
        let sender = comp_id(raw.sender_comp_id, "sender_comp_id")?;
        let target = comp_id(raw.target_comp_id, "target_comp_id")?;

        let mut candidates = Vec::new();
        if let Some(port) = raw.port {
            for (host, role) in [
                (raw.primary_host, EndpointRole::Primary),
                (raw.secondary_host, EndpointRole::Secondary),
            ] {
                if let Some(host) = host.filter(|h| !h.trim().is_empty()) {
                    candidates.push(Endpoint::new(host, port, role));
                }
            }
        }
        let implicit_primary = candidates.is_empty();
        for (index, endpoint) in raw.endpoints.into_iter().enumerate() {
            if endpoint.host.trim().is_empty() {
                return Err(ConfigError::InvalidField {
                    field: "endpoints",
                    reason: format!("endpoint {index} has an empty host"),
                });
            }
            let role = endpoint.role.unwrap_or(if implicit_primary && index == 0 {
                EndpointRole::Primary
            } else {
                EndpointRole::Secondary
            });
            candidates.push(Endpoint::new(endpoint.host, endpoint.port, role));
        }
        if candidates.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        // Stable: configuration order is kept within a role.
        candidates.sort_by_key(|e| e.role);

        let attempts_per_endpoint = raw
            .attempts_per_endpoint
            .unwrap_or(DEFAULT_ATTEMPTS_PER_ENDPOINT);
        if attempts_per_endpoint == 0 {
            return Err(ConfigError::InvalidField {
                field: "attempts_per_endpoint",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            identity: SessionIdentity {
                begin_string,
                sender_comp_id: sender,
                target_comp_id: target,
                auth_payload: raw.raw_data,
            },
            endpoints: candidates,
            heartbeat_interval: millis(
                raw.heartbeat_interval_ms,
                "heartbeat_interval_ms",
                DEFAULT_HEARTBEAT_INTERVAL,
            )?,
            connect_timeout: millis(
                raw.connect_timeout_ms,
                "connect_timeout_ms",
                DEFAULT_CONNECT_TIMEOUT,
            )?,
            logon_timeout: millis(
                raw.logon_timeout_ms,
                "logon_timeout_ms",
                DEFAULT_LOGON_TIMEOUT,
            )?,
            logout_timeout: millis(
                raw.logout_timeout_ms,
                "logout_timeout_ms",
                DEFAULT_LOGOUT_TIMEOUT,
            )?,
            attempts_per_endpoint,
            retry_delay: raw
                .retry_delay_ms
                .map_or(DEFAULT_RETRY_DELAY, Duration::from_millis),
            reconnect_on_loss: raw.reconnect_on_loss.unwrap_or(true),
            reset_on_logon: raw.reset_on_logon.unwrap_or(false),
            log_dir: raw.log_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
            store_dir: raw.store_dir,
        })
    }

    /// Returns the session key.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.identity.session_id()
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingField { field })
}

fn comp_id(value: Option<String>, field: &'static str) -> Result<CompId, ConfigError> {
    let value = required(value, field)?;
    CompId::new(&value).ok_or_else(|| ConfigError::InvalidField {
        field,
        reason: format!("longer than {COMP_ID_MAX_LEN} bytes"),
    })
}

fn millis(
    value: Option<u64>,
    field: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(default),
        Some(0) => Err(ConfigError::InvalidField {
            field,
            reason: "must be greater than zero".to_string(),
        }),
        Some(ms) => Ok(Duration::from_millis(ms)),
    }
}

/// Fluent builder for [`SessionSettings`].
#[derive(Debug, Clone, Default)]
pub struct SessionSettingsBuilder {
    raw: RawSessionConfig,
}

impl SessionSettingsBuilder {
    /// Creates a builder for the given identity.
    #[must_use]
    pub fn new(
        begin_string: impl Into<String>,
        sender_comp_id: impl Into<String>,
        target_comp_id: impl Into<String>,
    ) -> Self {
        Self {
            raw: RawSessionConfig {
                begin_string: Some(begin_string.into()),
                sender_comp_id: Some(sender_comp_id.into()),
                target_comp_id: Some(target_comp_id.into()),
                ..RawSessionConfig::default()
            },
        }
    }

    /// Sets the authentication payload.
    #[must_use]
    pub fn auth_payload(mut self, payload: impl Into<String>) -> Self {
        self.raw.raw_data = payload.into();
        self
    }

    /// Appends an endpoint candidate.
    #[must_use]
    pub fn endpoint(mut self, host: impl Into<String>, port: u16, role: EndpointRole) -> Self {
        self.raw.endpoints.push(EndpointConfig {
            host: host.into(),
            port,
            role: Some(role),
        });
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.raw.heartbeat_interval_ms = Some(as_millis(interval));
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.raw.connect_timeout_ms = Some(as_millis(timeout));
        self
    }

    /// Sets the logon timeout.
    #[must_use]
    pub fn logon_timeout(mut self, timeout: Duration) -> Self {
        self.raw.logon_timeout_ms = Some(as_millis(timeout));
        self
    }

    /// Sets the logout timeout.
    #[must_use]
    pub fn logout_timeout(mut self, timeout: Duration) -> Self {
        self.raw.logout_timeout_ms = Some(as_millis(timeout));
        self
    }

    /// Sets the attempt budget per endpoint.
    #[must_use]
    pub const fn attempts_per_endpoint(mut self, attempts: u32) -> Self {
        self.raw.attempts_per_endpoint = Some(attempts);
        self
    }

    /// Sets the delay between attempts.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.raw.retry_delay_ms = Some(as_millis(delay));
        self
    }

    /// Sets whether a lost transport triggers an automatic failover round.
    #[must_use]
    pub const fn reconnect_on_loss(mut self, reconnect: bool) -> Self {
        self.raw.reconnect_on_loss = Some(reconnect);
        self
    }

    /// Sets whether Logon requests a sequence reset.
    #[must_use]
    pub const fn reset_on_logon(mut self, reset: bool) -> Self {
        self.raw.reset_on_logon = Some(reset);
        self
    }

    /// Sets the log directory.
    #[must_use]
    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.raw.log_dir = Some(dir.into());
        self
    }

    /// Sets the sequence store directory.
    #[must_use]
    pub fn store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.raw.store_dir = Some(dir.into());
        self
    }

    /// Validates and builds the settings.
    ///
    /// # Errors
    /// Same as [`SessionSettings::from_raw`].
    pub fn build(self) -> Result<SessionSettings, ConfigError> {
        SessionSettings::from_raw(self.raw)
    }
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
