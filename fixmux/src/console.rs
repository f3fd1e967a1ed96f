/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Operator console commands.
//!
//! One command per line:
//!
//! | Line | Action |
//! |---|---|
//! | `logon` | log on every session that is not logged on |
//! | `resend <begin> <end>` | ResendRequest on every session (`end = 0` for open-ended) |
//! | `status` | print every session's state |
//! | `logout`, `quit`, `exit` | log out every session and stop |
//! | `help` | list the commands |
//!
//! Logon rounds run through [`interruptible_logon`] so an operator interrupt
//! cancels them instead of waiting out every endpoint timeout.

use fixmux_engine::{Coordinator, LogonReport};
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// A parsed console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Log on every session.
    Logon,
    /// Request a resend of `begin..=end` on every session.
    Resend {
        /// BeginSeqNo.
        begin: u64,
        /// EndSeqNo; zero means open-ended.
        end: u64,
    },
    /// Show session states.
    Status,
    /// Log out and exit.
    Logout,
    /// List commands.
    Help,
}

/// Errors raised while parsing a console line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsoleError {
    /// The line was blank.
    #[error("empty command")]
    Empty,

    /// The first word is not a command.
    #[error("unknown command: {0}")]
    Unknown(String),

    /// The command's arguments are wrong.
    #[error("usage: {0}")]
    Usage(&'static str),
}

const RESEND_USAGE: &str = "resend <begin> <end>";

impl FromStr for ConsoleCommand {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = words.next().ok_or(ConsoleError::Empty)?;
        let parsed = match command.to_ascii_lowercase().as_str() {
            "logon" => Self::Logon,
            "status" => Self::Status,
            "logout" | "quit" | "exit" => Self::Logout,
            "help" | "?" => Self::Help,
            "resend" => {
                let mut number = || {
                    words
                        .next()
                        .and_then(|w| w.parse::<u64>().ok())
                        .ok_or(ConsoleError::Usage(RESEND_USAGE))
                };
                let begin = number()?;
                let end = number()?;
                Self::Resend { begin, end }
            }
            other => return Err(ConsoleError::Unknown(other.to_string())),
        };
        if words.next().is_some() {
            return Err(ConsoleError::Usage(parsed.usage()));
        }
        Ok(parsed)
    }
}

impl ConsoleCommand {
    /// Returns the usage line of the command.
    #[must_use]
    pub const fn usage(&self) -> &'static str {
        match self {
            Self::Logon => "logon",
            Self::Resend { .. } => RESEND_USAGE,
            Self::Status => "status",
            Self::Logout => "logout",
            Self::Help => "help",
        }
    }
}

/// Help text listing every command.
pub const HELP: &str = "commands: logon | resend <begin> <end> | status | logout | quit | help";

/// Runs a logon round that `interrupt` can cut short.
///
/// When `interrupt` resolves first the coordinator's in-flight logons are
/// cancelled and the round is still awaited, so every session has settled
/// (cancelled ones end `Faulted`) when this returns.
///
/// # Returns
/// The round's report and whether it was interrupted.
pub async fn interruptible_logon(
    coordinator: &Coordinator,
    logon: impl Future<Output = LogonReport>,
    interrupt: impl Future<Output = ()>,
) -> (LogonReport, bool) {
    tokio::pin!(logon);
    tokio::select! {
        report = &mut logon => (report, false),
        () = interrupt => {
            warn!("interrupted, cancelling logons");
            coordinator.cancellation().cancel();
            (logon.await, true)
        }
    }
}
