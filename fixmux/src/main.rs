/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! `fixmux` operator binary.
//!
//! Loads the session configuration, logs every session on and then serves a
//! line-oriented console on stdin. Ctrl-C logs everything out and exits.
//!
//! Console logging is controlled through `RUST_LOG`; a daily diagnostic file
//! is written under the log directory (see [`fixmux::logging`]).

use anyhow::{Context, bail};
use clap::Parser;
use fixmux::console::{ConsoleCommand, HELP, interruptible_logon};
use fixmux::prelude::*;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

/// Multi-session FIX initiator.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path of the YAML session configuration.
    #[arg(short, long, default_value = "fixmux.yaml")]
    config: PathBuf,

    /// Do not log on at startup; wait for the `logon` command.
    #[arg(long)]
    no_logon: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = fixmux::config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let _log_guard = fixmux::logging::init(&loaded.log_dir).context("initializing logging")?;
    info!(
        config = %cli.config.display(),
        sessions = loaded.sessions.len(),
        "configuration loaded"
    );
    for rejected in &loaded.rejected {
        warn!(session = %rejected.label, error = %rejected.error, "session skipped");
    }
    if loaded.sessions.is_empty() {
        bail!("no valid session in {}", cli.config.display());
    }

    let coordinator = loaded
        .engine_builder()
        .build()
        .context("building the engine")?;
    tokio::spawn(print_events(coordinator.subscribe()));

    if !cli.no_logon {
        let (report, interrupted) =
            interruptible_logon(&coordinator, coordinator.logon_all(), ctrl_c()).await;
        print_logon(&report);
        if interrupted {
            print_operation("logout", &coordinator.shutdown().await);
            return Ok(());
        }
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            () = ctrl_c() => break,
            line = lines.next_line() => line.context("reading stdin")?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<ConsoleCommand>() {
            Ok(ConsoleCommand::Logon) => {
                let (report, interrupted) =
                    interruptible_logon(&coordinator, coordinator.logon_idle(), ctrl_c()).await;
                print_logon(&report);
                if interrupted {
                    break;
                }
            }
            Ok(ConsoleCommand::Resend { begin, end }) => {
                print_operation("resend", &coordinator.resend_all(begin, end).await);
            }
            Ok(ConsoleCommand::Status) => {
                for (session, state) in coordinator.states() {
                    println!("{session}: {state}");
                }
            }
            Ok(ConsoleCommand::Logout) => break,
            Ok(ConsoleCommand::Help) => println!("{HELP}"),
            Err(e) => println!("{e}"),
        }
    }

    print_operation("logout", &coordinator.shutdown().await);
    info!("bye");
    Ok(())
}

/// Resolves on Ctrl-C; never resolves if the signal cannot be listened for.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

fn print_logon(report: &LogonReport) {
    for (session, endpoint) in &report.succeeded {
        println!("{session}: logged on via {endpoint}");
    }
    for (session, error) in &report.failed {
        println!("{session}: logon failed: {error}");
    }
}

fn print_operation(operation: &str, report: &OperationReport) {
    for session in &report.succeeded {
        println!("{session}: {operation} ok");
    }
    for (session, error) in &report.failed {
        println!("{session}: {operation} failed: {error}");
    }
}

async fn print_events(mut events: tokio::sync::broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Execution { session, record }) => println!("{session}: {record}"),
            // already traced by the pipeline
            Ok(SessionEvent::Message { .. }) => {}
            Ok(event) => info!("{event}"),
            Err(RecvError::Lagged(missed)) => warn!(missed, "event printer fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}
