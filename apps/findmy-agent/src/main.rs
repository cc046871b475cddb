//! # FindMy Agent
//!
//! Headless daemon running the FindMy remote-command protocol.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  agent.toml ──► AgentConfig ──► Database (state.db) ──► DeviceState    │
//! │                                                              │          │
//! │  server URL: persisted value, else config seed               │          │
//! │        │                                                     ▼          │
//! │        └──────────► SyncClient ─────────────────────────► Agent        │
//! │                                                              │          │
//! │  stdin lines ──► console::parse_line ──► router / agent ◄────┘          │
//! │  Ctrl+C / SIGTERM ──► Agent::shutdown                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Environment
//! - `FINDMY_CONFIG` - config file path (first CLI argument wins)
//! - `RUST_LOG` - log filter, default `info,findmy=debug,sqlx=warn`

mod console;
mod platform;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use findmy_core::Command;
use findmy_db::{Database, DbConfig, DeviceState};
use findmy_sync::{Agent, AgentConfig, Disposition, SyncClient};

use crate::console::{parse_line, secret_line, ConsoleCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("FINDMY_CONFIG").ok())
        .map(PathBuf::from);
    let config = AgentConfig::load(config_path).context("loading agent config")?;

    let db = Database::new(DbConfig::new(config.database_path()))
        .await
        .context("opening state database")?;
    let state = DeviceState::new(db.state_store());

    let server_url = state.server_url_or_seed(&config.server.url).await?;
    let client = SyncClient::new(&server_url, config.request_timeout())?;
    info!(server = %client.base_url(), "Using FindMy server");

    let platform = platform::headless_services(&config);
    let mut agent = Agent::new(config, state, Arc::new(client), platform);
    let identity = agent.bootstrap().await.context("starting agent")?;
    info!(device_id = %identity.id, "Agent running; type `status` for details");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&mut agent, &line).await,
                // stdin closed: keep serving background loops until a signal
                Ok(None) => {
                    (&mut shutdown).await;
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "Console read failed");
                    (&mut shutdown).await;
                    break;
                }
            },
            _ = &mut shutdown => break,
        }
    }

    agent.shutdown().await?;
    db.close().await;
    info!("Agent shutdown complete");
    Ok(())
}

async fn handle_line(agent: &mut Agent, line: &str) {
    match parse_line(line) {
        ConsoleCommand::Empty => {}
        ConsoleCommand::Sms(body) => {
            let disposition = agent.router().handle_sms(&body).await;
            print_disposition(disposition).await;
        }
        ConsoleCommand::Push(data) => {
            let disposition = agent.router().handle_push(data).await;
            print_disposition(disposition).await;
        }
        ConsoleCommand::Poll => match agent.router().poll_once().await {
            Ok(report) => {
                println!("fetched {} command(s), cursor {}", report.fetched, report.since_id);
                for command in &report.executed {
                    print_command(command);
                }
            }
            Err(err) => println!("poll failed: {err}"),
        },
        ConsoleCommand::Track(enabled) => {
            let result = if enabled {
                agent.start_tracking().await
            } else {
                agent.stop_tracking().await
            };
            match result {
                Ok(()) => println!("tracking {}", if enabled { "on" } else { "off" }),
                Err(err) => println!("tracking change failed: {err}"),
            }
        }
        ConsoleCommand::Status { reveal } => print_status(agent, reveal).await,
        ConsoleCommand::Invalid(reason) => println!("{reason}"),
    }
}

async fn print_disposition(disposition: Disposition) {
    if !disposition.is_consumed() {
        println!("ignored");
        return;
    }
    match disposition.join().await {
        Some(command) => print_command(&command),
        None => println!("command task aborted"),
    }
}

fn print_command(command: &Command) {
    println!(
        "{} #{} {:?}: {}",
        command.command_type.as_str(),
        command.id.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
        command.status(),
        command.report_message()
    );
}

/// Prints to the console only; the SMS secret never goes through tracing.
async fn print_status(agent: &Agent, reveal: bool) {
    let status = agent.status().await;
    println!("registered: {}", status.registered);
    println!("device id:  {}", status.device_id.as_deref().unwrap_or("-"));
    println!("tracking:   {}", status.tracking);
    println!("polling:    {}", status.polling);
    if let Some(check) = &status.last_sim_check {
        println!("sim check:  {check:?}");
    }
    if status.default_fake_shutdown_password {
        println!("warning:    fake-shutdown password is the factory default");
    }
    if let Ok(secret) = agent.registration().sms_secret().await {
        println!("{}", secret_line(&secret, reveal));
    }
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=findmy::audit=warn` - Only the security audit trail
/// - Default: INFO, DEBUG for findmy crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,findmy=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping agent...");
}
