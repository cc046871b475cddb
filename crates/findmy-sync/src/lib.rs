//! # findmy-sync: Remote-Command Engine for the FindMy Device Agent
//!
//! This crate runs the device side of the FindMy protocol: it registers the
//! device, accepts commands from three channels, executes them against the
//! host platform and reports results back to the server.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        FindMy Agent Architecture                        │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      Agent (Main Orchestrator)                   │  │
//! │  │                                                                  │  │
//! │  │  bootstrap: registration, SIM check, resume tracking, polling   │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Ingress Router │  │ CommandPoller  │  │  LocationScheduler     │    │
//! │  │                │  │                │  │                        │    │
//! │  │ SMS: FINDMY... │  │ GET commands   │  │ Fixed 5 min cadence    │    │
//! │  │ Push: data map │  │ since cursor   │  │ Cached fix, else fresh │    │
//! │  │ Authenticates  │  │ Dedups by id   │  │ with 30 s timeout      │    │
//! │  └───────┬────────┘  └───────┬────────┘  └───────────┬────────────┘    │
//! │          └───────────┬───────┘                       │                 │
//! │                      ▼                               │                 │
//! │  ┌──────────────────────────────────┐                │                 │
//! │  │ CommandExecutor                  │                │                 │
//! │  │ LOCK · ALARM · LOCATE ·          │                │                 │
//! │  │ SHOW_MESSAGE · WIPE              │                │                 │
//! │  └────────────────┬─────────────────┘                │                 │
//! │                   ▼                                  ▼                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  SyncClient: /api/devices/... over HTTPS, bearer auth token     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  SECURITY AUDIT:                                                        │
//! │  • Rejected SMS/push commands are logged on target "findmy::audit"     │
//! │  • Secrets and tokens never reach the logs                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Engine
//! - [`agent`] - Main `Agent` orchestrator
//! - [`config`] - Agent configuration (server URL, cadences, audit)
//! - [`error`] - Sync error types
//! - [`registration`] - Identity creation and server registration
//! - [`ingress`] - SMS, push and poll entry points
//! - [`auth`] - Per-channel command authentication
//! - [`executor`] - Command actions and result reporting
//!
//! ### Background Tasks
//! - [`scheduler`] - Periodic location upload
//! - [`poller`] - Periodic command poll
//! - [`sim`] - Boot-time SIM change detection
//!
//! ### Wire and Platform
//! - [`client`] - HTTP client for the device API
//! - [`protocol`] - Request and response bodies
//! - [`platform`] - Host capability traits
//! - [`location`] - Location acquisition with timeout
//! - [`alarm`] - Alarm playback with a hard ceiling
//! - [`audit`] - Rate-limited security audit log
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use findmy_sync::{Agent, AgentConfig, PlatformServices, SyncClient};
//!
//! let config = AgentConfig::load_or_default(None);
//! let client = SyncClient::new(&config.server.url, config.request_timeout())?;
//!
//! let mut agent = Agent::new(config, state, Arc::new(client), platform);
//! agent.bootstrap().await?;
//!
//! // Hand an incoming SMS to the router
//! let disposition = agent.router().handle_sms(body).await;
//! if disposition.is_consumed() {
//!     // hide it from the inbox
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

// Engine
pub mod agent;
pub mod auth;
pub mod config;
pub mod error;
pub mod executor;
pub mod ingress;
pub mod registration;

// Background tasks
pub mod poller;
pub mod scheduler;
pub mod sim;

// Wire and platform
pub mod alarm;
pub mod audit;
pub mod client;
pub mod location;
pub mod platform;
pub mod protocol;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

// Core types
pub use agent::{Agent, AgentStatus, PlatformServices};
pub use config::AgentConfig;
pub use error::{SyncError, SyncResult};
pub use ingress::{CommandIngressRouter, Disposition, PollReport};
pub use registration::RegistrationManager;

// Wire and platform types
pub use client::{RemoteApi, SyncClient};
pub use location::{FreshLocationRequest, LocationProvider, LocationService};
pub use platform::{
    AlarmPlayer, DeviceAdmin, MessageDisplay, PlatformError, PlatformInfo, PlatformResult,
    SimReader,
};
pub use sim::SimCheck;
