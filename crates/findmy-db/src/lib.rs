//! # findmy-db: Persisted Device State
//!
//! Key/value persistence for the agent's identity, credentials and cursors.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        FindMy State Flow                                │
//! │                                                                         │
//! │  RegistrationManager / Router / SimMonitor (findmy-sync)               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   findmy-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐ │   │
//! │  │   │  DeviceState  │    │ SecureStateStore│   │  Migrations  │ │   │
//! │  │   │  (store.rs)   │───►│   (trait)       │   │  (embedded)  │ │   │
//! │  │   │ typed getters │    ├────────────────┤    │ 001_secure_  │ │   │
//! │  │   │ and setters   │    │ SqliteStateStore│   │ state.sql    │ │   │
//! │  │   └───────────────┘    │ MemoryStateStore│   └──────────────┘ │   │
//! │  │                        └────────────────┘                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   ~/.local/share/findmy-agent/state.db                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`store`] - `SecureStateStore` contract, key names, `DeviceState`
//! - [`repository`] - SQLite implementation of the store
//! - [`memory`] - In-memory implementation of the store
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use findmy_db::{Database, DbConfig, DeviceState};
//!
//! let db = Database::new(DbConfig::new("state.db")).await?;
//! let state = DeviceState::new(db.state_store());
//!
//! if !state.is_registered().await? {
//!     // run registration
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use memory::MemoryStateStore;
pub use pool::{Database, DbConfig};
pub use repository::state::SqliteStateStore;
pub use store::{DeviceState, SecureStateStore, StateKey};
