//! # Repository Module
//!
//! SQLite implementations of the storage contracts.
//!
//! ```text
//! DeviceState::put_string(StateKey::DeviceToken, ..)
//!       │
//!       ▼
//! SqliteStateStore::put("device_token", ..)
//!       │  INSERT .. ON CONFLICT(key) DO UPDATE
//!       ▼
//! secure_state table
//! ```
//!
//! ## Available Repositories
//!
//! - [`state::SqliteStateStore`] - `secure_state` key/value table

pub mod state;
