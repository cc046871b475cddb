//! # Security Audit Log
//!
//! Records inbound messages dropped by authentication, on the
//! `findmy::audit` tracing target.
//!
//! Events carry the channel and a short reason only. Message bodies and
//! secrets never reach the audit log. A flood of forged SMS is capped at
//! `max_per_minute` events; the rest are counted and summarised when the
//! next window opens.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use findmy_core::SourceChannel;

use crate::config::AuditSettings;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Window {
    started: Instant,
    emitted: u32,
    suppressed: u64,
}

/// Rate-limited audit sink.
#[derive(Debug)]
pub struct SecurityAudit {
    enabled: bool,
    max_per_window: u32,
    window: Mutex<Window>,
}

impl SecurityAudit {
    pub fn new(enabled: bool, max_per_minute: u32) -> Self {
        SecurityAudit {
            enabled,
            max_per_window: max_per_minute,
            window: Mutex::new(Window {
                started: Instant::now(),
                emitted: 0,
                suppressed: 0,
            }),
        }
    }

    pub fn from_settings(settings: &AuditSettings) -> Self {
        Self::new(settings.enabled, settings.max_per_minute)
    }

    pub fn disabled() -> Self {
        Self::new(false, 0)
    }

    /// Records a dropped message. Returns true if an event was emitted.
    pub fn record(&self, channel: SourceChannel, reason: &str) -> bool {
        if !self.enabled {
            return false;
        }

        let mut window = self.lock();
        let now = Instant::now();
        if now.duration_since(window.started) >= WINDOW {
            if window.suppressed > 0 {
                warn!(
                    target: "findmy::audit",
                    suppressed = window.suppressed,
                    "Audit events suppressed in previous window"
                );
            }
            *window = Window {
                started: now,
                emitted: 0,
                suppressed: 0,
            };
        }

        if window.emitted >= self.max_per_window {
            window.suppressed += 1;
            return false;
        }

        window.emitted += 1;
        warn!(
            target: "findmy::audit",
            channel = %channel,
            reason = %reason,
            "Dropped unauthenticated command"
        );
        true
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        match self.window.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
