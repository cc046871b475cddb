//! # Location Acquisition
//!
//! Turns the host's callback-style location API into a single awaitable
//! call with a hard timeout.
//!
//! ## Acquisition
//! ```text
//! current_location()
//!     │
//!     ├── last_known() ── Some(fix) ──► return cached fix
//!     │
//!     ▼
//! request_fresh(high accuracy, 10 s updates, oneshot::Sender)
//!     │
//!     ├── first fix arrives ─────────► return it (a oneshot delivers once)
//!     ├── provider drops the sender ─► LocationUnavailable
//!     └── 30 s elapse ───────────────► receiver dropped (request cancelled)
//!                                      LocationUnavailable("location request timeout")
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use findmy_core::{CoreError, CoreResult, LocationSample};

use crate::platform::PlatformResult;

/// Parameters for a fresh fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshLocationRequest {
    pub update_interval: Duration,
    pub high_accuracy: bool,
}

/// Host location source.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// The most recent cached fix, if any.
    async fn last_known(&self) -> PlatformResult<Option<LocationSample>>;

    /// Starts a fresh request that answers through `reply`.
    ///
    /// The caller drops the receiver on timeout; providers should stop
    /// updates once `reply.is_closed()`.
    fn request_fresh(
        &self,
        request: FreshLocationRequest,
        reply: oneshot::Sender<LocationSample>,
    ) -> PlatformResult<()>;
}

/// Cached-then-fresh location lookup with a timeout.
#[derive(Clone)]
pub struct LocationService {
    provider: Arc<dyn LocationProvider>,
    timeout: Duration,
    update_interval: Duration,
}

impl LocationService {
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        timeout: Duration,
        update_interval: Duration,
    ) -> Self {
        LocationService {
            provider,
            timeout,
            update_interval,
        }
    }

    pub async fn current_location(&self) -> CoreResult<LocationSample> {
        match self.provider.last_known().await {
            Ok(Some(sample)) => {
                debug!(provider = %sample.provider, "Using cached location");
                return Ok(sample);
            }
            Ok(None) => {}
            Err(err) => debug!(error = %err, "Cached location unavailable"),
        }

        let (reply, fix) = oneshot::channel();
        let request = FreshLocationRequest {
            update_interval: self.update_interval,
            high_accuracy: true,
        };
        self.provider
            .request_fresh(request, reply)
            .map_err(|e| CoreError::LocationUnavailable(e.to_string()))?;

        match tokio::time::timeout(self.timeout, fix).await {
            Ok(Ok(sample)) => Ok(sample),
            Ok(Err(_)) => Err(CoreError::LocationUnavailable(
                "location provider ended the request".to_string(),
            )),
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Location request timed out");
                Err(CoreError::LocationUnavailable(
                    "location request timeout".to_string(),
                ))
            }
        }
    }
}
