//! # Alarm Controller
//!
//! Guards the single audible-alert resource.
//!
//! Starting always stops whatever is playing first, under the slot mutex,
//! then arms a ceiling timer. Each start bumps a generation counter so a
//! stale timer from an earlier start can never stop a newer alarm.
//!
//! ```text
//! start() ──lock──► stop current ──► play ──► arm ceiling (gen N)
//!                                                   │
//!                              ceiling elapses ─────┘
//!                                   │
//!                                   └─ gen still N? ──► stop
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::platform::{AlarmPlayer, PlatformResult};

#[derive(Default)]
struct AlarmSlot {
    generation: u64,
    active: bool,
    ceiling: Option<JoinHandle<()>>,
}

/// Mutex-guarded alarm with an auto-stop ceiling.
pub struct AlarmController {
    player: Arc<dyn AlarmPlayer>,
    ceiling: Duration,
    slot: Arc<Mutex<AlarmSlot>>,
}

impl AlarmController {
    pub fn new(player: Arc<dyn AlarmPlayer>, ceiling: Duration) -> Self {
        AlarmController {
            player,
            ceiling,
            slot: Arc::new(Mutex::new(AlarmSlot::default())),
        }
    }

    /// Stops any running alarm, starts a new one, and arms the ceiling.
    pub async fn start(&self) -> PlatformResult<()> {
        let mut slot = self.slot.lock().await;
        Self::stop_locked(self.player.as_ref(), &mut slot);

        self.player.start_looping_max_volume()?;
        slot.generation += 1;
        slot.active = true;

        let generation = slot.generation;
        let ceiling = self.ceiling;
        let player = Arc::clone(&self.player);
        let shared = Arc::clone(&self.slot);

        slot.ceiling = Some(tokio::spawn(async move {
            tokio::time::sleep(ceiling).await;

            let mut slot = shared.lock().await;
            if slot.generation == generation && slot.active {
                player.stop();
                slot.active = false;
                slot.ceiling = None;
                info!(ceiling_ms = ceiling.as_millis() as u64, "Alarm auto-stopped");
            }
        }));

        info!(generation, "Alarm started");
        Ok(())
    }

    pub async fn stop(&self) {
        let mut slot = self.slot.lock().await;
        Self::stop_locked(self.player.as_ref(), &mut slot);
    }

    pub async fn is_active(&self) -> bool {
        self.slot.lock().await.active
    }

    fn stop_locked(player: &dyn AlarmPlayer, slot: &mut AlarmSlot) {
        if let Some(timer) = slot.ceiling.take() {
            timer.abort();
        }
        player.stop();
        if slot.active {
            slot.active = false;
            debug!(generation = slot.generation, "Alarm stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingAlarm;
    use std::sync::atomic::Ordering;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn controller() -> (AlarmController, Arc<RecordingAlarm>) {
        let player = Arc::new(RecordingAlarm::default());
        let controller = AlarmController::new(player.clone(), Duration::from_millis(120_000));
        (controller, player)
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_stops_at_exactly_ceiling() {
        let (alarm, player) = controller();

        alarm.start().await.unwrap();
        settle().await;
        assert!(player.playing.load(Ordering::SeqCst));

        tokio::time::advance(Duration::from_millis(119_999)).await;
        settle().await;
        assert!(alarm.is_active().await);
        assert!(player.playing.load(Ordering::SeqCst));

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert!(!alarm.is_active().await);
        assert!(!player.playing.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_stops_first_and_rearms_ceiling() {
        let (alarm, player) = controller();

        alarm.start().await.unwrap();
        settle().await;
        tokio::time::advance(Duration::from_secs(100)).await;
        settle().await;

        alarm.start().await.unwrap();
        settle().await;
        // stop-then-start on each start
        assert_eq!(player.starts.load(Ordering::SeqCst), 2);
        assert_eq!(player.stops.load(Ordering::SeqCst), 2);

        // First ceiling would have fired here
        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert!(alarm.is_active().await);

        tokio::time::advance(Duration::from_secs(90)).await;
        settle().await;
        assert!(!alarm.is_active().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_starts_leave_one_live_alarm() {
        let (alarm, player) = controller();

        let (first, second) = tokio::join!(alarm.start(), alarm.start());
        first.unwrap();
        second.unwrap();
        settle().await;

        // Each start stopped the previous playback under the lock
        assert_eq!(player.starts.load(Ordering::SeqCst), 2);
        assert_eq!(player.stops.load(Ordering::SeqCst), 2);
        assert!(player.playing.load(Ordering::SeqCst));
        assert!(alarm.is_active().await);
        assert_eq!(alarm.slot.lock().await.generation, 2);

        tokio::time::advance(Duration::from_millis(120_000)).await;
        settle().await;
        assert!(!alarm.is_active().await);
        assert_eq!(player.stops.load(Ordering::SeqCst), 3);

        // The aborted first ceiling never fires
        tokio::time::advance(Duration::from_secs(300)).await;
        settle().await;
        assert_eq!(player.stops.load(Ordering::SeqCst), 3);
        assert_eq!(player.starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_manual_stop() {
        let (alarm, player) = controller();
        alarm.start().await.unwrap();
        alarm.stop().await;
        assert!(!alarm.is_active().await);
        assert!(!player.playing.load(Ordering::SeqCst));
    }
}
