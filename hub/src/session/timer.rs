//! Duration timer for the active session

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// One firing of the session timer
///
/// The generation identifies which timer fired, so ticks already queued by
/// a stopped timer can be recognised and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTick {
    pub generation: u64,
}

/// Shortest period a timer will tick at
pub const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

/// Periodic tick source; stops when dropped
#[derive(Debug)]
pub struct SessionTimer {
    generation: u64,
    task: JoinHandle<()>,
}

impl SessionTimer {
    /// Start ticking every `period`, first tick one period from now
    ///
    /// Periods below [`MIN_TICK_PERIOD`] are raised to it.
    pub fn start(generation: u64, period: Duration, ticks: mpsc::Sender<SessionTick>) -> Self {
        let period = period.max(MIN_TICK_PERIOD);
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if ticks.send(SessionTick { generation }).await.is_err() {
                    break;
                }
            }
        });

        Self { generation, task }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
