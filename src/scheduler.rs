//! Stoppable periodic-task abstraction (spec §9 redesign guidance), used for
//! cache/session sweeps instead of a bare interval timer scattered across
//! call sites.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

pub struct ScheduledHandle {
    stop_flag: Arc<AtomicBool>,
    join_handle: JoinHandle<()>,
}

impl ScheduledHandle {
    /// Signals the task to stop after its current tick; does not block.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.join_handle.abort();
    }
}

/// Spawns `task` to run every `interval`, stopping once `handle.stop()` is
/// called. `task` runs on the Tokio runtime so it must not block.
pub fn spawn<F>(interval: Duration, mut task: F) -> ScheduledHandle
where
    F: FnMut() + Send + 'static,
{
    let stop_flag = Arc::new(AtomicBool::new(false));
    let flag_for_task = stop_flag.clone();

    let join_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if flag_for_task.load(Ordering::SeqCst) {
                break;
            }
            task();
        }
    });

    ScheduledHandle { stop_flag, join_handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn task_runs_periodically_until_stopped() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_for_task = counter.clone();

        let handle = spawn(Duration::from_millis(5), move || {
            counter_for_task.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.stop();
        let seen = counter.load(Ordering::SeqCst);
        assert!(seen >= 2, "{seen}");

        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_stop = counter.load(Ordering::SeqCst);
        assert_eq!(after_stop, seen);
    }
}
