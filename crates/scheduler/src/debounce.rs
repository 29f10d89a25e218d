//! Per-source debouncing logic
//!
//! Collapses bursts of edits from one source into a single delayed action.
//! Re-arming a source replaces its timer, so the action runs `delay` after
//! the last call and carries the latest closure.

use ahash::AHashMap;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

struct TimerTable<K> {
    timers: AHashMap<K, Timer>,
    generation: u64,
}

/// At most one pending timer per source
///
/// Cloning shares the timer table. Non-zero delays spawn onto the current
/// tokio runtime.
pub struct DebounceScheduler<K> {
    table: Arc<Mutex<TimerTable<K>>>,
}

impl<K> Clone for DebounceScheduler<K> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<K> Default for DebounceScheduler<K> {
    fn default() -> Self {
        Self {
            table: Arc::new(Mutex::new(TimerTable {
                timers: AHashMap::new(),
                generation: 0,
            })),
        }
    }
}

impl<K> DebounceScheduler<K>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer for `source`
    ///
    /// A zero delay cancels any pending timer and runs `action` before
    /// returning.
    pub fn schedule<F>(&self, source: K, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if delay.is_zero() {
            self.cancel(&source);
            debug!(?source, "debounce bypassed");
            action();
            return;
        }

        let mut table = self.table.lock();
        table.generation += 1;
        let generation = table.generation;

        let shared = Arc::clone(&self.table);
        let key = source.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut table = shared.lock();
                // A timer that expired while being replaced must not fire
                match table.timers.get(&key) {
                    Some(timer) if timer.generation == generation => {
                        table.timers.remove(&key);
                    }
                    _ => return,
                }
            }
            debug!(source = ?key, "debounce fired");
            action();
        });

        if let Some(previous) = table.timers.insert(source.clone(), Timer { generation, handle }) {
            previous.handle.abort();
            debug!(?source, ?delay, "debounce re-armed");
        } else {
            debug!(?source, ?delay, "debounce armed");
        }
    }

    /// Drop the pending timer for `source` without firing it
    pub fn cancel(&self, source: &K) -> bool {
        match self.table.lock().timers.remove(source) {
            Some(timer) => {
                timer.handle.abort();
                debug!(?source, "debounce cancelled");
                true
            }
            None => false,
        }
    }

    /// Drop every pending timer
    pub fn cancel_all(&self) -> usize {
        let mut table = self.table.lock();
        let count = table.timers.len();
        for (_, timer) in table.timers.drain() {
            timer.handle.abort();
        }
        count
    }

    pub fn is_pending(&self, source: &K) -> bool {
        self.table.lock().timers.contains_key(source)
    }

    pub fn pending_count(&self) -> usize {
        self.table.lock().timers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, Instant};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_zero_delay_runs_synchronously() {
        let scheduler = DebounceScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&fired);
        scheduler.schedule("checkbox", Duration::ZERO, move || {
            f.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending(&"checkbox"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_latest_action() {
        let scheduler = DebounceScheduler::new();
        let fired = Arc::new(Mutex::new(Vec::new()));

        for value in 1..=5 {
            let f = Arc::clone(&fired);
            scheduler.schedule("name", ms(300), move || f.lock().push(value));
            sleep(ms(50)).await;
        }
        assert_eq!(scheduler.pending_count(), 1);

        sleep(ms(1000)).await;
        assert_eq!(*fired.lock(), vec![5]);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_fires_delay_after_last_call() {
        let scheduler = DebounceScheduler::new();
        let fired_at = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        let f = Arc::clone(&fired_at);
        scheduler.schedule("bio", ms(300), move || f.lock().push(Instant::now()));
        sleep(ms(100)).await;
        let f = Arc::clone(&fired_at);
        scheduler.schedule("bio", ms(300), move || f.lock().push(Instant::now()));

        sleep(ms(250)).await;
        assert!(fired_at.lock().is_empty(), "must not fire at T+D");

        sleep(ms(1000)).await;
        let fired_at = fired_at.lock();
        assert_eq!(fired_at.len(), 1);
        let elapsed = fired_at[0] - start;
        assert!(elapsed >= ms(400) && elapsed < ms(410), "fired after {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let scheduler = DebounceScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&fired);
        scheduler.schedule(1u32, ms(200), move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.cancel(&1));
        assert!(!scheduler.cancel(&1));

        sleep(ms(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_cancels_pending_timer() {
        let scheduler = DebounceScheduler::new();
        let fired = Arc::new(Mutex::new(Vec::new()));

        let f = Arc::clone(&fired);
        scheduler.schedule("field", ms(300), move || f.lock().push("typed"));
        let f = Arc::clone(&fired);
        scheduler.schedule("field", Duration::ZERO, move || f.lock().push("toggled"));

        sleep(ms(1000)).await;
        assert_eq!(*fired.lock(), vec!["toggled"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sources_are_independent() {
        let scheduler = DebounceScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        for source in ["a", "b", "c"] {
            let f = Arc::clone(&fired);
            scheduler.schedule(source, ms(100), move || {
                f.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(scheduler.pending_count(), 3);
        assert!(scheduler.cancel(&"b"));

        sleep(ms(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let scheduler = DebounceScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        for source in 0..4u8 {
            let f = Arc::clone(&fired);
            scheduler.schedule(source, ms(100), move || {
                f.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(scheduler.cancel_all(), 4);

        sleep(ms(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
