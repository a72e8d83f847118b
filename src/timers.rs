//! Cancellable delays keyed by purpose.
//!
//! Scheduling a key that is already pending replaces the old task. Every
//! schedule gets a generation number so an expiry that raced with a
//! replacement or a cancel can be recognised as stale by whoever receives it.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// End of the optimistic window after a seek
    SeekGrace,
    /// Playback has been stopped long enough to hide the player
    IdleHide,
}

struct Scheduled {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct Timers {
    tasks: Mutex<HashMap<TimerKey, Scheduled>>,
    generation: Mutex<u64>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_elapsed(generation)` after `delay`, replacing any pending task
    /// for `key`. Returns the generation, or `None` outside a tokio runtime.
    pub fn schedule<F>(&self, key: TimerKey, delay: Duration, on_elapsed: F) -> Option<u64>
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                log::warn!("Cannot schedule {:?}: {}", key, e);
                return None;
            }
        };

        let generation = {
            let mut counter = self.generation.lock();
            *counter += 1;
            *counter
        };

        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            on_elapsed(generation);
        });

        if let Some(previous) = self
            .tasks
            .lock()
            .insert(key, Scheduled { generation, handle })
        {
            previous.handle.abort();
        }

        Some(generation)
    }

    /// Whether `generation` is still the live schedule for `key`.
    pub fn is_current(&self, key: TimerKey, generation: u64) -> bool {
        self.tasks
            .lock()
            .get(&key)
            .map_or(false, |scheduled| scheduled.generation == generation)
    }

    /// Mark `key` as done once its expiry has been handled.
    pub fn complete(&self, key: TimerKey, generation: u64) {
        let mut tasks = self.tasks.lock();
        if tasks.get(&key).map_or(false, |s| s.generation == generation) {
            tasks.remove(&key);
        }
    }

    pub fn is_pending(&self, key: TimerKey) -> bool {
        self.tasks
            .lock()
            .get(&key)
            .map_or(false, |scheduled| !scheduled.handle.is_finished())
    }

    pub fn cancel(&self, key: TimerKey) -> bool {
        match self.tasks.lock().remove(&key) {
            Some(scheduled) => {
                scheduled.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for (key, scheduled) in self.tasks.lock().drain() {
            log::debug!("Cancelling scheduled {:?}", key);
            scheduled.handle.abort();
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
