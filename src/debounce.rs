//! Trailing-edge debouncing for high-frequency UI intents.
//!
//! The dispatcher forwards every seek it is given. Presentation code feeds
//! slider drags through a `Debouncer` so only the last value of a burst is
//! sent.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

pub const DEFAULT_SEEK_WINDOW: Duration = Duration::from_millis(150);

pub struct Debouncer<T> {
    window: Duration,
    action: Arc<dyn Fn(T) + Send + Sync>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F>(window: Duration, action: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            window,
            action: Arc::new(action),
            pending: Mutex::new(None),
        }
    }

    /// Replace any pending value; `value` fires once the window passes quietly.
    pub fn push(&self, value: T) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                // Nothing to wait on; deliver immediately.
                (*self.action)(value);
                return;
            }
        };

        let action = self.action.clone();
        let window = self.window;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(window).await;
            (*action)(value);
        });

        if let Some(previous) = self.pending.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Drop the pending value, if any.
    pub fn cancel(&self) {
        if let Some(pending) = self.pending.lock().take() {
            pending.abort();
        }
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.get_mut().take() {
            pending.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting() -> (Arc<Mutex<Vec<u64>>>, Debouncer<u64>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let debouncer = Debouncer::new(DEFAULT_SEEK_WINDOW, move |v: u64| sink.lock().push(v));
        (seen, debouncer)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_last_value() {
        let (seen, debouncer) = collecting();

        for position in [1_000, 2_000, 3_000, 4_000] {
            debouncer.push(position);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(seen.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*seen.lock(), vec![4_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn separated_pushes_each_fire() {
        let (seen, debouncer) = collecting();

        debouncer.push(1);
        tokio::time::sleep(Duration::from_millis(200)).await;
        debouncer.push(2);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_pending_value() {
        let (seen, debouncer) = collecting();

        debouncer.push(7);
        debouncer.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(seen.lock().is_empty());
    }

    #[test]
    fn without_runtime_delivers_immediately() {
        let (seen, debouncer) = collecting();
        debouncer.push(9);
        assert_eq!(*seen.lock(), vec![9]);
    }
}
