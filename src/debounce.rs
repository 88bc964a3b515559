//! Trailing-edge debouncer.
//!
//! Coalesces a burst of values into the last one, delivered once the input
//! has been quiet for the configured period. Each [`Debouncer::send`]
//! restarts the timer; the pending timer task is aborted on
//! [`Debouncer::cancel`] and on drop, so nothing fires after teardown.
//!
//! Must be used from within a tokio runtime.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Callback invoked with the settled value.
pub type DebounceCallback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Delivers the last value after a quiet period.
pub struct Debouncer<T> {
    delay: Duration,
    callback: DebounceCallback<T>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<T> fmt::Debug for Debouncer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Debouncer<T> {
    /// Create a debouncer that calls `callback` after `delay` of quiet.
    pub fn new(delay: Duration, callback: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            delay,
            callback: Arc::new(callback),
            pending: Mutex::new(None),
        }
    }

    /// Submit a value, replacing any value still waiting.
    pub fn send(&self, value: T) {
        let callback = Arc::clone(&self.callback);
        let delay = self.delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback(value);
        });

        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl<T> Debouncer<T> {
    /// Drop the waiting value, if any.
    pub fn cancel(&self) {
        if let Some(task) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }

    /// Whether a value is waiting for its quiet period to elapse.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}
