use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use crate::runtime::{self, AsyncHandle};

/// Delays work until a burst of calls has been quiet for `window`.
///
/// Each [`call`](Debouncer::call) replaces the pending one. Cancelling only
/// clears the timer: once the window has elapsed the work runs as its own
/// task and is never aborted by a later call.
pub struct Debouncer {
    window: Duration,
    pending: Mutex<Option<Box<dyn AsyncHandle>>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Schedules `work` after the window, dropping any call still waiting
    pub fn call<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let window = self.window;
        let timer = runtime::spawn_after(window, work);

        if let Ok(mut pending) = self.pending.lock() {
            if let Some(previous) = pending.replace(timer) {
                if !previous.is_finished() {
                    log::trace!("debounce: resetting {:?} timer", window);
                }
                previous.cancel();
            }
        }
    }

    /// Drops the waiting call, if any
    pub fn cancel(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(previous) = pending.take() {
                previous.cancel();
            }
        }
    }

    /// Whether a call is still waiting for its window to elapse
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .ok()
            .and_then(|pending| pending.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("window", &self.window)
            .field("pending", &self.is_pending())
            .finish()
    }
}
