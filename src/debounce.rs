//! Trailing-edge debouncing for rapidly repeated UI triggers.
//!
//! A [`Debouncer`] wraps a callback so that a burst of calls collapses into a
//! single invocation, `delay` after the last call, with the last call's
//! arguments. Timers are tokio tasks, so a runtime must be running when
//! [`Debouncer::call`] is used.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

/// Collapses rapid calls into one delayed invocation of `F`.
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
/// use lobby_client::debounce::Debouncer;
///
/// let hits = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&hits);
/// let search = Debouncer::new(
///     move |_query: String| {
///         counter.fetch_add(1, Ordering::SeqCst);
///     },
///     Duration::from_millis(10),
/// );
///
/// search.call("l".into());
/// search.call("lo".into());
/// search.call("lob".into());
/// tokio::time::sleep(Duration::from_millis(50)).await;
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// # }
/// ```
pub struct Debouncer<A> {
    callback: Arc<dyn Fn(A) + Send + Sync>,
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<A: Send + 'static> Debouncer<A> {
    /// Wrap `callback` so that it runs at most once per `delay` window.
    pub fn new(callback: impl Fn(A) + Send + Sync + 'static, delay: Duration) -> Self {
        Self {
            callback: Arc::new(callback),
            delay,
            pending: Mutex::new(None),
        }
    }

    /// The configured delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule the callback with `args`, replacing any pending invocation.
    pub fn call(&self, args: A) {
        let callback = Arc::clone(&self.callback);
        let delay = self.delay;

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.take() {
            trace!("debounce: superseding pending invocation");
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback(args);
        }));
    }

    /// Drop the pending invocation, if any.
    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.take() {
            previous.abort();
        }
    }

    /// Returns `true` while an invocation is scheduled but has not run yet.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl<A> Drop for Debouncer<A> {
    fn drop(&mut self) {
        let pending = self
            .pending
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = pending.take() {
            handle.abort();
        }
    }
}

impl<A> std::fmt::Debug for Debouncer<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}
