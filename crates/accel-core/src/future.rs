//! Eventual results of possibly-asynchronous work.
//!
//! A [`Future`] resolves exactly once. Host-memory backends hand out
//! [`Future::instantly_resolved`] values; work enqueued on a
//! [`crate::Processor`] resolves later through its [`Promise`].
//!
//! There is no cancellation. A promise dropped before resolving marks its
//! future abandoned and [`Future::wait`] panics, since the result will never
//! arrive.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

enum State<T> {
    Pending,
    Resolved(T),
    Abandoned,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a value that becomes available later.
pub struct Future<T> {
    shared: Arc<Shared<T>>,
}

/// Write side of a pending [`Future`].
pub struct Promise<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> Future<T> {
    /// A future that is already resolved with `value`.
    pub fn instantly_resolved(value: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Resolved(value)),
                ready: Condvar::new(),
            }),
        }
    }

    /// A pending future and the promise that resolves it.
    pub fn pending() -> (Promise<T>, Self) {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::Pending),
            ready: Condvar::new(),
        });
        (Promise { shared: Some(shared.clone()) }, Self { shared })
    }

    /// Whether the value is available without blocking.
    pub fn is_resolved(&self) -> bool {
        matches!(*self.shared.lock(), State::Resolved(_))
    }

    /// Blocks until resolved and returns the value.
    ///
    /// # Panics
    ///
    /// If the promise was dropped without resolving.
    pub fn wait(self) -> T {
        let mut state = self.shared.lock();
        loop {
            match std::mem::replace(&mut *state, State::Pending) {
                State::Resolved(value) => return value,
                State::Abandoned => panic!("future abandoned: its work never completed"),
                State::Pending => {
                    state = self
                        .shared
                        .ready
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }
}

impl<T> std::fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Future")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl<T> Promise<T> {
    /// Resolves the paired future and wakes any waiter.
    pub fn resolve(mut self, value: T) {
        if let Some(shared) = self.shared.take() {
            *shared.lock() = State::Resolved(value);
            shared.ready.notify_all();
        }
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            let mut state = shared.lock();
            if matches!(*state, State::Pending) {
                *state = State::Abandoned;
            }
            drop(state);
            shared.ready.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_instantly_resolved() {
        let fut = Future::instantly_resolved(7u32);
        assert!(fut.is_resolved());
        assert_eq!(fut.wait(), 7);
    }

    #[test]
    fn test_pending_then_resolved() {
        let (promise, fut) = Future::pending();
        assert!(!fut.is_resolved());
        promise.resolve(vec![1u8, 2, 3]);
        assert!(fut.is_resolved());
        assert_eq!(fut.wait(), vec![1, 2, 3]);
    }

    #[test]
    fn test_resolved_from_other_thread() {
        let (promise, fut) = Future::<&'static str>::pending();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            promise.resolve("done");
        });
        assert_eq!(fut.wait(), "done");
        handle.join().unwrap();
    }

    #[test]
    #[should_panic(expected = "abandoned")]
    fn test_dropped_promise_abandons() {
        let (promise, fut) = Future::<()>::pending();
        drop(promise);
        fut.wait();
    }
}
