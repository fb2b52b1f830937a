//! A "do-once" closing latch: set at most once, carries a payload, and lets
//! any number of tasks await it without missing a wakeup.
//!
//! This is the building block behind every latch channel described in the
//! spec (`chDie`, `chSocketReadError`, `chSocketWriteError`, `chProtoError`
//! at the session level; the fin-latch and die-latch at the stream level).
//! The teacher's `sync::Once`-guarded latches in `session.go` are the model
//! — reimplemented to make `set` actually idempotent (Open Question #2).

use std::sync::Mutex;
use tokio::sync::Notify;

pub struct Latch<T: Clone> {
    value: Mutex<Option<T>>,
    notify: Notify,
}

impl<T: Clone> Latch<T> {
    pub fn new() -> Self {
        Latch {
            value: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Set the latch's value if not already set. Returns `true` if this call
    /// won the race and actually set it (the caller that gets `true` back is
    /// responsible for any one-time teardown work).
    pub fn set(&self, v: T) -> bool {
        let mut guard = self.value.lock().unwrap();
        if guard.is_some() {
            return false;
        }
        *guard = Some(v);
        drop(guard);
        self.notify.notify_waiters();
        true
    }

    pub fn get(&self) -> Option<T> {
        self.value.lock().unwrap().clone()
    }

    pub fn is_set(&self) -> bool {
        self.value.lock().unwrap().is_some()
    }

    /// Resolve once the latch has been set, returning its value. Safe to
    /// call concurrently from many tasks, and safe to call after the latch
    /// was already set before this call started waiting.
    pub async fn wait(&self) -> T {
        loop {
            if let Some(v) = self.get() {
                return v;
            }
            let notified = self.notify.notified();
            if let Some(v) = self.get() {
                return v;
            }
            notified.await;
        }
    }
}

impl<T: Clone> Default for Latch<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn set_then_wait_resolves_immediately() {
        let latch: Latch<u32> = Latch::new();
        assert!(latch.set(42));
        assert_eq!(latch.wait().await, 42);
    }

    #[tokio::test]
    async fn wait_then_set_wakes_waiter() {
        let latch: Arc<Latch<u32>> = Arc::new(Latch::new());
        let waiter = {
            let latch = latch.clone();
            tokio::spawn(async move { latch.wait().await })
        };
        tokio::task::yield_now().await;
        latch.set(7);
        assert_eq!(waiter.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn second_set_loses_the_race() {
        let latch: Latch<u32> = Latch::new();
        assert!(latch.set(1));
        assert!(!latch.set(2));
        assert_eq!(latch.wait().await, 1);
    }
}
