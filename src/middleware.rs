//! Server-side invocation-semantics middleware (§4.8): artificial loss
//! injection and an at-most-once reply cache.
//!
//! Grounded on `router.go`'s closures-as-middleware wrapping of the
//! readable/writable stream interface, generalized here into two small
//! types composed explicitly by the server rather than chained closures.

use crate::frame::Sid;
use bytes::Bytes;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Fixed sleep applied to a dropped write, simulating network loss.
pub const LOSS_PENALTY: Duration = Duration::from_secs(5);

/// Drops a fraction of outgoing writes to exercise retry paths.
pub struct LossInjector {
    loss_rate_percent: u8,
}

impl LossInjector {
    pub fn new(loss_rate_percent: u8) -> Self {
        LossInjector {
            loss_rate_percent: loss_rate_percent.min(100),
        }
    }

    /// `false` means the caller should still send; `true` means the caller
    /// must drop the write and report `Ok(0)` without ever touching the
    /// socket, after sleeping [`LOSS_PENALTY`].
    ///
    /// Only ever called for `lossy` writes — streaming writes (e.g.
    /// `MonitorUpdates`) pass `lossy = false` and never drop.
    pub async fn should_drop(&self, lossy: bool) -> bool {
        if !lossy || self.loss_rate_percent == 0 {
            return false;
        }
        let roll: u8 = rand::rng().random_range(0..100);
        if roll < self.loss_rate_percent {
            debug!(loss_rate = self.loss_rate_percent, "dropping write to simulate loss");
            tokio::time::sleep(LOSS_PENALTY).await;
            true
        } else {
            false
        }
    }
}

/// At-most-once reply cache, keyed by the stream's sid so that a client
/// retry (same sid, new rid) lands on the same entry (§4.8).
#[derive(Default)]
pub struct ReplyCache {
    entries: Mutex<HashMap<Sid, Bytes>>,
}

impl ReplyCache {
    pub fn new() -> Self {
        ReplyCache {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, sid: Sid) -> Option<Bytes> {
        self.entries.lock().unwrap().get(&sid).cloned()
    }

    /// Store the response bytes before the send is attempted, per the
    /// spec's store-then-send ordering — a retry that arrives mid-send
    /// still finds a cached reply to hand back.
    pub fn store(&self, sid: Sid, response: Bytes) {
        self.entries.lock().unwrap().insert(sid, response);
    }

    pub fn remove(&self, sid: Sid) {
        self.entries.lock().unwrap().remove(&sid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_roundtrips_by_sid() {
        let cache = ReplyCache::new();
        let sid = Sid::new();
        assert!(cache.get(sid).is_none());
        cache.store(sid, Bytes::from_static(b"reply"));
        assert_eq!(cache.get(sid).unwrap(), Bytes::from_static(b"reply"));
    }

    #[tokio::test]
    async fn zero_loss_rate_never_drops() {
        let injector = LossInjector::new(0);
        for _ in 0..20 {
            assert!(!injector.should_drop(true).await);
        }
    }

    #[tokio::test]
    async fn non_lossy_writes_never_drop_even_at_full_loss_rate() {
        let injector = LossInjector::new(100);
        assert!(!injector.should_drop(false).await);
    }
}
