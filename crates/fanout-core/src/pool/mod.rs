//! Thread-safe reservation of interchangeable credentials with rate-limit tracking.
//!
//! Every credential is in exactly one state:
//! - `Available`: can be handed out;
//! - `Reserved`: held by exactly one caller until [`CredentialPool::release`];
//! - `RateLimited { until }`: excluded until `until`, then reclaimed lazily by the next
//!   [`CredentialPool::acquire`] that looks at it.
//!
//! All transitions go through one mutex that is only held for O(n) bookkeeping, never
//! across an await point. Waiters park on a [`Notify`] and also wake on a short tick so a
//! backoff window can elapse without any explicit wake event.
mod credential;
pub use credential::Credential;

use std::{
    collections::HashSet,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use fanout_model::PoolStats;
use tokio::{sync::Notify, time::Instant};
use tracing::{debug, trace, warn};

use crate::error::PoolError;
use credential::{CredentialState, Slot};

/// Re-evaluation period for waiters with no wake event pending.
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

pub struct CredentialPool {
    inner: Mutex<PoolInner>,
    notify: Notify,
    tick: Duration,
}

struct PoolInner {
    slots: Vec<Slot>,
    /// Rotates the scan start so load spreads across credentials.
    cursor: usize,
}

impl CredentialPool {
    /// Build a pool from a fixed list of keys.
    ///
    /// An empty list is allowed; such a pool refuses every `acquire` immediately.
    pub fn new<I, S>(keys: I) -> Result<Self, PoolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut slots = Vec::new();
        for (pos, key) in keys.into_iter().enumerate() {
            let key = key.as_ref();
            if key.is_empty() {
                return Err(PoolError::EmptyKey(pos));
            }
            if !seen.insert(key.to_string()) {
                return Err(PoolError::DuplicateKey(pos));
            }
            slots.push(Slot {
                credential: Credential::new(key),
                state: CredentialState::Available,
            });
        }
        debug!(total = slots.len(), "credential pool created");

        Ok(Self {
            inner: Mutex::new(PoolInner { slots, cursor: 0 }),
            notify: Notify::new(),
            tick: DEFAULT_TICK,
        })
    }

    /// Override the re-evaluation tick used by waiting acquirers.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve a credential, waiting up to `timeout` for one to become free.
    ///
    /// Returns `None` on timeout, and immediately for an empty pool.
    pub async fn acquire(&self, timeout: Duration) -> Option<Credential> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before inspecting state so a release between the check
            // and the await is not lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let now = Instant::now();
            let next_expiry = {
                let mut inner = self.lock();
                if inner.slots.is_empty() {
                    warn!("acquire on an empty credential pool");
                    return None;
                }
                if let Some(credential) = inner.reserve(now) {
                    trace!(credential = %credential, "credential reserved");
                    return Some(credential);
                }
                if now >= deadline {
                    let stats = inner.stats(now);
                    warn!(
                        timeout_ms = timeout.as_millis() as u64,
                        reserved = stats.reserved,
                        rate_limited = stats.rate_limited,
                        "no credential became available before timeout"
                    );
                    return None;
                }
                inner.next_expiry()
            };

            let mut wake_at = deadline.min(now + self.tick);
            if let Some(expiry) = next_expiry {
                wake_at = wake_at.min(expiry);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    /// Return a reserved credential to the pool.
    ///
    /// Releasing a credential that was marked rate-limited leaves it benched. Releasing an
    /// already-available or unknown credential only logs a warning.
    pub fn release(&self, credential: &Credential) {
        let mut inner = self.lock();
        let Some(slot) = inner.slot_mut(credential) else {
            warn!(credential = %credential, "release of a credential this pool does not own");
            return;
        };

        match slot.state {
            CredentialState::Reserved => {
                slot.state = CredentialState::Available;
                drop(inner);
                trace!(credential = %credential, "credential released");
                self.notify.notify_waiters();
            }
            CredentialState::RateLimited { .. } => {
                debug!(credential = %credential, "released credential stays rate-limited");
            }
            CredentialState::Available => {
                warn!(credential = %credential, "double release ignored");
            }
        }
    }

    /// Bench a held credential for `backoff`, skipping the `Available` state.
    ///
    /// Limits are per credential; other credentials are untouched.
    pub fn mark_rate_limited(&self, credential: &Credential, backoff: Duration) {
        let until = Instant::now() + backoff;
        let mut inner = self.lock();
        let Some(slot) = inner.slot_mut(credential) else {
            warn!(credential = %credential, "rate limit reported for a credential this pool does not own");
            return;
        };

        match slot.state {
            CredentialState::Reserved => {
                slot.state = CredentialState::RateLimited { until };
            }
            CredentialState::RateLimited { until: current } => {
                warn!(credential = %credential, "rate limit reported for a credential that is not reserved");
                slot.state = CredentialState::RateLimited {
                    until: current.max(until),
                };
            }
            CredentialState::Available => {
                warn!(credential = %credential, "rate limit reported for a credential that is not reserved");
                slot.state = CredentialState::RateLimited { until };
            }
        }
        drop(inner);

        debug!(
            credential = %credential,
            backoff_ms = backoff.as_millis() as u64,
            "credential rate-limited"
        );
        // Waiters recompute their next wake-up against the new deadline.
        self.notify.notify_waiters();
    }

    pub fn stats(&self) -> PoolStats {
        self.lock().stats(Instant::now())
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PoolInner {
    fn reserve(&mut self, now: Instant) -> Option<Credential> {
        let n = self.slots.len();
        for offset in 0..n {
            let idx = (self.cursor + offset) % n;
            let slot = &mut self.slots[idx];
            if slot.state.is_free_at(now) {
                if matches!(slot.state, CredentialState::RateLimited { .. }) {
                    trace!(credential = %slot.credential, "rate limit elapsed; reclaimed");
                }
                slot.state = CredentialState::Reserved;
                self.cursor = (idx + 1) % n;
                return Some(slot.credential.clone());
            }
        }
        None
    }

    fn next_expiry(&self) -> Option<Instant> {
        self.slots
            .iter()
            .filter_map(|s| match s.state {
                CredentialState::RateLimited { until } => Some(until),
                _ => None,
            })
            .min()
    }

    fn slot_mut(&mut self, credential: &Credential) -> Option<&mut Slot> {
        self.slots
            .iter_mut()
            .find(|s| s.credential == *credential)
    }

    fn stats(&self, now: Instant) -> PoolStats {
        let mut stats = PoolStats {
            total: self.slots.len(),
            ..Default::default()
        };
        for slot in &self.slots {
            match slot.state {
                CredentialState::Reserved => stats.reserved += 1,
                state if state.is_free_at(now) => stats.available += 1,
                _ => stats.rate_limited += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn pool(keys: &[&str]) -> CredentialPool {
        CredentialPool::new(keys.iter().copied()).unwrap()
    }

    #[test]
    fn rejects_duplicate_and_empty_keys() {
        assert_eq!(
            CredentialPool::new(["a", "b", "a"]).err(),
            Some(PoolError::DuplicateKey(2))
        );
        assert_eq!(
            CredentialPool::new(["a", ""]).err(),
            Some(PoolError::EmptyKey(1))
        );
    }

    #[tokio::test]
    async fn empty_pool_fails_fast() {
        let pool = CredentialPool::new(Vec::<String>::new()).unwrap();
        let started = std::time::Instant::now();
        assert!(pool.acquire(Duration::from_secs(30)).await.is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn acquire_reserves_and_release_frees() {
        let pool = pool(&["k1"]);
        let c = pool.acquire(Duration::from_millis(10)).await.unwrap();
        assert_eq!(
            pool.stats(),
            PoolStats {
                total: 1,
                available: 0,
                reserved: 1,
                rate_limited: 0
            }
        );
        assert!(pool.acquire(Duration::from_millis(20)).await.is_none());

        pool.release(&c);
        let again = pool.acquire(Duration::from_millis(10)).await.unwrap();
        assert_eq!(again, c);
    }

    #[tokio::test]
    async fn rotates_across_credentials() {
        let pool = pool(&["k1", "k2"]);
        let a = pool.acquire(Duration::ZERO).await.unwrap();
        pool.release(&a);
        let b = pool.acquire(Duration::ZERO).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn double_release_does_not_corrupt_state() {
        let pool = pool(&["k1", "k2"]);
        let a = pool.acquire(Duration::ZERO).await.unwrap();
        pool.release(&a);
        pool.release(&a);
        let stats = pool.stats();
        assert_eq!(stats.available, 2);
        assert_eq!(stats.reserved, 0);

        let foreign = Credential::new("not-mine");
        pool.release(&foreign);
        assert_eq!(pool.stats().total, 2);
    }

    #[tokio::test]
    async fn waiter_wakes_on_release() {
        let pool = Arc::new(pool(&["k1"]).with_tick(Duration::from_secs(60)));
        let held = pool.acquire(Duration::ZERO).await.unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let started = std::time::Instant::now();
        pool.release(&held);

        let got = waiter.await.unwrap();
        assert_eq!(got, Some(held));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_credential_returns_only_after_backoff() {
        let pool = pool(&["k1"]);
        let c = pool.acquire(Duration::ZERO).await.unwrap();
        pool.mark_rate_limited(&c, Duration::from_millis(100));
        // Releasing after a rate limit must not shortcut the backoff.
        pool.release(&c);

        let stats = pool.stats();
        assert_eq!(stats.rate_limited, 1);
        assert_eq!(stats.available, 0);

        assert!(pool.acquire(Duration::from_millis(50)).await.is_none());

        let started = Instant::now();
        let again = pool.acquire(Duration::from_secs(1)).await.unwrap();
        assert_eq!(again, c);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_rate_limit_counts_as_available() {
        let pool = pool(&["k1"]);
        let c = pool.acquire(Duration::ZERO).await.unwrap();
        pool.mark_rate_limited(&c, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(11)).await;

        assert_eq!(pool.stats().available, 1);
        assert!(pool.acquire(Duration::ZERO).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn later_rate_limit_deadline_wins() {
        let pool = pool(&["k1"]);
        let c = pool.acquire(Duration::ZERO).await.unwrap();
        pool.mark_rate_limited(&c, Duration::from_millis(200));
        pool.mark_rate_limited(&c, Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(pool.acquire(Duration::ZERO).await.is_none());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(pool.acquire(Duration::ZERO).await.is_some());
    }
}
