use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    config::CacheConfig,
    entry::{Expiring, ExpiringEntry, OnExpire, TtlState},
    errors::CacheError,
    plain_store::PlainStore,
    timer_loop::{Phase, SweepReport, SweepStats, Sweeper, TimerLoop},
};

struct Inner<V, E: ExpiringEntry + ?Sized> {
    plain: PlainStore<V>,
    sweeper: Arc<Sweeper<E>>,
    timer: Option<TimerLoop>,
}

/// One cache instance: a plain store without expiration next to an expiring
/// store whose entries are evicted once idle for longer than their TTL.
///
/// Clones share the same instance. The timer thread stops when the last
/// clone is dropped.
pub struct Cache<V, E: ExpiringEntry + ?Sized> {
    inner: Arc<Inner<V, E>>,
}

impl<V, E: ExpiringEntry + ?Sized> Clone for Cache<V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V, E: ExpiringEntry + ?Sized> Cache<V, E> {
    /// Builds an empty cache and, unless disabled in `config`, starts its
    /// timer thread.
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        let sweeper = Arc::new(Sweeper::new(&config));
        let timer = if config.is_background() {
            Some(TimerLoop::run(&config, &sweeper)?)
        } else {
            None
        };
        Ok(Self {
            inner: Arc::new(Inner {
                plain: PlainStore::new(),
                sweeper,
                timer,
            }),
        })
    }

    pub fn cache(&self, key: impl Into<String>, value: V) {
        self.inner.plain.put(key, value);
    }
    pub fn count(&self) -> usize {
        self.inner.plain.count()
    }
    pub fn clear(&self) {
        self.inner.plain.clear();
    }

    /// Registers an entry that carries its own TTL bookkeeping.
    ///
    /// The entry is stamped with [`ExpiringEntry::keep_alive`] first, so
    /// overwriting a key restarts its clock. If its deadline is sooner than
    /// the armed one, the timer is re-armed right away.
    pub fn cache_entry(&self, key: impl Into<String>, entry: Arc<E>) -> Arc<E> {
        entry.keep_alive();
        let deadline = entry
            .expiring_since()
            .checked_add(entry.expire_duration());
        self.inner
            .sweeper
            .store()
            .insert(key.into(), entry.clone());
        match deadline {
            Some(deadline) if self.inner.sweeper.offer(deadline) => self.notify_timer(),
            Some(_) => {}
            None => log::debug!("deadline beyond clock range, entry never expires"),
        }
        entry
    }

    /// Looks up an expiring entry. A hit renews the entry's TTL.
    pub fn get_expiring(&self, key: &str) -> Result<Arc<E>, CacheError> {
        self.inner.sweeper.store().get(key)
    }
    pub fn count_expiring(&self) -> usize {
        self.inner.sweeper.store().len()
    }
    /// Cancels the pending wake, then wipes the expiring store. Callbacks
    /// are not invoked.
    pub fn clear_expiring(&self) {
        self.inner.sweeper.disarm();
        self.notify_timer();
        self.inner.sweeper.store().clear();
        log::debug!("expiring store cleared");
    }

    /// A fresh [`TtlState`] driven by this cache's clock, for pairing with a
    /// payload before [`cache_entry`](Self::cache_entry).
    pub fn new_ttl_state(
        &self,
        key: impl Into<String>,
        ttl: Duration,
        on_expire: Option<OnExpire>,
    ) -> TtlState {
        TtlState::with_clock(self.inner.sweeper.clock().clone(), key, ttl, on_expire)
    }

    /// Runs a scan immediately instead of waiting for the timer.
    ///
    /// Scans are serialized, so an expiry callback must not call this.
    pub fn sweep(&self) -> SweepReport {
        let report = self.inner.sweeper.sweep();
        self.notify_timer();
        report
    }
    pub fn phase(&self) -> Phase {
        self.inner.sweeper.phase()
    }
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner.sweeper.next_deadline()
    }
    pub fn stats(&self) -> SweepStats {
        self.inner.sweeper.stats()
    }

    fn notify_timer(&self) {
        if let Some(timer) = &self.inner.timer {
            timer.rearm();
        }
    }
}

impl<V: Clone, E: ExpiringEntry + ?Sized> Cache<V, E> {
    pub fn get(&self, key: &str) -> Result<V, CacheError> {
        self.inner.plain.get(key)
    }
}

impl<V, T: Send + Sync + 'static> Cache<V, Expiring<T>> {
    /// Caches `value` under `key` with a sliding `ttl`.
    ///
    /// `on_expire`, when given, is called once with the key right before the
    /// entry is evicted. The returned handle can renew the entry with
    /// [`ExpiringEntry::keep_alive`].
    ///
    /// ### Example
    /// ```rust
    /// use std::time::Duration;
    /// use sliding_cache::prelude::*;
    ///
    /// let cache: Cache<String, Expiring<String>> = Cache::new(CacheConfig::default()).unwrap();
    /// let token = cache.cache_with_ttl(
    ///     "token",
    ///     Duration::from_secs(30),
    ///     "abc123".to_owned(),
    ///     Some(Box::new(|key: &str| println!("{key} expired"))),
    /// );
    /// token.keep_alive();
    /// assert_eq!(cache.get_expiring("token").unwrap().as_str(), "abc123");
    /// ```
    pub fn cache_with_ttl(
        &self,
        key: impl Into<String>,
        ttl: Duration,
        value: T,
        on_expire: Option<OnExpire>,
    ) -> Arc<Expiring<T>> {
        let key = key.into();
        let state = self.new_ttl_state(key.clone(), ttl, on_expire);
        self.cache_entry(key, Arc::new(Expiring::new(value, state)))
    }
}
