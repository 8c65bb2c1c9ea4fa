pub use capability::ExpiringEntry;
pub use payload::Expiring;
pub use ttl_state::{OnExpire, TtlState};

mod capability {
    use std::time::{Duration, Instant};

    /// Capability set the sweep relies on to decide when an entry goes away.
    ///
    /// Implement it directly on a cached type, or pair a payload with a
    /// [`TtlState`](super::TtlState) through [`Expiring`](super::Expiring).
    /// The trait is object safe, so a cache can hold `dyn ExpiringEntry`.
    pub trait ExpiringEntry: Send + Sync + 'static {
        /// Last instant the entry was touched (inserted or kept alive).
        fn expiring_since(&self) -> Instant;
        /// How long the entry may stay idle.
        fn expire_duration(&self) -> Duration;
        /// Restart the idle clock.
        fn keep_alive(&self);
        /// Called by the sweep right before the entry is removed.
        fn about_to_expire(&self);

        /// Time left at `now` before the entry is due. Zero once idle time
        /// has reached [`expire_duration`](Self::expire_duration).
        fn remaining(&self, now: Instant) -> Duration {
            let idle = now.saturating_duration_since(self.expiring_since());
            self.expire_duration().saturating_sub(idle)
        }
    }
}

mod ttl_state {
    use std::{
        fmt::{self, Debug},
        sync::Arc,
        time::{Duration, Instant},
    };

    use parking_lot::Mutex;

    use super::ExpiringEntry;
    use crate::clock::{SharedClock, SystemClock};

    /// Callback fired with the entry's key right before it is evicted.
    pub type OnExpire = Box<dyn FnOnce(&str) + Send + 'static>;

    struct TtlInner {
        key: String,
        ttl: Duration,
        since: Instant,
        on_expire: Option<OnExpire>,
    }

    /// Standalone TTL bookkeeping for one cached entry.
    ///
    /// Every field sits behind the entry's own lock, so a keep-alive and a
    /// sweep reading the same entry serialize, while different entries never
    /// contend.
    pub struct TtlState {
        clock: SharedClock,
        inner: Mutex<TtlInner>,
    }

    impl TtlState {
        pub fn new(key: impl Into<String>, ttl: Duration, on_expire: Option<OnExpire>) -> Self {
            Self::with_clock(Arc::new(SystemClock), key, ttl, on_expire)
        }
        pub fn with_clock(
            clock: SharedClock,
            key: impl Into<String>,
            ttl: Duration,
            on_expire: Option<OnExpire>,
        ) -> Self {
            let since = clock.now();
            Self {
                clock,
                inner: Mutex::new(TtlInner {
                    key: key.into(),
                    ttl,
                    since,
                    on_expire,
                }),
            }
        }
        pub fn key(&self) -> String {
            self.inner.lock().key.clone()
        }
    }

    impl ExpiringEntry for TtlState {
        fn expiring_since(&self) -> Instant {
            self.inner.lock().since
        }
        fn expire_duration(&self) -> Duration {
            self.inner.lock().ttl
        }
        fn keep_alive(&self) {
            let now = self.clock.now();
            self.inner.lock().since = now;
        }
        /// The callback is detached under the lock, which is what makes it
        /// fire at most once, and then runs with the lock released.
        fn about_to_expire(&self) {
            let (key, callback) = {
                let mut inner = self.inner.lock();
                match inner.on_expire.take() {
                    Some(callback) => (inner.key.clone(), callback),
                    None => return,
                }
            };
            callback(&key);
        }
        fn remaining(&self, now: Instant) -> Duration {
            let inner = self.inner.lock();
            inner
                .ttl
                .saturating_sub(now.saturating_duration_since(inner.since))
        }
    }

    impl Debug for TtlState {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let inner = self.inner.lock();
            f.debug_struct("TtlState")
                .field("key", &inner.key)
                .field("ttl", &inner.ttl)
                .field("since", &inner.since)
                .field("on_expire", &inner.on_expire.is_some())
                .finish()
        }
    }
}

mod payload {
    use std::{
        ops::Deref,
        time::{Duration, Instant},
    };

    use super::{ExpiringEntry, TtlState};

    /// A cached payload registered together with its [`TtlState`].
    ///
    /// Derefs to the payload; the capability calls go to the TTL state.
    #[derive(Debug)]
    pub struct Expiring<T> {
        value: T,
        ttl: TtlState,
    }

    impl<T> Expiring<T> {
        pub fn new(value: T, ttl: TtlState) -> Self {
            Self { value, ttl }
        }
        pub fn value(&self) -> &T {
            &self.value
        }
        pub fn ttl_state(&self) -> &TtlState {
            &self.ttl
        }
    }

    impl<T> Deref for Expiring<T> {
        type Target = T;
        fn deref(&self) -> &Self::Target {
            &self.value
        }
    }

    impl<T: Send + Sync + 'static> ExpiringEntry for Expiring<T> {
        fn expiring_since(&self) -> Instant {
            self.ttl.expiring_since()
        }
        fn expire_duration(&self) -> Duration {
            self.ttl.expire_duration()
        }
        fn keep_alive(&self) {
            self.ttl.keep_alive()
        }
        fn about_to_expire(&self) {
            self.ttl.about_to_expire()
        }
        fn remaining(&self, now: Instant) -> Duration {
            self.ttl.remaining(now)
        }
    }
}
