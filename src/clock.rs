use std::{
    fmt::Debug,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

/// Time source used for idle-time computations and keep-alive stamps.
pub trait Clock: Send + Sync + Debug + 'static {
    fn now(&self) -> Instant;
}

pub type SharedClock = Arc<dyn Clock>;

/// Wall clock, backed by [`Instant::now()`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when [`ManualClock::advance`] is called.
///
/// Clones share the same instant, so a test can keep one handle and give
/// another to the cache.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_advanced() {
        let clock = ManualClock::new();
        let shared = clock.clone();
        let start = shared.now();

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(shared.now(), start);

        clock.advance(Duration::from_millis(40));
        assert_eq!(shared.now() - start, Duration::from_millis(40));
    }
}
