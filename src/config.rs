use std::{sync::Arc, time::Duration};

use crate::clock::{SharedClock, SystemClock};

#[derive(Clone, Debug)]
pub struct CacheConfig {
    timer_floor: Duration,
    thread_name: String,
    background: bool,
    clock: SharedClock,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            timer_floor: Duration::from_millis(1),
            thread_name: "sliding-cache-sweep".to_owned(),
            background: true,
            clock: Arc::new(SystemClock),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn get_timer_floor(&self) -> Duration {
        self.timer_floor
    }
    pub fn get_thread_name(&self) -> &str {
        &self.thread_name
    }
    pub fn is_background(&self) -> bool {
        self.background
    }
    pub fn get_clock(&self) -> &SharedClock {
        &self.clock
    }
    /// Shortest wait a sweep will re-arm for. Survivors due sooner than this
    /// are picked up together by the next wake.
    pub fn timer_floor(mut self, floor: Duration) -> Self {
        self.timer_floor = floor;
        self
    }
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
    /// With `false`, no timer thread is spawned and entries are only evicted
    /// by explicit calls to [`crate::Cache::sweep`].
    pub fn background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }
}
