use std::{
    fmt::{self, Display},
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crossbeam_channel::{RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::{
    clock::SharedClock, config::CacheConfig, entry::ExpiringEntry, errors::CacheError,
    expiring_store::ExpiringStore,
};

/// Where the sweep scheduler currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No wake is scheduled.
    Idle,
    /// One wake is scheduled for [`crate::Cache::next_deadline`].
    Armed,
    /// A scan is walking the entries.
    Scanning,
}

impl Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Armed => write!(f, "armed"),
            Self::Scanning => write!(f, "scanning"),
        }
    }
}

/// Outcome of a single scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: usize,
    pub survivors: usize,
    /// Wait until the next wake, `None` when the scan left the scheduler idle.
    pub next_wake: Option<Duration>,
}

/// Totals since the cache was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub sweeps: u64,
    pub evictions: u64,
}

struct Timing {
    phase: Phase,
    deadline: Option<Instant>,
    /// Bumped on every clear, so a scan that straddles a clear does not
    /// re-arm for entries that were wiped.
    epoch: u64,
}

pub(crate) enum Signal {
    Rearm,
    Shutdown,
}

/// Owns the expiring entries and the single wake deadline covering all of
/// them.
pub(crate) struct Sweeper<E: ExpiringEntry + ?Sized> {
    store: ExpiringStore<E>,
    clock: SharedClock,
    timer_floor: Duration,
    timing: Mutex<Timing>,
    scan: Mutex<()>,
    sweeps: AtomicU64,
    evictions: AtomicU64,
}

impl<E: ExpiringEntry + ?Sized> Sweeper<E> {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            store: ExpiringStore::new(),
            clock: config.get_clock().clone(),
            timer_floor: config.get_timer_floor(),
            timing: Mutex::new(Timing {
                phase: Phase::Idle,
                deadline: None,
                epoch: 0,
            }),
            scan: Mutex::new(()),
            sweeps: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }
    pub fn store(&self) -> &ExpiringStore<E> {
        &self.store
    }
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }
    pub fn phase(&self) -> Phase {
        self.timing.lock().phase
    }
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timing.lock().deadline
    }
    pub fn stats(&self) -> SweepStats {
        SweepStats {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Tracks `deadline` if it is sooner than the one already armed.
    /// Returns `true` when the timer has to re-evaluate its wait.
    pub fn offer(&self, deadline: Instant) -> bool {
        let mut timing = self.timing.lock();
        if matches!(timing.deadline, Some(current) if current <= deadline) {
            return false;
        }
        timing.deadline = Some(deadline);
        if timing.phase == Phase::Idle {
            timing.phase = Phase::Armed;
        }
        log::debug!("sweep armed for {:?}", deadline);
        true
    }

    /// Drops the pending wake and invalidates any scan in flight.
    pub fn disarm(&self) {
        let mut timing = self.timing.lock();
        timing.deadline = None;
        timing.phase = Phase::Idle;
        timing.epoch = timing.epoch.wrapping_add(1);
    }

    /// Time left before the armed wake, `None` when idle or while a scan
    /// owns the deadline.
    fn pending_wait(&self) -> Option<Duration> {
        let timing = self.timing.lock();
        match (timing.phase, timing.deadline) {
            (Phase::Armed, Some(deadline)) => {
                Some(deadline.saturating_duration_since(self.clock.now()))
            }
            _ => None,
        }
    }

    /// Runs one scan: evicts every entry whose idle time has reached its TTL
    /// and re-arms for the soonest survivor.
    pub fn sweep(&self) -> SweepReport {
        let _scan = self.scan.lock();
        let epoch = {
            let mut timing = self.timing.lock();
            timing.phase = Phase::Scanning;
            timing.deadline = None;
            timing.epoch
        };

        let now = self.clock.now();
        let mut evicted = 0;
        let mut survivors = 0;
        let mut soonest: Option<Duration> = None;
        for (key, entry) in self.store.snapshot() {
            let remaining = entry.remaining(now);
            if remaining.is_zero() {
                if self.timing.lock().epoch != epoch {
                    // Cleared under our feet; the snapshot is stale.
                    break;
                }
                if self.expire(&key, &entry) {
                    evicted += 1;
                }
            } else {
                survivors += 1;
                soonest = Some(soonest.map_or(remaining, |s| s.min(remaining)));
            }
        }

        let (next_wake, phase) = {
            let mut timing = self.timing.lock();
            if timing.epoch == epoch {
                // A deadline past the clock's range is never armed.
                if let Some(deadline) =
                    soonest.and_then(|remaining| now.checked_add(remaining.max(self.timer_floor)))
                {
                    timing.deadline =
                        Some(timing.deadline.map_or(deadline, |d| d.min(deadline)));
                }
            }
            timing.phase = match timing.deadline {
                Some(_) => Phase::Armed,
                None => Phase::Idle,
            };
            let next_wake = timing
                .deadline
                .map(|deadline| deadline.saturating_duration_since(now));
            (next_wake, timing.phase)
        };

        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        log::debug!(
            "sweep done: evicted [{}] survivors [{}] next wake [{:?}], now {}",
            evicted,
            survivors,
            next_wake,
            phase
        );
        SweepReport {
            evicted,
            survivors,
            next_wake,
        }
    }

    /// The eviction is decided before the callback runs: the key is removed
    /// even if the callback panics. Returns `false` when the key was already
    /// gone or replaced.
    fn expire(&self, key: &str, entry: &Arc<E>) -> bool {
        if panic::catch_unwind(AssertUnwindSafe(|| entry.about_to_expire())).is_err() {
            log::error!("expiry callback for [{}] panicked, evicting anyway", key);
        }
        let removed = self.store.remove_entry(key, entry);
        if removed {
            log::trace!("evicted [{}]", key);
        }
        removed
    }
}

/// Handle on the thread that waits for the armed deadline.
pub(crate) struct TimerLoop {
    signal: Sender<Signal>,
    thread: Option<JoinHandle<()>>,
}

impl TimerLoop {
    /// Spawns the timer thread. It parks on the signal channel for exactly
    /// the armed wait (or indefinitely while idle) and runs a sweep once the
    /// deadline is reached.
    pub fn run<E: ExpiringEntry + ?Sized>(
        config: &CacheConfig,
        sweeper: &Arc<Sweeper<E>>,
    ) -> Result<Self, CacheError> {
        let (signal, signals) = crossbeam_channel::bounded::<Signal>(1);
        let sweeper = sweeper.clone();
        let name = config.get_thread_name().to_owned();

        let thread = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                log::info!("timer thread [{}] started", name);
                loop {
                    let received = match sweeper.pending_wait() {
                        Some(wait) if wait.is_zero() => {
                            sweeper.sweep();
                            continue;
                        }
                        Some(wait) => signals.recv_timeout(wait),
                        None => signals.recv().map_err(|_| RecvTimeoutError::Disconnected),
                    };
                    match received {
                        Ok(Signal::Rearm) | Err(RecvTimeoutError::Timeout) => {}
                        Ok(Signal::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::info!("timer thread [{}] stopped", name);
            })?;

        Ok(Self {
            signal,
            thread: Some(thread),
        })
    }

    /// Wake requests merge: one pending signal is enough for the thread to
    /// re-read the deadline.
    pub fn rearm(&self) {
        let _ = self.signal.try_send(Signal::Rearm);
    }
}

impl Drop for TimerLoop {
    fn drop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        // The last handle can be released by a callback running on the timer
        // thread itself. It cannot drain the channel then, so don't block:
        // dropping the sender disconnects it and ends the loop anyway.
        if thread.thread().id() == std::thread::current().id() {
            let _ = self.signal.try_send(Signal::Shutdown);
            return;
        }
        let _ = self.signal.send(Signal::Shutdown);
        let _ = thread.join();
    }
}
