use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::{
    Cache, CacheConfig, CacheError, Clock, Expiring, ExpiringEntry, ManualClock, OnExpire, Phase,
};

type StringCache = Cache<String, Expiring<String>>;

fn wall_clock_cache() -> StringCache {
    Cache::new(CacheConfig::default()).unwrap()
}

fn wait_until(limit: Duration, mut done: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < limit {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    done()
}

#[test]
fn test_plain_round_trip_and_miss() {
    let cache = wall_clock_cache();
    cache.cache("greeting", "hello".to_owned());

    assert_eq!(cache.get("greeting").unwrap(), "hello");
    assert_eq!(cache.count(), 1);
    assert!(matches!(cache.get("farewell"), Err(CacheError::NotFound(_))));

    cache.clear();
    assert!(matches!(cache.get("greeting"), Err(CacheError::NotFound(_))));
}

#[test]
fn test_entry_expires_without_keep_alive() {
    let cache = wall_clock_cache();
    cache.cache_with_ttl("feng", Duration::from_millis(100), "qi yun".to_owned(), None);
    assert_eq!(
        cache.get_expiring("feng").unwrap().value(),
        &"qi yun".to_owned()
    );

    std::thread::sleep(Duration::from_millis(350));

    assert!(matches!(
        cache.get_expiring("feng"),
        Err(CacheError::NotFound(_))
    ));
    assert_eq!(cache.count_expiring(), 0);
    assert_eq!(cache.phase(), Phase::Idle);
}

#[test]
fn test_keep_alive_extends_lifetime() {
    let ttl = Duration::from_millis(400);
    let cache = wall_clock_cache();
    let started = Instant::now();
    let handle = cache.cache_with_ttl("feng", ttl, "qi yun".to_owned(), None);

    std::thread::sleep(ttl / 2);
    handle.keep_alive();

    // 1.25 ttl after insertion, 0.75 ttl after the keep-alive.
    std::thread::sleep((started + ttl * 5 / 4).saturating_duration_since(Instant::now()));
    assert_eq!(cache.count_expiring(), 1);

    std::thread::sleep(Duration::from_millis(400));
    assert_eq!(cache.count_expiring(), 0);
}

#[test]
fn test_reads_renew_ttl() {
    let cache = wall_clock_cache();
    cache.cache_with_ttl("a", Duration::from_millis(300), "a".to_owned(), None);
    assert!(cache.get_expiring("a").is_ok());

    std::thread::sleep(Duration::from_millis(150));
    assert!(cache.get_expiring("a").is_ok());

    std::thread::sleep(Duration::from_millis(150));
    assert!(cache.get_expiring("a").is_ok());

    std::thread::sleep(Duration::from_millis(500));
    assert!(matches!(
        cache.get_expiring("a"),
        Err(CacheError::NotFound(_))
    ));
}

#[test]
fn test_single_wake_for_soonest_deadline() {
    let cache = wall_clock_cache();
    let inserter = cache.clone();
    let x = std::thread::spawn(move || {
        inserter.cache_with_ttl("x", Duration::from_millis(50), "x".to_owned(), None);
    });
    cache.cache_with_ttl("y", Duration::from_millis(500), "y".to_owned(), None);
    x.join().unwrap();

    std::thread::sleep(Duration::from_millis(150));

    assert_eq!(cache.count_expiring(), 1);
    assert_eq!(cache.stats().sweeps, 1);
    assert_eq!(cache.stats().evictions, 1);
    assert_eq!(cache.phase(), Phase::Armed);
    assert!(cache.get_expiring("y").is_ok());
}

#[test]
fn test_callback_fires_once_before_entry_is_gone() {
    let (sender, receiver) = crossbeam_channel::unbounded::<(String, bool)>();
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = wall_clock_cache();

    let observer = cache.clone();
    let counter = calls.clone();
    let on_expire: OnExpire = Box::new(move |key: &str| {
        counter.fetch_add(1, Ordering::SeqCst);
        let still_reachable = observer.get_expiring(key).is_ok();
        sender.send((key.to_owned(), still_reachable)).unwrap();
    });
    cache.cache_with_ttl("session", Duration::from_millis(60), "s".to_owned(), Some(on_expire));

    let (key, still_reachable) = receiver.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(key, "session");
    assert!(still_reachable);

    assert!(wait_until(Duration::from_secs(1), || cache.count_expiring() == 0));
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(receiver.try_recv().is_err());
}

#[test]
fn test_clear_expiring_twice_fires_no_callback() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = wall_clock_cache();
    for key in ["a", "b", "c"] {
        let counter = calls.clone();
        cache.cache_with_ttl(
            key,
            Duration::from_millis(50),
            key.to_owned(),
            Some(Box::new(move |_: &str| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );
    }

    cache.clear_expiring();
    assert!(cache.get_expiring("a").is_err());
    cache.clear_expiring();

    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(cache.phase(), Phase::Idle);
    assert_eq!(cache.next_deadline(), None);
}

#[test]
fn test_concurrent_inserts_all_expire_exactly_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = wall_clock_cache();

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let cache = cache.clone();
            let calls = calls.clone();
            std::thread::spawn(move || {
                for i in 0..50u64 {
                    let key = format!("{}:{}", worker, i);
                    let counter = calls.clone();
                    cache.cache_with_ttl(
                        key.clone(),
                        Duration::from_millis(30 + i),
                        key.clone(),
                        Some(Box::new(move |_: &str| {
                            counter.fetch_add(1, Ordering::SeqCst);
                        })),
                    );
                    let _ = cache.get_expiring(&key);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(wait_until(Duration::from_secs(3), || cache.count_expiring() == 0));
    assert_eq!(calls.load(Ordering::SeqCst), 400);
    assert!(wait_until(Duration::from_secs(1), || cache.stats().evictions == 400));
    assert!(wait_until(Duration::from_secs(1), || cache.phase() == Phase::Idle));
}

/// Entry implementing the capability itself rather than through a TtlState.
struct Lease {
    clock: ManualClock,
    ttl: Duration,
    since: Mutex<Instant>,
    released: AtomicBool,
}

impl Lease {
    fn new(clock: &ManualClock, ttl: Duration) -> Self {
        Self {
            clock: clock.clone(),
            ttl,
            since: Mutex::new(clock.now()),
            released: AtomicBool::new(false),
        }
    }
}

impl ExpiringEntry for Lease {
    fn expiring_since(&self) -> Instant {
        *self.since.lock()
    }
    fn expire_duration(&self) -> Duration {
        self.ttl
    }
    fn keep_alive(&self) {
        *self.since.lock() = self.clock.now();
    }
    fn about_to_expire(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_heterogeneous_entries_share_one_scheduler() {
    let clock = ManualClock::new();
    let cache: Cache<(), dyn ExpiringEntry> = Cache::new(
        CacheConfig::new()
            .background(false)
            .clock(Arc::new(clock.clone())),
    )
    .unwrap();

    let lease = Arc::new(Lease::new(&clock, Duration::from_millis(40)));
    cache.cache_entry("lease", lease.clone());
    let doc_state = cache.new_ttl_state("doc", Duration::from_millis(100), None);
    cache.cache_entry("doc", Arc::new(Expiring::new("draft".to_owned(), doc_state)));
    assert_eq!(cache.count_expiring(), 2);

    clock.advance(Duration::from_millis(40));
    let report = cache.sweep();

    assert_eq!(report.evicted, 1);
    assert_eq!(report.next_wake, Some(Duration::from_millis(60)));
    assert!(lease.released.load(Ordering::SeqCst));
    assert!(cache.get_expiring("lease").is_err());

    clock.advance(Duration::from_millis(60));
    cache.sweep();
    assert_eq!(cache.count_expiring(), 0);
    assert_eq!(cache.phase(), Phase::Idle);
}
