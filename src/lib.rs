//! In-memory cache with two stores: a plain key/value map, and an expiring
//! map whose entries carry a sliding TTL. Expiring entries are evicted by a
//! single timer armed for the soonest deadline across all of them.

mod cache;
mod clock;
mod config;
mod entry;
mod errors;
mod expiring_store;
mod plain_store;
#[cfg(test)]
mod test;
mod timer_loop;

pub use cache::Cache;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::CacheConfig;
pub use entry::{Expiring, ExpiringEntry, OnExpire, TtlState};
pub use errors::CacheError;
pub use plain_store::PlainStore;
pub use timer_loop::{Phase, SweepReport, SweepStats};

pub mod prelude {
    pub use super::{
        Cache, CacheConfig, CacheError, Expiring, ExpiringEntry, OnExpire, PlainStore, TtlState,
    };
}
