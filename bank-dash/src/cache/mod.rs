//! Session-stamped caching for bank data.

mod entry;
mod locks;
mod store;

pub use entry::{CacheEntry, Cached};
pub use locks::{KeyedGuard, KeyedLocks};
pub use store::{CacheStats, SessionCache};
