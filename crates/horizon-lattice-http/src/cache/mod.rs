//! Response cache.
//!
//! Successful GET and POST responses can be stored on disk and replayed
//! without touching the network. Entries are keyed by [`CacheKey`] and the
//! cache can be trimmed to a size limit, oldest entries first.

mod key;
mod manager;

pub use key::CacheKey;
pub use manager::{CacheEntry, CacheManager, CacheStats};
