//! Bounded cache of fetch results.
//!
//! Every layer's fetches land in one [`FetchCache`], partitioned by layer
//! and keyed by the exact request (extent, CRS, output size). The cache is
//! bounded by the estimated heap footprint of its payloads rather than by
//! entry count: a single raster tile can outweigh thousands of points.
//!
//! ```text
//!  render ─► FetchCache::get(key) ─hit─► Arc<Payload>
//!                    │
//!                   miss ─► DataSource::fetch ─► FetchCache::insert ─► evict LRU
//! ```
//!
//! Eviction under memory pressure is the only place fetched content is
//! dropped without an explicit invalidation.

mod key;
mod memory;
mod stats;

pub use key::FetchKey;
pub use memory::FetchCache;
pub use stats::CacheStats;
