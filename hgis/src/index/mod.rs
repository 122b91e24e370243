//! Per-layer spatial index.
//!
//! Answers "which features intersect this box" in `O(log n + k)` using an
//! R-tree over feature envelopes. The index is shared read-mostly between
//! render workers: queries take a shared lock, edits an exclusive one, and
//! each layer owns its own index so edits never block other layers.
//!
//! The index holds envelopes only. The feature table it was built from stays
//! authoritative; [`SpatialIndex::verify`] compares the two and reports
//! [`IndexError::IndexCorrupt`] so the owner can rebuild.

mod rtree;

pub use rtree::{IndexError, SpatialIndex};
