//! Binary buddy allocator over a single contiguous pool
//!
//! The pool is one owned region of `2^max_order` bytes. Every block
//! carries an in-band [`BlockHeader`]; buddy arithmetic works on byte
//! offsets within the region, and the per-order free index stores
//! offsets rather than pointers.

mod block;
mod free_index;
mod pool;
mod stats;

pub use block::{buddy_offset, BlockHeader, INVALID_ALLOCATION_INDEX};
pub use free_index::FreeIndex;
pub use pool::{BuddyPool, MAX_SUPPORTED_ORDER};
pub use stats::PoolStats;
