//! Counters and statistics for the buddy pool
//!
//! The monotone counters use relaxed atomics and are readable without
//! the pool's mutation gate. Timing and free-space figures live behind
//! the gate and are exposed through [`PoolStats`] snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

use super::block::INVALID_ALLOCATION_INDEX;

/// Lock-free counters owned by one pool instance.
///
/// `allocation_counter` feeds the per-allocation identity and is never
/// reused; the totals track throughput.
pub(crate) struct AllocCounters {
    allocation_counter: AtomicU64,
    total_allocations: AtomicU64,
    total_deallocations: AtomicU64,
}

impl AllocCounters {
    pub(crate) const fn new() -> Self {
        Self {
            allocation_counter: AtomicU64::new(0),
            total_allocations: AtomicU64::new(0),
            total_deallocations: AtomicU64::new(0),
        }
    }

    /// Draw the next allocation identity. Strictly monotone.
    pub(crate) fn next_allocation_index(&self) -> u64 {
        let index = self.allocation_counter.fetch_add(1, Ordering::Relaxed);
        debug_assert_ne!(index, INVALID_ALLOCATION_INDEX);
        index
    }

    pub(crate) fn record_allocation(&self) {
        self.total_allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deallocation(&self) {
        self.total_deallocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn total_allocations(&self) -> u64 {
        self.total_allocations.load(Ordering::Relaxed)
    }

    pub(crate) fn total_deallocations(&self) -> u64 {
        self.total_deallocations.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of a pool, taken under the gate.
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Whole-pool size in bytes (`2^max_order`).
    pub total_bytes: usize,
    /// Bytes currently on the free index.
    pub free_bytes: usize,
    /// Free block count per order, lowest order first.
    pub free_blocks_by_order: Vec<usize>,
    /// Completed allocations since construction.
    pub total_allocations: u64,
    /// Completed deallocations since construction.
    pub total_deallocations: u64,
    /// Cumulative seconds spent inside `allocate`.
    pub allocation_time: f64,
    /// Cumulative seconds spent inside `deallocate`.
    pub deallocation_time: f64,
}

impl PoolStats {
    /// Free-space ratio in `[0.0, 1.0]`; `1.0` means fully empty.
    pub fn fragmentation(&self) -> f64 {
        self.free_bytes as f64 / self.total_bytes as f64
    }
}
