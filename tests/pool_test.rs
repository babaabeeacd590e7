//! Integration tests for the buddy pool
//!
//! Exercises the public surface end to end: construction, the
//! split/merge protocol, identity queries, metrics, and concurrent
//! callers sharing one pool.

use std::sync::Arc;
use std::thread;

use buddy_pool::{BlockHeader, BuddyPool};

#[test]
fn test_fresh_pool_is_empty() {
    let pool = BuddyPool::new(5, 20).unwrap();
    assert_eq!(pool.fragmentation(), 1.0);
    assert_eq!(pool.total_allocations(), 0);
    assert_eq!(pool.total_deallocations(), 0);
    assert_eq!(pool.total_size(), 1 << 20);
}

#[test]
fn test_first_allocation_and_round_trip() {
    let pool = BuddyPool::new(5, 20).unwrap();

    let ptr = pool.allocate(64).unwrap();
    assert_eq!(pool.allocation_id(ptr.as_ptr()), "Alloc0");
    assert_eq!(pool.total_allocations(), 1);
    assert!(pool.fragmentation() < 1.0);

    pool.deallocate(ptr.as_ptr());
    assert_eq!(pool.fragmentation(), 1.0);
    assert_eq!(pool.total_deallocations(), 1);
}

#[test]
fn test_request_larger_than_pool_fails() {
    let pool = BuddyPool::new(6, 16).unwrap();
    assert!(pool.allocate(1 << 20).is_none());
    assert_eq!(pool.total_allocations(), 0);
    assert_eq!(pool.fragmentation(), 1.0);
}

#[test]
fn test_sibling_blocks_coalesce_in_either_order() {
    for reverse in [false, true] {
        let pool = BuddyPool::new(6, 14).unwrap();
        let p1 = pool.allocate(64).unwrap();
        let p2 = pool.allocate(64).unwrap();
        assert_ne!(p1, p2);

        let distance = (p1.as_ptr() as usize).abs_diff(p2.as_ptr() as usize);
        assert_eq!(distance % (1 << 6), 0);
        assert!(distance.is_power_of_two());

        let (first, second) = if reverse { (p2, p1) } else { (p1, p2) };
        pool.deallocate(first.as_ptr());
        pool.deallocate(second.as_ptr());
        assert_eq!(pool.fragmentation(), 1.0);
    }
}

#[test]
fn test_concurrent_allocate_free_balances() {
    let pool = Arc::new(BuddyPool::new(5, 20).unwrap());
    let threads = 4;
    let per_thread = 50;

    let mut handles = Vec::new();
    for worker in 0..threads {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            let mut ptrs = Vec::with_capacity(per_thread);
            for i in 0..per_thread {
                let size = 64 + (worker * per_thread + i) % 72;
                let ptr = pool.allocate(size).expect("pool exhausted");
                ptrs.push(ptr);
            }
            while let Some(ptr) = ptrs.pop() {
                pool.deallocate(ptr.as_ptr());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(pool.fragmentation(), 1.0);
    assert_eq!(pool.total_allocations(), (threads * per_thread) as u64);
    assert_eq!(pool.total_deallocations(), (threads * per_thread) as u64);
}

#[test]
fn test_allocation_id_is_stable() {
    let pool = BuddyPool::new(5, 16).unwrap();
    let ptr = pool.allocate(100).unwrap();

    let first = pool.allocation_id(ptr.as_ptr());
    assert!(!first.is_empty());
    for _ in 0..1000 {
        assert_eq!(pool.allocation_id(ptr.as_ptr()), first);
    }
    pool.deallocate(ptr.as_ptr());
}

#[test]
fn test_round_trip_restores_fragmentation_at_any_fill() {
    let pool = BuddyPool::new(5, 16).unwrap();
    let resident: Vec<_> = (0..5).map(|_| pool.allocate(200).unwrap()).collect();

    for size in [1, 33, 64, 500, 4000] {
        let before = pool.fragmentation();
        let ptr = pool.allocate(size).unwrap();
        pool.deallocate(ptr.as_ptr());
        assert_eq!(pool.fragmentation(), before);
    }

    for ptr in resident {
        pool.deallocate(ptr.as_ptr());
    }
    assert_eq!(pool.fragmentation(), 1.0);
}

#[test]
fn test_live_blocks_never_overlap() {
    let pool = BuddyPool::new(5, 16).unwrap();
    let size = 48;
    // 48 bytes plus the header rounds up to a 64-byte block.
    let block = (size + BlockHeader::SIZE).next_power_of_two();

    let ptrs: Vec<_> = (0..32).map(|_| pool.allocate(size).unwrap()).collect();
    for (i, a) in ptrs.iter().enumerate() {
        for b in &ptrs[i + 1..] {
            let distance = (a.as_ptr() as usize).abs_diff(b.as_ptr() as usize);
            assert!(distance >= block, "blocks overlap: distance {}", distance);
        }
    }

    for ptr in ptrs {
        pool.deallocate(ptr.as_ptr());
    }
    assert_eq!(pool.fragmentation(), 1.0);
}

#[test]
fn test_identity_is_monotone_and_never_reused() {
    let pool = BuddyPool::new(5, 16).unwrap();

    let mut seen = Vec::new();
    for round in 0..3 {
        let ptrs: Vec<_> = (0..10).map(|_| pool.allocate(64).unwrap()).collect();
        for ptr in &ptrs {
            let id = pool.allocation_id(ptr.as_ptr());
            let index: u64 = id.strip_prefix("Alloc").unwrap().parse().unwrap();
            if let Some(&last) = seen.last() {
                assert!(index > last, "round {}: index {} reused", round, index);
            }
            seen.push(index);
        }
        for ptr in ptrs {
            pool.deallocate(ptr.as_ptr());
        }
    }
    assert_eq!(seen.len(), 30);
}

#[test]
fn test_live_count_matches_counter_difference() {
    let pool = BuddyPool::new(5, 16).unwrap();
    let mut live = Vec::new();

    for i in 0..20 {
        live.push(pool.allocate(64 + i).unwrap());
    }
    for _ in 0..7 {
        pool.deallocate(live.pop().unwrap().as_ptr());
    }

    let diff = pool.total_allocations() - pool.total_deallocations();
    assert_eq!(diff as usize, live.len());

    for ptr in live {
        pool.deallocate(ptr.as_ptr());
    }
    assert_eq!(pool.total_allocations(), pool.total_deallocations());
}

#[test]
fn test_fragmentation_stays_in_unit_range_under_churn() {
    let pool = Arc::new(BuddyPool::new(5, 18).unwrap());

    let mut handles = Vec::new();
    for _ in 0..4 {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            let mut live = Vec::new();
            for i in 0..200usize {
                if i % 3 != 2 {
                    if let Some(ptr) = pool.allocate(32 + (i * 13) % 480) {
                        live.push(ptr);
                    }
                } else if let Some(ptr) = live.pop() {
                    pool.deallocate(ptr.as_ptr());
                }
                let frag = pool.fragmentation();
                assert!((0.0..=1.0).contains(&frag), "fragmentation {}", frag);
            }
            while let Some(ptr) = live.pop() {
                pool.deallocate(ptr.as_ptr());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(pool.fragmentation(), 1.0);
    assert_eq!(pool.total_allocations(), pool.total_deallocations());
}

#[test]
fn test_metrics_accumulate_across_operations() {
    let pool = BuddyPool::new(5, 16).unwrap();

    let ptrs: Vec<_> = (0..50).map(|_| pool.allocate(128).unwrap()).collect();
    let alloc_time = pool.allocation_time();
    assert!(alloc_time >= 0.0);

    for ptr in ptrs {
        pool.deallocate(ptr.as_ptr());
    }
    assert!(pool.deallocation_time() >= 0.0);
    // Cumulative totals never decrease.
    assert!(pool.allocation_time() >= alloc_time);
}
