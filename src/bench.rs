//! Synthetic workload drivers
//!
//! Each workload drives a shared [`BuddyPool`] and appends one
//! telemetry record per operation. Workloads run on one thread by
//! default; with `threads > 1` every worker runs the same workload
//! against the same pool and drains its own surviving pointers.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::buddy::BuddyPool;
use crate::config::{Settings, TestKind};
use crate::logger::{current_thread_id, timestamp_now, DataLogger, OperationRecord};

/// Size distribution of the mixed workload.
const MIXED_SIZES: &[usize] = &[32, 64, 128, 256, 512, 1024];

/// Per-worker operation counts, summed for the summary row.
#[derive(Debug, Default, Clone, Copy)]
struct WorkloadReport {
    allocations: u64,
    deallocations: u64,
}

impl WorkloadReport {
    fn merge(&mut self, other: WorkloadReport) {
        self.allocations += other.allocations;
        self.deallocations += other.deallocations;
    }
}

/// Run the configured workload end to end.
///
/// Creates the output directory and a timestamped report file inside
/// it, constructs the pool, fans out over `threads` workers, and for
/// the throughput workload appends the aggregate summary record.
pub fn run(settings: &Settings) -> Result<()> {
    std::fs::create_dir_all(&settings.out).with_context(|| {
        format!(
            "failed to create output directory '{}'",
            settings.out.display()
        )
    })?;
    let path = report_path(settings);
    let logger = Arc::new(
        DataLogger::create(&path, settings.format)
            .with_context(|| format!("failed to open report file '{}'", path.display()))?,
    );
    let pool = Arc::new(
        BuddyPool::new(settings.min_order, settings.max_order)
            .context("failed to construct pool")?,
    );

    info!(
        "running {} workload: pool 2^{} bytes, {} thread(s)",
        settings.test,
        settings.max_order,
        settings.threads
    );

    let started = Instant::now();
    let report = if settings.threads == 1 {
        run_worker(&pool, &logger, settings, 0)?
    } else {
        let mut handles = Vec::with_capacity(settings.threads);
        for worker in 0..settings.threads {
            let pool = Arc::clone(&pool);
            let logger = Arc::clone(&logger);
            let settings = settings.clone();
            handles.push(std::thread::spawn(move || {
                run_worker(&pool, &logger, &settings, worker)
            }));
        }
        let mut total = WorkloadReport::default();
        for handle in handles {
            let report = handle
                .join()
                .map_err(|_| anyhow!("worker thread panicked"))??;
            total.merge(report);
        }
        total
    };
    let elapsed = started.elapsed().as_secs_f64();

    if settings.test == TestKind::Throughput {
        let alloc_throughput = report.allocations as f64 / elapsed;
        let dealloc_throughput = report.deallocations as f64 / elapsed;
        logger.log_summary(
            "Throughput Benchmark Summary",
            alloc_throughput,
            dealloc_throughput,
            pool.fragmentation(),
        )?;
        println!(
            "throughput: {:.0} allocs/sec, {:.0} deallocs/sec over {:.2}s",
            alloc_throughput, dealloc_throughput, elapsed
        );
    }

    println!(
        "{} workload completed: {} allocations, {} deallocations in {:.3}s",
        settings.test, report.allocations, report.deallocations, elapsed
    );
    println!("report written to {}", path.display());
    Ok(())
}

fn report_path(settings: &Settings) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    settings.out.join(format!(
        "buddy_bench_{}.{}",
        stamp,
        settings.format.extension()
    ))
}

fn run_worker(
    pool: &BuddyPool,
    logger: &DataLogger,
    settings: &Settings,
    worker: usize,
) -> Result<WorkloadReport> {
    // Offset the seed per worker so threads do not replay each other.
    let rng = match settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(worker as u64)),
        None => StdRng::from_entropy(),
    };
    match settings.test {
        TestKind::Sequential => sequential(pool, logger, settings),
        TestKind::Random => random(pool, logger, settings, rng),
        TestKind::Mixed => mixed(pool, logger, settings, rng),
        TestKind::Throughput => throughput(pool, logger, settings),
    }
}

fn log_operation(
    logger: &DataLogger,
    pool: &BuddyPool,
    operation: &str,
    source: &str,
    block_size: usize,
    seconds: f64,
    ptr: NonNull<u8>,
    allocation_id: String,
) -> Result<()> {
    logger.log(&OperationRecord {
        timestamp: timestamp_now(),
        operation: operation.to_string(),
        block_size,
        time: seconds,
        fragmentation: pool.fragmentation(),
        source: source.to_string(),
        call_stack: source.to_string(),
        memory_address: pool.memory_address(ptr.as_ptr()),
        thread_id: current_thread_id(),
        allocation_id,
    })?;
    Ok(())
}

/// Allocate `ops` fixed-size blocks, then free them in allocation order.
fn sequential(pool: &BuddyPool, logger: &DataLogger, settings: &Settings) -> Result<WorkloadReport> {
    let mut report = WorkloadReport::default();
    let mut pointers = Vec::with_capacity(settings.ops as usize);
    let mut ids = Vec::with_capacity(settings.ops as usize);

    for i in 0..settings.ops {
        let started = Instant::now();
        let Some(ptr) = pool.allocate(settings.block_size) else {
            error!("sequential: allocation failed at iteration {}", i);
            break;
        };
        let seconds = started.elapsed().as_secs_f64();
        let id = pool.allocation_id(ptr.as_ptr());
        log_operation(
            logger,
            pool,
            "Allocation",
            "sequential",
            settings.block_size,
            seconds,
            ptr,
            id.clone(),
        )?;
        pointers.push(ptr);
        ids.push(id);
        report.allocations += 1;
    }

    for (ptr, id) in pointers.into_iter().zip(ids) {
        let started = Instant::now();
        pool.deallocate(ptr.as_ptr());
        let seconds = started.elapsed().as_secs_f64();
        log_operation(
            logger,
            pool,
            "Deallocation",
            "sequential",
            settings.block_size,
            seconds,
            ptr,
            id,
        )?;
        report.deallocations += 1;
    }

    Ok(report)
}

/// Coin-flip between allocating a uniformly sized block and freeing a
/// uniformly chosen live pointer; survivors are drained at the end.
fn random(
    pool: &BuddyPool,
    logger: &DataLogger,
    settings: &Settings,
    mut rng: StdRng,
) -> Result<WorkloadReport> {
    let sizes = settings.min_block_size..=settings.max_block_size;
    random_mix(pool, logger, settings, "random", move |rng| {
        rng.gen_range(sizes.clone())
    }, &mut rng)
}

/// Like `random`, but sizes come from a fixed real-world distribution.
fn mixed(
    pool: &BuddyPool,
    logger: &DataLogger,
    settings: &Settings,
    mut rng: StdRng,
) -> Result<WorkloadReport> {
    random_mix(pool, logger, settings, "mixed", |rng| {
        MIXED_SIZES[rng.gen_range(0..MIXED_SIZES.len())]
    }, &mut rng)
}

fn random_mix(
    pool: &BuddyPool,
    logger: &DataLogger,
    settings: &Settings,
    source: &str,
    mut pick_size: impl FnMut(&mut StdRng) -> usize,
    rng: &mut StdRng,
) -> Result<WorkloadReport> {
    let mut report = WorkloadReport::default();
    let mut live: Vec<(NonNull<u8>, usize, String)> = Vec::new();

    for i in 0..settings.ops {
        let allocate = live.is_empty() || rng.gen_bool(0.5);
        if allocate {
            let block_size = pick_size(rng);
            let started = Instant::now();
            let Some(ptr) = pool.allocate(block_size) else {
                error!("{}: allocation failed at iteration {}", source, i);
                continue;
            };
            let seconds = started.elapsed().as_secs_f64();
            let id = pool.allocation_id(ptr.as_ptr());
            log_operation(
                logger,
                pool,
                "Allocation",
                source,
                block_size,
                seconds,
                ptr,
                id.clone(),
            )?;
            live.push((ptr, block_size, id));
            report.allocations += 1;
        } else {
            let index = rng.gen_range(0..live.len());
            let (ptr, block_size, id) = live.swap_remove(index);
            let started = Instant::now();
            pool.deallocate(ptr.as_ptr());
            let seconds = started.elapsed().as_secs_f64();
            log_operation(
                logger,
                pool,
                "Deallocation",
                source,
                block_size,
                seconds,
                ptr,
                id,
            )?;
            report.deallocations += 1;
        }
    }

    for (ptr, block_size, id) in live {
        let started = Instant::now();
        pool.deallocate(ptr.as_ptr());
        let seconds = started.elapsed().as_secs_f64();
        log_operation(
            logger,
            pool,
            "Deallocation",
            source,
            block_size,
            seconds,
            ptr,
            id,
        )?;
        report.deallocations += 1;
    }

    Ok(report)
}

/// Alternate allocate and FIFO deallocate of fixed-size blocks until
/// the configured duration elapses.
fn throughput(pool: &BuddyPool, logger: &DataLogger, settings: &Settings) -> Result<WorkloadReport> {
    let mut report = WorkloadReport::default();
    let mut live: VecDeque<(NonNull<u8>, String)> = VecDeque::new();
    let deadline = Instant::now() + Duration::from_secs_f64(settings.duration);

    while Instant::now() < deadline {
        let started = Instant::now();
        if let Some(ptr) = pool.allocate(settings.block_size) {
            let seconds = started.elapsed().as_secs_f64();
            let id = pool.allocation_id(ptr.as_ptr());
            log_operation(
                logger,
                pool,
                "Allocation",
                "throughput",
                settings.block_size,
                seconds,
                ptr,
                id.clone(),
            )?;
            live.push_back((ptr, id));
            report.allocations += 1;
        }

        if let Some((ptr, id)) = live.pop_front() {
            let started = Instant::now();
            pool.deallocate(ptr.as_ptr());
            let seconds = started.elapsed().as_secs_f64();
            log_operation(
                logger,
                pool,
                "Deallocation",
                "throughput",
                settings.block_size,
                seconds,
                ptr,
                id,
            )?;
            report.deallocations += 1;
        }
    }

    for (ptr, id) in live {
        let started = Instant::now();
        pool.deallocate(ptr.as_ptr());
        let seconds = started.elapsed().as_secs_f64();
        log_operation(
            logger,
            pool,
            "Deallocation",
            "throughput",
            settings.block_size,
            seconds,
            ptr,
            id,
        )?;
        report.deallocations += 1;
    }

    Ok(report)
}
