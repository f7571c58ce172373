//! End-to-end scenarios against the public facade: fast-path correctness,
//! bulk concurrent alloc/free, reclaim-before-publish under churn, closed-
//! epoch rejection, cooldown RSS flatness, and handle ABA across recycling.

use slabrt::{AllocError, Allocator, EpochError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn fill_pattern(ptr: *mut u8, size: usize, slot_index: usize) {
    let byte = (slot_index % 251) as u8;
    unsafe {
        for i in 0..size {
            *ptr.add(i) = byte;
        }
    }
}

fn check_pattern(ptr: *mut u8, size: usize, slot_index: usize) -> bool {
    let byte = (slot_index % 251) as u8;
    unsafe { (0..size).all(|i| *ptr.add(i) == byte) }
}

#[test]
fn scenario_fast_path_correctness() {
    let alloc = Allocator::create();
    let epoch = alloc.epoch_current();
    let before = alloc.global_stats().slabs_recycled_total;

    let mut handles = Vec::with_capacity(10_000);
    for i in 0..10_000 {
        let (h, ptr) = alloc.allocate(128, epoch).expect("allocate");
        fill_pattern(ptr, 128, i);
        handles.push((h, ptr, i));
    }

    for &(_, ptr, i) in handles.iter().rev() {
        assert!(check_pattern(ptr, 128, i));
    }

    for (h, _, _) in handles.into_iter().rev() {
        assert!(alloc.free(h));
    }

    // No cache_push (and so no generation bump) should have run while every
    // handle was still outstanding.
    assert_eq!(alloc.global_stats().slabs_recycled_total, before);
}

#[test]
fn scenario_bulk_alloc_free_across_threads() {
    let alloc = Arc::new(Allocator::create());
    let epoch = alloc.epoch_current();
    let threads = 8;
    let per_thread = 50_000;

    let workers: Vec<_> = (0..threads)
        .map(|_| {
            let alloc = Arc::clone(&alloc);
            thread::spawn(move || {
                let mut handles = Vec::with_capacity(per_thread);
                for _ in 0..per_thread {
                    let (h, _) = alloc.allocate(128, epoch).expect("allocate");
                    handles.push(h);
                }
                let mut ok = 0usize;
                for h in handles {
                    if alloc.free(h) {
                        ok += 1;
                    }
                }
                ok
            })
        })
        .collect();

    let total_freed: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
    assert_eq!(total_freed, threads * per_thread);
}

#[test]
fn scenario_reclaim_before_publish_under_churn() {
    let alloc = Arc::new(Allocator::create());
    let epoch = alloc.epoch_current();
    let deadline = Instant::now() + Duration::from_millis(300);

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let alloc = Arc::clone(&alloc);
            thread::spawn(move || {
                let mut total = 0u64;
                while Instant::now() < deadline {
                    let mut batch = Vec::with_capacity(64);
                    for _ in 0..64 {
                        if let Ok((h, _)) = alloc.allocate(64, epoch) {
                            batch.push(h);
                            total += 1;
                        }
                    }
                    for h in batch {
                        alloc.free(h);
                    }
                }
                total
            })
        })
        .collect();

    let total_allocs: u64 = workers.into_iter().map(|w| w.join().unwrap()).sum();

    let class_idx = slabrt::size_class::size_to_class(&slabrt::size_class::active_sizes(4096), 64).unwrap();
    let stats = alloc.class_stats(class_idx).unwrap();
    assert!(
        (stats.zombie_repairs as f64) <= 0.0005 * total_allocs as f64,
        "zombie repairs {} exceeded 0.05% of {} allocations",
        stats.zombie_repairs,
        total_allocs
    );
}

#[test]
fn scenario_closed_epoch_rejection() {
    let alloc = Allocator::create();
    let epoch0 = alloc.epoch_current();
    let (h, _) = alloc.allocate(256, epoch0).unwrap();
    assert!(alloc.free(h));

    alloc.epoch_advance();
    alloc.epoch_close(epoch0).unwrap();

    assert_eq!(alloc.allocate(256, epoch0), Err(AllocError::ClosedEpoch));
}

#[test]
fn scenario_cooldown_committed_bytes_flatness() {
    let alloc = Allocator::create();
    let class_idx =
        slabrt::size_class::size_to_class(&slabrt::size_class::active_sizes(4096), 4096).unwrap();

    let mut baseline = None;
    for cycle in 0..50 {
        let epoch = alloc.epoch_current();
        let mut handles = Vec::with_capacity(64);
        for _ in 0..64 {
            let (h, _) = alloc.allocate(4096, epoch).unwrap();
            handles.push(h);
        }
        for h in handles {
            alloc.free(h);
        }
        alloc.epoch_advance();
        alloc.epoch_close(epoch).unwrap();

        let committed = alloc.class_stats(class_idx).unwrap().committed_bytes;
        if cycle == 0 {
            baseline = Some(committed);
        } else if let Some(base) = baseline {
            if base > 0 {
                let drift = (committed as f64 - base as f64).abs() / base as f64;
                assert!(drift < 0.01, "cycle {cycle}: committed_bytes drifted {drift}");
            }
        }
    }
}

#[test]
fn scenario_handle_aba_across_recycle() {
    let alloc = Allocator::create();
    let epoch = alloc.epoch_current();
    let (h1, _) = alloc.allocate(512, epoch).unwrap();
    assert!(alloc.free(h1));

    alloc.epoch_advance();
    alloc.epoch_close(epoch).unwrap();

    // The slab backing h1 should have been fully recycled by the close; the
    // retired handle must now be rejected.
    assert!(!alloc.free(h1));

    let epoch1 = alloc.epoch_current();
    let (h2, _) = alloc.allocate(512, epoch1).unwrap();
    assert!(h2.generation() > h1.generation() || h2.slab_id() != h1.slab_id());
    assert!(alloc.free(h2));
}

#[test]
fn scenario_epoch_close_busy_then_free() {
    let alloc = Allocator::create();
    let epoch = alloc.epoch_current();
    let domain = alloc.domain_enter(epoch).unwrap();
    assert_eq!(alloc.epoch_close(epoch), Err(EpochError::Busy));
    drop(domain);
    assert!(alloc.epoch_close(epoch).is_ok());
}
