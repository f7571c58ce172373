//! Size class table and the per-class allocation engine.
//!
//! Unlike a multi-page-span size-class table (which carries `pages` and
//! `batch_size` for multi-page spans and thread-cache batch transfers),
//! every class here describes slabs that fit in exactly one page — this
//! allocator never hands out objects larger than a page (see `allocator.rs`)
//! and has no batch-transfer mechanism. The candidate list below is
//! filtered against the configured page size at startup, so a larger
//! `page_size` build simply keeps more of the tail.

use crate::config::{ENABLE_DIAGNOSTIC_COUNTERS, EPOCH_COUNT, MAX_SLOTS_PER_SLAB, PAGE_SIZE};
use crate::epoch::EpochRing;
use crate::errors::AllocError;
use crate::handle::Handle;
use crate::registry::Registry;
use crate::slab::SlabHeader;
use crate::slab_cache::SlabCache;
use crate::stats::ClassStats;
use crate::sync::SpinMutex;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};

/// Candidate size classes, 8 bytes to 64 KiB. Truncated at startup to
/// whatever fits in one configured page.
pub const CANDIDATE_SIZES: &[u32] = &[
    8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 448, 512, 640,
    768, 896, 1024, 1280, 1536, 1792, 2048, 2560, 3072, 3584, 4096, 5120, 6144, 7168, 8192, 10240,
    12288, 14336, 16384, 24576, 32768, 49152, 65536,
];

/// Builds the active size class table for `page_size`, smallest first.
pub fn active_sizes(page_size: usize) -> Vec<u32> {
    CANDIDATE_SIZES
        .iter()
        .copied()
        .filter(|&s| (s as usize) <= page_size)
        .collect()
}

/// Maps a requested byte size to a class index in `active`, or `None` if it
/// exceeds the largest configured class.
pub fn size_to_class(active: &[u32], size: usize) -> Option<u32> {
    if active.is_empty() {
        return None;
    }
    if size == 0 {
        return Some(0);
    }
    let idx = active.partition_point(|&s| (s as usize) < size);
    if idx < active.len() { Some(idx as u32) } else { None }
}

struct ClassLists {
    partial_head: Box<[*mut SlabHeader]>,
    full_head: Box<[*mut SlabHeader]>,
    partial_count: Box<[u64]>,
    full_count: Box<[u64]>,
}

unsafe impl Send for ClassLists {}

impl ClassLists {
    fn new() -> Self {
        ClassLists {
            partial_head: vec![ptr::null_mut(); EPOCH_COUNT].into_boxed_slice(),
            full_head: vec![ptr::null_mut(); EPOCH_COUNT].into_boxed_slice(),
            partial_count: vec![0u64; EPOCH_COUNT].into_boxed_slice(),
            full_count: vec![0u64; EPOCH_COUNT].into_boxed_slice(),
        }
    }

    fn push_partial(&mut self, epoch: usize, slab: *mut SlabHeader) {
        unsafe {
            let head = self.partial_head[epoch];
            (*slab).list_prev = ptr::null_mut();
            (*slab).list_next = head;
            (*slab).epoch_id = epoch as u32;
            (*slab).in_full = false;
            if !head.is_null() {
                (*head).list_prev = slab;
            }
            self.partial_head[epoch] = slab;
            self.partial_count[epoch] += 1;
        }
    }

    fn push_full(&mut self, epoch: usize, slab: *mut SlabHeader) {
        unsafe {
            let head = self.full_head[epoch];
            (*slab).list_prev = ptr::null_mut();
            (*slab).list_next = head;
            (*slab).epoch_id = epoch as u32;
            (*slab).in_full = true;
            if !head.is_null() {
                (*head).list_prev = slab;
            }
            self.full_head[epoch] = slab;
            self.full_count[epoch] += 1;
        }
    }

    /// Removes `slab` from whichever list it is currently linked into.
    fn unlink(&mut self, slab: *mut SlabHeader) {
        unsafe {
            let epoch = (*slab).epoch_id as usize;
            let prev = (*slab).list_prev;
            let next = (*slab).list_next;
            if !prev.is_null() {
                (*prev).list_next = next;
            } else if (*slab).in_full {
                self.full_head[epoch] = next;
            } else {
                self.partial_head[epoch] = next;
            }
            if !next.is_null() {
                (*next).list_prev = prev;
            }
            if (*slab).in_full {
                self.full_count[epoch] -= 1;
            } else {
                self.partial_count[epoch] -= 1;
            }
            (*slab).list_prev = ptr::null_mut();
            (*slab).list_next = ptr::null_mut();
        }
    }

    fn move_partial_to_full(&mut self, slab: *mut SlabHeader) {
        self.unlink(slab);
        let epoch = unsafe { (*slab).epoch_id as usize };
        self.push_full(epoch, slab);
    }

    fn move_full_to_partial(&mut self, slab: *mut SlabHeader) {
        self.unlink(slab);
        let epoch = unsafe { (*slab).epoch_id as usize };
        self.push_partial(epoch, slab);
    }

    fn peek_partial(&self, epoch: usize) -> Option<*mut SlabHeader> {
        let head = self.partial_head[epoch];
        if head.is_null() { None } else { Some(head) }
    }
}

pub struct SizeClass {
    pub class_index: u32,
    pub object_size: u32,
    pub object_count: u32,

    lists: SpinMutex<ClassLists>,
    current_partial: Box<[AtomicPtr<SlabHeader>]>,
    empty_queue_head: Box<[AtomicPtr<SlabHeader>]>,
    empty_partial_count: Box<[AtomicU64]>,
    cache: SlabCache,

    slabs_minted: AtomicU64,
    slabs_recycled: AtomicU64,
    slow_path_cache_miss: AtomicU64,
    slow_path_closed_epoch_rejections: AtomicU64,
    slow_path_fallthrough: AtomicU64,
    full_to_partial_transitions: AtomicU64,
    partial_to_full_transitions: AtomicU64,
    empty_transitions: AtomicU64,
    bitmap_cas_attempts: AtomicU64,
    bitmap_cas_retries: AtomicU64,
    current_partial_cas_attempts: AtomicU64,
    current_partial_cas_failures: AtomicU64,
    trylock_fast: AtomicU64,
    trylock_contended: AtomicU64,
    zombie_repairs: AtomicU64,

    /// Randomized-vs-sequential scan controller. Present regardless of the
    /// `adaptive-scan` feature; inert (always sequential) when the feature
    /// or `enable_adaptive_scan` toggle is off.
    scan_randomized: AtomicBool,
    scan_window_attempts: AtomicU64,
    scan_window_retries: AtomicU64,
    scan_mode_switches: AtomicU64,
    scan_checks: AtomicU64,
}

const ADAPTIVE_WINDOW: u64 = 1024;

impl SizeClass {
    pub fn new(class_index: u32, object_size: u32) -> Self {
        let object_count = ((PAGE_SIZE / object_size as usize).min(MAX_SLOTS_PER_SLAB)) as u32;
        SizeClass {
            class_index,
            object_size,
            object_count,
            lists: SpinMutex::new(ClassLists::new()),
            current_partial: (0..EPOCH_COUNT)
                .map(|_| AtomicPtr::new(ptr::null_mut()))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
            empty_queue_head: (0..EPOCH_COUNT)
                .map(|_| AtomicPtr::new(ptr::null_mut()))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
            empty_partial_count: (0..EPOCH_COUNT)
                .map(|_| AtomicU64::new(0))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
            cache: SlabCache::new(),
            slabs_minted: AtomicU64::new(0),
            slabs_recycled: AtomicU64::new(0),
            slow_path_cache_miss: AtomicU64::new(0),
            slow_path_closed_epoch_rejections: AtomicU64::new(0),
            slow_path_fallthrough: AtomicU64::new(0),
            full_to_partial_transitions: AtomicU64::new(0),
            partial_to_full_transitions: AtomicU64::new(0),
            empty_transitions: AtomicU64::new(0),
            bitmap_cas_attempts: AtomicU64::new(0),
            bitmap_cas_retries: AtomicU64::new(0),
            current_partial_cas_attempts: AtomicU64::new(0),
            current_partial_cas_failures: AtomicU64::new(0),
            trylock_fast: AtomicU64::new(0),
            trylock_contended: AtomicU64::new(0),
            zombie_repairs: AtomicU64::new(0),
            scan_randomized: AtomicBool::new(false),
            scan_window_attempts: AtomicU64::new(0),
            scan_window_retries: AtomicU64::new(0),
            scan_mode_switches: AtomicU64::new(0),
            scan_checks: AtomicU64::new(0),
        }
    }

    #[cfg(feature = "adaptive-scan")]
    fn scan_start_word(&self, slab: &SlabHeader) -> usize {
        if !crate::config::ENABLE_ADAPTIVE_SCAN {
            return 0;
        }
        if self.scan_randomized.load(Ordering::Relaxed) {
            // A cheap xorshift seeded by the slab's own scan cursor, to
            // avoid a clock call on the hot path.
            let mut x = slab.scan_cursor.fetch_add(1, Ordering::Relaxed) as u64 ^ 0x9E3779B97F4A7C15;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            (x as usize) % slab.word_count().max(1)
        } else {
            0
        }
    }

    #[cfg(not(feature = "adaptive-scan"))]
    #[inline]
    fn scan_start_word(&self, _slab: &SlabHeader) -> usize {
        0
    }

    #[cfg(feature = "adaptive-scan")]
    fn record_scan_window(&self, retries: u32) {
        if !crate::config::ENABLE_ADAPTIVE_SCAN {
            return;
        }
        self.scan_window_attempts.fetch_add(1, Ordering::Relaxed);
        self.scan_window_retries.fetch_add(retries as u64, Ordering::Relaxed);
        let attempts = self.scan_window_attempts.load(Ordering::Relaxed);
        if attempts >= ADAPTIVE_WINDOW {
            let retries_sum = self.scan_window_retries.swap(0, Ordering::Relaxed);
            self.scan_window_attempts.store(0, Ordering::Relaxed);
            self.scan_checks.fetch_add(1, Ordering::Relaxed);
            let rate = retries_sum as f64 / attempts as f64;
            let randomized = self.scan_randomized.load(Ordering::Relaxed);
            if !randomized && rate > 0.30 {
                self.scan_randomized.store(true, Ordering::Relaxed);
                self.scan_mode_switches.fetch_add(1, Ordering::Relaxed);
            } else if randomized && rate < 0.10 {
                self.scan_randomized.store(false, Ordering::Relaxed);
                self.scan_mode_switches.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    #[cfg(not(feature = "adaptive-scan"))]
    #[inline]
    fn record_scan_window(&self, _retries: u32) {}

    /// Allocation entry point for this class: fast path, falling through to
    /// the slow path on a miss.
    pub fn allocate(
        &self,
        epoch: usize,
        epoch_ring: &EpochRing,
        registry: &Registry,
    ) -> Result<(Handle, *mut u8), AllocError> {
        use crate::epoch::EpochState;

        if epoch_ring.state(epoch) == EpochState::Closing {
            self.slow_path_closed_epoch_rejections.fetch_add(1, Ordering::Relaxed);
            return Err(AllocError::ClosedEpoch);
        }

        let cp = self.current_partial[epoch].load(Ordering::Acquire);
        if !cp.is_null() {
            let slab = unsafe { &*cp };
            if slab.free_count.load(Ordering::Acquire) == 0 {
                // Brief inconsistency window: another thread claimed the
                // last slot and the full-transition CAS/relink hasn't
                // landed yet. Self-heal by promoting it under the class
                // mutex, then fall through to the slow path.
                self.zombie_repairs.fetch_add(1, Ordering::Relaxed);
                crate::trace_lifecycle!("zombie repair class={} epoch={epoch}", self.class_index);
                let _ = self.current_partial[epoch].compare_exchange(
                    cp,
                    ptr::null_mut(),
                    Ordering::Release,
                    Ordering::Relaxed,
                );
                let mut guard = self.lists.lock();
                if !slab.in_full && slab.free_count.load(Ordering::Acquire) == 0 {
                    guard.move_partial_to_full(cp);
                    self.partial_to_full_transitions.fetch_add(1, Ordering::Relaxed);
                }
            } else {
                let start = self.scan_start_word(slab);
                let (slot, retries) = slab.claim_free_slot(start);
                self.bitmap_cas_attempts.fetch_add(1, Ordering::Relaxed);
                self.bitmap_cas_retries.fetch_add(retries as u64, Ordering::Relaxed);
                self.record_scan_window(retries);

                if let Some(slot_index) = slot {
                    epoch_ring.note_alloc(epoch);
                    let handle = Handle::pack(
                        slab.slab_id,
                        slab.generation.load(Ordering::Relaxed),
                        slot_index,
                        self.class_index,
                    );
                    let out_ptr = slab.slot_ptr(slot_index);

                    if slab.free_count.load(Ordering::Acquire) == 0 {
                        self.current_partial_cas_attempts.fetch_add(1, Ordering::Relaxed);
                        if self.current_partial[epoch]
                            .compare_exchange(cp, ptr::null_mut(), Ordering::Release, Ordering::Relaxed)
                            .is_err()
                        {
                            self.current_partial_cas_failures.fetch_add(1, Ordering::Relaxed);
                        }
                        let mut guard = self.lists.lock();
                        if !slab.in_full {
                            guard.move_partial_to_full(cp);
                            self.partial_to_full_transitions.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    return Ok((handle, out_ptr));
                }
            }
        }

        self.slow_path_fallthrough.fetch_add(1, Ordering::Relaxed);
        self.slow_path(epoch, epoch_ring, registry)
    }

    fn harvest_empty_queue(&self, epoch: usize, guard: &mut ClassLists, registry: &Registry) {
        let mut head = self.empty_queue_head[epoch].swap(ptr::null_mut(), Ordering::AcqRel);
        while !head.is_null() {
            let slab = unsafe { &*head };
            let next = slab.empty_next.load(Ordering::Relaxed);
            slab.empty_queued.store(false, Ordering::Relaxed);
            if slab.free_count.load(Ordering::Acquire) == slab.object_count {
                guard.unlink(head);
                let _ = self.current_partial[epoch].compare_exchange(
                    head,
                    ptr::null_mut(),
                    Ordering::Release,
                    Ordering::Relaxed,
                );
                self.cache.cache_push(slab, registry, PAGE_SIZE);
                self.slabs_recycled.fetch_add(1, Ordering::Relaxed);
                self.empty_partial_count[epoch].fetch_sub(1, Ordering::Relaxed);
            }
            head = next;
        }
    }

    fn slow_path(
        &self,
        epoch: usize,
        epoch_ring: &EpochRing,
        registry: &Registry,
    ) -> Result<(Handle, *mut u8), AllocError> {
        let (mut guard, fast) = self.lists.lock_probed();
        if fast {
            self.trylock_fast.fetch_add(1, Ordering::Relaxed);
        } else {
            self.trylock_contended.fetch_add(1, Ordering::Relaxed);
        }

        self.harvest_empty_queue(epoch, &mut guard, registry);

        if let Some(slab_ptr) = guard.peek_partial(epoch) {
            unsafe { (*slab_ptr).was_published.store(true, Ordering::Release) };
            self.current_partial[epoch].store(slab_ptr, Ordering::Release);
            crate::trace_lifecycle!(
                "publish class={} epoch={epoch} slab_id={}",
                self.class_index,
                unsafe { (*slab_ptr).slab_id }
            );
            drop(guard);
            return self.allocate(epoch, epoch_ring, registry);
        }

        if let Some((slab_id, was_published_before)) = self.cache.cache_pop() {
            let slab_ptr = registry
                .raw_lookup(slab_id)
                .expect("slab id held by the cache must resolve in the registry");
            let era = epoch_ring.era(epoch);
            unsafe { (*slab_ptr).reinit(era) };
            let gen = registry.current_generation(slab_id);
            unsafe { (*slab_ptr).generation.store(gen, Ordering::Relaxed) };
            // `reinit` resets `was_published` to false; this slab is about to be
            // handed to the lock-free fast path again, so it must be re-marked
            // published regardless of whether the cache had reclaimed its page.
            unsafe { (*slab_ptr).was_published.store(true, Ordering::Release) };
            guard.push_partial(epoch, slab_ptr);
            self.current_partial[epoch].store(slab_ptr, Ordering::Release);
            crate::trace_lifecycle!(
                "publish class={} epoch={epoch} slab_id={slab_id} was_published_before={was_published_before}",
                self.class_index
            );
            drop(guard);
            return self.allocate(epoch, epoch_ring, registry);
        }

        let era = epoch_ring.era(epoch);
        let boxed = SlabHeader::mint(self.class_index, self.object_size, self.object_count, era);
        let raw = Box::into_raw(boxed);
        let id = match registry.register(raw) {
            Ok(id) => id,
            Err(e) => {
                unsafe {
                    let owned = Box::from_raw(raw);
                    owned.reclaim_page();
                }
                return Err(e);
            }
        };
        unsafe { (*raw).slab_id = id };
        unsafe { (*raw).was_published.store(true, Ordering::Release) };
        self.slabs_minted.fetch_add(1, Ordering::Relaxed);
        self.slow_path_cache_miss.fetch_add(1, Ordering::Relaxed);
        guard.push_partial(epoch, raw);
        self.current_partial[epoch].store(raw, Ordering::Release);
        crate::trace_lifecycle!(
            "publish class={} epoch={epoch} slab_id={id}",
            self.class_index
        );
        drop(guard);
        self.allocate(epoch, epoch_ring, registry)
    }

    /// Releases `slot_index` in an already generation-validated slab.
    pub fn free_slot(
        &self,
        slab_ptr: *mut SlabHeader,
        slot_index: u32,
        epoch_ring: &EpochRing,
        registry: &Registry,
    ) {
        let slab = unsafe { &*slab_ptr };
        let pre_full = slab.is_full();
        let post = slab.release_slot(slot_index);

        if pre_full {
            let mut guard = self.lists.lock();
            if slab.in_full {
                guard.move_full_to_partial(slab_ptr);
            }
            self.full_to_partial_transitions.fetch_add(1, Ordering::Relaxed);
        }

        if post == slab.object_count {
            {
                let mut guard = self.lists.lock();
                if slab.in_full {
                    guard.move_full_to_partial(slab_ptr);
                }
            }
            let epoch = slab.epoch_id as usize;
            self.empty_partial_count[epoch].fetch_add(1, Ordering::Relaxed);
            self.empty_transitions.fetch_add(1, Ordering::Relaxed);

            if slab
                .empty_queued
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                loop {
                    let head = self.empty_queue_head[epoch].load(Ordering::Acquire);
                    slab.empty_next.store(head, Ordering::Relaxed);
                    if self.empty_queue_head[epoch]
                        .compare_exchange_weak(head, slab_ptr, Ordering::AcqRel, Ordering::Relaxed)
                        .is_ok()
                    {
                        break;
                    }
                }
            }
        }

        epoch_ring.note_free(slab.epoch_id as usize);
    }

    /// Drains `epoch` at `epoch_close` time: unpublishes `current_partial`,
    /// harvests the empty queue, and pushes every fully-empty partial slab
    /// through the cache.
    pub fn close_epoch(&self, epoch: usize, registry: &Registry) {
        crate::trace_lifecycle!("close_epoch class={} epoch={epoch}", self.class_index);
        self.current_partial[epoch].store(ptr::null_mut(), Ordering::Release);
        let mut guard = self.lists.lock();
        self.harvest_empty_queue(epoch, &mut guard, registry);

        let mut cur = guard.partial_head[epoch];
        while !cur.is_null() {
            let slab = unsafe { &*cur };
            let next = slab.list_next;
            if slab.is_empty() {
                guard.unlink(cur);
                self.cache.cache_push(slab, registry, PAGE_SIZE);
                self.slabs_recycled.fetch_add(1, Ordering::Relaxed);
                if !slab.empty_queued.swap(true, Ordering::AcqRel) {
                    self.empty_partial_count[epoch].fetch_sub(1, Ordering::Relaxed);
                }
            }
            cur = next;
        }
    }

    /// O(1) count of slabs sitting empty-but-not-yet-harvested in `epoch`,
    /// used for the stats surface's `reclaimable_count`.
    pub fn empty_partial_count(&self, epoch: usize) -> u64 {
        self.empty_partial_count[epoch].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ClassStats {
        let guard = self.lists.lock();
        let partial_total: u64 = guard.partial_count.iter().sum();
        let full_total: u64 = guard.full_count.iter().sum();
        drop(guard);
        let empty_slabs: u64 = self.empty_partial_count.iter().map(|c| c.load(Ordering::Relaxed)).sum();
        let (cache_array_len, cache_overflow_len) = self.cache.lens();
        ClassStats {
            class_index: self.class_index,
            object_size: self.object_size,
            slow_path_cache_miss: self.slow_path_cache_miss.load(Ordering::Relaxed),
            slow_path_closed_epoch_rejections: self
                .slow_path_closed_epoch_rejections
                .load(Ordering::Relaxed),
            slow_path_fallthrough: self.slow_path_fallthrough.load(Ordering::Relaxed),
            full_to_partial_transitions: self.full_to_partial_transitions.load(Ordering::Relaxed),
            partial_to_full_transitions: self.partial_to_full_transitions.load(Ordering::Relaxed),
            empty_transitions: self.empty_transitions.load(Ordering::Relaxed),
            cache_array_len,
            cache_overflow_len,
            bitmap_cas_attempts: self.bitmap_cas_attempts.load(Ordering::Relaxed),
            bitmap_cas_retries: self.bitmap_cas_retries.load(Ordering::Relaxed),
            current_partial_cas_attempts: self.current_partial_cas_attempts.load(Ordering::Relaxed),
            current_partial_cas_failures: self.current_partial_cas_failures.load(Ordering::Relaxed),
            trylock_fast: self.trylock_fast.load(Ordering::Relaxed),
            trylock_contended: self.trylock_contended.load(Ordering::Relaxed),
            zombie_repairs: self.zombie_repairs.load(Ordering::Relaxed),
            committed_bytes: if ENABLE_DIAGNOSTIC_COUNTERS {
                (partial_total + full_total) * PAGE_SIZE as u64
            } else {
                0
            },
            live_bytes: if ENABLE_DIAGNOSTIC_COUNTERS {
                full_total * self.object_count as u64 * self.object_size as u64
            } else {
                0
            },
            empty_slabs,
        }
    }

    pub fn epoch_partial_full_counts(&self, epoch: usize) -> (u64, u64) {
        let guard = self.lists.lock();
        (guard.partial_count[epoch], guard.full_count[epoch])
    }

    pub fn slabs_minted(&self) -> u64 {
        self.slabs_minted.load(Ordering::Relaxed)
    }

    pub fn slabs_recycled(&self) -> u64 {
        self.slabs_recycled.load(Ordering::Relaxed)
    }

    pub fn reclaim_bytes(&self) -> u64 {
        self.cache.reclaim_bytes.load(Ordering::Relaxed)
    }

    pub fn reclaim_calls(&self) -> u64 {
        self.cache.reclaim_calls.load(Ordering::Relaxed)
    }
}

unsafe impl Send for SizeClass {}
unsafe impl Sync for SizeClass {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_sizes_truncates_to_page_size() {
        let sizes = active_sizes(4096);
        assert!(sizes.iter().all(|&s| s <= 4096));
        assert_eq!(*sizes.first().unwrap(), 8);
        assert_eq!(*sizes.last().unwrap(), 4096);
    }

    #[test]
    fn test_size_to_class_rounds_up() {
        let sizes = active_sizes(4096);
        let c = size_to_class(&sizes, 20).unwrap();
        assert_eq!(sizes[c as usize], 24);
    }

    #[test]
    fn test_size_to_class_exact_match() {
        let sizes = active_sizes(4096);
        let c = size_to_class(&sizes, 64).unwrap();
        assert_eq!(sizes[c as usize], 64);
    }

    #[test]
    fn test_size_to_class_rejects_oversized() {
        let sizes = active_sizes(4096);
        assert!(size_to_class(&sizes, 1_000_000).is_none());
    }

    #[test]
    fn test_allocate_and_free_round_trip() {
        let registry = Registry::new();
        let ring = EpochRing::new();
        let class = SizeClass::new(0, 64);
        let epoch = ring.current();
        let (handle, ptr) = class.allocate(epoch, &ring, &registry).unwrap();
        assert!(!ptr.is_null());
        let slab_ptr = registry
            .lookup_validate(handle.slab_id(), handle.generation())
            .unwrap();
        class.free_slot(slab_ptr, handle.slot_index(), &ring, &registry);
    }

    #[test]
    fn test_allocate_many_mints_and_reuses() {
        let registry = Registry::new();
        let ring = EpochRing::new();
        let class = SizeClass::new(0, 4096);
        let epoch = ring.current();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let (h, _) = class.allocate(epoch, &ring, &registry).unwrap();
            handles.push(h);
        }
        assert_eq!(class.slabs_minted(), 3);
        for h in handles {
            let slab_ptr = registry.lookup_validate(h.slab_id(), h.generation()).unwrap();
            class.free_slot(slab_ptr, h.slot_index(), &ring, &registry);
        }
        let (_, full) = class.epoch_partial_full_counts(epoch);
        assert_eq!(full, 0);
    }

    #[test]
    fn test_rejects_allocation_into_closing_epoch() {
        let registry = Registry::new();
        let ring = EpochRing::new();
        let class = SizeClass::new(0, 64);
        ring.begin_close(0).unwrap();
        assert_eq!(class.allocate(0, &ring, &registry), Err(AllocError::ClosedEpoch));
    }

    #[test]
    fn test_close_epoch_recycles_empty_slabs() {
        let registry = Registry::new();
        let ring = EpochRing::new();
        let class = SizeClass::new(0, 2048);
        let epoch = ring.current();
        let (h, _) = class.allocate(epoch, &ring, &registry).unwrap();
        let slab_ptr = registry.lookup_validate(h.slab_id(), h.generation()).unwrap();
        class.free_slot(slab_ptr, h.slot_index(), &ring, &registry);
        ring.begin_close(epoch).unwrap();
        class.close_epoch(epoch, &registry);
        assert_eq!(class.slabs_recycled(), 1);
        assert_eq!(registry.lookup_validate(h.slab_id(), h.generation()), None);
    }
}
