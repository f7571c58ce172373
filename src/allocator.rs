//! Top-level facade: the stable public surface described in the external
//! interfaces section. `Allocator::create` builds every size class and
//! the epoch ring; `allocate`/`free` dispatch into the right `SizeClass`;
//! `epoch_*` orchestrates the epoch ring and per-class draining; the
//! `*_stats` methods assemble read-only snapshots from the sharded
//! counters each module maintains on its own.

use crate::config::{EPOCH_COUNT, PAGE_SIZE};
use crate::domain::Domain;
use crate::epoch::EpochRing;
use crate::errors::{AllocError, EpochError, FreeError};
use crate::handle::Handle;
use crate::platform;
use crate::registry::Registry;
use crate::size_class::{self, SizeClass};
use crate::stats::{ClassStats, EpochStats, GlobalStats, STATS_VERSION};
use crate::sync::SpinMutex;
use std::sync::Arc;

/// Epoch identifier, stable across the public surface.
pub type EpochId = usize;

struct RssSample {
    before: Option<u64>,
    after: Option<u64>,
}

/// The allocator instance. Holds every size class, the registry, and the
/// epoch ring; all state is reachable from `&self`, so the whole thing can
/// live behind an `Arc` and be shared across threads without extra locking
/// at this layer.
pub struct Allocator {
    active_sizes: Vec<u32>,
    classes: Vec<SizeClass>,
    registry: Registry,
    epoch_ring: Arc<EpochRing>,
    rss_by_epoch: Box<[SpinMutex<RssSample>]>,
}

impl Allocator {
    /// Builds a fresh allocator: one size class per configured bucket, an
    /// empty registry, and an epoch ring with epoch 0 ACTIVE. There is no
    /// `destroy()`, and dropping the `Allocator` (or the last `Arc`
    /// referencing one) does not walk the registry to unmap pages or free
    /// headers: every slab minted over the allocator's lifetime is leaked
    /// for the remainder of the process, by design — slab ids are meant to
    /// be immortal (see `registry.rs`), not torn down mid-process.
    pub fn create() -> Self {
        let active_sizes = size_class::active_sizes(PAGE_SIZE);
        let classes = active_sizes
            .iter()
            .enumerate()
            .map(|(idx, &size)| SizeClass::new(idx as u32, size))
            .collect();
        let rss_by_epoch = (0..EPOCH_COUNT)
            .map(|_| {
                SpinMutex::new(RssSample {
                    before: None,
                    after: None,
                })
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Allocator {
            active_sizes,
            classes,
            registry: Registry::new(),
            epoch_ring: Arc::new(EpochRing::new()),
            rss_by_epoch,
        }
    }

    fn class_for(&self, size: usize) -> Result<&SizeClass, AllocError> {
        let idx = size_class::size_to_class(&self.active_sizes, size).ok_or(AllocError::OutOfCapacity)?;
        Ok(&self.classes[idx as usize])
    }

    /// Allocates one object of `size` bytes, stamped into `epoch`. Returns
    /// the opaque handle and a raw pointer to the slot's bytes; the caller
    /// owns initializing and later freeing them.
    pub fn allocate(&self, size: usize, epoch: EpochId) -> Result<(Handle, *mut u8), AllocError> {
        if !EpochRing::valid_epoch(epoch) {
            return Err(AllocError::ClosedEpoch);
        }
        let class = self.class_for(size)?;
        class.allocate(epoch, &self.epoch_ring, &self.registry)
    }

    /// Releases a handle previously returned by `allocate`. Returns `false`
    /// on a malformed handle or a generation mismatch (stale/double free);
    /// never panics on caller-supplied input. The underlying rejection
    /// reason is traced (see `try_free`) but collapsed to `bool` here, per
    /// the stable public surface.
    pub fn free(&self, handle: Handle) -> bool {
        self.try_free(handle).is_ok()
    }

    /// Same as `free`, but keeps the rejection cause for logging/tests
    /// instead of collapsing it to `bool`.
    fn try_free(&self, handle: Handle) -> Result<(), FreeError> {
        if !handle.well_formed(self.classes.len() as u32) {
            crate::trace_lifecycle!("free rejected handle={:#x} reason=malformed", handle.to_raw());
            return Err(FreeError::Malformed);
        }
        let slab_ptr = match self.registry.lookup_validate(handle.slab_id(), handle.generation()) {
            Some(ptr) => ptr,
            None => {
                crate::trace_lifecycle!(
                    "free rejected handle={:#x} reason=generation_mismatch",
                    handle.to_raw()
                );
                return Err(FreeError::GenerationMismatch);
            }
        };
        let class = &self.classes[handle.class_index() as usize];
        class.free_slot(slab_ptr, handle.slot_index(), &self.epoch_ring, &self.registry);
        Ok(())
    }

    pub fn epoch_current(&self) -> EpochId {
        self.epoch_ring.current()
    }

    pub fn epoch_advance(&self) -> EpochId {
        let new = self.epoch_ring.advance();
        crate::trace_lifecycle!("epoch_advance new_current={new}");
        new
    }

    /// Closes `epoch`: marks it CLOSING, then drains every size class's
    /// partial list and empty queue for that epoch through the slab cache.
    /// Rejects with `EpochError::Busy` if a domain still holds a nonzero
    /// refcount on `epoch`, leaving it untouched.
    pub fn epoch_close(&self, epoch: EpochId) -> Result<(), EpochError> {
        self.epoch_ring.begin_close(epoch)?;

        let rss_before = platform::current_rss_bytes();
        for class in &self.classes {
            class.close_epoch(epoch, &self.registry);
        }
        let rss_after = platform::current_rss_bytes();

        let mut sample = self.rss_by_epoch[epoch].lock();
        sample.before = rss_before;
        sample.after = rss_after;
        Ok(())
    }

    pub fn global_stats(&self) -> GlobalStats {
        let mut active_epochs = 0u32;
        let mut closing_epochs = 0u32;
        for e in 0..EPOCH_COUNT {
            match self.epoch_ring.state(e) {
                crate::epoch::EpochState::Active => active_epochs += 1,
                crate::epoch::EpochState::Closing => closing_epochs += 1,
            }
        }

        let mut slabs_minted_total = 0u64;
        let mut slabs_recycled_total = 0u64;
        let mut reclaim_calls_total = 0u64;
        let mut reclaim_bytes_total = 0u64;
        let mut slow_path_total = 0u64;
        for class in &self.classes {
            slabs_minted_total += class.slabs_minted();
            slabs_recycled_total += class.slabs_recycled();
            reclaim_calls_total += class.reclaim_calls();
            reclaim_bytes_total += class.reclaim_bytes();
            slow_path_total += class.snapshot().slow_path_fallthrough;
        }

        GlobalStats {
            version: STATS_VERSION,
            current_epoch: self.epoch_ring.current(),
            active_epochs,
            closing_epochs,
            slabs_minted_total,
            slabs_recycled_total,
            reclaim_calls_total,
            reclaim_bytes_total,
            slow_path_total,
        }
    }

    pub fn class_stats(&self, class_index: u32) -> Option<ClassStats> {
        self.classes.get(class_index as usize).map(|c| c.snapshot())
    }

    pub fn epoch_stats(&self, class_index: u32, epoch: EpochId) -> Option<EpochStats> {
        let class = self.classes.get(class_index as usize)?;
        if !EpochRing::valid_epoch(epoch) {
            return None;
        }
        let (partial_count, full_count) = class.epoch_partial_full_counts(epoch);
        let sample = self.rss_by_epoch[epoch].lock();
        Some(EpochStats {
            epoch_id: epoch,
            class_index,
            era: self.epoch_ring.era(epoch),
            is_closing: self.epoch_ring.state(epoch) == crate::epoch::EpochState::Closing,
            refcount: self.epoch_ring.refcount(epoch),
            open_since_ns: self.epoch_ring.open_since(epoch).elapsed().as_nanos() as u64,
            partial_count,
            full_count,
            reclaimable_count: class.empty_partial_count(epoch),
            rss_before_last_close: sample.before,
            rss_after_last_close: sample.after,
        })
    }

    /// Enters a new domain scope pinned to `epoch`, incrementing its
    /// refcount until the returned guard is dropped.
    pub fn domain_enter(&self, epoch: EpochId) -> Result<Domain, EpochError> {
        Domain::enter(Arc::clone(&self.epoch_ring), epoch)
    }

    pub fn num_classes(&self) -> u32 {
        self.classes.len() as u32
    }

    pub fn class_object_size(&self, class_index: u32) -> Option<u32> {
        self.active_sizes.get(class_index as usize).copied()
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::create()
    }
}

unsafe impl Send for Allocator {}
unsafe impl Sync for Allocator {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_free_round_trip() {
        let alloc = Allocator::create();
        let epoch = alloc.epoch_current();
        let (handle, ptr) = alloc.allocate(64, epoch).unwrap();
        assert!(!ptr.is_null());
        assert!(alloc.free(handle));
    }

    #[test]
    fn test_double_free_rejected() {
        let alloc = Allocator::create();
        let epoch = alloc.epoch_current();
        let (handle, _) = alloc.allocate(64, epoch).unwrap();
        assert!(alloc.free(handle));
        assert!(!alloc.free(handle));
    }

    #[test]
    fn test_try_free_distinguishes_malformed_from_generation_mismatch() {
        let alloc = Allocator::create();
        let epoch = alloc.epoch_current();
        let (handle, _) = alloc.allocate(64, epoch).unwrap();

        let malformed = Handle::from_raw(handle.to_raw() ^ 1 << 63);
        assert_eq!(alloc.try_free(malformed), Err(FreeError::Malformed));

        assert_eq!(alloc.try_free(handle), Ok(()));
        assert_eq!(alloc.try_free(handle), Err(FreeError::GenerationMismatch));
    }

    #[test]
    fn test_oversized_allocation_rejected() {
        let alloc = Allocator::create();
        let epoch = alloc.epoch_current();
        assert_eq!(alloc.allocate(10_000_000, epoch), Err(AllocError::OutOfCapacity));
    }

    #[test]
    fn test_allocation_into_nonexistent_epoch_rejected() {
        let alloc = Allocator::create();
        assert_eq!(alloc.allocate(64, EPOCH_COUNT + 1), Err(AllocError::ClosedEpoch));
    }

    #[test]
    fn test_epoch_advance_and_close_recycles() {
        let alloc = Allocator::create();
        let epoch = alloc.epoch_current();
        let (handle, _) = alloc.allocate(128, epoch).unwrap();
        assert!(alloc.free(handle));
        alloc.epoch_advance();
        assert!(alloc.epoch_close(epoch).is_ok());
        let stats = alloc.global_stats();
        assert!(stats.slabs_recycled_total >= 1);
    }

    #[test]
    fn test_epoch_close_rejects_busy_domain() {
        let alloc = Allocator::create();
        let epoch = alloc.epoch_current();
        let domain = alloc.domain_enter(epoch).unwrap();
        assert_eq!(alloc.epoch_close(epoch), Err(EpochError::Busy));
        drop(domain);
        assert!(alloc.epoch_close(epoch).is_ok());
    }

    #[test]
    fn test_stats_snapshots_are_well_formed() {
        let alloc = Allocator::create();
        let epoch = alloc.epoch_current();
        let (_handle, _) = alloc.allocate(256, epoch).unwrap();
        let g = alloc.global_stats();
        assert_eq!(g.version, STATS_VERSION);
        let class_idx = size_class::size_to_class(&alloc.active_sizes, 256).unwrap();
        let cs = alloc.class_stats(class_idx).unwrap();
        assert_eq!(cs.object_size, 256);
        let es = alloc.epoch_stats(class_idx, epoch).unwrap();
        assert_eq!(es.epoch_id, epoch);
    }
}
