//! Append-only table mapping a small integer `slab_id` to `(slab pointer,
//! generation)` — the indirection layer underlying every [`crate::handle::Handle`].
//!
//! Modeled on the page map's segmented, atomically-published blocks: growth
//! allocates a new block of entries and publishes it with one atomic store;
//! readers walk `blocks[..]` with acquire loads and never take a lock.
//! Unlike the page map (keyed by page address, three radix levels), a slab id
//! is a small dense integer, so one level of fixed-size blocks is enough.

use crate::config::{MAX_SLABS, REGISTRY_BLOCK_LEN, REGISTRY_MAX_BLOCKS};
use crate::errors::AllocError;
use crate::slab::SlabHeader;
use crate::sync::{SpinLock, SpinMutex};
use core::sync::atomic::{AtomicPtr, AtomicU32, Ordering};
use std::ptr;

struct RegistryEntry {
    slab: AtomicPtr<SlabHeader>,
    generation: AtomicU32,
}

impl RegistryEntry {
    const fn empty() -> Self {
        Self {
            slab: AtomicPtr::new(ptr::null_mut()),
            generation: AtomicU32::new(0),
        }
    }
}

struct RegistryBlock {
    entries: Vec<RegistryEntry>,
}

impl RegistryBlock {
    fn new() -> Self {
        let mut entries = Vec::with_capacity(REGISTRY_BLOCK_LEN);
        entries.resize_with(REGISTRY_BLOCK_LEN, RegistryEntry::empty);
        Self { entries }
    }
}

pub struct Registry {
    blocks: Box<[AtomicPtr<RegistryBlock>]>,
    /// Single writer lock: covers minting a fresh id and publishing new
    /// blocks. Readers (`lookup_validate`, `current_generation`) never take
    /// it.
    growth_lock: SpinLock,
    next_id: AtomicU32,
    /// Ids released back to the pool. Always empty in the current design
    /// (slab headers are immortal — see SPEC_FULL.md §3), kept so registry
    /// growth and id minting share one bookkeeping path with any future
    /// unregister operation.
    free_ids: SpinMutex<Vec<u32>>,
}

impl Registry {
    pub fn new() -> Self {
        let blocks = (0..REGISTRY_MAX_BLOCKS)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            blocks,
            growth_lock: SpinLock::new(),
            next_id: AtomicU32::new(0),
            free_ids: SpinMutex::new(Vec::new()),
        }
    }

    fn block_and_slot(slab_id: u32) -> (usize, usize) {
        (
            (slab_id as usize) / REGISTRY_BLOCK_LEN,
            (slab_id as usize) % REGISTRY_BLOCK_LEN,
        )
    }

    fn entry(&self, slab_id: u32) -> Option<&RegistryEntry> {
        let (block_idx, slot) = Self::block_and_slot(slab_id);
        let block_ptr = self.blocks.get(block_idx)?.load(Ordering::Acquire);
        if block_ptr.is_null() {
            return None;
        }
        // SAFETY: once published, a block is never freed or moved for the
        // lifetime of the registry.
        let block = unsafe { &*block_ptr };
        block.entries.get(slot)
    }

    /// Registers a newly minted slab, returning its `slab_id`. The slab's
    /// generation starts at 0.
    pub fn register(&self, slab: *mut SlabHeader) -> Result<u32, AllocError> {
        self.growth_lock.lock();
        let result = (|| {
            let id = {
                let mut free = self.free_ids.lock();
                if let Some(id) = free.pop() {
                    id
                } else {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    if id as usize >= MAX_SLABS {
                        self.next_id.fetch_sub(1, Ordering::Relaxed);
                        return Err(AllocError::ResourceExhausted);
                    }
                    id
                }
            };

            let (block_idx, slot) = Self::block_and_slot(id);
            if self.blocks[block_idx].load(Ordering::Acquire).is_null() {
                let block = Box::into_raw(Box::new(RegistryBlock::new()));
                // Sole writer under growth_lock: no CAS race is possible,
                // a plain release store is enough to publish to readers.
                self.blocks[block_idx].store(block, Ordering::Release);
            }
            let block_ptr = self.blocks[block_idx].load(Ordering::Relaxed);
            let block = unsafe { &*block_ptr };
            let entry = &block.entries[slot];
            entry.generation.store(0, Ordering::Relaxed);
            entry.slab.store(slab, Ordering::Release);
            Ok(id)
        })();
        self.growth_lock.unlock();
        result
    }

    /// Lock-free: returns the slab pointer iff `gen` matches the live
    /// generation for `slab_id`.
    pub fn lookup_validate(&self, slab_id: u32, gen: u32) -> Option<*mut SlabHeader> {
        let entry = self.entry(slab_id)?;
        if entry.generation.load(Ordering::Acquire) != gen {
            return None;
        }
        let ptr = entry.slab.load(Ordering::Acquire);
        if ptr.is_null() { None } else { Some(ptr) }
    }

    /// Unconditional pointer lookup for an id the caller already owns (e.g.
    /// one just popped out of the slab cache). Skips the generation check
    /// `lookup_validate` performs against caller-supplied handles.
    pub fn raw_lookup(&self, slab_id: u32) -> Option<*mut SlabHeader> {
        let entry = self.entry(slab_id)?;
        let ptr = entry.slab.load(Ordering::Acquire);
        if ptr.is_null() { None } else { Some(ptr) }
    }

    /// The live generation for `slab_id`, used internally by the slow path
    /// and cache pop to stamp a slab's cached `generation` field after
    /// reinitialization. Does not validate anything — callers must already
    /// trust `slab_id`.
    pub fn current_generation(&self, slab_id: u32) -> u32 {
        match self.entry(slab_id) {
            Some(entry) => entry.generation.load(Ordering::Acquire),
            None => 0,
        }
    }

    /// The *only* place a registry generation changes (see
    /// `slab_cache::cache_push`). Not atomic-RMW: safe because at most one
    /// thread ever recycles a given `slab_id` at a time (it is reached only
    /// while that slab is owned by the harvester holding the class mutex).
    pub fn bump_generation(&self, slab_id: u32) {
        if let Some(entry) = self.entry(slab_id) {
            let g = entry.generation.load(Ordering::Relaxed);
            entry
                .generation
                .store(g.wrapping_add(1) & crate::handle::MAX_GENERATION, Ordering::Relaxed);
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for Registry {}
unsafe impl Sync for Registry {}
