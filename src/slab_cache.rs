//! Two-tier per-size-class cache of recycled slabs.
//!
//! Tier 1 is a fixed-capacity array of `slab_id`s, mirroring the transfer
//! cache's bounded LIFO-stack-of-slots layout. Tier 2 is an intrusive
//! overflow list of off-page nodes for whatever does not fit in the array,
//! in the style of the span list's off-page linkage. Both tiers sit behind
//! one mutex (§4.6: "a narrower lock around tier-1 array and tier-2
//! overflow list").
//!
//! `cache_push` is the allocator's sole linearization point for "this slab
//! is reusable": it snapshots the slab's identity, optionally reclaims its
//! physical page, publishes it into the cache, and only then bumps the
//! registry generation that retires outstanding handles.

use crate::config::{CACHE_ARRAY_CAPACITY, ENABLE_RSS_RECLAMATION};
use crate::registry::Registry;
use crate::slab::SlabHeader;
use crate::sync::SpinMutex;
use core::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

struct OverflowNode {
    slab_id: u32,
    was_published: bool,
    next: *mut OverflowNode,
}

struct CacheInner {
    array: [u32; CACHE_ARRAY_CAPACITY],
    array_published: [bool; CACHE_ARRAY_CAPACITY],
    len: usize,
    overflow_head: *mut OverflowNode,
}

impl CacheInner {
    const fn new() -> Self {
        CacheInner {
            array: [0; CACHE_ARRAY_CAPACITY],
            array_published: [false; CACHE_ARRAY_CAPACITY],
            len: 0,
            overflow_head: ptr::null_mut(),
        }
    }

    fn push(&mut self, slab_id: u32, was_published: bool) {
        if self.len < CACHE_ARRAY_CAPACITY {
            self.array[self.len] = slab_id;
            self.array_published[self.len] = was_published;
            self.len += 1;
            return;
        }
        let node = Box::into_raw(Box::new(OverflowNode {
            slab_id,
            was_published,
            next: self.overflow_head,
        }));
        self.overflow_head = node;
    }

    fn pop(&mut self) -> Option<(u32, bool)> {
        if self.len > 0 {
            self.len -= 1;
            return Some((self.array[self.len], self.array_published[self.len]));
        }
        if self.overflow_head.is_null() {
            return None;
        }
        let node = unsafe { Box::from_raw(self.overflow_head) };
        self.overflow_head = node.next;
        Some((node.slab_id, node.was_published))
    }
}

unsafe impl Send for CacheInner {}

pub struct SlabCache {
    inner: SpinMutex<CacheInner>,
    pub reclaim_bytes: AtomicU64,
    pub reclaim_calls: AtomicU64,
}

impl SlabCache {
    pub fn new() -> Self {
        SlabCache {
            inner: SpinMutex::new(CacheInner::new()),
            reclaim_bytes: AtomicU64::new(0),
            reclaim_calls: AtomicU64::new(0),
        }
    }

    /// Linearization point for "slab becomes reusable". `slab` must not be
    /// reachable from any partial/full list or `current_partial` by the
    /// time this is called.
    pub fn cache_push(&self, slab: &SlabHeader, registry: &Registry, page_size: usize) {
        let slab_id = slab.slab_id;
        let was_published = slab.was_published.load(Ordering::Acquire);
        crate::trace_lifecycle!("cache_push slab_id={slab_id} was_published={was_published}");

        if !was_published && ENABLE_RSS_RECLAMATION {
            slab.reclaim_page();
            self.reclaim_bytes.fetch_add(page_size as u64, Ordering::Relaxed);
            self.reclaim_calls.fetch_add(1, Ordering::Relaxed);
        }

        {
            let mut inner = self.inner.lock();
            inner.push(slab_id, was_published);
        }

        // Strictly after reclamation and cache publication: retires every
        // outstanding handle to this slab-id.
        registry.bump_generation(slab_id);
    }

    /// Current `(array tier len, overflow tier len)`, for the stats surface.
    pub fn lens(&self) -> (u64, u64) {
        let inner = self.inner.lock();
        let mut overflow_len = 0u64;
        let mut node = inner.overflow_head;
        while !node.is_null() {
            overflow_len += 1;
            node = unsafe { (*node).next };
        }
        (inner.len as u64, overflow_len)
    }

    /// Returns the `(slab_id, was_published)` of a recycled slab, if any.
    /// The caller still owns reinitializing the header before reuse.
    pub fn cache_pop(&self) -> Option<(u32, bool)> {
        let popped = self.inner.lock().pop();
        if let Some((slab_id, _)) = popped {
            crate::trace_lifecycle!("cache_pop slab_id={slab_id}");
        }
        popped
    }
}

impl Default for SlabCache {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Sync for SlabCache {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slab::SlabHeader;

    fn fresh_slab(registry: &Registry) -> Box<SlabHeader> {
        let mut slab = SlabHeader::mint(0, 64, 10, 0);
        let id = registry.register(&mut *slab as *mut SlabHeader).unwrap();
        slab.slab_id = id;
        slab
    }

    #[test]
    fn test_push_pop_round_trip_array_tier() {
        let registry = Registry::new();
        let cache = SlabCache::new();
        let slab = fresh_slab(&registry);
        cache.cache_push(&slab, &registry, 4096);
        let (id, was_published) = cache.cache_pop().unwrap();
        assert_eq!(id, slab.slab_id);
        assert!(!was_published);
    }

    #[test]
    fn test_push_bumps_generation() {
        let registry = Registry::new();
        let cache = SlabCache::new();
        let slab = fresh_slab(&registry);
        let id = slab.slab_id;
        assert_eq!(registry.lookup_validate(id, 0), Some(&*slab as *const _ as *mut _));
        cache.cache_push(&slab, &registry, 4096);
        assert_eq!(registry.lookup_validate(id, 0), None);
        assert_eq!(registry.lookup_validate(id, 1), Some(&*slab as *const _ as *mut _));
    }

    #[test]
    fn test_overflow_tier_used_past_array_capacity() {
        let registry = Registry::new();
        let cache = SlabCache::new();
        let mut slabs = Vec::new();
        for _ in 0..(CACHE_ARRAY_CAPACITY + 5) {
            slabs.push(fresh_slab(&registry));
        }
        for slab in &slabs {
            cache.cache_push(slab, &registry, 4096);
        }
        let mut popped = 0;
        while cache.cache_pop().is_some() {
            popped += 1;
        }
        assert_eq!(popped, CACHE_ARRAY_CAPACITY + 5);
    }

    #[test]
    fn test_published_slab_is_not_reclaimed() {
        let registry = Registry::new();
        let cache = SlabCache::new();
        let slab = fresh_slab(&registry);
        slab.was_published.store(true, Ordering::Relaxed);
        cache.cache_push(&slab, &registry, 4096);
        assert_eq!(cache.reclaim_calls.load(Ordering::Relaxed), 0);
        let (_, was_published) = cache.cache_pop().unwrap();
        assert!(was_published);
    }
}
