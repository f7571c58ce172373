//! Read-only statistics snapshot shapes.
//!
//! Unlike a single flat `Stats` struct, these counters live sharded across
//! the modules that actually do the work (`SizeClass`, `SlabCache`,
//! `EpochRing`) — a global snapshot would otherwise need one lock spanning
//! the whole allocator. `global_stats`/`class_stats`/`epoch_stats` in
//! `allocator.rs` assemble a `Snapshot` by reading each shard's atomics;
//! the result is internally consistent per-field but not a single atomic
//! point in time across fields.

/// Bumped on any incompatible change to the snapshot field sets below.
pub const STATS_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalStats {
    pub version: u32,
    pub current_epoch: usize,
    pub active_epochs: u32,
    pub closing_epochs: u32,
    pub slabs_minted_total: u64,
    pub slabs_recycled_total: u64,
    pub reclaim_calls_total: u64,
    pub reclaim_bytes_total: u64,
    pub slow_path_total: u64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ClassStats {
    pub class_index: u32,
    pub object_size: u32,
    pub slow_path_cache_miss: u64,
    pub slow_path_closed_epoch_rejections: u64,
    pub slow_path_fallthrough: u64,
    pub full_to_partial_transitions: u64,
    pub partial_to_full_transitions: u64,
    pub empty_transitions: u64,
    pub cache_array_len: u64,
    pub cache_overflow_len: u64,
    pub bitmap_cas_attempts: u64,
    pub bitmap_cas_retries: u64,
    pub current_partial_cas_attempts: u64,
    pub current_partial_cas_failures: u64,
    pub trylock_fast: u64,
    pub trylock_contended: u64,
    /// Slabs found on `current_partial` with `free_count == 0` (a benign,
    /// brief inconsistency window) and promoted back to the full list by
    /// the fast path's self-healing repair. Never expected to grow at a
    /// rate near the allocation count.
    pub zombie_repairs: u64,
    /// Present only when `ENABLE_DIAGNOSTIC_COUNTERS` is on; zero otherwise.
    pub committed_bytes: u64,
    pub live_bytes: u64,
    pub empty_slabs: u64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EpochStats {
    pub epoch_id: usize,
    pub class_index: u32,
    pub era: u64,
    pub is_closing: bool,
    pub refcount: i64,
    pub open_since_ns: u64,
    pub partial_count: u64,
    pub full_count: u64,
    pub reclaimable_count: u64,
    pub rss_before_last_close: Option<u64>,
    pub rss_after_last_close: Option<u64>,
}
