//! Compile-time configuration, resolved by `build.rs` from `slabrt.toml`
//! (or the file named by `SLABRT_CONFIG`) and `include!`-ed here.

include!(concat!(env!("OUT_DIR"), "/config_gen.rs"));

/// Maximum slots addressable within one slab (handle's slot field is 9 bits).
pub const MAX_SLOTS_PER_SLAB: usize = 512;

/// Maximum number of slabs the registry can hold (`slab_id` is 22 bits).
pub const MAX_SLABS: usize = 1 << 22;

/// Entries per registry block (see `registry.rs`).
pub const REGISTRY_BLOCK_LEN: usize = 4096;

/// Number of top-level block slots the registry's root array reserves.
pub const REGISTRY_MAX_BLOCKS: usize = MAX_SLABS / REGISTRY_BLOCK_LEN;
