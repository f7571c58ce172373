//! slabrt: a lifetime-aware slab allocator for small, fixed-size objects.
//!
//! Objects are handed out as opaque 64-bit [`handle::Handle`]s rather than
//! raw pointers, and every allocation is stamped into an *epoch* — a
//! generation of related allocations that can be closed as a unit, driving
//! bulk recycling without per-object bookkeeping. See [`allocator::Allocator`]
//! for the public surface.

pub mod allocator;
pub mod config;
pub mod domain;
pub mod epoch;
pub mod errors;
pub mod handle;
#[macro_use]
pub mod macros;
pub mod platform;
pub mod registry;
pub mod size_class;
pub mod slab;
pub mod slab_cache;
pub mod stats;
pub mod sync;

pub use allocator::{Allocator, EpochId};
pub use errors::{AllocError, EpochError};
pub use handle::Handle;
