//! Public error types.

use thiserror::Error;

/// Failure modes for [`crate::allocator::Allocator::allocate`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The requested size exceeds the largest configured size class.
    #[error("requested size exceeds the largest size class")]
    OutOfCapacity,
    /// The registry or virtual address space is exhausted.
    #[error("allocator capacity exhausted (registry or virtual space)")]
    ResourceExhausted,
    /// The requested epoch is in the CLOSING state and has no ACTIVE
    /// fallback; the allocation is rejected rather than redirected.
    #[error("epoch is closed to new allocations")]
    ClosedEpoch,
}

/// Failure modes for [`crate::allocator::Allocator::epoch_close`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EpochError {
    /// `epoch_close` was invoked while a domain still holds a nonzero
    /// refcount on that epoch. The epoch is left untouched.
    #[error("epoch has a nonzero domain refcount")]
    Busy,
    /// The epoch id is out of range for the configured ring size.
    #[error("epoch id out of range")]
    InvalidEpoch,
}

/// Internal reasons a handle was rejected by `free`. Not part of the public
/// surface (`free` returns `bool`), but kept as a typed enum internally so
/// the allocator's self-test and logging paths can distinguish the cause.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FreeError {
    #[error("handle fields are malformed or out of range")]
    Malformed,
    #[error("handle generation does not match the registry (stale or already freed)")]
    GenerationMismatch,
}
