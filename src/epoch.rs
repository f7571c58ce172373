//! The epoch ring: groups allocations by lifetime phase and gives
//! `epoch_close` a deterministic quiescence boundary to reclaim against.
//!
//! A fixed-size ring of `config::EPOCH_COUNT` slots, each either `Active`
//! (accepting new allocations) or `Closing` (draining). `current_epoch`
//! always points at the one slot new allocations are stamped into;
//! `epoch_advance` moves it forward and marks the vacated slot `Closing`.
//! Per-slot state is stamped with a monotonic `era` so code that carries an
//! epoch id across a ring wrap can tell a stale id from a live one.

use crate::config::EPOCH_COUNT;
use crate::errors::EpochError;
use crate::sync::SpinMutex;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EpochState {
    Active = 0,
    Closing = 1,
}

impl EpochState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => EpochState::Active,
            _ => EpochState::Closing,
        }
    }
}

struct Slot {
    state: AtomicU8,
    era: AtomicU64,
    refcount: AtomicI64,
    open_since: SpinMutex<Instant>,
    label: SpinMutex<Option<String>>,
    /// Global (cross-class) count of live allocations stamped into this
    /// slot; bumped by the allocator facade, not by `SizeClass` directly.
    pub alloc_count: AtomicI64,
}

impl Slot {
    fn new(era: u64, active: bool) -> Self {
        Slot {
            state: AtomicU8::new(if active { 0 } else { 1 }),
            era: AtomicU64::new(era),
            refcount: AtomicI64::new(0),
            open_since: SpinMutex::new(Instant::now()),
            label: SpinMutex::new(None),
            alloc_count: AtomicI64::new(0),
        }
    }
}

pub struct EpochRing {
    slots: Box<[Slot]>,
    current: std::sync::atomic::AtomicUsize,
    era_counter: AtomicU64,
}

impl EpochRing {
    pub fn new() -> Self {
        let slots: Vec<Slot> = (0..EPOCH_COUNT)
            .map(|i| Slot::new(0, i == 0))
            .collect();
        EpochRing {
            slots: slots.into_boxed_slice(),
            current: std::sync::atomic::AtomicUsize::new(0),
            era_counter: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn current(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    #[inline]
    pub fn state(&self, epoch: usize) -> EpochState {
        EpochState::from_u8(self.slots[epoch].state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn era(&self, epoch: usize) -> u64 {
        self.slots[epoch].era.load(Ordering::Acquire)
    }

    pub fn valid_epoch(epoch: usize) -> bool {
        epoch < EPOCH_COUNT
    }

    /// Moves `current_epoch` forward one slot, marks the vacated slot
    /// `Closing`, and resets the newly entered slot. Returns the new
    /// current epoch index.
    pub fn advance(&self) -> usize {
        let old = self.current.load(Ordering::Acquire);
        let new = (old + 1) % EPOCH_COUNT;
        let era = self.era_counter.fetch_add(1, Ordering::Relaxed) + 1;

        self.slots[old].state.store(1, Ordering::Relaxed);

        self.slots[new].state.store(0, Ordering::Relaxed);
        self.slots[new].era.store(era, Ordering::Relaxed);
        self.slots[new].alloc_count.store(0, Ordering::Relaxed);
        self.slots[new].refcount.store(0, Ordering::Relaxed);
        *self.slots[new].open_since.lock() = Instant::now();
        *self.slots[new].label.lock() = None;

        self.current.store(new, Ordering::Release);
        new
    }

    /// Marks `epoch` `Closing`, refusing if a domain still holds a nonzero
    /// refcount on it. The caller (the allocator facade) is responsible for
    /// draining each size class afterward.
    pub fn begin_close(&self, epoch: usize) -> Result<(), EpochError> {
        if !Self::valid_epoch(epoch) {
            return Err(EpochError::InvalidEpoch);
        }
        if self.slots[epoch].refcount.load(Ordering::Acquire) != 0 {
            return Err(EpochError::Busy);
        }
        self.slots[epoch].state.store(1, Ordering::Release);
        Ok(())
    }

    pub fn enter_domain(&self, epoch: usize) -> Result<(), EpochError> {
        if !Self::valid_epoch(epoch) {
            return Err(EpochError::InvalidEpoch);
        }
        self.slots[epoch].refcount.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub fn exit_domain(&self, epoch: usize) {
        if Self::valid_epoch(epoch) {
            self.slots[epoch].refcount.fetch_sub(1, Ordering::AcqRel);
        }
    }

    pub fn refcount(&self, epoch: usize) -> i64 {
        self.slots[epoch].refcount.load(Ordering::Acquire)
    }

    pub fn set_label(&self, epoch: usize, label: Option<String>) {
        if Self::valid_epoch(epoch) {
            *self.slots[epoch].label.lock() = label;
        }
    }

    pub fn label(&self, epoch: usize) -> Option<String> {
        self.slots.get(epoch).and_then(|s| s.label.lock().clone())
    }

    pub fn note_alloc(&self, epoch: usize) {
        self.slots[epoch].alloc_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_free(&self, epoch: usize) {
        self.slots[epoch].alloc_count.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn alloc_count(&self, epoch: usize) -> i64 {
        self.slots[epoch].alloc_count.load(Ordering::Relaxed)
    }

    pub fn open_since(&self, epoch: usize) -> Instant {
        *self.slots[epoch].open_since.lock()
    }
}

impl Default for EpochRing {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for EpochRing {}
unsafe impl Sync for EpochRing {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let ring = EpochRing::new();
        assert_eq!(ring.current(), 0);
        assert_eq!(ring.state(0), EpochState::Active);
    }

    #[test]
    fn test_advance_closes_previous_and_opens_next() {
        let ring = EpochRing::new();
        let new = ring.advance();
        assert_eq!(new, 1);
        assert_eq!(ring.state(0), EpochState::Closing);
        assert_eq!(ring.state(1), EpochState::Active);
        assert!(ring.era(1) > ring.era(0));
    }

    #[test]
    fn test_advance_wraps_around_ring() {
        let ring = EpochRing::new();
        for _ in 0..EPOCH_COUNT {
            ring.advance();
        }
        assert_eq!(ring.current(), 0);
    }

    #[test]
    fn test_begin_close_rejects_busy_domain() {
        let ring = EpochRing::new();
        ring.enter_domain(0).unwrap();
        assert_eq!(ring.begin_close(0), Err(EpochError::Busy));
        ring.exit_domain(0);
        assert!(ring.begin_close(0).is_ok());
    }

    #[test]
    fn test_begin_close_rejects_invalid_epoch() {
        let ring = EpochRing::new();
        assert_eq!(ring.begin_close(EPOCH_COUNT + 5), Err(EpochError::InvalidEpoch));
    }

    #[test]
    fn test_alloc_count_tracks_note_alloc_and_free() {
        let ring = EpochRing::new();
        ring.note_alloc(0);
        ring.note_alloc(0);
        ring.note_free(0);
        assert_eq!(ring.alloc_count(0), 1);
    }
}
