//! Optional RAII scope that pins an epoch open for the scope's lifetime.
//!
//! A domain is a convenience collaborator, not part of the core allocation
//! path: entering one bumps the epoch's refcount so `epoch_close` rejects
//! with [`crate::errors::EpochError::Busy`] until every domain referencing
//! that epoch has exited. Modeled on the thread cache's drop-based cleanup
//! discipline — acquire a resource in `new`, release it unconditionally in
//! `Drop`, no fallible teardown path.

use crate::epoch::EpochRing;
use crate::errors::EpochError;
use std::sync::Arc;

/// A live reference into one epoch slot. Dropping it releases the
/// reference; holding one makes `epoch_close` on that epoch fail with
/// `EpochError::Busy` until all domains referencing it are gone.
pub struct Domain {
    ring: Arc<EpochRing>,
    epoch: usize,
}

impl Domain {
    pub(crate) fn enter(ring: Arc<EpochRing>, epoch: usize) -> Result<Self, EpochError> {
        ring.enter_domain(epoch)?;
        Ok(Domain { ring, epoch })
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn set_label(&self, label: impl Into<String>) {
        self.ring.set_label(self.epoch, Some(label.into()));
    }

    pub fn label(&self) -> Option<String> {
        self.ring.label(self.epoch)
    }

    pub fn refcount(&self) -> i64 {
        self.ring.refcount(self.epoch)
    }
}

impl Drop for Domain {
    fn drop(&mut self) {
        self.ring.exit_domain(self.epoch);
    }
}
