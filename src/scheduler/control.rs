//! Per-item stop flags for running workers.
//!
//! Workers check their flag, together with any request stored on the row, at
//! every unit boundary (before resolution, between child tracks, and after
//! the last unit). When several stop requests race, the strongest wins:
//! cancel beats pause, and pause beats a shutdown interrupt.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use dashmap::DashMap;

use crate::queue::StopRequest;

/// Why a worker should stop early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum StopSignal {
    /// Scheduler shutdown; the item goes back to pending.
    Interrupt = 1,
    /// User pause; the item becomes paused.
    Pause = 2,
    /// User cancel; the item fails with "cancelled by user".
    Cancel = 3,
}

impl StopSignal {
    /// Pause and cancel; a shutdown interrupt is not a user request.
    pub(crate) fn is_user_request(self) -> bool {
        !matches!(self, Self::Interrupt)
    }

    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Interrupt),
            2 => Some(Self::Pause),
            3 => Some(Self::Cancel),
            _ => None,
        }
    }
}

impl From<StopRequest> for StopSignal {
    fn from(request: StopRequest) -> Self {
        match request {
            StopRequest::Pause => Self::Pause,
            StopRequest::Cancel => Self::Cancel,
        }
    }
}

/// Stop flag owned by one running worker.
#[derive(Debug, Default)]
pub(crate) struct ItemControl {
    flag: AtomicU8,
}

impl ItemControl {
    pub(crate) fn request(&self, signal: StopSignal) {
        self.flag.fetch_max(signal as u8, Ordering::SeqCst);
    }

    pub(crate) fn requested(&self) -> Option<StopSignal> {
        StopSignal::from_raw(self.flag.load(Ordering::SeqCst))
    }
}

/// Flags for every item a worker currently holds.
#[derive(Debug, Default)]
pub(crate) struct ControlRegistry {
    active: DashMap<String, Arc<ItemControl>>,
}

impl ControlRegistry {
    /// Installs a fresh flag for a newly claimed item.
    pub(crate) fn register(&self, id: &str) -> Arc<ItemControl> {
        let control = Arc::new(ItemControl::default());
        self.active.insert(id.to_string(), Arc::clone(&control));
        control
    }

    /// Raises `signal` on a held item. Returns false if no worker holds it.
    pub(crate) fn request(&self, id: &str, signal: StopSignal) -> bool {
        match self.active.get(id) {
            Some(control) => {
                control.request(signal);
                true
            }
            None => false,
        }
    }

    /// Raises an interrupt on every held item.
    pub(crate) fn interrupt_all(&self) {
        for entry in &self.active {
            entry.value().request(StopSignal::Interrupt);
        }
    }

    /// Drops the flag once the worker is done with the item.
    ///
    /// Only removes `control` itself; a flag registered by a later claim of
    /// the same id stays in place.
    pub(crate) fn release(&self, id: &str, control: &Arc<ItemControl>) {
        self.active
            .remove_if(id, |_, current| Arc::ptr_eq(current, control));
    }

    pub(crate) fn active_count(&self) -> usize {
        self.active.len()
    }
}
