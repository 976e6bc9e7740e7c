use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use anyhow::Result;

/// Observable load state of a lazily initialised model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Ready,
    /// Initialisation failed; stays this way for the rest of the session.
    Unavailable,
}

/// Handle to a loaded model, shared by every caller.
pub type SharedModel<T> = Arc<Mutex<Box<T>>>;

enum Slot<T: ?Sized> {
    Unloaded,
    Loading,
    Ready(SharedModel<T>),
    Unavailable,
}

/// Load-once cell for an expensive model.
///
/// The first caller runs the loader; callers arriving while it runs block
/// until it settles and receive the same outcome. A failed load is final.
pub struct LazyModel<T: ?Sized> {
    label: &'static str,
    slot: Mutex<Slot<T>>,
    settled: Condvar,
}

impl<T: ?Sized> LazyModel<T> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            slot: Mutex::new(Slot::Unloaded),
            settled: Condvar::new(),
        }
    }

    pub fn state(&self) -> LoadState {
        match &*self.lock() {
            Slot::Unloaded => LoadState::Unloaded,
            Slot::Loading => LoadState::Loading,
            Slot::Ready(_) => LoadState::Ready,
            Slot::Unavailable => LoadState::Unavailable,
        }
    }

    /// The loaded model if initialisation already finished successfully.
    pub fn ready(&self) -> Option<SharedModel<T>> {
        match &*self.lock() {
            Slot::Ready(model) => Some(model.clone()),
            _ => None,
        }
    }

    /// Return the loaded model, running `load` if nobody has yet.
    pub fn get_or_load<F>(&self, load: F) -> Option<SharedModel<T>>
    where
        F: FnOnce() -> Result<Box<T>>,
    {
        let mut slot = self.lock();
        loop {
            match &*slot {
                Slot::Ready(model) => return Some(model.clone()),
                Slot::Unavailable => return None,
                Slot::Loading => {
                    slot = self
                        .settled
                        .wait(slot)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Slot::Unloaded => break,
            }
        }
        *slot = Slot::Loading;
        drop(slot);

        let mut guard = SettleGuard {
            cell: self,
            armed: true,
        };
        let outcome = load();
        guard.armed = false;

        let mut slot = self.lock();
        let result = match outcome {
            Ok(model) => {
                log::info!("{} model loaded", self.label);
                let shared: SharedModel<T> = Arc::new(Mutex::new(model));
                *slot = Slot::Ready(shared.clone());
                Some(shared)
            }
            Err(e) => {
                log::warn!(
                    "{} model failed to load, disabled for this session: {:#}",
                    self.label,
                    e
                );
                *slot = Slot::Unavailable;
                None
            }
        };
        self.settled.notify_all();
        result
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks the cell unavailable if the loader unwinds, so waiters never hang.
struct SettleGuard<'a, T: ?Sized> {
    cell: &'a LazyModel<T>,
    armed: bool,
}

impl<T: ?Sized> Drop for SettleGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            *self.cell.lock() = Slot::Unavailable;
            self.cell.settled.notify_all();
        }
    }
}
