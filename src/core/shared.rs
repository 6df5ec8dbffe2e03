//! Output slot shared between a caller and an interrupt handler
//!
//! Read requests hand the driver a `Shared` clone; the handler fills it
//! before resolving the Task, so by the time a callback or `wait` observes
//! success the value is in place.

use alloc::sync::Arc;

use crate::critical::critical_section;
use crate::core::cs_cell::CsCell;

/// Reference-counted, interrupt-safe cell
pub struct Shared<T>(Arc<CsCell<T>>);

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared(Arc::clone(&self.0))
    }
}

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Shared(Arc::new(CsCell::new(value)))
    }

    /// Run `f` on the contents with interrupts masked
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section(|cs| f(self.0.get(cs)))
    }

    pub fn set(&self, value: T) {
        self.with(|slot| *slot = value);
    }

    /// Swap the contents out, leaving the default behind
    pub fn take(&self) -> T
    where
        T: Default,
    {
        self.with(core::mem::take)
    }
}

impl<T: Clone> Shared<T> {
    pub fn get(&self) -> T {
        self.with(|slot| slot.clone())
    }
}

impl<T: Default> Default for Shared<T> {
    fn default() -> Self {
        Shared::new(T::default())
    }
}
