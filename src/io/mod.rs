//! Interrupt-driven peripheral drivers
//!
//! Every driver owns one [`PeripheralQueue`]: a task queue plus a running
//! flag. Requests allocate their node in the foreground, link it inside a
//! critical section and hand back the node's Task. The interrupt handler
//! advances the head, unlinks finished nodes inside the critical section and
//! resolves their Tasks after leaving it.

use alloc::boxed::Box;

use portable_atomic::{AtomicBool, Ordering};

use crate::critical::{critical_section, CriticalSection};
use crate::core::cs_cell::CsCell;
use crate::queue::{QueueItem, TaskQueue};
use crate::task::Task;

pub mod adc;
pub mod i2c;
pub mod spi;
pub mod timer;
pub mod uart;

pub use adc::Adc;
pub use i2c::I2c;
pub use spi::Spi;
pub use timer::Timer;
pub use uart::Uart;

/// Task queue of one peripheral
pub struct PeripheralQueue<T> {
    started: AtomicBool,
    items: CsCell<TaskQueue<T>>,
}

impl<T> PeripheralQueue<T> {
    pub const fn new() -> Self {
        PeripheralQueue {
            started: AtomicBool::new(false),
            items: CsCell::new(TaskQueue::new()),
        }
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_started(&self, started: bool) {
        self.started.store(started, Ordering::Release);
    }

    #[inline]
    pub(crate) fn get<'a>(&'a self, cs: &'a CriticalSection) -> &'a mut TaskQueue<T> {
        self.items.get(cs)
    }

    /// Number of queued operations, the one in service included
    pub fn len(&self) -> usize {
        critical_section(|cs| self.items.get(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue `op` at the tail.
    ///
    /// `kick` runs inside the same critical section after linking and is
    /// told whether the queue was idle, so the caller can start the
    /// hardware. A stopped peripheral refuses the request with an already
    /// rejected Task.
    pub(crate) fn submit(&self, op: T, kick: impl FnOnce(&CriticalSection, bool)) -> Task {
        self.submit_with(op, |queue, node| queue.push_back(node), kick)
    }

    /// Like [`submit`](Self::submit) with a custom link step
    pub(crate) fn submit_with(
        &self,
        op: T,
        link: impl FnOnce(&mut TaskQueue<T>, Box<QueueItem<T>>),
        kick: impl FnOnce(&CriticalSection, bool),
    ) -> Task {
        if !self.is_started() {
            return Task::rejected();
        }

        let (node, task) = QueueItem::new(op);
        let refused = critical_section(|cs| {
            if !self.is_started() {
                return Some(node);
            }
            let queue = self.items.get(cs);
            let idle = queue.is_empty();
            link(queue, node);
            kick(cs, idle);
            None
        });

        if let Some(node) = refused {
            node.finish(false);
        }
        task
    }

    /// Mark the peripheral stopped and fail every queued Task.
    ///
    /// Runs as one critical section: the queue is failed front to back,
    /// then `release` shuts the hardware down. Returns the number of Tasks
    /// failed.
    pub(crate) fn shutdown(&self, release: impl FnOnce(&CriticalSection)) -> usize {
        critical_section(|cs| {
            self.set_started(false);
            let mut drained = self.items.get(cs).take_all();
            let failed = drained.fail_all();
            release(cs);
            failed
        })
    }
}

impl<T> Default for PeripheralQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
