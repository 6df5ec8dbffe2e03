//! Delay timer
//!
//! Pending delays are kept sorted by remaining time. The hardware counter is
//! only ever armed for the nearest deadline; whenever it fires, or a new
//! delay arrives, the time elapsed since it was armed is subtracted from
//! every queued deadline before anything else happens.

use crate::critical::critical_section;
use crate::io::PeripheralQueue;
use crate::port::TimerRegs;
use crate::queue::TaskQueue;
use crate::task::Task;
use crate::types::Millis;

/// A queued delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    /// Milliseconds left, as of the last rebase
    pub remaining: Millis,
}

/// Millisecond delay service
pub struct Timer<R: TimerRegs> {
    regs: R,
    queue: PeripheralQueue<Deadline>,
}

impl<R: TimerRegs> Timer<R> {
    pub const fn new(regs: R) -> Self {
        Timer {
            regs,
            queue: PeripheralQueue::new(),
        }
    }

    pub fn regs(&self) -> &R {
        &self.regs
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.queue.is_started()
    }

    /// Accept delays. The counter stays idle until one is queued.
    pub fn start(&self) {
        self.queue.set_started(true);
        crate::debug!("timer: started");
    }

    /// Fail every pending delay and halt the counter
    pub fn stop(&self) {
        let failed = self.queue.shutdown(|_| self.regs.disarm());
        crate::info!("timer: stopped, {} delays failed", failed);
    }

    /// A Task that resolves `ms` milliseconds from now.
    ///
    /// A zero delay resolves immediately.
    pub fn delay(&self, ms: Millis) -> Task {
        if ms == 0 && self.is_started() {
            return Task::fulfilled();
        }

        self.queue.submit_with(
            Deadline { remaining: ms },
            |queue, node| {
                rebase(queue, self.regs.elapsed());
                queue.insert_by(node, |new, old| new.remaining < old.remaining);
            },
            |_, _| self.rearm_head(),
        )
    }

    /// Delays not yet expired
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Milliseconds until the nearest deadline
    pub fn next_deadline(&self) -> Option<Millis> {
        critical_section(|cs| {
            let head = self.queue.get(cs).front()?;
            Some(head.op.remaining.saturating_sub(self.regs.elapsed()))
        })
    }

    /// Program the counter for the head deadline, or halt it
    fn rearm_head(&self) {
        critical_section(|cs| match self.queue.get(cs).front() {
            Some(head) => self.regs.arm(head.op.remaining.max(1)),
            None => self.regs.disarm(),
        })
    }

    /// Timer interrupt handler body
    pub fn on_interrupt(&self) {
        let mut expired = critical_section(|cs| {
            let queue = self.queue.get(cs);
            rebase(queue, self.regs.elapsed());

            let mut expired = TaskQueue::new();
            while queue.front().is_some_and(|head| head.op.remaining == 0) {
                if let Some(node) = queue.pop_front() {
                    expired.push_back(node);
                }
            }

            self.rearm_head();
            expired
        });

        expired.resolve_all(true);
    }
}

/// Charge `elapsed` milliseconds against every queued deadline
fn rebase(queue: &mut TaskQueue<Deadline>, elapsed: Millis) {
    if elapsed == 0 {
        return;
    }
    for deadline in queue.iter_mut() {
        deadline.remaining = deadline.remaining.saturating_sub(elapsed);
    }
}
