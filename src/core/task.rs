//! Tasks
//!
//! A Task is a single-assignment, reference-counted completion handle. It
//! starts Pending and moves exactly once to Fulfilled or Rejected. Callbacks
//! registered with [`Task::when`] run once, in registration order, when that
//! happens; after that `when` invokes new callbacks on the spot.
//!
//! Every peripheral operation hands back a Task. The foreground either
//! registers a callback or parks in [`Task::wait`]; the interrupt handler
//! that finishes the operation calls [`Task::complete`].

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::mem;
use core::ops::Add;

use portable_atomic::{AtomicU8, Ordering};

use crate::critical::{critical_section, interrupts_masked, is_isr_context};
use crate::core::cs_cell::CsCell;
use crate::types::TaskStatus;

/// Completion callback: `(context, task, success)`
///
/// The context pointer is opaque to the Task machinery. Registering the same
/// callback with the same context twice on one Task has no effect.
pub type TaskCallback = fn(*mut (), &Task, bool);

/// Shared state behind every handle to one Task
pub struct InternalTask {
    status: AtomicU8,
    callbacks: CsCell<Vec<(TaskCallback, *mut ())>>,
}

// SAFETY: the callback list is only reached inside a critical section; the
// context pointers are opaque tokens owned by whoever registered them.
unsafe impl Send for InternalTask {}
unsafe impl Sync for InternalTask {}

impl InternalTask {
    fn new() -> Self {
        InternalTask {
            status: AtomicU8::new(TaskStatus::Pending as u8),
            callbacks: CsCell::new(Vec::new()),
        }
    }

    #[inline(always)]
    fn status(&self) -> TaskStatus {
        TaskStatus::from_bits(self.status.load(Ordering::Acquire))
    }
}

/// Reference-counted handle to a Task
///
/// Cloning shares the Task; the state is freed with the last handle. The
/// default handle is null and is refused by every operation.
#[derive(Clone, Default)]
pub struct Task {
    inner: Option<Arc<InternalTask>>,
}

impl Task {
    /// Create a Pending task with no callbacks
    pub fn new() -> Self {
        Task {
            inner: Some(Arc::new(InternalTask::new())),
        }
    }

    /// A handle that refers to no task
    pub const fn null() -> Self {
        Task { inner: None }
    }

    /// A task that has already succeeded
    pub fn fulfilled() -> Self {
        let task = Task::new();
        task.complete(true);
        task
    }

    /// A task that has already failed
    pub fn rejected() -> Self {
        let task = Task::new();
        task.complete(false);
        task
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.inner.is_none()
    }

    /// Current state. A null handle reads as Rejected since it can never
    /// succeed.
    #[inline]
    pub fn status(&self) -> TaskStatus {
        match &self.inner {
            Some(inner) => inner.status(),
            None => TaskStatus::Rejected,
        }
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.status() == TaskStatus::Pending
    }

    /// Whether both handles refer to the same task
    pub fn ptr_eq(&self, other: &Task) -> bool {
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Number of live handles, zero for a null handle
    pub fn ref_count(&self) -> usize {
        self.inner.as_ref().map_or(0, Arc::strong_count)
    }

    /// Resolve the task.
    ///
    /// Returns false for a null handle or a task that is already resolved,
    /// in which case nothing happens. Otherwise the status is set and every
    /// registered callback runs once, outside the critical section.
    pub fn complete(&self, success: bool) -> bool {
        let Some(inner) = &self.inner else {
            return false;
        };

        let status = if success {
            TaskStatus::Fulfilled
        } else {
            TaskStatus::Rejected
        };

        let callbacks = critical_section(|cs| {
            if inner.status().is_resolved() {
                return None;
            }
            inner.status.store(status as u8, Ordering::Release);
            Some(mem::take(inner.callbacks.get(cs)))
        });

        match callbacks {
            Some(list) => {
                for &(callback, context) in list.iter() {
                    callback(context, self, success);
                }
                true
            }
            None => false,
        }
    }

    /// Register a completion callback.
    ///
    /// Returns false only for a null handle. On a resolved task the callback
    /// runs immediately with the outcome and is not stored.
    pub fn when(&self, callback: TaskCallback, context: *mut ()) -> bool {
        let Some(inner) = &self.inner else {
            return false;
        };

        let resolved = critical_section(|cs| {
            let status = inner.status();
            if status.is_resolved() {
                return Some(status == TaskStatus::Fulfilled);
            }

            let list = inner.callbacks.get(cs);
            let registered = list
                .iter()
                .any(|&(cb, ctx)| cb as usize == callback as usize && ctx == context);
            if !registered {
                list.push((callback, context));
            }
            None
        });

        if let Some(success) = resolved {
            callback(context, self, success);
        }
        true
    }

    /// Sleep until the task resolves and return whether it succeeded.
    ///
    /// Returns false at once for a null handle, or for a task that is still
    /// Pending when called from an interrupt handler or with interrupts
    /// masked. Nothing could resolve it in either case.
    pub fn wait(&self) -> bool {
        let Some(inner) = &self.inner else {
            return false;
        };

        if inner.status() == TaskStatus::Pending {
            if is_isr_context() {
                crate::warn!("task: wait from interrupt context refused");
                return false;
            }
            if interrupts_masked() {
                crate::warn!("task: wait with interrupts masked refused");
                return false;
            }
            crate::port::sleep_while(|| inner.status() == TaskStatus::Pending);
        }

        inner.status() == TaskStatus::Fulfilled
    }

    /// A task that succeeds when both `self` and `other` succeed and fails
    /// as soon as either fails.
    ///
    /// Joining a task with itself waits for that one task. A null operand
    /// counts as a failed branch.
    ///
    /// The join state lives until every branch has resolved. If the last
    /// handle to a still Pending operand is dropped, that branch never
    /// resolves: the joined task stays Pending and its join state is
    /// leaked. Keep operands alive, or resolve them, until the join
    /// settles.
    pub fn join(&self, other: &Task) -> Task {
        let joined = Task::new();
        let same = self.ptr_eq(other);

        let join = Box::new(Join {
            joined: joined.clone(),
            remaining: AtomicU8::new(if same { 1 } else { 2 }),
        });
        let context = Box::into_raw(join) as *mut ();

        let branches: &[&Task] = if same { &[self] } else { &[self, other] };
        for branch in branches {
            if !branch.when(join_branch, context) {
                join_branch(context, branch, false);
            }
        }

        joined
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(inner) => f
                .debug_struct("Task")
                .field("status", &inner.status())
                .field("refs", &Arc::strong_count(inner))
                .finish(),
            None => f.write_str("Task(null)"),
        }
    }
}

impl Add for &Task {
    type Output = Task;

    fn add(self, rhs: &Task) -> Task {
        self.join(rhs)
    }
}

// ============ Join ============

/// Counter shared by the branches of a join
struct Join {
    joined: Task,
    remaining: AtomicU8,
}

fn join_branch(context: *mut (), _branch: &Task, success: bool) {
    let join = unsafe { &*(context as *const Join) };

    if !success {
        join.joined.complete(false);
    }

    // The branch that takes the counter to zero owns the allocation
    if join.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
        join.joined.complete(true);
        drop(unsafe { Box::from_raw(context as *mut Join) });
    }
}

// ============ Free-function facade ============

/// Create a new Pending task
pub fn create_task() -> Task {
    Task::new()
}

/// Resolve `task`. See [`Task::complete`].
pub fn complete_task(task: &Task, success: bool) -> bool {
    task.complete(success)
}

/// Register `callback` on `task`. See [`Task::when`].
pub fn when(task: &Task, callback: TaskCallback, context: *mut ()) -> bool {
    task.when(callback, context)
}

/// Block until `task` resolves. See [`Task::wait`].
pub fn wait(task: &Task) -> bool {
    task.wait()
}
