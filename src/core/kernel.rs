//! Global firmware state and initialization
//!
//! Owns the heap arena and the allocator in front of it. On the target the
//! allocator is installed as the global allocator, so `os_init` must run
//! before anything touches `Box`, `Vec` or a Task.

use portable_atomic::{AtomicBool, Ordering};

use crate::config::CFG_HEAP_SIZE;
use crate::core::cs_cell::CsCell;
use crate::error::{OsError, OsResult};
use crate::heap::{LockedHeap, WORD};

// ============ Kernel State ============

/// Atomic kernel flags
pub struct KernelFlags {
    initialized: AtomicBool,
}

impl KernelFlags {
    const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
        }
    }

    /// Check if `os_init` has completed
    #[inline(always)]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Claim initialization. Returns false if it was already claimed.
    #[inline(always)]
    fn claim(&self) -> bool {
        !self.initialized.swap(true, Ordering::AcqRel)
    }
}

// ============ Global Instances ============

/// Global kernel state instance
pub(crate) static KERNEL: KernelFlags = KernelFlags::new();

/// Backing storage for the heap
static ARENA: CsCell<[u32; CFG_HEAP_SIZE / WORD]> = CsCell::new([0; CFG_HEAP_SIZE / WORD]);

/// The firmware heap
#[cfg_attr(target_arch = "arm", global_allocator)]
pub static HEAP: LockedHeap = LockedHeap::empty();

// ============ Public API ============

/// Initialize the firmware core
///
/// Hands the static arena to the heap. Must be the first call after reset.
///
/// # Returns
/// * `Ok(())` - Initialization successful
/// * `Err(OsError::OsRunning)` - Already initialized
pub fn os_init() -> OsResult<()> {
    if !KERNEL.claim() {
        return Err(OsError::OsRunning);
    }

    // SAFETY: `claim` succeeds once, so the arena is handed over exactly once
    // and nothing else ever references it.
    unsafe {
        let arena = ARENA.get_unchecked();
        HEAP.init(arena.as_mut_ptr() as *mut u8, CFG_HEAP_SIZE)?;
    }

    crate::info!("irqtask: initialized, heap {} bytes", CFG_HEAP_SIZE);
    Ok(())
}

/// Whether `os_init` has run
#[inline]
pub fn is_initialized() -> bool {
    KERNEL.is_initialized()
}

/// Heap usage as `(used_words, free_words)`
///
/// # Returns
/// * `Err(OsError::OsNotInit)` - `os_init` has not run
pub fn heap_usage() -> OsResult<(usize, usize)> {
    if !KERNEL.is_initialized() {
        return Err(OsError::OsNotInit);
    }
    Ok(HEAP.with(|heap| (heap.used_words(), heap.free_words())))
}
