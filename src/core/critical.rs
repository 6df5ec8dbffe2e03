//! Critical section handling
//!
//! The global interrupt mask is the only mutual-exclusion primitive in the
//! system. Every structure shared between foreground code and an interrupt
//! handler is reached through a [`CsCell`](crate::core::cs_cell::CsCell),
//! which demands a live [`CriticalSection`] guard.

use critical_section::RestoreState;

#[cfg(not(target_arch = "arm"))]
std::thread_local! {
    static DEPTH: core::cell::Cell<usize> = const { core::cell::Cell::new(0) };
}

/// RAII guard for critical sections
///
/// When this guard is created, interrupts are disabled.
/// When it is dropped, the interrupt mask is restored to its previous state,
/// so sections nest correctly, including inside interrupt handlers.
pub struct CriticalSection {
    restore: RestoreState,
}

impl CriticalSection {
    /// Enter a critical section by disabling interrupts.
    ///
    /// Returns a guard that will restore interrupt state when dropped.
    #[inline(always)]
    pub fn enter() -> Self {
        let restore = unsafe { critical_section::acquire() };
        #[cfg(not(target_arch = "arm"))]
        DEPTH.with(|depth| depth.set(depth.get() + 1));
        CriticalSection { restore }
    }
}

impl Drop for CriticalSection {
    #[inline(always)]
    fn drop(&mut self) {
        #[cfg(not(target_arch = "arm"))]
        DEPTH.with(|depth| depth.set(depth.get() - 1));
        unsafe { critical_section::release(self.restore) };
    }
}

/// Execute a closure with interrupts disabled
///
/// The closure receives a reference to the critical section guard,
/// which can be used to access [`CsCell`](crate::core::cs_cell::CsCell)
/// protected data.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    let cs = CriticalSection::enter();
    f(&cs)
}

/// Check if currently executing in an ISR context
#[inline]
pub fn is_isr_context() -> bool {
    #[cfg(target_arch = "arm")]
    {
        let ipsr: u32;
        unsafe {
            core::arch::asm!(
                "mrs {}, IPSR",
                out(reg) ipsr,
                options(nomem, nostack, preserves_flags)
            );
        }
        ipsr != 0
    }

    #[cfg(not(target_arch = "arm"))]
    {
        false
    }
}

/// Whether interrupts are currently masked. On the host this means a
/// [`CriticalSection`] is alive on the calling thread.
#[inline]
pub fn interrupts_masked() -> bool {
    #[cfg(target_arch = "arm")]
    {
        cortex_m::register::primask::read().is_inactive()
    }

    #[cfg(not(target_arch = "arm"))]
    {
        DEPTH.with(|depth| depth.get() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_tracks_nesting() {
        assert!(!interrupts_masked());
        critical_section(|_| {
            assert!(interrupts_masked());
            critical_section(|_| assert!(interrupts_masked()));
            assert!(interrupts_masked());
        });
        assert!(!interrupts_masked());
    }
}
