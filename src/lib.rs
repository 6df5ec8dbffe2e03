//! Interrupt-driven Task/Promise I/O core for bare-metal Cortex-M
//!
//! A small firmware core providing:
//! - A first-fit heap allocator that backs every dynamic allocation
//! - Reference-counted single-assignment Tasks with completion callbacks
//! - Interrupt-driven UART, SPI, I2C, ADC and delay-timer drivers, each
//!   exposing its operations as Tasks resolved from the interrupt handler

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

// Host builds track the simulated interrupt mask per thread
#[cfg(all(not(test), not(target_arch = "arm")))]
extern crate std;

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod core;
pub mod io;
pub mod port;
pub mod system;

// ============ Re-exports ============

pub use crate::core::config;
pub use crate::core::config::*;
pub use crate::core::critical;
pub use crate::core::error;
pub use crate::core::error::{OsError, OsResult};
pub use crate::core::heap;
pub use crate::core::kernel;
pub use crate::core::kernel::os_init;
pub use crate::core::queue;
pub use crate::core::ring;
pub use crate::core::ring::CircularBuffer;
pub use crate::core::shared;
pub use crate::core::shared::Shared;
pub use crate::core::task;
pub use crate::core::task::{complete_task, create_task, wait, when, Task, TaskCallback};
pub use crate::core::types;
pub use crate::core::types::*;

pub use system::System;
