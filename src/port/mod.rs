//! Port layer - hardware access for the peripheral drivers
//!
//! Drivers never touch registers directly. Each one is generic over a
//! register trait defined here, so the same interrupt state machines run
//! against the LPC13xx MMIO implementation on the board and against
//! simulated registers on the host.
//!
//! All methods take `&self`: register blocks are shared between foreground
//! code and interrupt handlers, and the drivers serialize access with the
//! critical section where it matters.

use portable_atomic::{AtomicBool, Ordering};

use crate::types::{Millis, SpiConfig, UartDivisor, UartMode};

#[cfg(all(feature = "lpc13xx", target_arch = "arm"))]
pub mod lpc13xx;
pub mod pins;

// ============ Register traits ============

/// 16C550-style UART
pub trait UartRegs {
    /// Clock the block, program the baud generator and frame format,
    /// enable FIFOs
    fn enable(&self, divisor: UartDivisor, mode: UartMode);
    /// Disable interrupts and gate the clock
    fn disable(&self);
    /// A received byte is waiting
    fn rx_ready(&self) -> bool;
    fn read_byte(&self) -> u8;
    /// Bytes that can be written without blocking
    fn tx_room(&self) -> usize;
    fn write_byte(&self, byte: u8);
    /// Report and clear a receiver overrun, including one already seen by
    /// an earlier `rx_ready` or `tx_room` status read
    fn take_overrun(&self) -> bool;
    fn set_rx_interrupt(&self, enabled: bool);
    fn set_tx_interrupt(&self, enabled: bool);
}

/// Sticky copy of a clear-on-read overrun bit. Every UART status read
/// feeds it, so an overrun seen while polling for data is kept until
/// `take_overrun`.
pub struct OverrunLatch(AtomicBool);

impl OverrunLatch {
    pub const fn new() -> Self {
        OverrunLatch(AtomicBool::new(false))
    }

    /// Record the overrun bit from a status read
    #[inline]
    pub fn observe(&self, overrun: bool) {
        if overrun {
            self.0.store(true, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::Relaxed)
    }
}

impl Default for OverrunLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Synchronous serial port with transmit and receive FIFOs
pub trait SpiRegs {
    /// Clock the block and apply `config`; `prescaler` is the even CPSR value
    fn enable(&self, config: SpiConfig, prescaler: u8);
    fn disable(&self);
    fn tx_not_full(&self) -> bool;
    fn rx_not_empty(&self) -> bool;
    fn write_frame(&self, frame: u16);
    fn read_frame(&self) -> u16;
    /// Enable or mask the receive interrupts (RX half full, RX timeout)
    /// and the TX half-empty interrupt. TX half-empty is level triggered,
    /// so it stays masked while there is nothing the handler may send.
    fn set_interrupts(&self, rx: bool, tx: bool);
}

/// I2C master with an LPC-style status register
pub trait I2cRegs {
    /// Clock the block, program SCL high and low periods, set I2EN
    fn enable(&self, half_period: u16);
    fn disable(&self);
    /// Current bus state code
    fn status(&self) -> u8;
    fn read_data(&self) -> u8;
    fn write_data(&self, byte: u8);
    /// Set bits in the control register (CONSET)
    fn set_control(&self, bits: u8);
    /// Clear bits in the control register (CONCLR)
    fn clear_control(&self, bits: u8);
}

/// Successive approximation ADC
pub trait AdcRegs {
    /// Clock the block and program the conversion clock divider
    fn enable(&self, clock_divider: u8);
    fn disable(&self);
    /// Power the analog front end up or down
    fn set_power(&self, on: bool);
    /// Start a single conversion on `channel` with its completion interrupt
    fn start_conversion(&self, channel: u8);
    /// Result of the last conversion, right aligned
    fn result(&self) -> u16;
}

/// One-shot millisecond down-counter
pub trait TimerRegs {
    /// Restart the count and fire once `ms` milliseconds from now
    fn arm(&self, ms: Millis);
    fn disarm(&self);
    /// Milliseconds counted since the last `arm`
    fn elapsed(&self) -> Millis;
}

/// The register blocks of one board
pub trait Port {
    type Uart: UartRegs;
    type Spi: SpiRegs;
    type I2c: I2cRegs;
    type Adc: AdcRegs;
    type Timer: TimerRegs;
}

// ============ Low-power wait ============

/// Sleep until `pending` returns false.
///
/// Interrupts are masked between the check and `WFI`, so an interrupt that
/// resolves the condition in that window still wakes the core: a pending
/// interrupt ends `WFI` even while PRIMASK is set, and is taken as soon as
/// interrupts are re-enabled.
///
/// Called with interrupts already masked it returns at once and leaves the
/// mask alone, since no handler could change the condition.
#[cfg(target_arch = "arm")]
pub fn sleep_while(pending: impl Fn() -> bool) {
    if cortex_m::register::primask::read().is_inactive() {
        return;
    }
    loop {
        cortex_m::interrupt::disable();
        if !pending() {
            unsafe { cortex_m::interrupt::enable() };
            return;
        }
        cortex_m::asm::wfi();
        unsafe { cortex_m::interrupt::enable() };
    }
}

// Host builds have nothing to sleep on; another thread resolves the task
#[cfg(not(target_arch = "arm"))]
pub fn sleep_while(pending: impl Fn() -> bool) {
    while pending() {
        core::hint::spin_loop();
    }
}
