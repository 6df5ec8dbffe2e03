//! Compile-time configuration
//!
//! These constants control clock-derived divisors and resource sizes.

/// Core (AHB) clock frequency in Hz. The LPC1343 boots from its 12 MHz IRC.
pub const CFG_CORE_CLOCK_HZ: u32 = 12_000_000;

/// Delay timer resolution in Hz (one tick per millisecond)
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Size of the heap arena in bytes
pub const CFG_HEAP_SIZE: usize = 4096;

/// Capacity of the UART receive ring (one slot stays unused)
pub const CFG_UART_RX_BUFFER_SIZE: usize = 128;

/// Default UART baud rate
pub const CFG_UART_DEFAULT_BAUD: u32 = 9600;

/// Default SPI bit rate
pub const CFG_SPI_DEFAULT_BIT_RATE: u32 = 2_000_000;

/// Depth of the SPI transmit and receive FIFOs
pub const CFG_SPI_FIFO_DEPTH: usize = 8;

/// Default I2C bit rate
pub const CFG_I2C_DEFAULT_BIT_RATE: u32 = 100_000;

/// Upper bound for the ADC conversion clock
pub const CFG_ADC_CLOCK_HZ: u32 = 4_500_000;

/// Number of ADC input channels
pub const CFG_ADC_CHANNELS: u8 = 8;
