//! Core type definitions
//!
//! These types provide strong typing for Task state and peripheral modes.

/// Millisecond count used by the delay timer
pub type Millis = u32;

/// Resolution state of a Task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TaskStatus {
    /// Not yet resolved
    Pending = 0,
    /// Resolved successfully
    Fulfilled = 1,
    /// Resolved with failure
    Rejected = 2,
}

impl TaskStatus {
    #[inline]
    pub(crate) const fn from_bits(bits: u8) -> Self {
        match bits {
            1 => TaskStatus::Fulfilled,
            2 => TaskStatus::Rejected,
            _ => TaskStatus::Pending,
        }
    }

    /// Whether the status is terminal
    #[inline]
    pub const fn is_resolved(self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

/// UART frame format, laid out as the 16C550 line control register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartMode(pub u8);

impl UartMode {
    pub const CHARS_5_BIT: u8 = 0x00;
    pub const CHARS_6_BIT: u8 = 0x01;
    pub const CHARS_7_BIT: u8 = 0x02;
    pub const CHARS_8_BIT: u8 = 0x03;

    pub const ONE_STOP_BIT: u8 = 0x00;
    pub const TWO_STOP_BITS: u8 = 0x04;

    pub const NO_PARITY: u8 = 0x00;
    pub const ODD_PARITY: u8 = 0x08;
    pub const EVEN_PARITY: u8 = 0x08 | (0x01 << 4);
    pub const CONSTANT_1_PARITY: u8 = 0x08 | (0x02 << 4);
    pub const CONSTANT_0_PARITY: u8 = 0x08 | (0x03 << 4);

    /// 8 data bits, no parity, one stop bit
    pub const EIGHT_N_ONE: UartMode = UartMode(Self::CHARS_8_BIT | Self::NO_PARITY | Self::ONE_STOP_BIT);

    /// Line control register bits
    #[inline]
    pub const fn bits(self) -> u8 {
        self.0 & 0x3F
    }
}

impl Default for UartMode {
    fn default() -> Self {
        UartMode::EIGHT_N_ONE
    }
}

/// UART baud generator setting: the divisor latch followed by the
/// fractional divider. The line runs at
/// `clock / (16 * divisor * (1 + frac_n / frac_d))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartDivisor {
    /// DLM:DLL
    pub divisor: u16,
    /// DIVADDVAL; zero bypasses the fractional stage
    pub frac_n: u8,
    /// MULVAL, 1..=15
    pub frac_d: u8,
}

impl UartDivisor {
    /// Divisor latch only, fractional stage bypassed
    pub const fn integer(divisor: u16) -> Self {
        UartDivisor {
            divisor,
            frac_n: 0,
            frac_d: 1,
        }
    }

    /// Whether the hardware accepts this combination. A non-zero `frac_n`
    /// needs a divisor of at least 3.
    pub const fn is_valid(self) -> bool {
        self.divisor != 0
            && self.frac_d >= 1
            && self.frac_d <= 15
            && self.frac_n < self.frac_d
            && (self.frac_n == 0 || self.divisor >= 3)
    }

    /// Line rate in baud produced from a `clock` Hz UART clock
    pub fn baud(self, clock: u32) -> u32 {
        let num = u64::from(clock) * u64::from(self.frac_d);
        let den = 16 * u64::from(self.divisor) * (u64::from(self.frac_d) + u64::from(self.frac_n));
        if den == 0 {
            return 0;
        }
        (num / den) as u32
    }
}

/// SPI bus role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiRole {
    #[default]
    Master,
    Slave,
}

/// SPI clock polarity and phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiMode {
    /// SCK idles low, data read on the rising edge
    #[default]
    Mode0,
    /// SCK idles low, data read on the falling edge
    Mode1,
    /// SCK idles high, data read on the rising edge
    Mode2,
    /// SCK idles high, data read on the falling edge
    Mode3,
}

impl SpiMode {
    /// (CPOL, CPHA)
    #[inline]
    pub const fn polarity_phase(self) -> (bool, bool) {
        match self {
            SpiMode::Mode0 => (false, false),
            SpiMode::Mode1 => (false, true),
            SpiMode::Mode2 => (true, false),
            SpiMode::Mode3 => (true, true),
        }
    }
}

/// Register-level SPI configuration computed by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiConfig {
    /// Serial clock rate divider (SCR field)
    pub clock_divider: u8,
    /// Bits per frame, 4..=16
    pub frame_bits: u8,
    pub mode: SpiMode,
    pub role: SpiRole,
}
