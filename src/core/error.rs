//! Error types
//!
//! Configuration-time failures use Rust's Result pattern. Runtime I/O
//! failures never surface here: they travel through a Task's outcome.

/// Firmware error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum OsError {
    // ============ Kernel errors ============
    /// `os_init` was called twice
    OsRunning = 24202,
    /// A facility was used before `os_init`
    OsNotInit = 24203,

    // ============ Heap errors ============
    /// Arena cannot hold a single block
    HeapTooSmall = 22201,
    /// Arena start or size is not word aligned
    HeapMisaligned = 22203,
    /// No free block satisfies the request
    HeapExhausted = 22210,

    // ============ Peripheral errors ============
    /// Baud rate of zero or unreachable from the core clock
    InvalidBaudRate = 30001,
    /// Bus bit rate of zero or unreachable from the core clock
    InvalidBitRate = 30002,
    /// ADC channel out of range
    InvalidChannel = 30003,
}

/// Result type alias for fallible configuration calls
pub type OsResult<T> = Result<T, OsError>;

impl OsError {
    /// Numeric error code
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Whether the error leaves the system without a way forward
    #[inline]
    pub fn is_fatal(self) -> bool {
        matches!(self, OsError::HeapExhausted)
    }
}

/// Halt on an unrecoverable error
///
/// There is no fallback memory source and no supervisor to report to, so
/// the only option is to log and stop. The panic handler parks the core.
#[cold]
#[inline(never)]
pub fn fatal(err: OsError) -> ! {
    crate::error!("fatal error {}", err.code());
    panic!("fatal error {:?}", err);
}
