//! LPC1343 pin routing
//!
//! Which IOCON register carries each peripheral signal and the FUNC value
//! that selects it. Pin choices follow the Galago board's headers.

use crate::config::CFG_ADC_CHANNELS;

/// FUNC, bits 2:0
const FUNC_MASK: u32 = 0x7;
/// MODE, bits 4:3 (pull-up at reset)
const MODE_MASK: u32 = 0x3 << 3;
/// ADMODE, bit 7: set for digital, clear for analog input
const ADMODE_DIGITAL: u32 = 1 << 7;

/// One pin's IOCON register and the function that connects it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinRoute {
    /// Offset from the IOCON base
    pub iocon: u16,
    pub func: u8,
    /// Analog input: pull resistors off, ADMODE cleared
    pub analog: bool,
}

impl PinRoute {
    const fn digital(iocon: u16, func: u8) -> Self {
        PinRoute {
            iocon,
            func,
            analog: false,
        }
    }

    const fn analog(iocon: u16, func: u8) -> Self {
        PinRoute {
            iocon,
            func,
            analog: true,
        }
    }

    /// New IOCON value given the register's `current` value
    pub const fn apply(self, current: u32) -> u32 {
        let value = (current & !FUNC_MASK) | self.func as u32;
        if self.analog {
            value & !(MODE_MASK | ADMODE_DIGITAL)
        } else {
            value
        }
    }
}

/// RXD on PIO1_6, TXD on PIO1_7
pub const UART_PINS: [PinRoute; 2] = [PinRoute::digital(0xA4, 1), PinRoute::digital(0xA8, 1)];

/// SCL on PIO0_4, SDA on PIO0_5 (standard I2C pad mode is the reset value)
pub const I2C_PINS: [PinRoute; 2] = [PinRoute::digital(0x30, 1), PinRoute::digital(0x34, 1)];

/// SCK0 on PIO0_6, MISO0 on PIO0_8, MOSI0 on PIO0_9
pub const SSP0_PINS: [PinRoute; 3] = [
    PinRoute::digital(0x4C, 2),
    PinRoute::digital(0x60, 1),
    PinRoute::digital(0x64, 1),
];

/// IOCON_SCK_LOC and the value that puts SCK0 on PIO0_6
pub const SCK0_LOC: u16 = 0xB0;
pub const SCK0_ON_PIO0_6: u32 = 2;

/// AD0..AD7: PIO0_11, PIO1_0..PIO1_4, PIO1_10, PIO1_11
pub const ADC_PINS: [PinRoute; 8] = [
    PinRoute::analog(0x74, 2),
    PinRoute::analog(0x78, 2),
    PinRoute::analog(0x7C, 2),
    PinRoute::analog(0x80, 2),
    PinRoute::analog(0x90, 2),
    PinRoute::analog(0x94, 1),
    PinRoute::analog(0x6C, 1),
    PinRoute::analog(0x98, 1),
];

/// Input pin for ADC `channel`
pub fn adc_pin(channel: u8) -> Option<PinRoute> {
    if channel >= CFG_ADC_CHANNELS {
        return None;
    }
    ADC_PINS.get(usize::from(channel)).copied()
}
