//! NXP LPC1343 port
//!
//! Register-level implementations of the driver traits, the device
//! interrupt vector table expected by `cortex-m-rt`'s `device` feature, and
//! a SysTick based millisecond timer.
//!
//! Pins are not routed by the drivers. Firmware calls the `route_*`
//! functions for the peripherals it uses before starting them.

#![allow(non_camel_case_types)]

use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::{NVIC, SYST};
use portable_atomic::{AtomicU32, Ordering};

use crate::config::{CFG_CORE_CLOCK_HZ, CFG_TICK_RATE_HZ};
use crate::error::{OsError, OsResult};
use crate::port::pins::{self, PinRoute};
use crate::port::{AdcRegs, I2cRegs, OverrunLatch, Port, SpiRegs, TimerRegs, UartRegs};
use crate::system::System;
use crate::types::{Millis, SpiConfig, SpiRole, UartDivisor, UartMode};

// ============ Register access ============

#[inline(always)]
fn read(addr: u32) -> u32 {
    unsafe { (addr as *const u32).read_volatile() }
}

#[inline(always)]
fn write(addr: u32, value: u32) {
    unsafe { (addr as *mut u32).write_volatile(value) }
}

#[inline(always)]
fn modify(addr: u32, f: impl FnOnce(u32) -> u32) {
    write(addr, f(read(addr)));
}

// ============ System control ============

const SYSCON: u32 = 0x4004_8000;
const PRESETCTRL: u32 = SYSCON + 0x004;
const SYSAHBCLKCTRL: u32 = SYSCON + 0x080;
const SSP0CLKDIV: u32 = SYSCON + 0x094;
const UARTCLKDIV: u32 = SYSCON + 0x098;
const PDRUNCFG: u32 = SYSCON + 0x238;

const RST_SSP0: u32 = 1 << 0;
const RST_I2C: u32 = 1 << 1;

const CLK_I2C: u32 = 1 << 5;
const CLK_SSP0: u32 = 1 << 11;
const CLK_UART: u32 = 1 << 12;
const CLK_ADC: u32 = 1 << 13;
const CLK_IOCON: u32 = 1 << 16;

const PD_ADC: u32 = 1 << 4;

// ============ Pin routing ============

const IOCON_BASE: u32 = 0x4004_4000;

fn route(routes: &[PinRoute]) {
    modify(SYSAHBCLKCTRL, |v| v | CLK_IOCON);
    for pin in routes {
        modify(IOCON_BASE + u32::from(pin.iocon), |v| pin.apply(v));
    }
}

/// Connect RXD and TXD
pub fn route_uart() {
    route(&pins::UART_PINS);
}

/// Connect SCL and SDA
pub fn route_i2c() {
    route(&pins::I2C_PINS);
}

/// Connect SCK0, MISO0 and MOSI0
pub fn route_spi() {
    route(&pins::SSP0_PINS);
    write(IOCON_BASE + u32::from(pins::SCK0_LOC), pins::SCK0_ON_PIO0_6);
}

/// Switch the input pin of ADC `channel` to analog
pub fn route_adc(channel: u8) -> OsResult<()> {
    let pin = pins::adc_pin(channel).ok_or(OsError::InvalidChannel)?;
    route(&[pin]);
    Ok(())
}

// ============ UART ============

const UART_BASE: u32 = 0x4000_8000;
const U_RBR_THR_DLL: u32 = UART_BASE;
const U_DLM_IER: u32 = UART_BASE + 0x04;
const U_FCR: u32 = UART_BASE + 0x08;
const U_LCR: u32 = UART_BASE + 0x0C;
const U_LSR: u32 = UART_BASE + 0x14;
const U_FDR: u32 = UART_BASE + 0x28;

const IER_RBR: u32 = 1 << 0;
const IER_THRE: u32 = 1 << 1;
const IER_RLS: u32 = 1 << 2;
const LCR_DLAB: u32 = 1 << 7;
const LSR_RDR: u32 = 1 << 0;
const LSR_OE: u32 = 1 << 1;
const LSR_THRE: u32 = 1 << 5;

/// Depth of the UART transmit FIFO
const UART_TX_FIFO: usize = 16;

/// OE clears when LSR is read, whichever method read it
static UART_OVERRUN: OverrunLatch = OverrunLatch::new();

/// Read LSR once, keeping any overrun it reported
fn lsr() -> u32 {
    let value = read(U_LSR);
    UART_OVERRUN.observe(value & LSR_OE != 0);
    value
}

/// The 16C550-compatible UART
pub struct LpcUart;

impl UartRegs for LpcUart {
    fn enable(&self, divisor: UartDivisor, mode: UartMode) {
        modify(SYSAHBCLKCTRL, |v| v | CLK_UART);
        write(UARTCLKDIV, 1);

        write(U_LCR, u32::from(mode.bits()) | LCR_DLAB);
        write(U_RBR_THR_DLL, u32::from(divisor.divisor & 0xFF));
        write(U_DLM_IER, u32::from(divisor.divisor >> 8));
        write(U_FDR, (u32::from(divisor.frac_d) << 4) | u32::from(divisor.frac_n));
        write(U_LCR, u32::from(mode.bits()));

        // Enable and reset both FIFOs, RX trigger at one byte
        write(U_FCR, 0x07);
        let _ = read(U_LSR);
        UART_OVERRUN.take();
        write(U_DLM_IER, IER_RLS);
    }

    fn disable(&self) {
        write(U_DLM_IER, 0);
        write(U_FCR, 0x06);
        write(UARTCLKDIV, 0);
        modify(SYSAHBCLKCTRL, |v| v & !CLK_UART);
    }

    fn rx_ready(&self) -> bool {
        lsr() & LSR_RDR != 0
    }

    fn read_byte(&self) -> u8 {
        read(U_RBR_THR_DLL) as u8
    }

    fn tx_room(&self) -> usize {
        if lsr() & LSR_THRE != 0 {
            UART_TX_FIFO
        } else {
            0
        }
    }

    fn write_byte(&self, byte: u8) {
        write(U_RBR_THR_DLL, u32::from(byte));
    }

    fn take_overrun(&self) -> bool {
        lsr();
        UART_OVERRUN.take()
    }

    fn set_rx_interrupt(&self, enabled: bool) {
        modify(U_DLM_IER, |v| if enabled { v | IER_RBR } else { v & !IER_RBR });
    }

    fn set_tx_interrupt(&self, enabled: bool) {
        modify(U_DLM_IER, |v| if enabled { v | IER_THRE } else { v & !IER_THRE });
    }
}

// ============ SSP0 ============

const SSP0_BASE: u32 = 0x4004_0000;
const SSP_CR0: u32 = SSP0_BASE;
const SSP_CR1: u32 = SSP0_BASE + 0x04;
const SSP_DR: u32 = SSP0_BASE + 0x08;
const SSP_SR: u32 = SSP0_BASE + 0x0C;
const SSP_CPSR: u32 = SSP0_BASE + 0x10;
const SSP_IMSC: u32 = SSP0_BASE + 0x14;
const SSP_ICR: u32 = SSP0_BASE + 0x20;

const SR_TNF: u32 = 1 << 1;
const SR_RNE: u32 = 1 << 2;
const CR1_SSE: u32 = 1 << 1;
const CR1_MS: u32 = 1 << 2;
/// RX timeout and RX half full
const IMSC_RX: u32 = (1 << 1) | (1 << 2);
/// TX half empty
const IMSC_TX: u32 = 1 << 3;

/// SSP0 in SPI frame format
pub struct LpcSsp0;

impl SpiRegs for LpcSsp0 {
    fn enable(&self, config: SpiConfig, prescaler: u8) {
        modify(PRESETCTRL, |v| v & !RST_SSP0);
        modify(SYSAHBCLKCTRL, |v| v | CLK_SSP0);
        write(SSP0CLKDIV, 1);
        modify(PRESETCTRL, |v| v | RST_SSP0);

        let (cpol, cpha) = config.mode.polarity_phase();
        let cr0 = u32::from(config.frame_bits - 1)
            | (u32::from(cpol) << 6)
            | (u32::from(cpha) << 7)
            | (u32::from(config.clock_divider) << 8);
        write(SSP_CR0, cr0);
        write(SSP_CPSR, u32::from(prescaler));

        let ms = match config.role {
            SpiRole::Master => 0,
            SpiRole::Slave => CR1_MS,
        };
        write(SSP_CR1, ms);
        write(SSP_CR1, ms | CR1_SSE);
    }

    fn disable(&self) {
        write(SSP_IMSC, 0);
        write(SSP_CR1, 0);
        modify(PRESETCTRL, |v| v & !RST_SSP0);
        write(SSP0CLKDIV, 0);
        modify(SYSAHBCLKCTRL, |v| v & !CLK_SSP0);
    }

    fn tx_not_full(&self) -> bool {
        read(SSP_SR) & SR_TNF != 0
    }

    fn rx_not_empty(&self) -> bool {
        read(SSP_SR) & SR_RNE != 0
    }

    fn write_frame(&self, frame: u16) {
        write(SSP_DR, u32::from(frame));
    }

    fn read_frame(&self) -> u16 {
        // Reading clears the RX timeout condition, the flag needs an explicit clear
        write(SSP_ICR, 0x03);
        read(SSP_DR) as u16
    }

    fn set_interrupts(&self, rx: bool, tx: bool) {
        let mut mask = 0;
        if rx {
            mask |= IMSC_RX;
        }
        if tx {
            mask |= IMSC_TX;
        }
        write(SSP_IMSC, mask);
    }
}

// ============ I2C ============

const I2C_BASE: u32 = 0x4000_0000;
const I2C_CONSET: u32 = I2C_BASE;
const I2C_STAT: u32 = I2C_BASE + 0x04;
const I2C_DAT: u32 = I2C_BASE + 0x08;
const I2C_SCLH: u32 = I2C_BASE + 0x10;
const I2C_SCLL: u32 = I2C_BASE + 0x14;
const I2C_CONCLR: u32 = I2C_BASE + 0x18;

/// The I2C bus controller in master mode
pub struct LpcI2c;

impl I2cRegs for LpcI2c {
    fn enable(&self, half_period: u16) {
        modify(PRESETCTRL, |v| v & !RST_I2C);
        modify(SYSAHBCLKCTRL, |v| v | CLK_I2C);
        modify(PRESETCTRL, |v| v | RST_I2C);

        write(I2C_SCLH, u32::from(half_period));
        write(I2C_SCLL, u32::from(half_period));
        write(I2C_CONSET, u32::from(crate::io::i2c::I2C_EN));
    }

    fn disable(&self) {
        write(I2C_CONCLR, 0x6C);
        modify(PRESETCTRL, |v| v & !RST_I2C);
        modify(SYSAHBCLKCTRL, |v| v & !CLK_I2C);
    }

    fn status(&self) -> u8 {
        (read(I2C_STAT) & 0xF8) as u8
    }

    fn read_data(&self) -> u8 {
        read(I2C_DAT) as u8
    }

    fn write_data(&self, byte: u8) {
        write(I2C_DAT, u32::from(byte));
    }

    fn set_control(&self, bits: u8) {
        write(I2C_CONSET, u32::from(bits));
    }

    fn clear_control(&self, bits: u8) {
        write(I2C_CONCLR, u32::from(bits));
    }
}

// ============ ADC ============

const ADC_BASE: u32 = 0x4001_C000;
const AD_CR: u32 = ADC_BASE;
const AD_GDR: u32 = ADC_BASE + 0x04;
const AD_INTEN: u32 = ADC_BASE + 0x0C;

const CR_CLKDIV_MASK: u32 = 0xFF << 8;
const CR_START_NOW: u32 = 1 << 24;
const CR_START_MASK: u32 = 0x7 << 24;
const INTEN_GLOBAL: u32 = 1 << 8;

/// The 10-bit ADC
pub struct LpcAdc;

impl AdcRegs for LpcAdc {
    fn enable(&self, clock_divider: u8) {
        modify(SYSAHBCLKCTRL, |v| v | CLK_ADC);
        write(AD_CR, u32::from(clock_divider) << 8);
        write(AD_INTEN, INTEN_GLOBAL);
    }

    fn disable(&self) {
        write(AD_INTEN, 0);
        write(AD_CR, 0);
        modify(SYSAHBCLKCTRL, |v| v & !CLK_ADC);
    }

    fn set_power(&self, on: bool) {
        modify(PDRUNCFG, |v| if on { v & !PD_ADC } else { v | PD_ADC });
    }

    fn start_conversion(&self, channel: u8) {
        modify(AD_CR, |v| (v & CR_CLKDIV_MASK) | (1 << channel) | CR_START_NOW);
    }

    fn result(&self) -> u16 {
        let gdr = read(AD_GDR);
        modify(AD_CR, |v| v & !CR_START_MASK);
        ((gdr >> 6) & 0x3FF) as u16
    }
}

// ============ SysTick timer ============

static TICKS: AtomicU32 = AtomicU32::new(0);
static TARGET: AtomicU32 = AtomicU32::new(0);

const SYST_ENABLE: u32 = 1 << 0;
const SYST_TICKINT: u32 = 1 << 1;
const SYST_CORE_CLOCK: u32 = 1 << 2;

/// SysTick ticking at `CFG_TICK_RATE_HZ`, counting toward one deadline
pub struct SysTickTimer;

impl SysTickTimer {
    /// Count one tick. Call from the SysTick exception; returns true when the
    /// armed deadline has been reached and the delay timer must be serviced.
    #[inline]
    pub fn tick() -> bool {
        let ticks = TICKS.fetch_add(1, Ordering::Relaxed) + 1;
        ticks >= TARGET.load(Ordering::Relaxed)
    }
}

impl TimerRegs for SysTickTimer {
    fn arm(&self, ms: Millis) {
        TARGET.store(ms, Ordering::Relaxed);
        TICKS.store(0, Ordering::Relaxed);
        unsafe {
            let syst = &*SYST::PTR;
            syst.rvr.write(CFG_CORE_CLOCK_HZ / CFG_TICK_RATE_HZ - 1);
            syst.cvr.write(0);
            syst.csr.write(SYST_ENABLE | SYST_TICKINT | SYST_CORE_CLOCK);
        }
    }

    fn disarm(&self) {
        unsafe { (*SYST::PTR).csr.write(0) };
    }

    fn elapsed(&self) -> Millis {
        TICKS.load(Ordering::Relaxed)
    }
}

// ============ Board ============

/// The LPC1343 register blocks
pub struct Lpc1343;

impl Port for Lpc1343 {
    type Uart = LpcUart;
    type Spi = LpcSsp0;
    type I2c = LpcI2c;
    type Adc = LpcAdc;
    type Timer = SysTickTimer;
}

/// The board's driver set, for placing in a `static`
pub const fn system() -> System<Lpc1343> {
    System::new(SysTickTimer, LpcUart, LpcSsp0, LpcI2c, LpcAdc)
}

/// Unmask the peripheral interrupts the drivers rely on
///
/// # Safety
/// The matching handlers must be installed; see [`Interrupt`].
pub unsafe fn unmask_interrupts() {
    unsafe {
        NVIC::unmask(Interrupt::I2C);
        NVIC::unmask(Interrupt::SSP0);
        NVIC::unmask(Interrupt::UART);
        NVIC::unmask(Interrupt::ADC);
    }
}

// ============ Interrupts ============

/// Device interrupt numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Interrupt {
    /// First of the 40 start-logic wakeup interrupts
    WAKEUP = 0,
    I2C = 40,
    CT16B0 = 41,
    CT16B1 = 42,
    CT32B0 = 43,
    CT32B1 = 44,
    SSP0 = 45,
    UART = 46,
    USB_IRQ = 47,
    USB_FIQ = 48,
    ADC = 49,
    WDT = 50,
    BOD = 51,
    PIOINT3 = 53,
    PIOINT2 = 54,
    PIOINT1 = 55,
    PIOINT0 = 56,
    SSP1 = 57,
}

unsafe impl InterruptNumber for Interrupt {
    #[inline(always)]
    fn number(self) -> u16 {
        self as u16
    }
}

/// Lets `#[cortex_m_rt::interrupt]` resolve handler names
pub use self::Interrupt as interrupt;

extern "C" {
    fn WAKEUP();
    fn I2C();
    fn CT16B0();
    fn CT16B1();
    fn CT32B0();
    fn CT32B1();
    fn SSP0();
    fn UART();
    fn USB_IRQ();
    fn USB_FIQ();
    fn ADC();
    fn WDT();
    fn BOD();
    fn PIOINT3();
    fn PIOINT2();
    fn PIOINT1();
    fn PIOINT0();
    fn SSP1();
}

#[doc(hidden)]
#[derive(Clone, Copy)]
pub union Vector {
    handler: unsafe extern "C" fn(),
    reserved: u32,
}

const WAKE: Vector = Vector { handler: WAKEUP };

#[doc(hidden)]
#[link_section = ".vector_table.interrupts"]
#[no_mangle]
pub static __INTERRUPTS: [Vector; 58] = [
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    WAKE,
    Vector { handler: I2C },
    Vector { handler: CT16B0 },
    Vector { handler: CT16B1 },
    Vector { handler: CT32B0 },
    Vector { handler: CT32B1 },
    Vector { handler: SSP0 },
    Vector { handler: UART },
    Vector { handler: USB_IRQ },
    Vector { handler: USB_FIQ },
    Vector { handler: ADC },
    Vector { handler: WDT },
    Vector { handler: BOD },
    Vector { reserved: 0 },
    Vector { handler: PIOINT3 },
    Vector { handler: PIOINT2 },
    Vector { handler: PIOINT1 },
    Vector { handler: PIOINT0 },
    Vector { handler: SSP1 },
];
