//! Simulated register blocks for driving the peripheral drivers on the host
//!
//! Each simulator implements one register trait from `irqtask::port` and
//! records what the driver did to it. Tests play the hardware side by
//! feeding input and then calling the driver's `on_interrupt`.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use irqtask::io::{Adc, I2c, Spi, Timer};
use irqtask::io::i2c::{I2C_AA, I2C_SI, I2C_STA, I2C_STO};
use irqtask::port::{AdcRegs, I2cRegs, OverrunLatch, Port, SpiRegs, TimerRegs, UartRegs};
use irqtask::{Millis, SpiConfig, UartDivisor, UartMode};

// ============ UART ============

pub struct SimUart {
    pub enabled: Cell<Option<(UartDivisor, UartMode)>>,
    pub rx: RefCell<VecDeque<u8>>,
    pub tx: RefCell<Vec<u8>>,
    /// Bytes accepted per interrupt
    pub tx_room: Cell<usize>,
    pub rx_irq: Cell<bool>,
    pub tx_irq: Cell<bool>,
    /// OE bit; cleared by any status read, like LSR
    pub overrun: Cell<bool>,
    /// Raise OE after this many more bytes are read
    pub overrun_after: Cell<Option<usize>>,
    latch: OverrunLatch,
}

impl SimUart {
    pub fn new() -> Self {
        SimUart {
            enabled: Cell::new(None),
            rx: RefCell::new(VecDeque::new()),
            tx: RefCell::new(Vec::new()),
            tx_room: Cell::new(16),
            rx_irq: Cell::new(false),
            tx_irq: Cell::new(false),
            overrun: Cell::new(false),
            overrun_after: Cell::new(None),
            latch: OverrunLatch::new(),
        }
    }

    fn read_status(&self) {
        self.latch.observe(self.overrun.replace(false));
    }

    /// Bytes arriving on the RX line
    pub fn inject(&self, bytes: &[u8]) {
        self.rx.borrow_mut().extend(bytes.iter().copied());
    }

    pub fn sent(&self) -> Vec<u8> {
        self.tx.borrow().clone()
    }
}

impl UartRegs for SimUart {
    fn enable(&self, divisor: UartDivisor, mode: UartMode) {
        self.enabled.set(Some((divisor, mode)));
    }

    fn disable(&self) {
        self.enabled.set(None);
        self.rx_irq.set(false);
        self.tx_irq.set(false);
    }

    fn rx_ready(&self) -> bool {
        self.read_status();
        !self.rx.borrow().is_empty()
    }

    fn read_byte(&self) -> u8 {
        match self.overrun_after.get() {
            Some(n) if n <= 1 => {
                self.overrun.set(true);
                self.overrun_after.set(None);
            }
            Some(n) => self.overrun_after.set(Some(n - 1)),
            None => {}
        }
        self.rx.borrow_mut().pop_front().unwrap_or(0)
    }

    fn tx_room(&self) -> usize {
        self.read_status();
        self.tx_room.get()
    }

    fn write_byte(&self, byte: u8) {
        self.tx.borrow_mut().push(byte);
    }

    fn take_overrun(&self) -> bool {
        self.read_status();
        self.latch.take()
    }

    fn set_rx_interrupt(&self, enabled: bool) {
        self.rx_irq.set(enabled);
    }

    fn set_tx_interrupt(&self, enabled: bool) {
        self.tx_irq.set(enabled);
    }
}

// ============ SPI ============

pub const SIM_SPI_FIFO: usize = 8;

/// SPI port whose slave answers from a scripted MISO stream, or echoes the
/// frame back once the script runs dry
pub struct SimSpi {
    pub config: Cell<Option<(SpiConfig, u8)>>,
    pub mosi: RefCell<Vec<u16>>,
    pub miso: RefCell<VecDeque<u16>>,
    pub rx_fifo: RefCell<VecDeque<u16>>,
    pub rx_irq: Cell<bool>,
    pub tx_irq: Cell<bool>,
    pub max_in_flight: Cell<usize>,
    /// Frames written but not yet clocked out; only used with `hold`
    pub shifting: RefCell<VecDeque<u16>>,
    /// Keep written frames on the wire until `clock` is called
    pub hold: Cell<bool>,
}

impl SimSpi {
    pub fn new() -> Self {
        SimSpi {
            config: Cell::new(None),
            mosi: RefCell::new(Vec::new()),
            miso: RefCell::new(VecDeque::new()),
            rx_fifo: RefCell::new(VecDeque::new()),
            rx_irq: Cell::new(false),
            tx_irq: Cell::new(false),
            max_in_flight: Cell::new(0),
            shifting: RefCell::new(VecDeque::new()),
            hold: Cell::new(false),
        }
    }

    /// Any SSP interrupt source unmasked
    pub fn irq(&self) -> bool {
        self.rx_irq.get() || self.tx_irq.get()
    }

    /// Finish shifting every held frame into the RX FIFO
    pub fn clock(&self) {
        let mut held = self.shifting.borrow_mut();
        self.rx_fifo.borrow_mut().extend(held.drain(..));
    }

    pub fn script(&self, frames: impl IntoIterator<Item = u16>) {
        self.miso.borrow_mut().extend(frames);
    }
}

impl SpiRegs for SimSpi {
    fn enable(&self, config: SpiConfig, prescaler: u8) {
        self.config.set(Some((config, prescaler)));
    }

    fn disable(&self) {
        self.config.set(None);
        self.rx_fifo.borrow_mut().clear();
        self.shifting.borrow_mut().clear();
    }

    fn tx_not_full(&self) -> bool {
        self.rx_fifo.borrow().len() + self.shifting.borrow().len() < SIM_SPI_FIFO
    }

    fn rx_not_empty(&self) -> bool {
        !self.rx_fifo.borrow().is_empty()
    }

    fn write_frame(&self, frame: u16) {
        self.mosi.borrow_mut().push(frame);
        let answer = self.miso.borrow_mut().pop_front().unwrap_or(frame);
        if self.hold.get() {
            self.shifting.borrow_mut().push_back(answer);
        } else {
            self.rx_fifo.borrow_mut().push_back(answer);
        }
        let in_flight = self.rx_fifo.borrow().len() + self.shifting.borrow().len();
        self.max_in_flight.set(self.max_in_flight.get().max(in_flight));
    }

    fn read_frame(&self) -> u16 {
        self.rx_fifo.borrow_mut().pop_front().unwrap_or(0xFFFF)
    }

    fn set_interrupts(&self, rx: bool, tx: bool) {
        self.rx_irq.set(rx);
        self.tx_irq.set(tx);
    }
}

// ============ I2C ============

const IDLE: u8 = 0xF8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Start,
    RepeatedStart,
    Stop,
    /// Address byte, read flag included
    Address(u8),
    Write(u8),
    Read(u8),
}

/// Bus model of an LPC-style I2C master with scripted slaves.
///
/// The next status code is computed when the driver clears SI, from the
/// control flags and data register it left behind.
pub struct SimI2c {
    pub half_period: Cell<Option<u16>>,
    status: Cell<u8>,
    data: Cell<u8>,
    sta: Cell<bool>,
    sto: Cell<bool>,
    aa: Cell<bool>,
    pub events: RefCell<Vec<BusEvent>>,
    /// Slaves that do not acknowledge their address
    pub absent: RefCell<Vec<u8>>,
    /// Slaves that NACK data bytes
    pub stubborn: RefCell<Vec<u8>>,
    /// Bytes returned by each slave on read
    pub slave_data: RefCell<HashMap<u8, VecDeque<u8>>>,
    current: Cell<u8>,
}

impl SimI2c {
    pub fn new() -> Self {
        SimI2c {
            half_period: Cell::new(None),
            status: Cell::new(IDLE),
            data: Cell::new(0),
            sta: Cell::new(false),
            sto: Cell::new(false),
            aa: Cell::new(false),
            events: RefCell::new(Vec::new()),
            absent: RefCell::new(Vec::new()),
            stubborn: RefCell::new(Vec::new()),
            slave_data: RefCell::new(HashMap::new()),
            current: Cell::new(0),
        }
    }

    /// Interrupt flag
    pub fn irq_pending(&self) -> bool {
        self.status.get() != IDLE
    }

    /// Force a status code, as when another master wins arbitration
    pub fn force_status(&self, code: u8) {
        self.status.set(code);
    }

    pub fn events(&self) -> Vec<BusEvent> {
        self.events.borrow().clone()
    }

    pub fn load(&self, slave: u8, bytes: &[u8]) {
        self.slave_data
            .borrow_mut()
            .entry(slave)
            .or_default()
            .extend(bytes.iter().copied());
    }

    fn log(&self, event: BusEvent) {
        self.events.borrow_mut().push(event);
    }

    fn next_status(&self) {
        let status = self.status.get();

        if self.sto.replace(false) {
            self.log(BusEvent::Stop);
            if self.sta.get() {
                self.log(BusEvent::Start);
                self.status.set(0x08);
            } else {
                self.status.set(IDLE);
            }
            return;
        }

        if self.sta.get() {
            if status == IDLE {
                self.log(BusEvent::Start);
                self.status.set(0x08);
            } else {
                self.log(BusEvent::RepeatedStart);
                self.status.set(0x10);
            }
            return;
        }

        let next = match status {
            0x08 | 0x10 => {
                let address = self.data.get();
                self.log(BusEvent::Address(address));
                self.current.set(address >> 1);
                let present = !self.absent.borrow().contains(&(address >> 1));
                match (address & 1 != 0, present) {
                    (false, true) => 0x18,
                    (false, false) => 0x20,
                    (true, true) => 0x40,
                    (true, false) => 0x48,
                }
            }
            0x18 | 0x28 => {
                self.log(BusEvent::Write(self.data.get()));
                if self.stubborn.borrow().contains(&self.current.get()) {
                    0x30
                } else {
                    0x28
                }
            }
            0x40 | 0x50 => {
                let byte = self
                    .slave_data
                    .borrow_mut()
                    .get_mut(&self.current.get())
                    .and_then(|q| q.pop_front())
                    .unwrap_or(0xFF);
                self.log(BusEvent::Read(byte));
                self.data.set(byte);
                if self.aa.get() {
                    0x50
                } else {
                    0x58
                }
            }
            // Waiting for the driver to issue STOP or START
            _ => IDLE,
        };
        self.status.set(next);
    }
}

impl I2cRegs for SimI2c {
    fn enable(&self, half_period: u16) {
        self.half_period.set(Some(half_period));
    }

    fn disable(&self) {
        self.half_period.set(None);
        self.status.set(IDLE);
    }

    fn status(&self) -> u8 {
        self.status.get()
    }

    fn read_data(&self) -> u8 {
        self.data.get()
    }

    fn write_data(&self, byte: u8) {
        self.data.set(byte);
    }

    fn set_control(&self, bits: u8) {
        if bits & I2C_AA != 0 {
            self.aa.set(true);
        }
        if bits & I2C_STO != 0 {
            self.sto.set(true);
        }
        if bits & I2C_STA != 0 {
            self.sta.set(true);
            if self.status.get() == IDLE && !self.sto.get() {
                self.log(BusEvent::Start);
                self.status.set(0x08);
            }
        }
    }

    fn clear_control(&self, bits: u8) {
        if bits & I2C_AA != 0 {
            self.aa.set(false);
        }
        if bits & I2C_STA != 0 {
            self.sta.set(false);
        }
        if bits & I2C_SI != 0 && self.status.get() != IDLE {
            self.next_status();
        } else if bits & I2C_SI != 0 && self.sto.get() {
            // STOP requested with nothing pending
            self.sto.set(false);
        }
    }
}

// ============ ADC ============

pub struct SimAdc {
    pub divider: Cell<Option<u8>>,
    pub powered: Cell<bool>,
    pub started: RefCell<Vec<u8>>,
    pub readings: RefCell<HashMap<u8, u16>>,
    channel: Cell<Option<u8>>,
}

impl SimAdc {
    pub fn new() -> Self {
        SimAdc {
            divider: Cell::new(None),
            powered: Cell::new(false),
            started: RefCell::new(Vec::new()),
            readings: RefCell::new(HashMap::new()),
            channel: Cell::new(None),
        }
    }

    pub fn set_reading(&self, channel: u8, value: u16) {
        self.readings.borrow_mut().insert(channel, value);
    }

    /// Channel whose conversion is in progress
    pub fn converting(&self) -> Option<u8> {
        self.channel.get()
    }
}

impl AdcRegs for SimAdc {
    fn enable(&self, clock_divider: u8) {
        self.divider.set(Some(clock_divider));
    }

    fn disable(&self) {
        self.divider.set(None);
        self.channel.set(None);
    }

    fn set_power(&self, on: bool) {
        self.powered.set(on);
    }

    fn start_conversion(&self, channel: u8) {
        assert!(self.powered.get(), "conversion started while powered down");
        self.started.borrow_mut().push(channel);
        self.channel.set(Some(channel));
    }

    fn result(&self) -> u16 {
        let channel = self.channel.take().unwrap_or(0);
        self.readings.borrow().get(&channel).copied().unwrap_or(0x3FF)
    }
}

// ============ Timer ============

pub struct SimTimer {
    pub target: Cell<Option<Millis>>,
    elapsed: Cell<Millis>,
    pub arms: Cell<usize>,
}

impl SimTimer {
    pub fn new() -> Self {
        SimTimer {
            target: Cell::new(None),
            elapsed: Cell::new(0),
            arms: Cell::new(0),
        }
    }
}

impl TimerRegs for SimTimer {
    fn arm(&self, ms: Millis) {
        self.target.set(Some(ms));
        self.elapsed.set(0);
        self.arms.set(self.arms.get() + 1);
    }

    fn disarm(&self) {
        self.target.set(None);
        self.elapsed.set(0);
    }

    fn elapsed(&self) -> Millis {
        self.elapsed.get()
    }
}

/// Let `ms` milliseconds pass, firing the timer interrupt at each deadline
pub fn advance(timer: &Timer<SimTimer>, ms: Millis) {
    for _ in 0..ms {
        let regs = timer.regs();
        if let Some(target) = regs.target.get() {
            regs.elapsed.set(regs.elapsed.get() + 1);
            if regs.elapsed.get() >= target {
                timer.on_interrupt();
            }
        }
    }
}

// ============ Helpers ============

/// Run the I2C handler until the bus goes idle
pub fn run_i2c(i2c: &I2c<SimI2c>) {
    for _ in 0..1000 {
        if !i2c.regs().irq_pending() {
            return;
        }
        i2c.on_interrupt();
    }
    panic!("i2c bus never went idle");
}

/// Run the SPI handler until its queue drains
pub fn run_spi(spi: &Spi<SimSpi>) {
    for _ in 0..1000 {
        if spi.pending_frames() == 0 {
            return;
        }
        spi.regs().clock();
        spi.on_interrupt();
    }
    panic!("spi queue never drained");
}

/// Complete the conversion in progress, if any
pub fn convert(adc: &Adc<SimAdc>) -> bool {
    if adc.regs().converting().is_some() {
        adc.on_interrupt();
        true
    } else {
        false
    }
}

pub struct SimPort;

impl Port for SimPort {
    type Uart = SimUart;
    type Spi = SimSpi;
    type I2c = SimI2c;
    type Adc = SimAdc;
    type Timer = SimTimer;
}

pub fn sim_system() -> irqtask::System<SimPort> {
    irqtask::System::new(
        SimTimer::new(),
        SimUart::new(),
        SimSpi::new(),
        SimI2c::new(),
        SimAdc::new(),
    )
}
