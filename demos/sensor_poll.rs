//! Sensor polling
//!
//! Every 500 ms reads an LM75 temperature sensor over I2C and ADC channel 0
//! at the same time, joins the two Tasks and reports both over the UART.

#![no_std]
#![no_main]

extern crate alloc;

use alloc::format;
use alloc::vec::Vec;

use cortex_m_rt::{entry, exception};
use irqtask::port::lpc13xx::{self, interrupt, Lpc1343, SysTickTimer};
use irqtask::{
    info, warn, Shared, System, UartMode, CFG_I2C_DEFAULT_BIT_RATE, CFG_UART_DEFAULT_BAUD,
};

/// LM75 slave address and temperature register
const LM75: u8 = 0x48;
const LM75_TEMP: u8 = 0x00;

static SYSTEM: System<Lpc1343> = lpc13xx::system();

#[cortex_m_rt::interrupt]
fn UART() {
    SYSTEM.uart.on_interrupt();
}

#[cortex_m_rt::interrupt]
fn I2C() {
    SYSTEM.i2c.on_interrupt();
}

#[cortex_m_rt::interrupt]
fn ADC() {
    SYSTEM.adc.on_interrupt();
}

#[exception]
fn SysTick() {
    if SysTickTimer::tick() {
        SYSTEM.timer.on_interrupt();
    }
}

#[entry]
fn main() -> ! {
    irqtask::os_init().expect("init failed");

    lpc13xx::route_uart();
    lpc13xx::route_i2c();
    lpc13xx::route_adc(0).expect("adc pin");
    SYSTEM.timer.start();
    SYSTEM
        .uart
        .start(CFG_UART_DEFAULT_BAUD, UartMode::EIGHT_N_ONE)
        .expect("uart start failed");
    SYSTEM.i2c.start(CFG_I2C_DEFAULT_BIT_RATE).expect("i2c start failed");
    SYSTEM.adc.start();
    unsafe { lpc13xx::unmask_interrupts() };

    info!("sensor_poll: running");

    let temperature: Shared<Vec<u8>> = Shared::default();
    let level = Shared::new(0u16);

    loop {
        // Register pointer write, then a repeated-START read of two bytes
        SYSTEM.i2c.write(LM75, &[LM75_TEMP]);
        let sensor = SYSTEM.i2c.read(LM75, 2, temperature.clone());
        let analog = SYSTEM.adc.read(0, level.clone());

        if (&sensor + &analog).wait() {
            let raw = temperature.get();
            let half_degrees = i16::from_be_bytes([raw[0], raw[1]]) >> 7;
            let line = format!("t={}.{} adc={}\r\n", half_degrees / 2, (half_degrees & 1) * 5, level.get());
            SYSTEM.uart.write(line.as_bytes());
        } else {
            warn!("sensor_poll: read failed");
        }

        SYSTEM.delay(500).wait();
    }
}
