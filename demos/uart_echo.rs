//! UART echo with a heartbeat
//!
//! Echoes every received byte and prints a dot once a second from a timer
//! callback chain.

#![no_std]
#![no_main]

use core::ptr;

use cortex_m_rt::{entry, exception};
use irqtask::port::lpc13xx::{self, interrupt, Lpc1343, SysTickTimer};
use irqtask::{info, System, Task, UartMode, CFG_UART_DEFAULT_BAUD};

static SYSTEM: System<Lpc1343> = lpc13xx::system();

#[cortex_m_rt::interrupt]
fn UART() {
    SYSTEM.uart.on_interrupt();
}

#[exception]
fn SysTick() {
    if SysTickTimer::tick() {
        SYSTEM.timer.on_interrupt();
    }
}

fn heartbeat(_ctx: *mut (), _task: &Task, ok: bool) {
    if ok {
        SYSTEM.uart.write_byte(b'.');
        SYSTEM.delay(1000).when(heartbeat, ptr::null_mut());
    }
}

#[entry]
fn main() -> ! {
    irqtask::os_init().expect("init failed");

    lpc13xx::route_uart();
    SYSTEM.timer.start();
    SYSTEM
        .uart
        .start(CFG_UART_DEFAULT_BAUD, UartMode::EIGHT_N_ONE)
        .expect("uart start failed");
    unsafe { lpc13xx::unmask_interrupts() };

    info!("uart_echo: running");
    SYSTEM.uart.write(b"irqtask echo\r\n").wait();
    SYSTEM.delay(1000).when(heartbeat, ptr::null_mut());

    let mut buf = [0u8; 32];
    while SYSTEM.uart.receive().wait() {
        let n = SYSTEM.uart.read(&mut buf);
        SYSTEM.uart.write(&buf[..n]);
    }

    loop {
        cortex_m::asm::wfi();
    }
}
