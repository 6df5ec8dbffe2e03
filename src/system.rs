//! System facade
//!
//! Owns one driver per peripheral of a [`Port`]. Firmware builds a single
//! `System` in a `static` with [`System::new`] and routes each interrupt
//! vector to the matching driver's `on_interrupt`.

use crate::io::{Adc, I2c, Spi, Timer, Uart};
use crate::port::Port;
use crate::task::{Task, TaskCallback};
use crate::types::Millis;

/// Every driver of one board
pub struct System<P: Port> {
    pub timer: Timer<P::Timer>,
    pub uart: Uart<P::Uart>,
    pub spi: Spi<P::Spi>,
    pub i2c: I2c<P::I2c>,
    pub adc: Adc<P::Adc>,
}

impl<P: Port> System<P> {
    pub const fn new(timer: P::Timer, uart: P::Uart, spi: P::Spi, i2c: P::I2c, adc: P::Adc) -> Self {
        System {
            timer: Timer::new(timer),
            uart: Uart::new(uart),
            spi: Spi::new(spi),
            i2c: I2c::new(i2c),
            adc: Adc::new(adc),
        }
    }

    /// New Pending task
    pub fn create_task(&self) -> Task {
        Task::new()
    }

    /// Register `callback` on `task`; see [`Task::when`]
    pub fn when(&self, task: &Task, callback: TaskCallback, context: *mut ()) -> bool {
        task.when(callback, context)
    }

    /// Resolve `task`; see [`Task::complete`]
    pub fn complete_task(&self, task: &Task, success: bool) -> bool {
        task.complete(success)
    }

    /// Sleep until `task` resolves; see [`Task::wait`]
    pub fn wait(&self, task: &Task) -> bool {
        task.wait()
    }

    /// Task resolving after `ms` milliseconds
    pub fn delay(&self, ms: Millis) -> Task {
        self.timer.delay(ms)
    }

    /// Stop every peripheral, failing all outstanding work
    pub fn shutdown(&self) {
        self.uart.stop();
        self.spi.stop();
        self.i2c.stop();
        self.adc.stop();
        self.timer.stop();
    }
}
