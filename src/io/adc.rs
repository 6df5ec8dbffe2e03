//! ADC driver
//!
//! Conversions run one at a time in queue order. The converter is powered
//! only while there is work: the first request powers it up and the
//! handler powers it down after the last conversion.

use crate::config::{CFG_ADC_CHANNELS, CFG_ADC_CLOCK_HZ, CFG_CORE_CLOCK_HZ};
use crate::critical::critical_section;
use crate::error::{OsError, OsResult};
use crate::io::PeripheralQueue;
use crate::port::AdcRegs;
use crate::shared::Shared;
use crate::task::Task;

/// One queued conversion
pub struct AdcOp {
    pub channel: u8,
    output: Shared<u16>,
}

/// Conversion clock divider keeping the ADC clock at or below its limit
pub const fn clock_divider() -> u8 {
    let div = CFG_CORE_CLOCK_HZ.div_ceil(CFG_ADC_CLOCK_HZ);
    if div == 0 {
        0
    } else if div > 256 {
        255
    } else {
        (div - 1) as u8
    }
}

/// Validate an input channel number
pub fn check_channel(channel: u8) -> OsResult<()> {
    if channel < CFG_ADC_CHANNELS {
        Ok(())
    } else {
        Err(OsError::InvalidChannel)
    }
}

/// Interrupt-driven single-conversion ADC
pub struct Adc<R: AdcRegs> {
    regs: R,
    queue: PeripheralQueue<AdcOp>,
}

impl<R: AdcRegs> Adc<R> {
    pub const fn new(regs: R) -> Self {
        Adc {
            regs,
            queue: PeripheralQueue::new(),
        }
    }

    pub fn regs(&self) -> &R {
        &self.regs
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.queue.is_started()
    }

    pub fn start(&self) {
        critical_section(|_| {
            self.regs.enable(clock_divider());
            self.queue.set_started(true);
        });
        crate::debug!("adc: started, clkdiv {}", clock_divider());
    }

    /// Fail every queued conversion and power the converter down
    pub fn stop(&self) {
        let failed = self.queue.shutdown(|_| {
            self.regs.set_power(false);
            self.regs.disable();
        });
        crate::info!("adc: stopped, {} conversions failed", failed);
    }

    /// Convert `channel`; the result is stored in `output` before the Task
    /// resolves. An out-of-range channel is refused with a rejected Task.
    pub fn read(&self, channel: u8, output: Shared<u16>) -> Task {
        if check_channel(channel).is_err() {
            crate::warn!("adc: channel {} out of range", channel);
            return Task::rejected();
        }

        self.queue.submit(AdcOp { channel, output }, |_, idle| {
            if idle {
                self.regs.set_power(true);
                self.regs.start_conversion(channel);
            }
        })
    }

    /// Conversions queued, the one running included
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// ADC interrupt handler body
    pub fn on_interrupt(&self) {
        let finished = critical_section(|cs| {
            let queue = self.queue.get(cs);
            let value = self.regs.result();
            let node = queue.pop_front()?;
            node.op.output.set(value);

            match queue.front() {
                Some(next) => self.regs.start_conversion(next.op.channel),
                None => self.regs.set_power(false),
            }
            Some(node)
        });

        if let Some(node) = finished {
            node.finish(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_divider() {
        // 12 MHz / 3 = 4 MHz, the fastest rate under 4.5 MHz
        assert_eq!(clock_divider(), 2);
    }

    #[test]
    fn test_channel_range() {
        assert!(check_channel(0).is_ok());
        assert!(check_channel(CFG_ADC_CHANNELS - 1).is_ok());
        assert_eq!(check_channel(CFG_ADC_CHANNELS), Err(OsError::InvalidChannel));
    }
}
