//! SPI driver
//!
//! Transfers are full duplex: every frame written clocks one frame in. Each
//! queued transfer owns a halfword buffer that is sent from the front and
//! overwritten in place by the received frames, so when both cursors reach
//! the end the buffer holds exactly what the bus returned.
//!
//! The interrupt handler keeps at most one FIFO's worth of frames in flight
//! so the receive FIFO can never overrun.

use alloc::vec;
use alloc::vec::Vec;
use core::mem;

use crate::config::{CFG_CORE_CLOCK_HZ, CFG_SPI_FIFO_DEPTH};
use crate::critical::critical_section;
use crate::error::{OsError, OsResult};
use crate::io::PeripheralQueue;
use crate::port::SpiRegs;
use crate::queue::TaskQueue;
use crate::shared::Shared;
use crate::task::Task;
use crate::types::{SpiConfig, SpiMode, SpiRole};

/// Clock prescaler applied ahead of the serial clock divider
pub const SPI_PRESCALER: u8 = 2;

/// Where received frames go once a transfer completes
pub enum Readback {
    Discard,
    Bytes(Shared<Vec<u8>>),
    Halfwords(Shared<Vec<u16>>),
}

/// One queued transfer
pub struct SpiOp {
    frames: Vec<u16>,
    tx: usize,
    rx: usize,
    readback: Readback,
}

impl SpiOp {
    fn new(frames: Vec<u16>, readback: Readback) -> Self {
        SpiOp {
            frames,
            tx: 0,
            rx: 0,
            readback,
        }
    }

    /// Frames not yet received back
    #[inline]
    pub fn remaining(&self) -> usize {
        self.frames.len() - self.rx
    }

    /// Move received frames to the read-back slot
    fn deliver(&mut self) {
        match &self.readback {
            Readback::Discard => {}
            Readback::Bytes(out) => out.set(self.frames.iter().map(|&f| f as u8).collect()),
            Readback::Halfwords(out) => out.set(mem::take(&mut self.frames)),
        }
    }
}

/// Serial clock divider for `bit_rate` with the fixed prescaler
///
/// # Returns
/// * `Err(OsError::InvalidBitRate)` - zero, faster than the core allows, or
///   too slow for the 8-bit divider
pub fn clock_divider_for(bit_rate: u32) -> OsResult<u8> {
    let ticks = bit_rate
        .checked_mul(SPI_PRESCALER as u32)
        .filter(|&d| d != 0)
        .map(|d| CFG_CORE_CLOCK_HZ / d)
        .ok_or(OsError::InvalidBitRate)?;

    if ticks == 0 {
        return Err(OsError::InvalidBitRate);
    }
    u8::try_from(ticks - 1).map_err(|_| OsError::InvalidBitRate)
}

/// Interrupt-driven SPI master or slave
pub struct Spi<R: SpiRegs> {
    regs: R,
    queue: PeripheralQueue<SpiOp>,
}

impl<R: SpiRegs> Spi<R> {
    pub const fn new(regs: R) -> Self {
        Spi {
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

    /// Start with 8-bit frames
    pub fn start(&self, bit_rate: u32, role: SpiRole, mode: SpiMode) -> OsResult<()> {
        self.start_framed(bit_rate, role, mode, 8)
    }

    /// Start with `frame_bits` per frame, clamped to 4..=16
    pub fn start_framed(&self, bit_rate: u32, role: SpiRole, mode: SpiMode, frame_bits: u8) -> OsResult<()> {
        let config = SpiConfig {
            clock_divider: clock_divider_for(bit_rate)?,
            frame_bits: frame_bits.clamp(4, 16),
            mode,
            role,
        };

        critical_section(|_| {
            self.regs.enable(config, SPI_PRESCALER);
            self.regs.set_interrupts(false, false);
            self.queue.set_started(true);
        });

        crate::info!("spi: started at {} bit/s, scr {}", bit_rate, config.clock_divider);
        Ok(())
    }

    /// Fail every queued transfer and power the port down
    pub fn stop(&self) {
        let failed = self.queue.shutdown(|_| {
            self.regs.set_interrupts(false, false);
            self.regs.disable();
        });
        crate::info!("spi: stopped, {} transfers failed", failed);
    }

    fn transfer(&self, frames: Vec<u16>, readback: Readback) -> Task {
        if frames.is_empty() && self.is_started() {
            return Task::fulfilled();
        }
        self.queue.submit(SpiOp::new(frames, readback), |_, idle| {
            if idle {
                self.regs.set_interrupts(true, true);
            }
        })
    }

    /// Send `data`; received bytes land in `readback` if given
    pub fn write(&self, data: &[u8], readback: Option<Shared<Vec<u8>>>) -> Task {
        let frames = data.iter().map(|&b| u16::from(b)).collect();
        self.transfer(frames, readback.map_or(Readback::Discard, Readback::Bytes))
    }

    /// Send halfword frames; received frames land in `readback` if given
    pub fn write_halfwords(&self, data: &[u16], readback: Option<Shared<Vec<u16>>>) -> Task {
        self.transfer(data.to_vec(), readback.map_or(Readback::Discard, Readback::Halfwords))
    }

    /// Send `value` `len` times, discarding what comes back
    pub fn write_repeated(&self, value: u16, len: usize) -> Task {
        self.transfer(vec![value; len], Readback::Discard)
    }

    /// Clock in `len` bytes while sending `fill`
    pub fn read(&self, len: usize, out: Shared<Vec<u8>>, fill: u8) -> Task {
        self.transfer(vec![u16::from(fill); len], Readback::Bytes(out))
    }

    /// Clock in `len` halfword frames while sending `fill`
    pub fn read_halfwords(&self, len: usize, out: Shared<Vec<u16>>, fill: u16) -> Task {
        self.transfer(vec![fill; len], Readback::Halfwords(out))
    }

    /// Frames still to be exchanged across every queued transfer
    pub fn pending_frames(&self) -> usize {
        critical_section(|cs| self.queue.get(cs).iter().map(|item| item.op.remaining()).sum())
    }

    /// SSP interrupt handler body
    pub fn on_interrupt(&self) {
        let mut finished = critical_section(|cs| {
            let queue = self.queue.get(cs);
            let mut finished = TaskQueue::new();

            while let Some(head) = queue.front_mut() {
                let op = &mut head.op;
                let len = op.frames.len();

                loop {
                    let progress = (op.tx, op.rx);
                    while op.rx < op.tx && self.regs.rx_not_empty() {
                        op.frames[op.rx] = self.regs.read_frame();
                        op.rx += 1;
                    }
                    while op.tx < len && op.tx - op.rx < CFG_SPI_FIFO_DEPTH && self.regs.tx_not_full() {
                        self.regs.write_frame(op.frames[op.tx]);
                        op.tx += 1;
                    }
                    if (op.tx, op.rx) == progress {
                        break;
                    }
                }

                if op.rx < len {
                    break;
                }
                if let Some(node) = queue.pop_front() {
                    finished.push_back(node);
                }
            }

            // TX only while the head may still put frames in the FIFO
            match queue.front() {
                Some(head) => {
                    let op = &head.op;
                    let may_send = op.tx < op.frames.len() && op.tx - op.rx < CFG_SPI_FIFO_DEPTH;
                    self.regs.set_interrupts(true, may_send);
                }
                None => self.regs.set_interrupts(false, false),
            }
            finished
        });

        while let Some(mut node) = finished.pop_front() {
            node.op.deliver();
            node.finish(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_divider() {
        // 12 MHz / (2 * (2 + 1)) = 2 MHz
        assert_eq!(clock_divider_for(2_000_000), Ok(2));
        assert_eq!(clock_divider_for(6_000_000), Ok(0));
        assert_eq!(clock_divider_for(0), Err(OsError::InvalidBitRate));
        assert_eq!(clock_divider_for(12_000_000), Err(OsError::InvalidBitRate));
        // 12 MHz / 2 / 1 kHz = 6000, far beyond the divider
        assert_eq!(clock_divider_for(1_000), Err(OsError::InvalidBitRate));
    }
}
