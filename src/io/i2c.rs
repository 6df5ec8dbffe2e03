//! I2C master driver
//!
//! One packet is on the bus at a time. The interrupt handler is a state
//! machine keyed by the controller's status code; it advances the head
//! packet and decides how the bus is handed to the next one. Back-to-back
//! packets for the same slave are joined with a repeated START, anything
//! else gets a STOP first.
//!
//! A NACK, arbitration loss or bus error aborts the head packet and fails
//! its Task. The queue then carries on with the next packet.

use alloc::vec;
use alloc::vec::Vec;

use crate::config::CFG_CORE_CLOCK_HZ;
use crate::critical::critical_section;
use crate::error::{OsError, OsResult};
use crate::io::PeripheralQueue;
use crate::port::I2cRegs;
use crate::shared::Shared;
use crate::task::Task;

// ============ Control register bits ============

/// Assert acknowledge
pub const I2C_AA: u8 = 0x04;
/// Interrupt flag
pub const I2C_SI: u8 = 0x08;
/// STOP condition
pub const I2C_STO: u8 = 0x10;
/// START condition
pub const I2C_STA: u8 = 0x20;
/// Interface enable
pub const I2C_EN: u8 = 0x40;

/// Highest 7-bit slave address
pub const I2C_MAX_ADDRESS: u8 = 0x7F;

// ============ Master status codes ============

pub mod status {
    pub const BUS_ERROR: u8 = 0x00;
    pub const START: u8 = 0x08;
    pub const REPEATED_START: u8 = 0x10;
    pub const ADDR_W_ACK: u8 = 0x18;
    pub const ADDR_W_NACK: u8 = 0x20;
    pub const DATA_W_ACK: u8 = 0x28;
    pub const DATA_W_NACK: u8 = 0x30;
    pub const ARBITRATION_LOST: u8 = 0x38;
    pub const ADDR_R_ACK: u8 = 0x40;
    pub const ADDR_R_NACK: u8 = 0x48;
    pub const DATA_R_ACK: u8 = 0x50;
    pub const DATA_R_NACK: u8 = 0x58;
}

/// One queued packet
pub struct I2cOp {
    /// Slave address shifted left, read flag in bit 0
    address: u8,
    data: Vec<u8>,
    idx: usize,
    readback: Option<Shared<Vec<u8>>>,
}

impl I2cOp {
    /// 7-bit slave address
    #[inline]
    pub fn slave(&self) -> u8 {
        self.address >> 1
    }

    #[inline]
    pub fn is_read(&self) -> bool {
        self.address & 1 != 0
    }

    fn deliver(&mut self) {
        if let Some(out) = self.readback.take() {
            out.set(core::mem::take(&mut self.data));
        }
    }
}

/// SCL high and low period, in core clocks, for `bit_rate`
///
/// # Returns
/// * `Err(OsError::InvalidBitRate)` - zero, or outside the SCLH/SCLL range
pub fn half_period_for(bit_rate: u32) -> OsResult<u16> {
    if bit_rate == 0 {
        return Err(OsError::InvalidBitRate);
    }
    let half = CFG_CORE_CLOCK_HZ / bit_rate / 2;
    match u16::try_from(half) {
        Ok(half) if half >= 4 => Ok(half),
        _ => Err(OsError::InvalidBitRate),
    }
}

/// Interrupt-driven I2C master
pub struct I2c<R: I2cRegs> {
    regs: R,
    queue: PeripheralQueue<I2cOp>,
}

impl<R: I2cRegs> I2c<R> {
    pub const fn new(regs: R) -> Self {
        I2c {
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

    pub fn start(&self, bit_rate: u32) -> OsResult<()> {
        let half = half_period_for(bit_rate)?;

        critical_section(|_| {
            self.regs.clear_control(I2C_AA | I2C_SI | I2C_STA | I2C_EN);
            self.regs.enable(half);
            self.queue.set_started(true);
        });

        crate::info!("i2c: started at {} bit/s", bit_rate);
        Ok(())
    }

    /// Fail every queued packet, release the bus and power down
    pub fn stop(&self) {
        let failed = self.queue.shutdown(|_| {
            self.regs.set_control(I2C_STO);
            self.regs.clear_control(I2C_AA | I2C_SI | I2C_STA | I2C_EN);
            self.regs.disable();
        });
        crate::info!("i2c: stopped, {} packets failed", failed);
    }

    fn submit(&self, op: I2cOp) -> Task {
        self.queue.submit(op, |_, idle| {
            if idle {
                self.regs.set_control(I2C_STA);
            }
        })
    }

    /// Write `data` to the 7-bit slave `address`.
    ///
    /// An address above 0x7F is refused with a rejected Task.
    pub fn write(&self, address: u8, data: &[u8]) -> Task {
        if address > I2C_MAX_ADDRESS {
            crate::warn!("i2c: address {=u8:#x} is not 7-bit", address);
            return Task::rejected();
        }
        if data.is_empty() && self.is_started() {
            return Task::fulfilled();
        }
        self.submit(I2cOp {
            address: address << 1,
            data: data.to_vec(),
            idx: 0,
            readback: None,
        })
    }

    /// Read `len` bytes from the 7-bit slave `address` into `out`
    pub fn read(&self, address: u8, len: usize, out: Shared<Vec<u8>>) -> Task {
        if address > I2C_MAX_ADDRESS {
            crate::warn!("i2c: address {=u8:#x} is not 7-bit", address);
            return Task::rejected();
        }
        if len == 0 && self.is_started() {
            out.set(Vec::new());
            return Task::fulfilled();
        }
        self.submit(I2cOp {
            address: (address << 1) | 1,
            data: vec![0; len],
            idx: 0,
            readback: Some(out),
        })
    }

    /// Packets queued, the one on the bus included
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// I2C interrupt handler body
    pub fn on_interrupt(&self) {
        let code = self.regs.status();

        let finished = critical_section(|cs| {
            let queue = self.queue.get(cs);
            let Some(head) = queue.front_mut() else {
                self.regs.set_control(I2C_STO);
                self.regs.clear_control(I2C_SI | I2C_STA);
                return None;
            };

            let op = &mut head.op;
            let slave = op.slave();
            let outcome = self.advance(code, op);

            let finished = match outcome {
                Some(success) => {
                    match queue.second() {
                        Some(next) if success && next.op.slave() == slave => {
                            self.regs.set_control(I2C_STA);
                        }
                        Some(_) if code == status::ARBITRATION_LOST => {
                            self.regs.set_control(I2C_STA);
                        }
                        Some(_) => self.regs.set_control(I2C_STO | I2C_STA),
                        // Nothing follows: a START still latched from an
                        // aborted packet must not fire. After arbitration
                        // loss the bus belongs to the winner, so no STOP.
                        None => {
                            self.regs.clear_control(I2C_STA);
                            if code != status::ARBITRATION_LOST {
                                self.regs.set_control(I2C_STO);
                            }
                        }
                    }
                    queue.pop_front().map(|node| (node, success))
                }
                None => None,
            };

            self.regs.clear_control(I2C_SI);
            finished
        });

        if let Some((mut node, success)) = finished {
            if success {
                node.op.deliver();
            } else {
                crate::warn!("i2c: slave {=u8:#x} aborted with status {=u8:#x}", node.op.slave(), code);
            }
            node.finish(success);
        }
    }

    /// Step the head packet for status `code`. Returns the packet outcome
    /// once it is finished.
    fn advance(&self, code: u8, op: &mut I2cOp) -> Option<bool> {
        match code {
            status::START | status::REPEATED_START => {
                self.regs.write_data(op.address);
                self.regs.clear_control(I2C_STA);
                None
            }
            status::ADDR_W_ACK | status::DATA_W_ACK => match op.data.get(op.idx) {
                Some(&byte) => {
                    self.regs.write_data(byte);
                    op.idx += 1;
                    None
                }
                None => Some(true),
            },
            status::ADDR_R_ACK => {
                if op.data.len() > 1 {
                    self.regs.set_control(I2C_AA);
                } else {
                    self.regs.clear_control(I2C_AA);
                }
                None
            }
            status::DATA_R_ACK => {
                if let Some(slot) = op.data.get_mut(op.idx) {
                    *slot = self.regs.read_data();
                    op.idx += 1;
                }
                // NACK the final byte so the slave lets go of SDA
                if op.idx + 1 < op.data.len() {
                    self.regs.set_control(I2C_AA);
                } else {
                    self.regs.clear_control(I2C_AA);
                }
                None
            }
            status::DATA_R_NACK => {
                if let Some(slot) = op.data.get_mut(op.idx) {
                    *slot = self.regs.read_data();
                    op.idx += 1;
                }
                Some(true)
            }
            status::ADDR_W_NACK
            | status::DATA_W_NACK
            | status::ADDR_R_NACK
            | status::ARBITRATION_LOST
            | status::BUS_ERROR => Some(false),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_period() {
        assert_eq!(half_period_for(100_000), Ok(60));
        assert_eq!(half_period_for(400_000), Ok(15));
        assert_eq!(half_period_for(0), Err(OsError::InvalidBitRate));
        assert_eq!(half_period_for(2_000_000), Err(OsError::InvalidBitRate));
        assert_eq!(half_period_for(10), Err(OsError::InvalidBitRate));
    }
}
