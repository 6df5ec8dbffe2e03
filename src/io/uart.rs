//! UART driver
//!
//! Transmit is a queue of byte packets pushed into the hardware FIFO from the
//! interrupt handler. Receive is a ring buffer filled by the same handler,
//! with at most one outstanding receive Task that resolves once new bytes
//! have landed in the ring.

use alloc::vec::Vec;
use portable_atomic::{AtomicU32, Ordering};

use crate::config::{CFG_CORE_CLOCK_HZ, CFG_UART_RX_BUFFER_SIZE};
use crate::critical::critical_section;
use crate::core::cs_cell::CsCell;
use crate::error::{OsError, OsResult};
use crate::io::PeripheralQueue;
use crate::port::UartRegs;
use crate::queue::TaskQueue;
use crate::ring::CircularBuffer;
use crate::task::Task;
use crate::types::{UartDivisor, UartMode};

/// A packet being transmitted
pub struct WriteOp {
    data: Vec<u8>,
    sent: usize,
}

impl WriteOp {
    /// Bytes not yet handed to the hardware
    pub fn remaining(&self) -> usize {
        self.data.len() - self.sent
    }
}

struct RxState {
    ring: Option<CircularBuffer>,
    waiter: Option<Task>,
}

/// Interrupt-driven UART
pub struct Uart<R: UartRegs> {
    regs: R,
    tx: PeripheralQueue<WriteOp>,
    rx: CsCell<RxState>,
    overruns: AtomicU32,
}

/// Largest line-rate error `start` accepts, in parts per thousand
pub const MAX_BAUD_ERROR_PERMILLE: u32 = 30;

/// Baud generator setting closest to `baud`
///
/// Every fractional ratio the hardware accepts is tried; the plain divisor
/// wins ties.
///
/// # Returns
/// * `Err(OsError::InvalidBaudRate)` - zero, out of the divisor range, or no
///   setting within `MAX_BAUD_ERROR_PERMILLE`
pub fn divisor_for(baud: u32) -> OsResult<UartDivisor> {
    if baud == 0 {
        return Err(OsError::InvalidBaudRate);
    }

    let mut best: Option<(UartDivisor, u32)> = None;
    for frac_d in 1..=15u8 {
        for frac_n in 0..frac_d {
            let num = u64::from(CFG_CORE_CLOCK_HZ) * u64::from(frac_d);
            let den = 16 * u64::from(baud) * u64::from(frac_d + frac_n);
            let Ok(divisor) = u16::try_from((num + den / 2) / den) else {
                continue;
            };
            let candidate = UartDivisor {
                divisor,
                frac_n,
                frac_d,
            };
            if !candidate.is_valid() {
                continue;
            }
            let error = candidate.baud(CFG_CORE_CLOCK_HZ).abs_diff(baud);
            if best.map_or(true, |(_, e)| error < e) {
                best = Some((candidate, error));
            }
        }
    }

    match best {
        Some((divisor, error))
            if u64::from(error) * 1000 <= u64::from(baud) * u64::from(MAX_BAUD_ERROR_PERMILLE) =>
        {
            Ok(divisor)
        }
        _ => Err(OsError::InvalidBaudRate),
    }
}

impl<R: UartRegs> Uart<R> {
    pub const fn new(regs: R) -> Self {
        Uart {
            regs,
            tx: PeripheralQueue::new(),
            rx: CsCell::new(RxState {
                ring: None,
                waiter: None,
            }),
            overruns: AtomicU32::new(0),
        }
    }

    /// Register block
    pub fn regs(&self) -> &R {
        &self.regs
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.tx.is_started()
    }

    /// Power up at `baud` with frame format `mode`.
    ///
    /// Allocates the receive ring on first start; restarting a running UART
    /// only reprograms the line settings and keeps buffered bytes.
    pub fn start(&self, baud: u32, mode: UartMode) -> OsResult<()> {
        let divisor = divisor_for(baud)?;
        self.start_with(divisor, mode);
        crate::info!(
            "uart: started at {} baud (divisor {}, fraction {}/{})",
            divisor.baud(CFG_CORE_CLOCK_HZ),
            divisor.divisor,
            divisor.frac_n,
            divisor.frac_d
        );
        Ok(())
    }

    /// Power up with an explicit baud generator setting: divisor latch
    /// `divider` and fractional ratio `frac_n / frac_d`.
    ///
    /// # Returns
    /// * `Err(OsError::InvalidBaudRate)` - a combination the hardware refuses
    pub fn start_with_ratio(&self, divider: u16, frac_n: u8, frac_d: u8, mode: UartMode) -> OsResult<()> {
        let divisor = UartDivisor {
            divisor: divider,
            frac_n,
            frac_d,
        };
        if !divisor.is_valid() {
            return Err(OsError::InvalidBaudRate);
        }
        self.start_with(divisor, mode);
        crate::info!("uart: started at {} baud", divisor.baud(CFG_CORE_CLOCK_HZ));
        Ok(())
    }

    fn start_with(&self, divisor: UartDivisor, mode: UartMode) {
        let ring = if self.is_started() {
            None
        } else {
            Some(CircularBuffer::new(CFG_UART_RX_BUFFER_SIZE))
        };

        critical_section(|cs| {
            let rx = self.rx.get(cs);
            if rx.ring.is_none() {
                rx.ring = ring;
            }
            self.regs.enable(divisor, mode);
            self.regs.set_rx_interrupt(true);
            self.tx.set_started(true);
        });
    }

    /// Fail every queued write and the outstanding receive, free the ring
    /// and power the UART down.
    pub fn stop(&self) {
        let (failed, waiter, ring) = critical_section(|cs| {
            let failed = self.tx.shutdown(|_| self.regs.disable());
            let rx = self.rx.get(cs);
            (failed, rx.waiter.take(), rx.ring.take())
        });

        drop(ring);
        if let Some(waiter) = waiter {
            waiter.complete(false);
        }
        crate::info!("uart: stopped, {} writes failed", failed);
    }

    /// Queue `data` for transmission. The Task resolves once the last byte
    /// is in the transmit FIFO.
    pub fn write(&self, data: &[u8]) -> Task {
        if data.is_empty() && self.is_started() {
            return Task::fulfilled();
        }
        let op = WriteOp {
            data: data.to_vec(),
            sent: 0,
        };
        self.tx.submit(op, |_, _| self.regs.set_tx_interrupt(true))
    }

    pub fn write_byte(&self, byte: u8) -> Task {
        self.write(&[byte])
    }

    /// A Task that resolves when received bytes are available.
    ///
    /// Resolves at once when the ring already holds data. Only one receive
    /// Task is outstanding: calling again before it resolves returns another
    /// handle to the same Task.
    pub fn receive(&self) -> Task {
        if !self.is_started() {
            return Task::rejected();
        }
        let fresh = Task::new();

        critical_section(|cs| {
            let rx = self.rx.get(cs);
            let buffered = rx.ring.as_ref().is_some_and(|ring| !ring.is_empty());
            if buffered {
                fresh.complete(true);
                return fresh;
            }
            match &rx.waiter {
                Some(waiter) => waiter.clone(),
                None => {
                    rx.waiter = Some(fresh.clone());
                    fresh
                }
            }
        })
    }

    /// Copy buffered received bytes into `dst`. Never blocks.
    ///
    /// Re-enables reception if a full ring had paused it.
    pub fn read(&self, dst: &mut [u8]) -> usize {
        critical_section(|cs| {
            let rx = self.rx.get(cs);
            let Some(ring) = rx.ring.as_mut() else {
                return 0;
            };
            let n = ring.read_slice(dst);
            if n > 0 && self.is_started() {
                self.regs.set_rx_interrupt(true);
            }
            n
        })
    }

    /// Received bytes waiting in the ring
    pub fn bytes_available(&self) -> usize {
        critical_section(|cs| self.rx.get(cs).ring.as_ref().map_or(0, |ring| ring.len()))
    }

    /// Hardware receive overruns seen since reset
    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Packets waiting to be sent, the one in progress included
    pub fn pending_writes(&self) -> usize {
        self.tx.len()
    }

    /// UART interrupt handler body
    pub fn on_interrupt(&self) {
        self.service_rx();
        self.service_tx();
    }

    fn service_rx(&self) {
        let (waiter, overrun) = critical_section(|cs| {
            let rx = self.rx.get(cs);
            let mut received = 0usize;

            match rx.ring.as_mut() {
                Some(ring) => {
                    while !ring.is_full() && self.regs.rx_ready() {
                        ring.write(self.regs.read_byte());
                        received += 1;
                    }
                    // Leave further bytes in hardware until `read` makes room
                    if ring.is_full() {
                        self.regs.set_rx_interrupt(false);
                    }
                }
                None => {
                    while self.regs.rx_ready() {
                        self.regs.read_byte();
                    }
                }
            }

            // After the drain, so an overrun raised while draining counts now
            let overrun = self.regs.take_overrun();
            let waiter = if received > 0 { rx.waiter.take() } else { None };
            (waiter, overrun)
        });

        if overrun {
            self.overruns.fetch_add(1, Ordering::Relaxed);
            crate::warn!("uart: receive overrun");
        }
        if let Some(waiter) = waiter {
            waiter.complete(true);
        }
    }

    fn service_tx(&self) {
        let mut finished = critical_section(|cs| {
            let queue = self.tx.get(cs);
            let mut finished = TaskQueue::new();
            let mut room = self.regs.tx_room();

            while let Some(head) = queue.front_mut() {
                let op = &mut head.op;
                while room > 0 && op.sent < op.data.len() {
                    self.regs.write_byte(op.data[op.sent]);
                    op.sent += 1;
                    room -= 1;
                }
                if op.remaining() > 0 {
                    break;
                }
                if let Some(node) = queue.pop_front() {
                    finished.push_back(node);
                }
            }

            if queue.is_empty() {
                self.regs.set_tx_interrupt(false);
            }
            finished
        });

        finished.resolve_all(true);
    }
}
