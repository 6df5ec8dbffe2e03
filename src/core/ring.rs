//! Byte ring buffer
//!
//! One slot is always left empty so that `head == tail` means empty without
//! a separate count: a buffer of capacity N holds at most N - 1 bytes.
//! The UART driver keeps received bytes here between the RX interrupt and
//! the application's `read`.

use alloc::boxed::Box;
use alloc::vec;

/// Fixed-capacity FIFO of bytes
pub struct CircularBuffer {
    data: Box<[u8]>,
    head: usize,
    tail: usize,
}

impl CircularBuffer {
    /// Create a buffer with `capacity` slots, holding up to `capacity - 1` bytes.
    ///
    /// A capacity below 2 is raised to 2.
    pub fn new(capacity: usize) -> Self {
        CircularBuffer {
            data: vec![0u8; capacity.max(2)].into_boxed_slice(),
            head: 0,
            tail: 0,
        }
    }

    #[inline]
    fn advance(&self, idx: usize) -> usize {
        if idx + 1 == self.data.len() {
            0
        } else {
            idx + 1
        }
    }

    /// Number of slots, one more than the usable space
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        if self.head >= self.tail {
            self.head - self.tail
        } else {
            self.data.len() - self.tail + self.head
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.advance(self.head) == self.tail
    }

    /// Append a byte. Returns false and drops nothing when full.
    pub fn write(&mut self, byte: u8) -> bool {
        let next = self.advance(self.head);
        if next == self.tail {
            return false;
        }
        self.data[self.head] = byte;
        self.head = next;
        true
    }

    /// Remove the oldest byte
    pub fn read(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.data[self.tail];
        self.tail = self.advance(self.tail);
        Some(byte)
    }

    /// Append as many bytes of `src` as fit, returning how many were taken
    pub fn write_slice(&mut self, src: &[u8]) -> usize {
        src.iter().take_while(|&&b| self.write(b)).count()
    }

    /// Drain into `dst`, returning how many bytes were copied
    pub fn read_slice(&mut self, dst: &mut [u8]) -> usize {
        let mut n = 0;
        for slot in dst.iter_mut() {
            match self.read() {
                Some(b) => {
                    *slot = b;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    /// Discard all buffered bytes
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }
}
