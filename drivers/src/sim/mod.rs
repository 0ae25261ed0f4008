//! Simulated peripherals.
//!
//! Register-accurate stand-ins for the LiteX cores and the devices behind
//! them, used by the host test-suite and for exercising board bring-up
//! code without hardware. Everything is fixed-size; nothing allocates.

pub mod bitbang;
pub mod flash;
pub mod i2c;
pub mod uart;

/// Fixed-capacity byte queue.
#[derive(Debug, Clone)]
pub struct ByteFifo<const N: usize> {
    buf: [u8; N],
    head: usize,
    len: usize,
}

impl<const N: usize> ByteFifo<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            head: 0,
            len: 0,
        }
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn is_full(&self) -> bool {
        self.len == N
    }

    /// Append `byte`; returns `false` when full.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.buf[(self.head + self.len) % N] = byte;
        self.len += 1;
        true
    }

    pub fn peek(&self) -> Option<u8> {
        if self.is_empty() {
            None
        } else {
            Some(self.buf[self.head])
        }
    }

    pub fn pop(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.head = (self.head + 1) % N;
        self.len -= 1;
        Some(byte)
    }
}

impl<const N: usize> Default for ByteFifo<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_wraps_around() {
        let mut fifo = ByteFifo::<3>::new();
        assert!(fifo.push(1));
        assert!(fifo.push(2));
        assert!(fifo.push(3));
        assert!(!fifo.push(4));
        assert_eq!(fifo.pop(), Some(1));
        assert!(fifo.push(4));
        assert_eq!(fifo.pop(), Some(2));
        assert_eq!(fifo.pop(), Some(3));
        assert_eq!(fifo.pop(), Some(4));
        assert_eq!(fifo.pop(), None);
    }
}
