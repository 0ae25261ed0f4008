//! Memory-mapped register access.
//!
//! Every peripheral register access goes through [`RegisterBlock`]. The
//! hardware implementation, [`Mmio`], performs `read_volatile` /
//! `write_volatile` so the compiler can neither elide nor cache accesses,
//! and fences around them so they are not reordered with surrounding
//! memory traffic. Drivers are generic over the trait, which lets host
//! tests substitute a simulated register file.

use core::ptr::{read_volatile, write_volatile};
use core::sync::atomic::{Ordering, fence};

/// Base address of a peripheral's register block.
///
/// Bus handles are boot-time constants supplied by the board
/// configuration; they are plain values and never reallocated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BusHandle {
    base: usize,
}

impl BusHandle {
    pub const fn new(base: usize) -> Self {
        Self { base }
    }

    pub const fn base(self) -> usize {
        self.base
    }

    /// Address of the register at byte `offset` within the block.
    pub const fn register(self, offset: usize) -> usize {
        self.base + offset
    }
}

/// A block of 32-bit registers addressed by byte offset.
pub trait RegisterBlock {
    /// Read the register at byte `offset`.
    fn read(&self, offset: usize) -> u32;

    /// Write the register at byte `offset`.
    fn write(&mut self, offset: usize, value: u32);

    /// Read-modify-write helper.
    fn modify(&mut self, offset: usize, f: impl FnOnce(u32) -> u32) {
        let value = self.read(offset);
        self.write(offset, f(value));
    }
}

impl<T: RegisterBlock + ?Sized> RegisterBlock for &mut T {
    fn read(&self, offset: usize) -> u32 {
        (**self).read(offset)
    }

    fn write(&mut self, offset: usize, value: u32) {
        (**self).write(offset, value)
    }
}

/// Volatile register block backed by real device memory.
#[derive(Debug)]
pub struct Mmio {
    handle: BusHandle,
}

impl Mmio {
    /// Wrap the register block at `handle`.
    ///
    /// # Safety
    ///
    /// - `handle` must point to a mapped, 32-bit accessible register block
    /// - Only one `Mmio` should exist per block; the owning driver is the
    ///   only code that touches those addresses
    pub const unsafe fn new(handle: BusHandle) -> Self {
        Self { handle }
    }

    pub const fn handle(&self) -> BusHandle {
        self.handle
    }
}

impl RegisterBlock for Mmio {
    #[inline]
    fn read(&self, offset: usize) -> u32 {
        let value = unsafe { read_volatile(self.handle.register(offset) as *const u32) };
        fence(Ordering::Acquire);
        value
    }

    #[inline]
    fn write(&mut self, offset: usize, value: u32) {
        fence(Ordering::Release);
        unsafe { write_volatile(self.handle.register(offset) as *mut u32, value) }
    }
}
