//! Hardware-independent building blocks shared by the BIOS drivers.
//!
//! - [`crc`]: CRC-16/XMODEM and CRC-32 checksum engine
//! - [`mmio`]: memory-mapped register access and bus handles
//! - [`sync`]: busy-wait synchronization primitives

#![no_std]

pub mod crc;
pub mod mmio;
pub mod sync;
