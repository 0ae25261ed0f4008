//! Peripheral Drivers
//!
//! Drivers for reusable IP blocks and bus protocols. They are generic over
//! the HAL traits or over [`common::mmio::RegisterBlock`], so the same code
//! runs against real registers and simulated ones.
//!
//! # Available Peripherals
//!
//! - [`liteuart`]: LiteX UART core
//! - [`i2c_bitbang`]: software-timed I2C master
//! - [`spiflash`]: SPI NOR flash command sequencing

pub mod i2c_bitbang;
pub mod liteuart;
pub mod spiflash;
