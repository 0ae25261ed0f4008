//! Hardware Abstraction Layer (HAL) - Platform-Independent Traits
//!
//! This module defines generic traits for interacting with hardware
//! peripherals. These traits are implemented by platform-specific
//! register adapters and consumed by the reusable drivers in
//! [`crate::peripheral`].
//!
//! # Available Interfaces
//!
//! - [`gpio`]: Signal levels
//! - [`i2c`]: I2C line control and register transactions
//! - [`serial`]: Serial port (UART) communication
//! - [`spi`]: SPI master with chip select
//! - [`timer`]: Busy-wait delays and free-running counters

pub mod gpio;
pub mod i2c;
pub mod serial;
pub mod spi;
pub mod timer;
