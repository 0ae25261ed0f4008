//! Hardware Driver Subsystem
//!
//! Hardware support for a LiteX soft-SoC BIOS, organized in layers:
//!
//! # Module Organization
//!
//! - [`hal`]: Platform-independent trait definitions
//! - [`peripheral`]: Reusable drivers (UART core, bit-banged I2C, SPI NOR flash)
//! - [`platform`]: SoC-level register adapters and bring-up
//! - [`hw`]: Register maps
//! - [`memtest`]: Destructive RAM test engine
//! - [`serialboot`]: Serial flash loader protocol
//! - [`sim`]: Simulated cores and devices for host testing
//!
//! # Design Principles
//!
//! 1. **Separation of Concerns**: Register adapters are separate from protocol code
//! 2. **Zero-Cost Abstractions**: Drivers are generic over their register blocks
//! 3. **No Allocation**: Everything is fixed-size; the crate never uses `alloc`
//! 4. **Clear Ownership**: Each driver owns its bus; `&mut self` is the lock
//!
//! # Usage Example
//!
//! ```no_run
//! use softsoc_drivers::config::BoardConfig;
//! use softsoc_drivers::platform::litex::Board;
//!
//! let config = BoardConfig::litex_default();
//! let mut board = unsafe { Board::take(&config) }.unwrap();
//! let id = board.flash.read_id();
//! softsoc_drivers::kprintln!("flash {:02x}{:02x}{:02x}", id.manufacturer, id.memory_type, id.capacity);
//! ```

#![no_std]

pub mod config;
pub mod console;
pub mod error;
pub mod hal;
pub mod hw;
pub mod logger;
pub mod memtest;
pub mod peripheral;
pub mod platform;
pub mod serialboot;
pub mod sim;

// Re-export commonly used types
pub use common::crc;
pub use common::mmio::{BusHandle, RegisterBlock};
pub use config::BoardConfig;
pub use error::Error;
pub use hal::serial::{SerialConfig, SerialPort};
pub use hal::timer::{CountingTimer, Delay};
