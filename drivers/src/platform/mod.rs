//! Platform Abstraction Layer
//!
//! This module provides a platform-agnostic interface for board bring-up.
//! Each supported SoC implements the [`Platform`] trait; the one to build
//! for is chosen with a Cargo feature.
//!
//! # Usage
//!
//! ```no_run
//! use softsoc_drivers::config::BoardConfig;
//! use softsoc_drivers::platform::{CurrentPlatform, Platform};
//!
//! let config = BoardConfig::litex_default();
//! unsafe { CurrentPlatform::early_init(&config).unwrap() };
//! CurrentPlatform::console_write("ready\n");
//! ```

use crate::config::{BoardConfig, MemoryMap};
use crate::error::Error;

/// Platform trait - implemented by each supported platform
pub trait Platform {
    /// Platform name for debugging
    fn name() -> &'static str;

    /// Static memory map of the stock configuration.
    fn memory_map() -> MemoryMap;

    /// Validate `config`, bring up the console and install the logger.
    ///
    /// # Safety
    /// Must only be called once, very early in boot, with a configuration
    /// that describes the running SoC.
    unsafe fn early_init(config: &BoardConfig) -> Result<(), Error>;

    /// Initialize console for early debugging
    ///
    /// # Safety
    /// `config.uart` must point at the console UART.
    unsafe fn init_console(config: &BoardConfig) -> Result<(), Error>;

    /// Write string to console (blocking)
    fn console_write(s: &str);

    /// Read a character from console (blocking); `None` without a console
    fn console_read() -> Option<u8>;

    /// Read a character from console (non-blocking)
    fn console_read_nonblocking() -> Option<u8>;
}

// Platform selection based on Cargo features
cfg_if::cfg_if! {
    if #[cfg(feature = "litex")] {
        pub mod litex;
        pub use litex::LitexPlatform as CurrentPlatform;
    } else {
        compile_error!(
            "No platform selected!\n\
            Use: cargo build --features litex"
        );
    }
}
