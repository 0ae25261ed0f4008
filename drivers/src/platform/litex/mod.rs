//! LiteX SoC support.
//!
//! Register adapters for the LiteX bit-bang cores and timer, plus the
//! bring-up code that turns a [`BoardConfig`] into ready drivers.

pub mod i2c;
pub mod spi;
pub mod timer;

use common::mmio::{Mmio, RegisterBlock};
use log::{LevelFilter, info};

use super::Platform;
use crate::config::{BoardConfig, MemoryMap};
use crate::console;
use crate::error::{ConfigError, Error};
use crate::hal::serial::{SerialConfig, SerialPort};
use crate::hal::timer::{CycleDelay, Delay};
use crate::logger;
use crate::memtest::VolatileRegion;
use crate::peripheral::i2c_bitbang::BitBangI2c;
use crate::peripheral::liteuart::LiteUart;
use crate::peripheral::spiflash::SpiFlash;

pub use i2c::LitexI2c;
pub use spi::LitexSpiBitbang;
pub use timer::LitexTimer;

pub struct LitexPlatform;

impl Platform for LitexPlatform {
    fn name() -> &'static str {
        "LiteX SoC"
    }

    fn memory_map() -> MemoryMap {
        BoardConfig::litex_default().memory
    }

    unsafe fn early_init(config: &BoardConfig) -> Result<(), Error> {
        config.validate()?;
        unsafe { Self::init_console(config)? };
        // A second init keeps the logger already installed
        let _ = logger::init(LevelFilter::Info);
        info!("{} at {} Hz", Self::name(), config.sys_clk_hz);
        Ok(())
    }

    unsafe fn init_console(config: &BoardConfig) -> Result<(), Error> {
        let mut uart = unsafe { LiteUart::new(config.uart, config.uart_baud) };
        uart.configure(SerialConfig::new_8n1(config.uart_baud))?;
        console::install(uart);
        Ok(())
    }

    fn console_write(s: &str) {
        console::console_write(s);
    }

    fn console_read() -> Option<u8> {
        console::console_read()
    }

    fn console_read_nonblocking() -> Option<u8> {
        console::console_read_nonblocking()
    }
}

/// SPI flash driver on the bit-bang CSRs in `regs`.
pub fn spi_flash<R: RegisterBlock, D: Delay>(
    regs: R,
    delay: D,
    config: &BoardConfig,
) -> Result<SpiFlash<LitexSpiBitbang<R>, D>, ConfigError> {
    SpiFlash::new(
        LitexSpiBitbang::with_registers(regs),
        delay,
        config.flash,
        config.flash_timeouts,
    )
}

/// I2C master on the line CSRs in `regs`.
pub fn i2c_master<R: RegisterBlock, D: Delay>(
    regs: R,
    delay: D,
    config: &BoardConfig,
) -> BitBangI2c<LitexI2c<R>, D> {
    BitBangI2c::new(LitexI2c::with_registers(regs), delay, &config.i2c_bus)
}

/// Drivers for every on-chip peripheral besides the console.
pub struct Board {
    pub timer: LitexTimer,
    pub i2c: BitBangI2c<LitexI2c, CycleDelay>,
    pub flash: SpiFlash<LitexSpiBitbang, CycleDelay>,
    pub main_ram: VolatileRegion,
}

impl Board {
    /// # Safety
    ///
    /// The Bus Handles and memory map in `config` must describe the running
    /// SoC, and this must be the only owner of those peripherals.
    pub unsafe fn take(config: &BoardConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let delay = CycleDelay::new(config.sys_clk_hz);
        let ram = config.memory.main_ram;
        unsafe {
            Ok(Self {
                timer: LitexTimer::new(config.timer, config.sys_clk_hz),
                i2c: i2c_master(Mmio::new(config.i2c), delay, config),
                flash: spi_flash(Mmio::new(config.spiflash), delay, config)?,
                main_ram: VolatileRegion::new(ram.base, ram.size),
            })
        }
    }
}
