//! Board configuration.
//!
//! Everything a driver needs to find and time its hardware: Bus Handles,
//! the system clock, the memory map and the flash layout. A configuration
//! is plain data, built once at boot and handed to constructors by
//! reference.

use common::mmio::BusHandle;

use crate::error::ConfigError;
use crate::hw::litex;

pub use crate::peripheral::i2c_bitbang::I2cConfig;
pub use crate::peripheral::spiflash::{FlashGeometry, FlashTimeouts};

/// A span of the physical address space.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Region {
    pub base: usize,
    pub size: usize,
}

impl Region {
    pub const fn new(base: usize, size: usize) -> Self {
        Self { base, size }
    }

    pub const fn end(&self) -> usize {
        self.base + self.size
    }

    /// Whether `[address, address + len)` lies inside the region.
    pub const fn contains(&self, address: usize, len: usize) -> bool {
        match address.checked_add(len) {
            Some(end) => address >= self.base && end <= self.end(),
            None => false,
        }
    }
}

/// Platform memory map.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryMap {
    pub rom: Region,
    pub sram: Region,
    pub main_ram: Region,
    /// Memory-mapped read window of the SPI flash.
    pub spiflash: Region,
    pub csr_base: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BoardConfig {
    pub sys_clk_hz: u32,
    pub memory: MemoryMap,

    pub uart: BusHandle,
    /// Baud rate the UART core was synthesized for.
    pub uart_baud: u32,
    pub timer: BusHandle,
    pub i2c: BusHandle,
    pub i2c_bus: I2cConfig,
    pub spiflash: BusHandle,
    pub flash: FlashGeometry,
    pub flash_timeouts: FlashTimeouts,
}

impl BoardConfig {
    /// Stock LiteX SoC layout.
    pub const fn litex_default() -> Self {
        let flash = FlashGeometry::DEFAULT;
        Self {
            sys_clk_hz: litex::SYS_CLK_HZ,
            memory: MemoryMap {
                rom: Region::new(litex::ROM_BASE, litex::ROM_SIZE),
                sram: Region::new(litex::SRAM_BASE, litex::SRAM_SIZE),
                main_ram: Region::new(litex::MAIN_RAM_BASE, litex::MAIN_RAM_SIZE),
                spiflash: Region::new(litex::SPIFLASH_BASE, flash.capacity as usize),
                csr_base: litex::CSR_BASE,
            },
            uart: BusHandle::new(litex::UART_BASE),
            uart_baud: 115_200,
            timer: BusHandle::new(litex::TIMER0_BASE),
            i2c: BusHandle::new(litex::I2C_BASE),
            i2c_bus: I2cConfig::STANDARD,
            spiflash: BusHandle::new(litex::SPIFLASH_CSR_BASE),
            flash,
            flash_timeouts: FlashTimeouts::DEFAULT,
        }
    }

    /// Reject configurations no driver could work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sys_clk_hz == 0 {
            return Err(ConfigError::Zero("system clock"));
        }
        if self.uart_baud == 0 {
            return Err(ConfigError::Zero("UART baud rate"));
        }
        if self.memory.main_ram.size == 0 {
            return Err(ConfigError::Zero("main RAM size"));
        }
        self.i2c_bus.validate()?;
        self.flash.validate()?;
        self.flash_timeouts.validate()
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self::litex_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_layout_is_valid() {
        let config = BoardConfig::litex_default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.uart.base(), 0xF000_3000);
        assert_eq!(config.memory.spiflash.size, 16 * 1024 * 1024);
    }

    #[test]
    fn nested_errors_surface() {
        let mut config = BoardConfig::litex_default();
        config.flash.sector_size = 3000;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPowerOfTwo {
                what: "flash sector size",
                value: 3000
            })
        );

        let mut config = BoardConfig::litex_default();
        config.i2c_bus = I2cConfig::new(0);
        assert_eq!(config.validate(), Err(ConfigError::I2cFrequency(0)));

        let mut config = BoardConfig::litex_default();
        config.sys_clk_hz = 0;
        assert_eq!(config.validate(), Err(ConfigError::Zero("system clock")));
    }

    #[test]
    fn region_bounds() {
        let ram = Region::new(0x4000_0000, 0x1000);
        assert!(ram.contains(0x4000_0000, 0x1000));
        assert!(ram.contains(0x4000_0ffc, 4));
        assert!(!ram.contains(0x4000_0ffc, 8));
        assert!(!ram.contains(0x3fff_fffc, 4));
        assert!(!ram.contains(usize::MAX, 2));
    }
}
