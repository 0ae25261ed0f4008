//! LiteX SoC register map.
//!
//! CSRs are 32 bits wide and laid out at a 4-byte stride inside each
//! peripheral's CSR window. Base addresses match the stock VexRiscv
//! memory map; boards with a different layout override them through
//! [`crate::config::BoardConfig`].

// Memory regions
pub const ROM_BASE: usize = 0x0000_0000;
pub const ROM_SIZE: usize = 0x0002_0000;
pub const SRAM_BASE: usize = 0x1000_0000;
pub const SRAM_SIZE: usize = 0x0000_2000;
pub const SPIFLASH_BASE: usize = 0x2000_0000;
pub const MAIN_RAM_BASE: usize = 0x4000_0000;
pub const MAIN_RAM_SIZE: usize = 0x0800_0000;
pub const CSR_BASE: usize = 0xF000_0000;

// CSR windows
pub const TIMER0_BASE: usize = CSR_BASE + 0x2800;
pub const UART_BASE: usize = CSR_BASE + 0x3000;
pub const I2C_BASE: usize = CSR_BASE + 0x3800;
pub const SPIFLASH_CSR_BASE: usize = CSR_BASE + 0x4000;

pub const SYS_CLK_HZ: u32 = 100_000_000;

pub mod uart {
    pub const RXTX: usize = 0x00;
    pub const TXFULL: usize = 0x04;
    pub const RXEMPTY: usize = 0x08;
    pub const EV_STATUS: usize = 0x0C;
    pub const EV_PENDING: usize = 0x10;
    pub const EV_ENABLE: usize = 0x14;
    pub const TXEMPTY: usize = 0x18;
    pub const RXFULL: usize = 0x1C;

    pub const EV_TX: u32 = 1 << 0;
    pub const EV_RX: u32 = 1 << 1;
}

pub mod timer0 {
    pub const LOAD: usize = 0x00;
    pub const RELOAD: usize = 0x04;
    pub const EN: usize = 0x08;
    pub const UPDATE_VALUE: usize = 0x0C;
    pub const VALUE: usize = 0x10;
    pub const EV_STATUS: usize = 0x14;
    pub const EV_PENDING: usize = 0x18;
    pub const EV_ENABLE: usize = 0x1C;
}

pub mod i2c {
    /// Output register: SCL, SDA output enable, SDA level.
    pub const W: usize = 0x00;
    /// Input register: sampled SDA.
    pub const R: usize = 0x04;

    pub const W_SCL: u32 = 1 << 0;
    pub const W_OE: u32 = 1 << 1;
    pub const W_SDA: u32 = 1 << 2;
}

pub mod spiflash {
    /// Bit-bang output register.
    pub const BITBANG: usize = 0x00;
    /// Sampled MISO (bit 0).
    pub const MISO: usize = 0x04;
    /// Hand the pins to the bit-bang register instead of the mmap core.
    pub const BITBANG_EN: usize = 0x08;

    pub const MOSI: u32 = 1 << 0;
    pub const CLK: u32 = 1 << 1;
    pub const CS_N: u32 = 1 << 2;
    /// Turn the data line around to sample MISO.
    pub const DQ_INPUT: u32 = 1 << 3;
}
