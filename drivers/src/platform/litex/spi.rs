//! LiteX SPI Flash Bit-Bang Adapter
//!
//! The LiteX SPI flash core normally serves the memory-mapped read window.
//! Setting `bitbang_en` hands the pads to the `bitbang` CSR instead, which
//! is how the BIOS issues erase and program commands. The core stays in
//! bit-bang mode only while chip select is asserted.
//!
//! Waveform per bit (SPI mode 0, MSB first): set MOSI with CLK low, then
//! raise CLK. For reads, `DQ_INPUT` turns the data line around and MISO is
//! sampled while CLK is high.

use common::mmio::{BusHandle, Mmio, RegisterBlock};

use crate::hal::spi::SpiBus;
use crate::hw::litex::spiflash::{BITBANG, BITBANG_EN, CLK, CS_N, DQ_INPUT, MISO, MOSI};

pub struct LitexSpiBitbang<R: RegisterBlock = Mmio> {
    regs: R,
}

impl LitexSpiBitbang<Mmio> {
    /// # Safety
    ///
    /// `handle` must point to a LiteX SPI flash CSR window owned by the
    /// caller.
    pub const unsafe fn new(handle: BusHandle) -> Self {
        Self {
            regs: unsafe { Mmio::new(handle) },
        }
    }
}

impl<R: RegisterBlock> LitexSpiBitbang<R> {
    pub const fn with_registers(regs: R) -> Self {
        Self { regs }
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    pub fn into_registers(self) -> R {
        self.regs
    }
}

impl<R: RegisterBlock> SpiBus for LitexSpiBitbang<R> {
    fn select(&mut self) {
        self.regs.write(BITBANG_EN, 1);
        self.regs.write(BITBANG, CS_N);
        self.regs.write(BITBANG, 0);
    }

    fn deselect(&mut self) {
        self.regs.write(BITBANG, CS_N);
        self.regs.write(BITBANG_EN, 0);
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            for bit in (0..8).rev() {
                let mosi = if (byte >> bit) & 1 != 0 { MOSI } else { 0 };
                self.regs.write(BITBANG, mosi);
                self.regs.write(BITBANG, mosi | CLK);
            }
        }
    }

    fn read(&mut self, buffer: &mut [u8]) {
        self.regs.write(BITBANG, DQ_INPUT);
        for byte in buffer.iter_mut() {
            let mut value = 0u8;
            for _ in 0..8 {
                self.regs.write(BITBANG, CLK | DQ_INPUT);
                value = (value << 1) | (self.regs.read(MISO) & 1) as u8;
                self.regs.write(BITBANG, DQ_INPUT);
            }
            *byte = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::bitbang::SimBitbang;
    use crate::sim::flash::SimFlash;

    #[test]
    fn jedec_id_through_the_pins() {
        let mut bus = LitexSpiBitbang::with_registers(SimBitbang::new(SimFlash::<4096>::new()));
        let mut id = [0u8; 3];
        bus.transaction(&[0x9F], &mut id);

        assert_eq!(id, [0xEF, 0x40, 0x18]);
        let pins = bus.into_registers();
        assert!(!pins.is_enabled());
        assert_eq!(pins.stray_writes(), 0);
        assert_eq!(pins.device().command_count(), 1);
    }

    #[test]
    fn write_enable_reaches_the_device() {
        let mut bus = LitexSpiBitbang::with_registers(SimBitbang::new(SimFlash::<4096>::new()));
        bus.transaction(&[0x06], &mut []);

        assert!(bus.registers().device().write_enabled());
    }
}
