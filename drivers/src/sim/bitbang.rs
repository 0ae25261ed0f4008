//! Pin-level model of the LiteX SPI flash bit-bang register.
//!
//! Decodes the MOSI/CLK/CS_N waveform written to `BITBANG` back into
//! byte-level [`SpiBus`] calls on the wrapped device, and presents the
//! device's output bits on `MISO` while `DQ_INPUT` is set. Bits move on
//! SCK rising edges, MSB first (SPI mode 0).

use common::mmio::RegisterBlock;

use crate::hal::spi::SpiBus;
use crate::hw::litex::spiflash::{BITBANG, BITBANG_EN, CLK, CS_N, DQ_INPUT, MISO, MOSI};

pub struct SimBitbang<D: SpiBus> {
    device: D,
    enabled: bool,
    last: u32,
    out_shift: u8,
    out_bits: u8,
    in_byte: u8,
    in_bits: u8,
    miso: bool,
    /// Writes to `BITBANG` while `BITBANG_EN` was clear.
    stray_writes: u32,
}

impl<D: SpiBus> SimBitbang<D> {
    pub const fn new(device: D) -> Self {
        Self {
            device,
            enabled: false,
            last: CS_N,
            out_shift: 0,
            out_bits: 0,
            in_byte: 0,
            in_bits: 0,
            miso: false,
            stray_writes: 0,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn stray_writes(&self) -> u32 {
        self.stray_writes
    }

    fn reset_shifters(&mut self) {
        self.out_shift = 0;
        self.out_bits = 0;
        self.in_bits = 0;
    }

    fn drive(&mut self, value: u32) {
        let prev = self.last;
        self.last = value;

        let was_selected = prev & CS_N == 0;
        let selected = value & CS_N == 0;
        if !was_selected && selected {
            self.reset_shifters();
            self.device.select();
        } else if was_selected && !selected {
            self.device.deselect();
            self.reset_shifters();
            return;
        }

        let rising = prev & CLK == 0 && value & CLK != 0;
        if !selected || !rising {
            return;
        }

        if value & DQ_INPUT != 0 {
            if self.in_bits == 0 {
                let mut byte = [0u8];
                self.device.read(&mut byte);
                self.in_byte = byte[0];
            }
            self.miso = (self.in_byte >> (7 - self.in_bits)) & 1 != 0;
            self.in_bits = (self.in_bits + 1) % 8;
        } else {
            self.out_shift = (self.out_shift << 1) | (value & MOSI) as u8;
            self.out_bits += 1;
            if self.out_bits == 8 {
                self.device.write(&[self.out_shift]);
                self.out_shift = 0;
                self.out_bits = 0;
            }
        }
    }
}

impl<D: SpiBus> RegisterBlock for SimBitbang<D> {
    fn read(&self, offset: usize) -> u32 {
        match offset {
            BITBANG => self.last,
            MISO => self.miso as u32,
            BITBANG_EN => self.enabled as u32,
            _ => 0,
        }
    }

    fn write(&mut self, offset: usize, value: u32) {
        match offset {
            BITBANG_EN => {
                self.enabled = value & 1 != 0;
                if !self.enabled && self.last & CS_N == 0 {
                    self.drive(CS_N);
                }
            }
            BITBANG if self.enabled => self.drive(value),
            BITBANG => self.stray_writes += 1,
            _ => {}
        }
    }
}
