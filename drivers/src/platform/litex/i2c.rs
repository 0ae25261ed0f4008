//! LiteX I2C Line Adapter
//!
//! The LiteX `I2C` core is a pair of CSRs wired straight to the pads:
//! `w` drives SCL, the SDA output enable and the SDA level; `r` samples
//! SDA. All protocol timing lives in the bit-bang engine.

use common::mmio::{BusHandle, Mmio, RegisterBlock};

use crate::hal::gpio::PinLevel;
use crate::hal::i2c::I2cLines;
use crate::hw::litex::i2c::{R, W, W_OE, W_SCL, W_SDA};

pub struct LitexI2c<R: RegisterBlock = Mmio> {
    regs: R,
}

impl LitexI2c<Mmio> {
    /// # Safety
    ///
    /// `handle` must point to a LiteX I2C CSR window owned by the caller.
    pub const unsafe fn new(handle: BusHandle) -> Self {
        Self {
            regs: unsafe { Mmio::new(handle) },
        }
    }
}

impl<R: RegisterBlock> LitexI2c<R> {
    pub const fn with_registers(regs: R) -> Self {
        Self { regs }
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }
}

impl<R: RegisterBlock> I2cLines for LitexI2c<R> {
    fn drive(&mut self, scl: PinLevel, sda: Option<PinLevel>) {
        let mut value = 0;
        if scl.is_high() {
            value |= W_SCL;
        }
        if let Some(level) = sda {
            value |= W_OE;
            if level.is_high() {
                value |= W_SDA;
            }
        }
        self.regs.write(W, value);
    }

    fn sda(&self) -> PinLevel {
        (self.regs.read(R) & 1 != 0).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::i2c::SimI2cBus;

    #[test]
    fn encodes_line_states() {
        let mut bus = SimI2cBus::new(0x50);
        let mut lines = LitexI2c::with_registers(&mut bus);

        lines.drive(PinLevel::High, Some(PinLevel::Low));
        assert_eq!(lines.registers().read(W), W_SCL | W_OE);
        assert_eq!(lines.sda(), PinLevel::Low);

        lines.drive(PinLevel::Low, None);
        assert_eq!(lines.registers().read(W), 0);
        assert_eq!(lines.sda(), PinLevel::High);
    }
}
