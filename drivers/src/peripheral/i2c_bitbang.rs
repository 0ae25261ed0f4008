//! Bit-banged I2C master.
//!
//! Drives SCL and SDA through an [`I2cLines`] implementation, one register
//! write per line change, with every level held for at least one delay
//! unit: a quarter of the SCL period. SDA is only changed while SCL is
//! low, except to form START and STOP conditions.
//!
//! Every transaction that fails on a missing acknowledge issues a STOP
//! before returning, so the bus is idle whenever control returns to the
//! caller.
//!
//! # Example
//!
//! ```no_run
//! use softsoc_drivers::hal::i2c::I2cBus;
//! use softsoc_drivers::hal::timer::NoDelay;
//! use softsoc_drivers::peripheral::i2c_bitbang::{BitBangI2c, I2cConfig};
//! use softsoc_drivers::sim::i2c::SimI2cBus;
//!
//! let mut i2c = BitBangI2c::new(SimI2cBus::new(0x50), NoDelay, &I2cConfig::STANDARD);
//! i2c.write(0x50, 0x00, &[0xDE, 0xAD]).unwrap();
//! ```

use log::{debug, warn};

use crate::error::{ConfigError, I2cError, NackStage};
use crate::hal::gpio::PinLevel::{self, High, Low};
use crate::hal::i2c::{I2cBus, I2cLines};
use crate::hal::timer::Delay;

/// Bus timing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct I2cConfig {
    pub frequency_hz: u32,
}

impl I2cConfig {
    pub const STANDARD: Self = Self::new(100_000);
    pub const FAST: Self = Self::new(400_000);

    pub const fn new(frequency_hz: u32) -> Self {
        Self { frequency_hz }
    }

    /// One delay unit, a quarter of the SCL period.
    pub const fn quarter_period_ns(&self) -> u32 {
        if self.frequency_hz == 0 {
            return 0;
        }
        250_000_000 / self.frequency_hz
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frequency_hz == 0 || self.frequency_hz > 1_000_000 {
            return Err(ConfigError::I2cFrequency(self.frequency_hz));
        }
        Ok(())
    }
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Where the engine is within the bus protocol.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Both lines released high.
    Idle,
    /// SDA pulled low under a high SCL.
    StartAsserted,
    /// SCL low, data bit being placed on SDA.
    ClockLow,
    /// Data bit held while SCL is still low.
    DataSettle,
    /// SCL high, the receiver samples.
    ClockHigh,
    /// SDA released for the receiver's acknowledge.
    AckSample,
    /// SDA rising under a high SCL.
    StopAsserted,
}

pub struct BitBangI2c<L: I2cLines, D: Delay> {
    lines: L,
    delay: D,
    quarter_ns: u32,
    phase: Phase,
}

impl<L: I2cLines, D: Delay> BitBangI2c<L, D> {
    pub fn new(lines: L, delay: D, config: &I2cConfig) -> Self {
        Self {
            lines,
            delay,
            quarter_ns: config.quarter_period_ns(),
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn lines(&self) -> &L {
        &self.lines
    }

    pub fn lines_mut(&mut self) -> &mut L {
        &mut self.lines
    }

    pub fn into_parts(self) -> (L, D) {
        (self.lines, self.delay)
    }

    fn wait(&mut self, quarters: u32) {
        self.delay.delay_ns(self.quarter_ns.saturating_mul(quarters));
    }

    fn drive(&mut self, scl: PinLevel, sda: Option<PinLevel>) {
        self.lines.drive(scl, sda);
    }

    /// START condition: SDA falls while SCL is high. Also used as a
    /// repeated start in the middle of a transaction.
    pub fn start(&mut self) {
        self.phase = Phase::StartAsserted;
        self.drive(High, Some(High));
        self.wait(1);
        self.drive(High, Some(Low));
        self.wait(1);
        self.drive(Low, Some(Low));
        self.wait(1);
    }

    /// STOP condition: SDA rises while SCL is high. Leaves both lines
    /// released.
    pub fn stop(&mut self) {
        self.phase = Phase::StopAsserted;
        self.drive(Low, Some(Low));
        self.wait(1);
        self.drive(High, Some(Low));
        self.wait(1);
        self.drive(High, Some(High));
        self.wait(1);
        self.drive(High, None);
        self.phase = Phase::Idle;
    }

    fn transmit_bit(&mut self, level: PinLevel) {
        self.phase = Phase::ClockLow;
        self.drive(Low, Some(level));
        self.phase = Phase::DataSettle;
        self.wait(1);
        self.phase = Phase::ClockHigh;
        self.drive(High, Some(level));
        self.wait(2);
        self.drive(Low, Some(level));
        self.wait(1);
    }

    fn receive_bit(&mut self) -> PinLevel {
        self.drive(Low, None);
        self.wait(1);
        self.drive(High, None);
        self.wait(1);
        let level = self.lines.sda();
        self.wait(1);
        self.drive(Low, None);
        self.wait(1);
        level
    }

    /// Shift out `byte` MSB first and sample the acknowledge.
    ///
    /// Returns `true` when the receiver pulled SDA low.
    pub fn write_byte(&mut self, byte: u8) -> bool {
        for bit in (0..8).rev() {
            self.transmit_bit(((byte >> bit) & 1 != 0).into());
        }
        self.drive(Low, None);
        self.phase = Phase::AckSample;
        self.receive_bit().is_low()
    }

    /// Shift in a byte, then acknowledge it (`send_ack`) or signal the end
    /// of the read with a NACK.
    pub fn read_byte(&mut self, send_ack: bool) -> u8 {
        let mut byte = 0u8;
        for _ in 0..8 {
            self.phase = Phase::ClockHigh;
            byte = (byte << 1) | self.receive_bit().is_high() as u8;
        }
        self.transmit_bit((!send_ack).into());
        self.drive(Low, None);
        byte
    }

    /// Clock out a wedged slave: nine SCL pulses with SDA released, then a
    /// STOP.
    pub fn reset(&mut self) {
        debug!("i2c: bus reset");
        self.phase = Phase::ClockLow;
        for _ in 0..9 {
            self.drive(Low, None);
            self.wait(2);
            self.drive(High, None);
            self.wait(2);
        }
        self.stop();
    }

    fn nack(&mut self, address: u8, stage: NackStage) -> I2cError {
        self.stop();
        warn!("i2c: no ack from {address:#04x} at {stage:?}");
        I2cError::Nack { address, stage }
    }

    fn check_address(address: u8) -> Result<(), I2cError> {
        if address > 0x7F {
            return Err(I2cError::InvalidAddress(address));
        }
        Ok(())
    }

    /// START, address in write direction, register pointer.
    fn select_register(&mut self, address: u8, register: u8) -> Result<(), I2cError> {
        self.start();
        if !self.write_byte(address << 1) {
            return Err(self.nack(address, NackStage::AddressWrite));
        }
        if !self.write_byte(register) {
            return Err(self.nack(address, NackStage::Register));
        }
        Ok(())
    }
}

impl<L: I2cLines, D: Delay> I2cBus for BitBangI2c<L, D> {
    fn write(&mut self, address: u8, register: u8, data: &[u8]) -> Result<(), I2cError> {
        Self::check_address(address)?;
        self.select_register(address, register)?;
        for (index, &byte) in data.iter().enumerate() {
            if !self.write_byte(byte) {
                return Err(self.nack(address, NackStage::Data { index }));
            }
        }
        self.stop();
        Ok(())
    }

    fn read(
        &mut self,
        address: u8,
        register: u8,
        buffer: &mut [u8],
        send_stop: bool,
    ) -> Result<(), I2cError> {
        Self::check_address(address)?;
        self.select_register(address, register)?;
        // A read address with no bytes to clock would leave the slave
        // driving SDA, so stop after the pointer write.
        if buffer.is_empty() {
            self.stop();
            return Ok(());
        }
        if send_stop {
            self.stop();
        }
        self.start();
        if !self.write_byte((address << 1) | 1) {
            return Err(self.nack(address, NackStage::AddressRead));
        }
        let last = buffer.len().saturating_sub(1);
        for (index, byte) in buffer.iter_mut().enumerate() {
            *byte = self.read_byte(index != last);
        }
        self.stop();
        Ok(())
    }

    fn poll(&mut self, address: u8) -> bool {
        if Self::check_address(address).is_err() {
            return false;
        }
        self.start();
        let present = self.write_byte((address << 1) | 1);
        if present {
            self.read_byte(false);
        }
        self.stop();
        present
    }
}
