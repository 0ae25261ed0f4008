//! Simulated I2C bus with one register-file slave.
//!
//! The bus is open-drain: SDA reads low whenever the master or the slave
//! pulls it low. The slave follows the usual timing, sampling SDA on SCL
//! rising edges and changing its own SDA output only while SCL is low,
//! and recognizes START / STOP as SDA edges while SCL is high.
//!
//! Writes use the common EEPROM/PMIC convention: the first byte after the
//! address sets the register pointer, following bytes are stored at the
//! pointer, which auto-increments. Reads return bytes from the pointer.

use common::mmio::RegisterBlock;

use crate::hal::gpio::PinLevel;
use crate::hal::i2c::I2cLines;
use crate::hw::litex::i2c::{R, W, W_OE, W_SCL, W_SDA};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Slave {
    Idle,
    /// Shifting in the address byte.
    Address,
    /// Holding the address ACK.
    AddressAck { read: bool },
    /// Shifting in a written byte.
    Write,
    /// Holding a write ACK.
    WriteAck,
    /// Shifting out a byte.
    Read,
    /// Waiting for the master's ACK/NACK after a read byte.
    ReadAck { acked: bool },
    /// Not addressed, or transaction finished; wait for START/STOP.
    Ignore,
}

/// Bus events observed since construction.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct BusStats {
    pub starts: u32,
    pub stops: u32,
}

/// I2C bus with a single slave device.
pub struct SimI2cBus {
    scl: bool,
    master_sda: Option<bool>,
    slave_low: bool,
    last_w: u32,

    state: Slave,
    shift: u8,
    bits: u8,
    pointer: u8,
    pointer_set: bool,
    written: usize,

    address: u8,
    present: bool,
    refuse_reads: bool,
    nack_write_at: Option<usize>,
    registers: [u8; 256],
    stats: BusStats,
}

impl SimI2cBus {
    /// Bus with a responding device at 7-bit `address`.
    pub const fn new(address: u8) -> Self {
        Self {
            scl: true,
            master_sda: None,
            slave_low: false,
            last_w: W_SCL,
            state: Slave::Idle,
            shift: 0,
            bits: 0,
            pointer: 0,
            pointer_set: false,
            written: 0,
            address,
            present: true,
            refuse_reads: false,
            nack_write_at: None,
            registers: [0; 256],
            stats: BusStats {
                starts: 0,
                stops: 0,
            },
        }
    }

    /// Bus where nothing answers.
    pub const fn empty() -> Self {
        let mut bus = Self::new(0);
        bus.present = false;
        bus
    }

    /// Refuse to acknowledge the `index`-th byte written after the address
    /// (0 is the register pointer).
    pub fn nack_write_at(&mut self, index: usize) {
        self.nack_write_at = Some(index);
    }

    /// Acknowledge the address only in the write direction.
    pub fn refuse_reads(&mut self) {
        self.refuse_reads = true;
    }

    pub fn registers(&self) -> &[u8; 256] {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut [u8; 256] {
        &mut self.registers
    }

    pub fn stats(&self) -> BusStats {
        self.stats
    }

    /// Both lines high, master released and the slave waiting for START.
    pub fn is_idle(&self) -> bool {
        self.scl
            && self.master_sda.is_none()
            && self.line()
            && matches!(self.state, Slave::Idle)
    }

    /// Put the slave mid-read, holding SDA low as a confused device would
    /// after the master lost track of a transfer.
    pub fn wedge_mid_read(&mut self) {
        self.state = Slave::Read;
        self.tx_load(0x00);
        self.bits = 3;
        self.slave_low = true;
    }

    fn line(&self) -> bool {
        !(self.slave_low || self.master_sda == Some(false))
    }

    fn set_lines(&mut self, scl: bool, sda: Option<bool>) {
        let prev_scl = self.scl;
        let prev_line = self.line();

        self.scl = scl;
        self.master_sda = sda;
        let line = self.line();

        match (prev_scl, scl) {
            (true, true) if prev_line && !line => self.on_start(),
            (true, true) if !prev_line && line => self.on_stop(),
            (false, true) => self.on_rising(line),
            (true, false) => self.on_falling(),
            _ => {}
        }
    }

    fn on_start(&mut self) {
        self.stats.starts += 1;
        self.state = Slave::Address;
        self.shift = 0;
        self.bits = 0;
        self.slave_low = false;
    }

    fn on_stop(&mut self) {
        self.stats.stops += 1;
        self.state = Slave::Idle;
        self.slave_low = false;
    }

    fn on_rising(&mut self, sda: bool) {
        match self.state {
            Slave::Address | Slave::Write => {
                if self.bits < 8 {
                    self.shift = (self.shift << 1) | sda as u8;
                    self.bits += 1;
                }
            }
            Slave::Read => self.bits += 1,
            Slave::ReadAck { .. } => self.state = Slave::ReadAck { acked: !sda },
            _ => {}
        }
    }

    fn on_falling(&mut self) {
        match self.state {
            Slave::Address if self.bits == 8 => {
                let read = self.shift & 1 != 0;
                let matched = self.present
                    && self.shift >> 1 == self.address
                    && !(read && self.refuse_reads);
                if matched {
                    self.slave_low = true;
                    self.state = Slave::AddressAck { read };
                } else {
                    self.state = Slave::Ignore;
                }
            }
            Slave::AddressAck { read } => {
                self.slave_low = false;
                if read {
                    let byte = self.next_read_byte();
                    self.tx_load(byte);
                } else {
                    self.pointer_set = false;
                    self.written = 0;
                    self.begin_write_byte();
                }
            }
            Slave::Write if self.bits == 8 => {
                let index = self.written;
                self.written += 1;
                if self.nack_write_at == Some(index) {
                    self.state = Slave::Ignore;
                    return;
                }
                if self.pointer_set {
                    self.registers[self.pointer as usize] = self.shift;
                    self.pointer = self.pointer.wrapping_add(1);
                } else {
                    self.pointer = self.shift;
                    self.pointer_set = true;
                }
                self.slave_low = true;
                self.state = Slave::WriteAck;
            }
            Slave::WriteAck => {
                self.slave_low = false;
                self.begin_write_byte();
            }
            Slave::Read => {
                if self.bits == 8 {
                    self.slave_low = false;
                    self.state = Slave::ReadAck { acked: false };
                } else {
                    self.present_bit();
                }
            }
            Slave::ReadAck { acked } => {
                if acked {
                    let byte = self.next_read_byte();
                    self.tx_load(byte);
                } else {
                    self.slave_low = false;
                    self.state = Slave::Ignore;
                }
            }
            _ => {}
        }
    }

    fn begin_write_byte(&mut self) {
        self.state = Slave::Write;
        self.shift = 0;
        self.bits = 0;
    }

    fn next_read_byte(&mut self) -> u8 {
        let byte = self.registers[self.pointer as usize];
        self.pointer = self.pointer.wrapping_add(1);
        byte
    }

    fn tx_load(&mut self, byte: u8) {
        self.state = Slave::Read;
        self.shift = byte;
        self.bits = 0;
        self.present_bit();
    }

    fn present_bit(&mut self) {
        let bit = (self.shift >> (7 - self.bits)) & 1;
        self.slave_low = bit == 0;
    }
}

impl I2cLines for SimI2cBus {
    fn drive(&mut self, scl: PinLevel, sda: Option<PinLevel>) {
        self.set_lines(scl.is_high(), sda.map(PinLevel::is_high));
    }

    fn sda(&self) -> PinLevel {
        self.line().into()
    }
}

/// The LiteX I2C CSR pair, wired to the simulated bus.
impl RegisterBlock for SimI2cBus {
    fn read(&self, offset: usize) -> u32 {
        match offset {
            W => self.last_w,
            R => self.line() as u32,
            _ => 0,
        }
    }

    fn write(&mut self, offset: usize, value: u32) {
        if offset == W {
            self.last_w = value;
            let sda = (value & W_OE != 0).then_some(value & W_SDA != 0);
            self.set_lines(value & W_SCL != 0, sda);
        }
    }
}
