//! Error taxonomy.
//!
//! | Kind            | Type                                  | Hardware touched? |
//! |-----------------|---------------------------------------|-------------------|
//! | bus protocol    | [`I2cError::Nack`]                    | yes, bus released |
//! | hardware timeout| [`FlashError::Incomplete`]            | yes, state unknown|
//! | data integrity  | [`MemtestFailure`], [`ChecksumMismatch`], [`FlashError::VerifyFailed`] | yes |
//! | invalid range   | [`RangeError`]                        | never             |

pub use common::crc::ChecksumMismatch;
use thiserror::Error;

use crate::hal::serial::SerialError;
use crate::memtest::{Mismatch, Pattern};

/// Where in an I2C transaction the acknowledge went missing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NackStage {
    /// Address byte, write direction.
    AddressWrite,
    /// Address byte, read direction.
    AddressRead,
    /// Register pointer byte.
    Register,
    /// Payload byte at `index`.
    Data { index: usize },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum I2cError {
    /// The device did not acknowledge; a stop has been issued.
    #[error("device {address:#04x} not responding ({stage:?})")]
    Nack { address: u8, stage: NackStage },
    /// Address outside the 7-bit space.
    #[error("invalid 7-bit address {0:#04x}")]
    InvalidAddress(u8),
}

/// Flash operation that can be left incomplete.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlashOp {
    SectorErase,
    ChipErase,
    PageProgram,
}

/// A flash address range rejected before any command was issued.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("range {start:#x}+{len:#x} exceeds capacity {capacity:#x}")]
    OutOfCapacity { start: u32, len: u32, capacity: u32 },
    #[error("range {start:#x}+{len:#x} is not aligned to {sector_size:#x}-byte sectors")]
    Unaligned { start: u32, len: u32, sector_size: u32 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum FlashError {
    #[error(transparent)]
    InvalidRange(#[from] RangeError),
    /// The device never cleared its busy flag; contents are undefined.
    #[error("{op:?} at {address:#x} did not complete after {polls} status polls")]
    Incomplete { op: FlashOp, address: u32, polls: u32 },
    /// Read-back differs from what was programmed.
    #[error("verify failed at {address:#x}: wrote {expected:#04x}, read {actual:#04x}")]
    VerifyFailed { address: u32, expected: u8, actual: u8 },
    #[error(transparent)]
    Checksum(#[from] ChecksumMismatch),
}

/// A memory test found at least one word that did not hold its pattern.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
#[error(
    "{pattern:?} pattern: {errors} errors, first at {:#x} (expected {:#010x}, read {:#010x})",
    .first.address, .first.expected, .first.actual
)]
pub struct MemtestFailure {
    pub pattern: Pattern,
    pub first: Mismatch,
    pub errors: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum BootError {
    /// No host answered the serial boot handshake.
    #[error("no serial boot host")]
    NoHost,
    /// The host sent an abort command.
    #[error("serial boot aborted by host")]
    Aborted,
    /// The host asked for a SoC reset.
    #[error("serial boot host requested a reboot")]
    Reboot,
    /// Too many consecutive bad frames.
    #[error("serial boot gave up after {0} consecutive errors")]
    TooManyErrors(u32),
    #[error(transparent)]
    Serial(#[from] SerialError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be non-zero")]
    Zero(&'static str),
    #[error("{what} ({value:#x}) must be a power of two")]
    NotPowerOfTwo { what: &'static str, value: u32 },
    #[error("flash capacity {0:#x} needs more than 3 address bytes")]
    CapacityTooLarge(u32),
    #[error("flash page size exceeds sector size")]
    PageLargerThanSector,
    #[error("I2C frequency {0} Hz is out of range")]
    I2cFrequency(u32),
}

/// Any failure surfaced by the drivers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    I2c(#[from] I2cError),
    #[error(transparent)]
    Flash(#[from] FlashError),
    #[error(transparent)]
    Memtest(#[from] MemtestFailure),
    #[error(transparent)]
    Checksum(#[from] ChecksumMismatch),
    #[error(transparent)]
    Boot(#[from] BootError),
    #[error(transparent)]
    Serial(#[from] SerialError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<RangeError> for Error {
    fn from(err: RangeError) -> Self {
        Error::Flash(err.into())
    }
}
