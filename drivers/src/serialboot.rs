//! Serial boot loader.
//!
//! Speaks the LiteX serial flash loader (SFL) protocol over any UART. The
//! BIOS announces itself with a magic string; a host tool that answers
//! with its own magic then streams frames:
//!
//! ```text
//! +--------+-----------+-----+-------------------+
//! | length | crc16 (BE)| cmd | payload[length]   |
//! +--------+-----------+-----+-------------------+
//! ```
//!
//! The CRC is CRC-16/XMODEM over `cmd` followed by the payload. Each frame
//! is answered with a single status byte. `LOAD` carries a big-endian
//! address followed by data; `JUMP` carries the entry address and ends the
//! session. `FLASH` is `LOAD` aimed at the boot flash, and `REBOOT` ends
//! the session asking the caller to reset the SoC.

use common::crc;
use log::{debug, info, warn};
use thiserror::Error;

use crate::config::Region;
use crate::error::{BootError, FlashError};
use crate::hal::serial::{NonBlockingSerial, SerialError};
use crate::hal::spi::SpiBus;
use crate::hal::timer::{CountingTimer, Delay};
use crate::peripheral::spiflash::SpiFlash;

/// Sent by the BIOS to announce it is waiting for a host.
pub const MAGIC_REQUEST: &[u8; 14] = b"sL5DdSMmkekro\n";
/// Expected answer from the host.
pub const MAGIC_ACK: &[u8; 14] = b"z6IHG7cYDID6o\n";

pub const MAX_PAYLOAD: usize = 255;
/// Header bytes before the payload: length, crc16, cmd.
pub const HEADER_LEN: usize = 4;

/// Frame commands.
pub mod cmd {
    pub const ABORT: u8 = 0x00;
    pub const LOAD: u8 = 0x01;
    pub const JUMP: u8 = 0x02;
    pub const FLASH: u8 = 0x04;
    pub const REBOOT: u8 = 0x05;
}

/// Single-byte replies.
pub mod reply {
    pub const SUCCESS: u8 = b'K';
    pub const CRC_ERROR: u8 = b'C';
    pub const UNKNOWN: u8 = b'U';
    pub const ERROR: u8 = b'E';
}

const ESC: u8 = 0x1B;

/// A load that does not fit the target.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
#[error("load of {len:#x} bytes at {address:#x} is outside the target window")]
pub struct LoadRejected {
    pub address: u32,
    pub len: usize,
}

/// Destination for `LOAD` and `FLASH` frames.
pub trait LoadTarget {
    fn load(&mut self, address: u32, data: &[u8]) -> Result<(), LoadRejected>;

    /// Write `data` to boot flash at `offset`. Targets without flash
    /// reject every write.
    fn flash(&mut self, offset: u32, data: &[u8]) -> Result<(), LoadRejected> {
        Err(LoadRejected {
            address: offset,
            len: data.len(),
        })
    }
}

impl<L: LoadTarget + ?Sized> LoadTarget for &mut L {
    fn load(&mut self, address: u32, data: &[u8]) -> Result<(), LoadRejected> {
        (**self).load(address, data)
    }

    fn flash(&mut self, offset: u32, data: &[u8]) -> Result<(), LoadRejected> {
        (**self).flash(offset, data)
    }
}

/// RAM loads go to `ram`; `FLASH` frames program `flash`.
///
/// Frames are expected in address order. A frame starting on a sector
/// boundary erases that sector first, so an image streamed from a
/// sector-aligned offset lands on erased flash.
pub struct FlashTarget<'a, B: SpiBus, D: Delay, L> {
    flash: &'a mut SpiFlash<B, D>,
    ram: L,
}

impl<'a, B: SpiBus, D: Delay, L: LoadTarget> FlashTarget<'a, B, D, L> {
    pub fn new(flash: &'a mut SpiFlash<B, D>, ram: L) -> Self {
        Self { flash, ram }
    }

    pub fn into_ram(self) -> L {
        self.ram
    }

    fn write_flash(&mut self, offset: u32, data: &[u8]) -> Result<(), FlashError> {
        let geometry = *self.flash.geometry();
        let range = geometry.range(offset, data.len())?;
        if range.is_empty() {
            return Ok(());
        }
        if offset % geometry.sector_size == 0 {
            self.flash.erase(offset, geometry.sector_size as usize)?;
        }
        self.flash.program(offset, data)?;
        self.flash.verify(offset, data)
    }
}

impl<B: SpiBus, D: Delay, L: LoadTarget> LoadTarget for FlashTarget<'_, B, D, L> {
    fn load(&mut self, address: u32, data: &[u8]) -> Result<(), LoadRejected> {
        self.ram.load(address, data)
    }

    fn flash(&mut self, offset: u32, data: &[u8]) -> Result<(), LoadRejected> {
        self.write_flash(offset, data).map_err(|err| {
            warn!("serialboot: flash write at {offset:#x}: {err}");
            LoadRejected {
                address: offset,
                len: data.len(),
            }
        })
    }
}

/// A byte buffer that appears at `base` in the address space.
pub struct SliceTarget<'a> {
    base: u32,
    memory: &'a mut [u8],
}

impl<'a> SliceTarget<'a> {
    pub fn new(base: u32, memory: &'a mut [u8]) -> Self {
        Self { base, memory }
    }
}

impl LoadTarget for SliceTarget<'_> {
    fn load(&mut self, address: u32, data: &[u8]) -> Result<(), LoadRejected> {
        let rejected = LoadRejected {
            address,
            len: data.len(),
        };
        let offset = address.checked_sub(self.base).ok_or(rejected)? as usize;
        let window = offset
            .checked_add(data.len())
            .and_then(|end| self.memory.get_mut(offset..end))
            .ok_or(rejected)?;
        window.copy_from_slice(data);
        Ok(())
    }
}

/// Physical memory, written with volatile byte stores.
pub struct RegionTarget {
    region: Region,
}

impl RegionTarget {
    /// # Safety
    ///
    /// `region` must be writable RAM that nothing else is using.
    pub const unsafe fn new(region: Region) -> Self {
        Self { region }
    }
}

impl LoadTarget for RegionTarget {
    fn load(&mut self, address: u32, data: &[u8]) -> Result<(), LoadRejected> {
        if !self.region.contains(address as usize, data.len()) {
            return Err(LoadRejected {
                address,
                len: data.len(),
            });
        }
        let dst = address as usize as *mut u8;
        for (i, &byte) in data.iter().enumerate() {
            // SAFETY: bounds checked against the region above
            unsafe { core::ptr::write_volatile(dst.add(i), byte) };
        }
        Ok(())
    }
}

/// One received frame.
#[derive(Clone)]
pub struct Frame {
    pub cmd: u8,
    pub crc: u16,
    len: u8,
    payload: [u8; MAX_PAYLOAD],
}

impl Frame {
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len as usize]
    }

    pub fn crc_ok(&self) -> bool {
        let computed = crc::crc16_update(crc::crc16_update(crc::crc16_init(), &[self.cmd]), self.payload());
        crc::crc16_finalize(computed) == self.crc
    }

    /// Big-endian address at the start of the payload.
    fn address(&self) -> Option<u32> {
        let bytes = self.payload().get(..4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Serialize a frame into `out`, returning its length.
///
/// Used by host-side tooling and tests. Panics if `payload` exceeds
/// [`MAX_PAYLOAD`] or `out` is too small.
pub fn encode_frame(command: u8, payload: &[u8], out: &mut [u8]) -> usize {
    assert!(payload.len() <= MAX_PAYLOAD);
    let crc = crc::Crc16::new().update(&[command]).update(payload).finish();
    let [hi, lo] = crc.to_be_bytes();
    out[..HEADER_LEN].copy_from_slice(&[payload.len() as u8, hi, lo, command]);
    out[HEADER_LEN..HEADER_LEN + payload.len()].copy_from_slice(payload);
    HEADER_LEN + payload.len()
}

/// Timing and retry policy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BootConfig {
    /// How long to wait for the host's magic.
    pub handshake_timeout_us: u32,
    /// Gap allowed between bytes of one frame.
    pub byte_timeout_us: u32,
    /// Consecutive bad frames before giving up.
    pub max_failures: u32,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_us: 500_000,
            byte_timeout_us: 100_000,
            max_failures: 5,
        }
    }
}

/// Run a serial boot session.
///
/// Returns the entry address from the host's `JUMP`; transferring control
/// there is left to the caller.
pub fn boot<S, T, L>(
    port: &mut S,
    timer: &T,
    target: &mut L,
    config: &BootConfig,
) -> Result<u32, BootError>
where
    S: NonBlockingSerial + ?Sized,
    T: CountingTimer + ?Sized,
    L: LoadTarget + ?Sized,
{
    port.write(MAGIC_REQUEST)?;
    handshake(port, timer, config.handshake_timeout_us)?;
    info!("serialboot: host connected");

    let mut failures = 0;
    loop {
        let frame = match read_frame(port, timer, config.byte_timeout_us) {
            Ok(frame) if frame.crc_ok() => frame,
            Ok(frame) => {
                warn!("serialboot: bad CRC on cmd {:#04x}", frame.cmd);
                failures += 1;
                port.write_byte(reply::CRC_ERROR)?;
                if failures >= config.max_failures {
                    return Err(BootError::TooManyErrors(failures));
                }
                continue;
            }
            Err(SerialError::Timeout) => {
                warn!("serialboot: frame timed out");
                failures += 1;
                port.write_byte(reply::ERROR)?;
                if failures >= config.max_failures {
                    return Err(BootError::TooManyErrors(failures));
                }
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        failures = 0;

        match frame.cmd {
            cmd::ABORT => {
                port.write_byte(reply::SUCCESS)?;
                info!("serialboot: aborted by host");
                return Err(BootError::Aborted);
            }
            cmd::LOAD => {
                let status = match frame.address() {
                    Some(address) => match target.load(address, &frame.payload()[4..]) {
                        Ok(()) => {
                            debug!("serialboot: loaded {:#x}+{:#x}", address, frame.len - 4);
                            reply::SUCCESS
                        }
                        Err(err) => {
                            warn!("serialboot: {err}");
                            reply::ERROR
                        }
                    },
                    None => reply::ERROR,
                };
                port.write_byte(status)?;
            }
            cmd::FLASH => {
                let status = match frame.address() {
                    Some(offset) => match target.flash(offset, &frame.payload()[4..]) {
                        Ok(()) => {
                            debug!("serialboot: flashed {:#x}+{:#x}", offset, frame.len - 4);
                            reply::SUCCESS
                        }
                        Err(_) => reply::ERROR,
                    },
                    None => reply::ERROR,
                };
                port.write_byte(status)?;
            }
            cmd::REBOOT => {
                port.write_byte(reply::SUCCESS)?;
                info!("serialboot: reboot requested");
                return Err(BootError::Reboot);
            }
            cmd::JUMP => match frame.address() {
                Some(entry) => {
                    port.write_byte(reply::SUCCESS)?;
                    info!("serialboot: jumping to {entry:#010x}");
                    return Ok(entry);
                }
                None => port.write_byte(reply::ERROR)?,
            },
            other => {
                debug!("serialboot: unknown cmd {other:#04x}");
                port.write_byte(reply::UNKNOWN)?;
            }
        }
    }
}

/// Wait for [`MAGIC_ACK`]. `Q` or ESC from the console cancels.
fn handshake<S, T>(port: &mut S, timer: &T, timeout_us: u32) -> Result<(), BootError>
where
    S: NonBlockingSerial + ?Sized,
    T: CountingTimer + ?Sized,
{
    let start = timer.now_us();
    let mut matched = 0;
    loop {
        match port.try_read_byte() {
            Ok(b'Q' | ESC) if matched == 0 => return Err(BootError::Aborted),
            Ok(byte) if byte == MAGIC_ACK[matched] => {
                matched += 1;
                if matched == MAGIC_ACK.len() {
                    return Ok(());
                }
            }
            Ok(byte) => matched = (byte == MAGIC_ACK[0]) as usize,
            Err(SerialError::WouldBlock) => {}
            Err(err) => return Err(err.into()),
        }
        if timer.now_us().wrapping_sub(start) >= timeout_us as u64 {
            return Err(BootError::NoHost);
        }
    }
}

fn read_frame<S, T>(port: &mut S, timer: &T, byte_timeout_us: u32) -> Result<Frame, SerialError>
where
    S: NonBlockingSerial + ?Sized,
    T: CountingTimer + ?Sized,
{
    let mut header = [0u8; HEADER_LEN];
    port.read_exact_timeout(&mut header, timer, byte_timeout_us)?;
    let [len, crc_hi, crc_lo, cmd] = header;

    let mut frame = Frame {
        cmd,
        crc: u16::from_be_bytes([crc_hi, crc_lo]),
        len,
        payload: [0; MAX_PAYLOAD],
    };
    port.read_exact_timeout(&mut frame.payload[..len as usize], timer, byte_timeout_us)?;
    Ok(frame)
}
