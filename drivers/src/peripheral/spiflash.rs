//! SPI NOR Flash Driver
//!
//! Command sequencing for 25-series serial NOR flash behind a [`SpiBus`]:
//! identification, reads, sector and chip erase, page programming and
//! verification. Addresses are 3 bytes, so devices up to 16 MiB are
//! reachable.
//!
//! Every range is validated against the [`FlashGeometry`] before the first
//! command goes out; a rejected range leaves the bus untouched. Erase and
//! program wait for the busy flag with a bounded number of status polls
//! and report [`FlashError::Incomplete`] when the budget runs out.
//!
//! Programming only clears bits. Nothing here erases implicitly except
//! [`SpiFlash::write_image`].

use bitflags::bitflags;
use common::crc::{self, Crc32};
use log::{debug, trace, warn};

use crate::error::{ConfigError, FlashError, FlashOp, RangeError};
use crate::hal::spi::SpiBus;
use crate::hal::timer::Delay;

/// Standard SPI NOR opcodes.
pub mod opcode {
    pub const WRITE_STATUS: u8 = 0x01;
    pub const PAGE_PROGRAM: u8 = 0x02;
    pub const READ: u8 = 0x03;
    pub const WRITE_DISABLE: u8 = 0x04;
    pub const READ_STATUS: u8 = 0x05;
    pub const WRITE_ENABLE: u8 = 0x06;
    pub const SECTOR_ERASE_4K: u8 = 0x20;
    pub const READ_ID: u8 = 0x9F;
    pub const CHIP_ERASE: u8 = 0xC7;
    pub const BLOCK_ERASE_64K: u8 = 0xD8;
}

/// Largest address expressible with 3 address bytes, plus one.
pub const MAX_CAPACITY: u32 = 1 << 24;

const CHUNK: usize = 256;

bitflags! {
    /// Status register 1.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct Status: u8 {
        /// Write in progress.
        const WIP = 1 << 0;
        /// Write enable latch.
        const WEL = 1 << 1;
        const BP0 = 1 << 2;
        const BP1 = 1 << 3;
        const BP2 = 1 << 4;
        /// Status register write disable.
        const SRWD = 1 << 7;
    }
}

/// JEDEC manufacturer and device identification.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct JedecId {
    pub manufacturer: u8,
    pub memory_type: u8,
    pub capacity: u8,
}

impl JedecId {
    /// Capacity encoded as a power of two, when the code is plausible.
    pub fn capacity_bytes(&self) -> Option<u32> {
        match self.capacity {
            10..=31 => Some(1 << self.capacity),
            _ => None,
        }
    }

    /// All-ones or all-zeros means nothing is driving MISO.
    pub fn is_present(&self) -> bool {
        let raw = [self.manufacturer, self.memory_type, self.capacity];
        raw != [0xFF; 3] && raw != [0x00; 3]
    }
}

/// Device layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FlashGeometry {
    pub capacity: u32,
    /// Erase unit.
    pub sector_size: u32,
    /// Program unit; a page program wraps within it.
    pub page_size: u32,
    /// Opcode that erases one `sector_size` unit.
    pub erase_opcode: u8,
}

impl FlashGeometry {
    /// 16 MiB part erased in 64 KiB blocks.
    pub const DEFAULT: Self = Self {
        capacity: 16 * 1024 * 1024,
        sector_size: 64 * 1024,
        page_size: 256,
        erase_opcode: opcode::BLOCK_ERASE_64K,
    };

    pub const fn with_4k_sectors(capacity: u32) -> Self {
        Self {
            capacity,
            sector_size: 4 * 1024,
            page_size: 256,
            erase_opcode: opcode::SECTOR_ERASE_4K,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (what, value) in [
            ("flash capacity", self.capacity),
            ("flash sector size", self.sector_size),
            ("flash page size", self.page_size),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(what));
            }
            if !value.is_power_of_two() {
                return Err(ConfigError::NotPowerOfTwo { what, value });
            }
        }
        if self.capacity > MAX_CAPACITY {
            return Err(ConfigError::CapacityTooLarge(self.capacity));
        }
        if self.page_size > self.sector_size || self.sector_size > self.capacity {
            return Err(ConfigError::PageLargerThanSector);
        }
        Ok(())
    }

    /// Check that `[start, start + len)` lies inside the device.
    pub fn range(&self, start: u32, len: usize) -> Result<FlashRange, RangeError> {
        let capacity = self.capacity;
        let out = |len: u32| RangeError::OutOfCapacity {
            start,
            len,
            capacity,
        };
        let len = u32::try_from(len).map_err(|_| out(u32::MAX))?;
        match start.checked_add(len) {
            Some(end) if end <= capacity => Ok(FlashRange { start, len }),
            _ => Err(out(len)),
        }
    }

    /// As [`FlashGeometry::range`], also requiring both ends on sector
    /// boundaries.
    pub fn sector_range(&self, start: u32, len: usize) -> Result<FlashRange, RangeError> {
        let range = self.range(start, len)?;
        let mask = self.sector_size - 1;
        if range.start & mask != 0 || range.len & mask != 0 {
            return Err(RangeError::Unaligned {
                start: range.start,
                len: range.len,
                sector_size: self.sector_size,
            });
        }
        Ok(range)
    }
}

impl Default for FlashGeometry {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A validated address range.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FlashRange {
    pub start: u32,
    pub len: u32,
}

impl FlashRange {
    pub const fn end(&self) -> u32 {
        self.start + self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Status poll budgets.
///
/// Each poll is one status read followed by `poll_interval_us` of delay.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FlashTimeouts {
    pub poll_interval_us: u32,
    pub program_polls: u32,
    pub erase_polls: u32,
    pub chip_erase_polls: u32,
}

impl FlashTimeouts {
    /// Datasheet maxima of common parts: 3 ms page, 2 s block, 200 s chip.
    pub const DEFAULT: Self = Self {
        poll_interval_us: 10,
        program_polls: 1_000,
        erase_polls: 300_000,
        chip_erase_polls: 20_000_000,
    };

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.program_polls == 0 {
            return Err(ConfigError::Zero("flash program poll budget"));
        }
        if self.erase_polls == 0 || self.chip_erase_polls == 0 {
            return Err(ConfigError::Zero("flash erase poll budget"));
        }
        Ok(())
    }
}

impl Default for FlashTimeouts {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// SPI NOR flash driver.
pub struct SpiFlash<B: SpiBus, D: Delay> {
    bus: B,
    delay: D,
    geometry: FlashGeometry,
    timeouts: FlashTimeouts,
}

impl<B: SpiBus, D: Delay> SpiFlash<B, D> {
    /// Fails if `geometry` or `timeouts` do not validate; the range checks
    /// rely on power-of-two sizes.
    pub fn new(
        bus: B,
        delay: D,
        geometry: FlashGeometry,
        timeouts: FlashTimeouts,
    ) -> Result<Self, ConfigError> {
        geometry.validate()?;
        timeouts.validate()?;
        Ok(Self {
            bus,
            delay,
            geometry,
            timeouts,
        })
    }

    pub fn geometry(&self) -> &FlashGeometry {
        &self.geometry
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_parts(self) -> (B, D) {
        (self.bus, self.delay)
    }

    fn command(op: u8, address: u32) -> [u8; 4] {
        let [_, a2, a1, a0] = address.to_be_bytes();
        [op, a2, a1, a0]
    }

    pub fn read_id(&mut self) -> JedecId {
        let mut id = [0u8; 3];
        self.bus.transaction(&[opcode::READ_ID], &mut id);
        JedecId {
            manufacturer: id[0],
            memory_type: id[1],
            capacity: id[2],
        }
    }

    pub fn read_status(&mut self) -> Status {
        let mut status = [0u8];
        self.bus.transaction(&[opcode::READ_STATUS], &mut status);
        Status::from_bits_retain(status[0])
    }

    pub fn write_enable(&mut self) {
        self.bus.transaction(&[opcode::WRITE_ENABLE], &mut []);
    }

    pub fn write_disable(&mut self) {
        self.bus.transaction(&[opcode::WRITE_DISABLE], &mut []);
    }

    fn wait_ready(&mut self, op: FlashOp, address: u32, polls: u32) -> Result<(), FlashError> {
        for _ in 0..polls {
            if !self.read_status().contains(Status::WIP) {
                return Ok(());
            }
            self.delay.delay_us(self.timeouts.poll_interval_us);
        }
        warn!("spiflash: {op:?} at {address:#x} still busy after {polls} polls");
        Err(FlashError::Incomplete { op, address, polls })
    }

    /// Read `buffer.len()` bytes starting at `start`.
    pub fn read(&mut self, start: u32, buffer: &mut [u8]) -> Result<(), FlashError> {
        let range = self.geometry.range(start, buffer.len())?;
        if range.is_empty() {
            return Ok(());
        }
        trace!("spiflash: read {:#x}+{:#x}", range.start, range.len);
        self.bus
            .transaction(&Self::command(opcode::READ, range.start), buffer);
        Ok(())
    }

    /// Erase every sector of `[start, start + len)`; both ends must be
    /// sector aligned.
    pub fn erase(&mut self, start: u32, len: usize) -> Result<(), FlashError> {
        let range = self.geometry.sector_range(start, len)?;
        if range.is_empty() {
            return Ok(());
        }
        debug!("spiflash: erase {:#x}+{:#x}", range.start, range.len);
        let polls = self.timeouts.erase_polls;
        for sector in (range.start..range.end()).step_by(self.geometry.sector_size as usize) {
            self.write_enable();
            let command = Self::command(self.geometry.erase_opcode, sector);
            self.bus.transaction(&command, &mut []);
            self.wait_ready(FlashOp::SectorErase, sector, polls)?;
        }
        Ok(())
    }

    pub fn erase_chip(&mut self) -> Result<(), FlashError> {
        debug!("spiflash: chip erase");
        self.write_enable();
        self.bus.transaction(&[opcode::CHIP_ERASE], &mut []);
        self.wait_ready(FlashOp::ChipErase, 0, self.timeouts.chip_erase_polls)
    }

    /// Program `data` at `start`, split so no page program crosses a page
    /// boundary. Only clears bits; erase first to write arbitrary data.
    pub fn program(&mut self, start: u32, data: &[u8]) -> Result<(), FlashError> {
        let range = self.geometry.range(start, data.len())?;
        if range.is_empty() {
            return Ok(());
        }
        debug!("spiflash: program {:#x}+{:#x}", range.start, range.len);
        let page = self.geometry.page_size;
        let polls = self.timeouts.program_polls;
        let mut address = range.start;
        let mut rest = data;
        while !rest.is_empty() {
            let room = (page - address % page) as usize;
            let (chunk, tail) = rest.split_at(room.min(rest.len()));
            trace!("spiflash: page program {:#x}+{:#x}", address, chunk.len());

            self.write_enable();
            self.bus.select();
            self.bus
                .write(&Self::command(opcode::PAGE_PROGRAM, address));
            self.bus.write(chunk);
            self.bus.deselect();
            self.wait_ready(FlashOp::PageProgram, address, polls)?;

            address += chunk.len() as u32;
            rest = tail;
        }
        Ok(())
    }

    /// Compare flash contents at `start` against `data`.
    pub fn verify(&mut self, start: u32, data: &[u8]) -> Result<(), FlashError> {
        self.geometry.range(start, data.len())?;
        let mut buffer = [0u8; CHUNK];
        let mut address = start;
        for expected in data.chunks(CHUNK) {
            let actual = &mut buffer[..expected.len()];
            self.read(address, actual)?;
            if let Some(i) = expected.iter().zip(actual.iter()).position(|(e, a)| e != a) {
                let address = address + i as u32;
                warn!("spiflash: verify mismatch at {address:#x}");
                return Err(FlashError::VerifyFailed {
                    address,
                    expected: expected[i],
                    actual: actual[i],
                });
            }
            address += expected.len() as u32;
        }
        Ok(())
    }

    /// CRC-32 of `[start, start + len)`, streamed without a full buffer.
    pub fn crc32(&mut self, start: u32, len: usize) -> Result<u32, FlashError> {
        let range = self.geometry.range(start, len)?;
        let mut digest = Crc32::new();
        let mut buffer = [0u8; CHUNK];
        let mut address = range.start;
        while address < range.end() {
            let n = ((range.end() - address) as usize).min(CHUNK);
            self.read(address, &mut buffer[..n])?;
            digest.update(&buffer[..n]);
            address += n as u32;
        }
        Ok(digest.finish())
    }

    pub fn verify_crc32(&mut self, start: u32, len: usize, expected: u32) -> Result<(), FlashError> {
        let computed = self.crc32(start, len)?;
        crc::check(computed, expected).map_err(|err| {
            warn!("spiflash: {err}");
            FlashError::from(err)
        })
    }

    /// Erase the sectors covering `data`, program it and read it back.
    ///
    /// `start` must be sector aligned; the tail of the last sector past
    /// the image is left erased.
    pub fn write_image(&mut self, start: u32, data: &[u8]) -> Result<(), FlashError> {
        let range = self.geometry.range(start, data.len())?;
        let sector = self.geometry.sector_size;
        let span = range.len.div_ceil(sector) * sector;
        self.geometry.sector_range(start, span as usize)?;

        self.erase(start, span as usize)?;
        self.program(start, data)?;
        self.verify(start, data)?;
        debug!("spiflash: wrote {:#x} byte image at {start:#x}", range.len);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::error::RangeError;
    use crate::hal::timer::NoDelay;
    use crate::sim::flash::SimFlash;
    use std::boxed::Box;
    use std::vec::Vec;

    const SIZE: usize = 64 * 1024;

    type Sim = SimFlash<SIZE>;

    fn small_timeouts() -> FlashTimeouts {
        FlashTimeouts {
            poll_interval_us: 0,
            program_polls: 8,
            erase_polls: 8,
            chip_erase_polls: 8,
        }
    }

    fn flash(sim: &mut Sim) -> SpiFlash<&mut Sim, NoDelay> {
        SpiFlash::new(
            sim,
            NoDelay,
            FlashGeometry::with_4k_sectors(SIZE as u32),
            small_timeouts(),
        )
        .unwrap()
    }

    fn sim() -> Box<Sim> {
        Box::new(SimFlash::new())
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    #[test]
    fn identifies_device() {
        let mut sim = sim();
        let id = flash(&mut sim).read_id();
        assert_eq!(id.manufacturer, 0xEF);
        assert_eq!(id.capacity_bytes(), Some(16 * 1024 * 1024));
        assert!(id.is_present());
    }

    #[test]
    fn program_then_read_back() {
        let mut sim = sim();
        let data = pattern(1000);
        let mut flash = flash(&mut sim);

        flash.erase(0x1000, 0x1000).unwrap();
        flash.program(0x1000, &data).unwrap();
        let mut back = std::vec![0u8; data.len()];
        flash.read(0x1000, &mut back).unwrap();

        assert_eq!(back, data);
    }

    #[test]
    fn program_splits_at_page_boundaries() {
        let mut sim = sim();
        flash(&mut sim).program(0xF0, &pattern(300)).unwrap();

        // 0xF0..0x100, 0x100..0x200, 0x200..0x21C
        assert_eq!(sim.program_count(), 3);
        assert_eq!(&sim.memory()[0xF0..0xF0 + 300], &pattern(300)[..]);
        assert_eq!(sim.memory()[0xEF], 0xFF);
        assert_eq!(sim.memory()[0xF0 + 300], 0xFF);
    }

    #[test]
    fn programming_only_clears_bits() {
        let mut sim = sim();
        let mut flash = flash(&mut sim);
        flash.program(0, &[0b1100_1100]).unwrap();
        flash.program(0, &[0b1010_1010]).unwrap();

        let mut byte = [0u8];
        flash.read(0, &mut byte).unwrap();
        assert_eq!(byte[0], 0b1000_1000);
    }

    #[test]
    fn invalid_ranges_never_touch_the_bus() {
        let mut sim = sim();
        let mut flash = flash(&mut sim);

        assert_eq!(
            flash.erase(0x100, 0x1000),
            Err(FlashError::InvalidRange(RangeError::Unaligned {
                start: 0x100,
                len: 0x1000,
                sector_size: 0x1000
            }))
        );
        assert!(matches!(
            flash.program(SIZE as u32 - 4, &[0; 8]),
            Err(FlashError::InvalidRange(RangeError::OutOfCapacity { .. }))
        ));
        let mut buf = [0u8; 2];
        assert!(flash.read(u32::MAX, &mut buf).is_err());

        assert_eq!(sim.command_count(), 0);
    }

    #[test]
    fn zero_length_is_a_no_op() {
        let mut sim = sim();
        let mut flash = flash(&mut sim);
        flash.erase(0x2000, 0).unwrap();
        flash.program(0x10, &[]).unwrap();
        flash.read(0x10, &mut []).unwrap();

        assert_eq!(sim.command_count(), 0);
    }

    #[test]
    fn erase_waits_out_the_busy_period() {
        let mut sim = sim();
        sim.memory_mut()[0x3000..0x3010].fill(0);
        sim.set_latency(2, 5);

        flash(&mut sim).erase(0x3000, 0x1000).unwrap();
        assert_eq!(sim.erase_count(), 1);
        assert!(sim.memory()[0x3000..0x4000].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn stuck_busy_is_reported_incomplete() {
        let mut sim = sim();
        sim.stick_busy(true);

        let err = flash(&mut sim).erase(0x2000, 0x1000).unwrap_err();
        assert_eq!(
            err,
            FlashError::Incomplete {
                op: FlashOp::SectorErase,
                address: 0x2000,
                polls: 8
            }
        );
    }

    #[test]
    fn page_program_timeout_is_reported_incomplete() {
        let mut sim = sim();
        sim.set_latency(100, 0);

        let err = flash(&mut sim).program(0x1F0, &pattern(40)).unwrap_err();
        assert_eq!(
            err,
            FlashError::Incomplete {
                op: FlashOp::PageProgram,
                address: 0x1F0,
                polls: 8
            }
        );
        // the second page is never started
        assert_eq!(sim.program_count(), 1);
    }

    #[test]
    fn chip_erase_clears_everything() {
        let mut sim = sim();
        sim.memory_mut()[..0x100].fill(0);
        sim.memory_mut()[SIZE - 0x100..].fill(0);
        sim.set_latency(0, 3);

        flash(&mut sim).erase_chip().unwrap();
        assert!(sim.memory().iter().all(|&b| b == 0xFF));
        assert_eq!(sim.erase_count(), 1);
        assert!(!sim.write_enabled());

        sim.set_latency(0, 100);
        assert_eq!(
            flash(&mut sim).erase_chip(),
            Err(FlashError::Incomplete {
                op: FlashOp::ChipErase,
                address: 0,
                polls: 8
            })
        );
    }

    #[test]
    fn constructor_rejects_unvalidated_geometry() {
        let mut sim = sim();
        let geometry = FlashGeometry {
            sector_size: 0,
            ..FlashGeometry::with_4k_sectors(0x2000)
        };
        assert_eq!(
            SpiFlash::new(&mut *sim, NoDelay, geometry, small_timeouts()).err(),
            Some(ConfigError::Zero("flash sector size"))
        );

        let geometry = FlashGeometry {
            sector_size: 3000,
            ..FlashGeometry::with_4k_sectors(0x2000)
        };
        assert!(matches!(
            SpiFlash::new(&mut *sim, NoDelay, geometry, small_timeouts()),
            Err(ConfigError::NotPowerOfTwo { value: 3000, .. })
        ));

        let timeouts = FlashTimeouts {
            program_polls: 0,
            ..small_timeouts()
        };
        let geometry = FlashGeometry::with_4k_sectors(SIZE as u32);
        assert!(SpiFlash::new(&mut *sim, NoDelay, geometry, timeouts).is_err());
        assert_eq!(sim.command_count(), 0);
    }

    #[test]
    fn verify_pinpoints_first_difference() {
        let mut sim = sim();
        let data = pattern(600);
        flash(&mut sim).program(0, &data).unwrap();
        sim.memory_mut()[0x205] ^= 0x01;

        let err = flash(&mut sim).verify(0, &data).unwrap_err();
        assert_eq!(
            err,
            FlashError::VerifyFailed {
                address: 0x205,
                expected: data[0x205],
                actual: data[0x205] ^ 0x01
            }
        );
    }

    #[test]
    fn crc32_matches_programmed_data() {
        let mut sim = sim();
        let data = pattern(5000);
        let mut flash = flash(&mut sim);
        flash.write_image(0x4000, &data).unwrap();

        let expected = crc::crc32(&data);
        assert_eq!(flash.crc32(0x4000, data.len()).unwrap(), expected);
        flash.verify_crc32(0x4000, data.len(), expected).unwrap();
        assert!(matches!(
            flash.verify_crc32(0x4000, data.len(), expected ^ 1),
            Err(FlashError::Checksum(_))
        ));
    }

    #[test]
    fn write_image_erases_first() {
        let mut sim = sim();
        sim.memory_mut()[0x1000..0x3000].fill(0x00);

        let data = pattern(0x1800);
        flash(&mut sim).write_image(0x1000, &data).unwrap();

        assert_eq!(&sim.memory()[0x1000..0x2800], &data[..]);
        assert!(sim.memory()[0x2800..0x3000].iter().all(|&b| b == 0xFF));
        assert_eq!(sim.erase_count(), 2);
    }

    #[test]
    fn geometry_validation() {
        assert!(FlashGeometry::DEFAULT.validate().is_ok());
        let mut geometry = FlashGeometry::DEFAULT;
        geometry.capacity = 32 * 1024 * 1024;
        assert_eq!(
            geometry.validate(),
            Err(ConfigError::CapacityTooLarge(32 * 1024 * 1024))
        );
        geometry = FlashGeometry::with_4k_sectors(1 << 20);
        geometry.page_size = 8192;
        assert_eq!(geometry.validate(), Err(ConfigError::PageLargerThanSector));
        geometry.page_size = 300;
        assert!(matches!(
            geometry.validate(),
            Err(ConfigError::NotPowerOfTwo { .. })
        ));
    }
}
