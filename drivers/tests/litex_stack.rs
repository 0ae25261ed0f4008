//! Drivers running against the LiteX register adapters, with simulated
//! devices behind the pins.

use softsoc_drivers::config::{BoardConfig, FlashGeometry, FlashTimeouts};
use softsoc_drivers::crc;
use softsoc_drivers::error::{ConfigError, FlashError, I2cError, NackStage, RangeError};
use softsoc_drivers::hal::i2c::I2cBus;
use softsoc_drivers::hal::timer::NoDelay;
use softsoc_drivers::memtest::lfsr32;
use softsoc_drivers::platform::litex;
use softsoc_drivers::sim::bitbang::SimBitbang;
use softsoc_drivers::sim::flash::SimFlash;
use softsoc_drivers::sim::i2c::SimI2cBus;

const FLASH_SIZE: usize = 128 * 1024;

type Pins = SimBitbang<SimFlash<FLASH_SIZE>>;

fn config() -> BoardConfig {
    let mut config = BoardConfig::litex_default();
    config.flash = FlashGeometry {
        capacity: FLASH_SIZE as u32,
        ..FlashGeometry::DEFAULT
    };
    config.flash_timeouts = FlashTimeouts {
        poll_interval_us: 0,
        program_polls: 16,
        erase_polls: 64,
        chip_erase_polls: 64,
    };
    config.validate().unwrap();
    config
}

fn pins() -> Box<Pins> {
    Box::new(SimBitbang::new(SimFlash::new()))
}

fn image(len: usize) -> Vec<u8> {
    let mut state = 1u32;
    (0..len)
        .map(|_| {
            state = lfsr32(state);
            state as u8
        })
        .collect()
}

#[test]
fn erase_program_read_back_through_the_pins() {
    let config = config();
    let mut pins = pins();
    pins.device_mut().set_latency(3, 20);
    let data = image(70_000);

    let mut flash = litex::spi_flash(&mut *pins, NoDelay, &config).unwrap();
    let id = flash.read_id();
    assert!(id.is_present());

    flash.erase(0, FLASH_SIZE).unwrap();
    flash.program(0x80, &data).unwrap();

    let mut back = vec![0u8; data.len()];
    flash.read(0x80, &mut back).unwrap();
    assert_eq!(back, data);
    assert_eq!(crc::crc32(&back), crc::crc32(&data));
    flash.verify_crc32(0x80, data.len(), crc::crc32(&data)).unwrap();

    assert_eq!(pins.stray_writes(), 0);
    assert!(!pins.is_enabled());
    assert_eq!(pins.device().erase_count(), 2);
    // first page is partial, so one extra program
    assert_eq!(pins.device().program_count() as usize, data.len() / 256 + 1);
}

#[test]
fn write_image_then_checksum() {
    let config = config();
    let mut pins = pins();
    pins.device_mut().memory_mut().fill(0x00);
    let data = image(1000);

    let mut flash = litex::spi_flash(&mut *pins, NoDelay, &config).unwrap();
    flash.write_image(0x1_0000, &data).unwrap();
    assert_eq!(flash.crc32(0x1_0000, data.len()).unwrap(), crc::crc32(&data));

    // first sector untouched
    assert!(pins.device().memory()[..0x1_0000].iter().all(|&b| b == 0));
}

#[test]
fn rejected_ranges_leave_the_pins_alone() {
    let config = config();
    let mut pins = pins();

    let mut flash = litex::spi_flash(&mut *pins, NoDelay, &config).unwrap();
    assert!(matches!(
        flash.erase(0x8000, 0x1_0000),
        Err(FlashError::InvalidRange(RangeError::Unaligned { .. }))
    ));
    assert!(matches!(
        flash.write_image(0x1_0000, &[0; 0x1_0001]),
        Err(FlashError::InvalidRange(RangeError::OutOfCapacity { .. }))
    ));

    assert_eq!(pins.device().command_count(), 0);
}

#[test]
fn unvalidated_geometry_never_reaches_the_pins() {
    let mut config = config();
    config.flash.sector_size = 0;
    let mut pins = pins();

    assert_eq!(
        litex::spi_flash(&mut *pins, NoDelay, &config).err(),
        Some(ConfigError::Zero("flash sector size"))
    );
    assert_eq!(pins.device().command_count(), 0);
}

#[test]
fn erase_timeout_is_distinct_from_success() {
    let config = config();
    let mut pins = pins();
    pins.device_mut().set_latency(0, 1_000);

    let mut flash = litex::spi_flash(&mut *pins, NoDelay, &config).unwrap();
    assert_eq!(
        flash.erase(0, 0x1_0000),
        Err(FlashError::Incomplete {
            op: softsoc_drivers::error::FlashOp::SectorErase,
            address: 0,
            polls: 64,
        })
    );
}

#[test]
fn i2c_register_access_through_the_csrs() {
    let config = config();
    let mut bus = SimI2cBus::new(0x50);

    let mut i2c = litex::i2c_master(&mut bus, NoDelay, &config);
    i2c.write(0x50, 0x20, b"BIOS").unwrap();
    let mut back = [0u8; 4];
    i2c.read(0x50, 0x20, &mut back, false).unwrap();
    assert_eq!(&back, b"BIOS");

    assert_eq!(
        i2c.write(0x51, 0, &[1]),
        Err(I2cError::Nack {
            address: 0x51,
            stage: NackStage::AddressWrite
        })
    );
    assert!(bus.is_idle());
}
