//! I2C Hardware Abstraction Layer.
//!
//! Two levels are defined here:
//!
//! - [`I2cLines`]: raw control of the two bus wires, implemented by
//!   platform register adapters and driven by the bit-bang engine
//! - [`I2cBus`]: register-oriented transactions offered to console glue

use super::gpio::PinLevel;
use crate::error::I2cError;

/// Raw access to SCL and SDA.
///
/// SCL is driven push-pull. SDA is open-drain: `Some(level)` drives it,
/// `None` releases it so the pull-up (or a slave) determines the level.
pub trait I2cLines {
    /// Apply both line states in one register write.
    fn drive(&mut self, scl: PinLevel, sda: Option<PinLevel>);

    /// Sample the current SDA level on the wire.
    fn sda(&self) -> PinLevel;
}

impl<L: I2cLines + ?Sized> I2cLines for &mut L {
    fn drive(&mut self, scl: PinLevel, sda: Option<PinLevel>) {
        (**self).drive(scl, sda)
    }

    fn sda(&self) -> PinLevel {
        (**self).sda()
    }
}

/// Register-oriented I2C master.
///
/// Addresses are 7-bit. Every failing transaction has already released
/// the bus with a stop condition when the error is returned.
pub trait I2cBus {
    /// Write `data` starting at `register` of device `address`.
    fn write(&mut self, address: u8, register: u8, data: &[u8]) -> Result<(), I2cError>;

    /// Read `buffer.len()` bytes starting at `register` of device `address`.
    ///
    /// With `send_stop` the register pointer write is terminated by a stop
    /// before the read phase; otherwise a repeated start is used.
    fn read(
        &mut self,
        address: u8,
        register: u8,
        buffer: &mut [u8],
        send_stop: bool,
    ) -> Result<(), I2cError>;

    /// Check whether a device acknowledges `address`.
    fn poll(&mut self, address: u8) -> bool;

    /// Probe every 7-bit address.
    fn scan(&mut self) -> DeviceMap {
        let mut map = DeviceMap::new();
        for address in 0..DeviceMap::CAPACITY {
            if self.poll(address) {
                map.insert(address);
            }
        }
        map
    }
}

/// Set of responding 7-bit addresses.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct DeviceMap {
    bits: u128,
}

impl DeviceMap {
    pub const CAPACITY: u8 = 128;

    pub const fn new() -> Self {
        Self { bits: 0 }
    }

    pub fn insert(&mut self, address: u8) {
        if address < Self::CAPACITY {
            self.bits |= 1u128 << address;
        }
    }

    pub const fn contains(&self, address: u8) -> bool {
        address < Self::CAPACITY && self.bits & (1u128 << address) != 0
    }

    pub const fn len(&self) -> u32 {
        self.bits.count_ones()
    }

    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Responding addresses in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..Self::CAPACITY).filter(move |&address| self.contains(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_map_tracks_addresses() {
        let mut map = DeviceMap::new();
        assert!(map.is_empty());

        map.insert(0x50);
        map.insert(0x08);
        map.insert(0x7F);
        map.insert(0x80);

        assert_eq!(map.len(), 3);
        assert!(map.contains(0x50));
        assert!(!map.contains(0x51));
        assert!(!map.contains(0x80));

        let mut found = map.iter();
        assert_eq!(found.next(), Some(0x08));
        assert_eq!(found.next(), Some(0x50));
        assert_eq!(found.next(), Some(0x7F));
        assert_eq!(found.next(), None);
    }
}
