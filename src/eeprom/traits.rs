// Licensed under the Apache-2.0 license

//! # Collaborator traits for the AT24 driver
//!
//! The driver core only talks to the outside world through the traits in
//! this module. Each trait has one responsibility; a host binding the driver
//! implements all of them and gets [`DeviceHost`] through a blanket impl.
//!
//! ```text
//! DeviceHost (composite)
//!     ├── BusAdapter        (capabilities, alias address reservation)
//!     ├── ConfigSource      (platform data, devicetree-style properties)
//!     └── AttributeRegistry (byte-range file exposure)
//!
//! Monotonic + embedded_hal::delay::DelayNs   (busy-poll timing)
//! SmbusExt  (blanket over embedded_hal::i2c::I2c)
//! ```

use crate::eeprom::common::{ChipConfig, EepromFlags};
use bitflags::bitflags;
use embedded_hal::i2c::{I2c, SevenBitAddress};

/// Millisecond-resolution instant used for transfer deadlines.
pub type MillisInstant = fugit::TimerInstantU64<1000>;

bitflags! {
    /// Transfer functionality advertised by the bus adapter.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct BusCapabilities: u32 {
        /// Arbitrary I2C messages.
        const I2C                   = 0x0000_0001;
        const SMBUS_READ_BYTE_DATA  = 0x0008_0000;
        const SMBUS_READ_WORD_DATA  = 0x0020_0000;
        const SMBUS_READ_I2C_BLOCK  = 0x0400_0000;
        const SMBUS_WRITE_I2C_BLOCK = 0x0800_0000;
    }
}

/// Monotonic time source for busy-poll deadlines.
pub trait Monotonic {
    /// Current time; must never go backwards.
    fn now(&mut self) -> MillisInstant;
}

/// Bus adapter hosting the chip.
pub trait BusAdapter {
    type Error: core::fmt::Debug;

    /// Transfer functionality of the adapter.
    fn capabilities(&self) -> BusCapabilities;

    /// Reserve `address` on the adapter for a chip spanning several addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is already claimed by another device.
    fn new_dummy(&mut self, address: SevenBitAddress) -> Result<(), Self::Error>;

    /// Release an address reserved by [`BusAdapter::new_dummy`].
    fn unregister_dummy(&mut self, address: SevenBitAddress);
}

/// Board-level description of the chip.
pub trait ConfigSource {
    /// Explicit chip description; overrides the id table when present.
    fn platform_data(&self) -> Option<ChipConfig> {
        None
    }

    /// `read-only` property of the firmware node.
    fn read_only_property(&self) -> bool {
        false
    }

    /// `pagesize` property of the firmware node.
    fn page_size_property(&self) -> Option<u32> {
        None
    }
}

/// Exposure of the chip contents as one byte-range file.
pub trait AttributeRegistry {
    type Error: core::fmt::Debug;

    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    fn create_bin_file(&mut self, attr: &EepromAttribute) -> Result<(), Self::Error>;

    fn remove_bin_file(&mut self, attr: &EepromAttribute);
}

/// Everything the driver needs from its host during probe and remove.
pub trait DeviceHost: BusAdapter + ConfigSource + AttributeRegistry {}

impl<T> DeviceHost for T where T: BusAdapter + ConfigSource + AttributeRegistry {}

pub const S_IRUSR: u16 = 0o400;
pub const S_IWUSR: u16 = 0o200;
pub const S_IRUGO: u16 = 0o444;

/// Description of the exposed byte-range file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EepromAttribute {
    pub name: &'static str,
    pub size: u32,
    pub mode: u16,
}

impl EepromAttribute {
    /// Attribute for a chip of `size` bytes.
    ///
    /// Contents are private to the owner unless the chip is flagged world
    /// readable; the owner write bit is granted only to writable chips.
    #[must_use]
    pub fn new(size: u32, flags: EepromFlags, writable: bool) -> Self {
        let mut mode = if flags.contains(EepromFlags::WORLD_READABLE) {
            S_IRUGO
        } else {
            S_IRUSR
        };
        if writable {
            mode |= S_IWUSR;
        }
        Self {
            name: "eeprom",
            size,
            mode,
        }
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.mode & S_IWUSR != 0
    }
}

/// SMBus-style byte and word commands on top of plain I2C messages.
///
/// The wire format matches the SMBus protocol: word data goes out low byte
/// first.
pub trait SmbusExt: I2c {
    /// Send one byte with no command code.
    fn smbus_write_byte(&mut self, addr: SevenBitAddress, value: u8) -> Result<(), Self::Error> {
        self.write(addr, &[value])
    }

    fn smbus_write_byte_data(
        &mut self,
        addr: SevenBitAddress,
        command: u8,
        value: u8,
    ) -> Result<(), Self::Error> {
        self.write(addr, &[command, value])
    }

    fn smbus_write_word_data(
        &mut self,
        addr: SevenBitAddress,
        command: u8,
        word: u16,
    ) -> Result<(), Self::Error> {
        let [lo, hi] = word.to_le_bytes();
        self.write(addr, &[command, lo, hi])
    }

    /// Receive one byte from the chip's current address pointer.
    fn smbus_read_byte(&mut self, addr: SevenBitAddress) -> Result<u8, Self::Error> {
        let mut value = [0u8; 1];
        self.read(addr, &mut value)?;
        let [byte] = value;
        Ok(byte)
    }
}

impl<T: I2c> SmbusExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};

    #[derive(Default)]
    struct WireLog {
        writes: Vec<(u8, Vec<u8>)>,
    }

    impl ErrorType for WireLog {
        type Error = ErrorKind;
    }

    impl I2c for WireLog {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            for op in operations {
                match op {
                    Operation::Write(bytes) => self.writes.push((address, bytes.to_vec())),
                    Operation::Read(buf) => buf.fill(0xA5),
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_smbus_word_data_is_little_endian() {
        let mut bus = WireLog::default();
        bus.smbus_write_word_data(0x50, 0x12, 0xAB34).unwrap();
        bus.smbus_write_byte_data(0x51, 0x01, 0x02).unwrap();
        bus.smbus_write_byte(0x52, 0x7F).unwrap();

        assert_eq!(bus.writes[0], (0x50, vec![0x12, 0x34, 0xAB]));
        assert_eq!(bus.writes[1], (0x51, vec![0x01, 0x02]));
        assert_eq!(bus.writes[2], (0x52, vec![0x7F]));
        assert_eq!(bus.smbus_read_byte(0x50).unwrap(), 0xA5);
    }

    #[test]
    fn test_attribute_mode() {
        let attr = EepromAttribute::new(256, EepromFlags::empty(), true);
        assert_eq!(attr.mode, 0o600);
        assert!(attr.is_writable());

        let spd = EepromAttribute::new(
            256,
            EepromFlags::READONLY | EepromFlags::WORLD_READABLE,
            false,
        );
        assert_eq!(spd.mode, 0o444);
        assert!(!spd.is_writable());
        assert_eq!(spd.name, "eeprom");
    }
}
