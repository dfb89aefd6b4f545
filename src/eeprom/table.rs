// Licensed under the Apache-2.0 license

//! Device identification table for the AT24 family.
//!
//! Each entry packs the chip size and flags into one non-zero magic number
//! (see [`device_magic`]). The generic `at24` entry carries magic 0: such a
//! chip can only be bound with board-supplied platform data.

use crate::eeprom::common::{EepromFlags, SIZE_BYTELEN, SIZE_FLAGS};

/// One row of the id table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeviceId {
    pub name: &'static str,
    pub magic: u32,
}

impl DeviceId {
    #[must_use]
    pub const fn new(name: &'static str, magic: u32) -> Self {
        Self { name, magic }
    }
}

/// Pack a chip size in bytes and its flags into a table magic.
///
/// The bit just above the flags field is always set so that every packed
/// value is non-zero; decoding masks it away.
#[must_use]
pub const fn device_magic(len: u32, flags: EepromFlags) -> u32 {
    (((1 << SIZE_FLAGS) | flags.bits() as u32) << SIZE_BYTELEN) | len.ilog2()
}

const SERIAL_RO: EepromFlags = EepromFlags::SERIAL.union(EepromFlags::READONLY);
const MAC_RO: EepromFlags = EepromFlags::MAC.union(EepromFlags::READONLY);
const SERIAL16_RO: EepromFlags = EepromFlags::ADDR16.union(SERIAL_RO);

pub static AT24_IDS: &[DeviceId] = &[
    // needs 8 addresses as A0-A2 are ignored
    DeviceId::new("24c00", device_magic(128 / 8, EepromFlags::TAKE8ADDR)),
    // old variants can't be handled with this generic entry
    DeviceId::new("24c01", device_magic(1024 / 8, EepromFlags::empty())),
    DeviceId::new("24cs01", device_magic(16, SERIAL_RO)),
    DeviceId::new("24c02", device_magic(2048 / 8, EepromFlags::empty())),
    DeviceId::new("24cs02", device_magic(16, SERIAL_RO)),
    DeviceId::new("24mac402", device_magic(48 / 8, MAC_RO)),
    DeviceId::new("24mac602", device_magic(64 / 8, MAC_RO)),
    // spd is a 24c02 in memory DIMMs
    DeviceId::new(
        "spd",
        device_magic(
            2048 / 8,
            EepromFlags::READONLY.union(EepromFlags::WORLD_READABLE),
        ),
    ),
    DeviceId::new("24c04", device_magic(4096 / 8, EepromFlags::empty())),
    DeviceId::new("24cs04", device_magic(16, SERIAL_RO)),
    DeviceId::new("24c08", device_magic(8192 / 8, EepromFlags::empty())),
    DeviceId::new("24cs08", device_magic(16, SERIAL_RO)),
    DeviceId::new("24c16", device_magic(16384 / 8, EepromFlags::empty())),
    DeviceId::new("24cs16", device_magic(16, SERIAL_RO)),
    DeviceId::new("24c32", device_magic(32768 / 8, EepromFlags::ADDR16)),
    DeviceId::new("24cs32", device_magic(16, SERIAL16_RO)),
    DeviceId::new("24c64", device_magic(65536 / 8, EepromFlags::ADDR16)),
    DeviceId::new("24cs64", device_magic(16, SERIAL16_RO)),
    DeviceId::new("24c128", device_magic(131_072 / 8, EepromFlags::ADDR16)),
    DeviceId::new("24c256", device_magic(262_144 / 8, EepromFlags::ADDR16)),
    DeviceId::new("24c512", device_magic(524_288 / 8, EepromFlags::ADDR16)),
    DeviceId::new("24c1024", device_magic(1_048_576 / 8, EepromFlags::ADDR16)),
    DeviceId::new("24c2048", device_magic(2_097_152 / 8, EepromFlags::ADDR16)),
    DeviceId::new("at24", 0),
];

/// Find the table row matching a device name.
#[must_use]
pub fn lookup(name: &str) -> Option<&'static DeviceId> {
    AT24_IDS.iter().find(|id| id.name == name)
}
