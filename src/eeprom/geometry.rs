// Licensed under the Apache-2.0 license

//! Chip geometry: table decode, override resolution and address translation.

use crate::eeprom::common::{
    ChipConfig, EepromFlags, Error, GeometryWarnings, SIZE_BYTELEN, SIZE_FLAGS, SPAN_ADDR16,
    SPAN_ADDR8,
};
use crate::eeprom::table::DeviceId;
use crate::eeprom::traits::ConfigSource;

const fn bitmask(bits: u32) -> u32 {
    (1 << bits) - 1
}

/// Unpack a table magic.
///
/// The table cannot know the real page size, so the result writes one byte
/// per cycle.
///
/// # Errors
///
/// Returns [`Error::NoDevice`] for magic 0, which marks a table entry that
/// needs board-supplied geometry.
pub fn decode_magic(magic: u32) -> Result<ChipConfig, Error> {
    if magic == 0 {
        return Err(Error::NoDevice);
    }
    let byte_len = 1u32
        .checked_shl(magic & bitmask(SIZE_BYTELEN))
        .ok_or(Error::NoDevice)?;
    let bits = (magic >> SIZE_BYTELEN) & bitmask(SIZE_FLAGS);
    Ok(ChipConfig {
        byte_len,
        page_size: 1,
        flags: EepromFlags::from_bits_truncate(bits as u8),
    })
}

/// Work out the chip description for a probe.
///
/// Platform data wins outright. Otherwise the id table magic is decoded and
/// the `read-only` and `pagesize` properties are applied on top.
///
/// # Errors
///
/// Returns [`Error::NoDevice`] when neither source describes the chip.
pub fn resolve<S: ConfigSource + ?Sized>(id: &DeviceId, source: &S) -> Result<ChipConfig, Error> {
    if let Some(chip) = source.platform_data() {
        return Ok(chip);
    }
    let mut chip = decode_magic(id.magic)?;
    if source.read_only_property() {
        chip.flags |= EepromFlags::READONLY;
    }
    if let Some(page_size) = source.page_size_property() {
        chip.page_size = page_size;
    }
    Ok(chip)
}

/// Check a resolved geometry.
///
/// # Errors
///
/// Returns [`Error::ZeroPageSize`] if the page size is 0. Sizes that are
/// merely suspicious come back as warnings.
pub fn validate(chip: &ChipConfig) -> Result<GeometryWarnings, Error> {
    let mut warnings = GeometryWarnings::empty();
    if !chip.byte_len.is_power_of_two() {
        warnings |= GeometryWarnings::CAPACITY_NOT_POW2;
    }
    if chip.page_size == 0 {
        return Err(Error::ZeroPageSize);
    }
    if !chip.page_size.is_power_of_two() {
        warnings |= GeometryWarnings::PAGE_SIZE_NOT_POW2;
    }
    Ok(warnings)
}

/// Bytes one bus address can index for this chip.
#[must_use]
pub fn address_span(flags: EepromFlags) -> u32 {
    if flags.contains(EepromFlags::ADDR16) {
        SPAN_ADDR16
    } else {
        SPAN_ADDR8
    }
}

/// Number of bus addresses the chip occupies, primary included.
#[must_use]
pub fn num_addresses(chip: &ChipConfig) -> usize {
    if chip.flags.contains(EepromFlags::TAKE8ADDR) {
        return 8;
    }
    let count = chip.byte_len.div_ceil(address_span(chip.flags)).max(1);
    count as usize
}

/// Bus address slot and in-chip offset for one logical byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TranslatedAddress {
    pub alias_index: usize,
    pub offset: u16,
}

impl TranslatedAddress {
    /// In-chip offset as it goes out on the wire.
    #[must_use]
    pub fn wire_bytes(&self, flags: EepromFlags) -> heapless::Vec<u8, 2> {
        let [hi, lo] = self.offset.to_be_bytes();
        let mut bytes = heapless::Vec::new();
        if flags.contains(EepromFlags::ADDR16) {
            let _ = bytes.push(hi);
        }
        let _ = bytes.push(lo);
        bytes
    }
}

/// Split a logical offset into alias slot and in-chip offset.
///
/// Callers keep `offset` below the chip size; the alias index is not
/// checked here.
#[must_use]
pub fn translate(flags: EepromFlags, offset: u32) -> TranslatedAddress {
    if flags.contains(EepromFlags::ADDR16) {
        TranslatedAddress {
            alias_index: (offset >> 16) as usize,
            offset: (offset & 0xffff) as u16,
        }
    } else {
        TranslatedAddress {
            alias_index: (offset >> 8) as usize,
            offset: (offset & 0xff) as u16,
        }
    }
}
