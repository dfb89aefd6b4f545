// Licensed under the Apache-2.0 license

//! Stream view of a chip through `embedded-io`.

use crate::common::Logger;
use crate::eeprom::common::Error;
use crate::eeprom::device::At24Device;
use crate::eeprom::traits::Monotonic;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use embedded_io::{ErrorType, Read, Seek, SeekFrom, Write};

/// Positioned cursor over one chip, like an open `eeprom` file.
pub struct EepromFile<'d, I, C, D, L> {
    device: &'d At24Device<I, C, D, L>,
    pos: u64,
}

impl<'d, I, C, D, L> EepromFile<'d, I, C, D, L>
where
    I: I2c,
    C: Monotonic,
    D: DelayNs,
    L: Logger,
{
    #[must_use]
    pub fn new(device: &'d At24Device<I, C, D, L>) -> Self {
        Self { device, pos: 0 }
    }

    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl<I, C, D, L> ErrorType for EepromFile<'_, I, C, D, L> {
    type Error = Error;
}

impl<I, C, D, L> Read for EepromFile<'_, I, C, D, L>
where
    I: I2c,
    C: Monotonic,
    D: DelayNs,
    L: Logger,
{
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let Ok(offset) = u32::try_from(self.pos) else {
            return Ok(0);
        };
        let n = self.device.read(offset, buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<I, C, D, L> Write for EepromFile<'_, I, C, D, L>
where
    I: I2c,
    C: Monotonic,
    D: DelayNs,
    L: Logger,
{
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let offset = u32::try_from(self.pos).map_err(|_| Error::OutOfRange)?;
        let n = self.device.write(offset, buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<I, C, D, L> Seek for EepromFile<'_, I, C, D, L>
where
    I: I2c,
    C: Monotonic,
    D: DelayNs,
    L: Logger,
{
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, Self::Error> {
        let (base, delta) = match pos {
            SeekFrom::Start(to) => {
                self.pos = to;
                return Ok(to);
            }
            SeekFrom::End(delta) => (u64::from(self.device.size()), delta),
            SeekFrom::Current(delta) => (self.pos, delta),
        };
        self.pos = base.checked_add_signed(delta).ok_or(Error::OutOfRange)?;
        Ok(self.pos)
    }
}
