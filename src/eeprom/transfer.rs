// Licensed under the Apache-2.0 license

//! Single-transfer engine with busy polling.
//!
//! An EEPROM commits a write internally for 5-20 ms after the stop
//! condition and NAKs every transaction in the meantime. Each transfer here
//! is therefore retried, with a short sleep between attempts, until it goes
//! through or the write timeout elapses.

use crate::common::Logger;
use crate::eeprom::alias::Client;
use crate::eeprom::common::{EepromFlags, Error, IoConfig, SMBUS_BLOCK_MAX, WRITE_BUF_CAPACITY};
use crate::eeprom::geometry::TranslatedAddress;
use crate::eeprom::traits::{BusCapabilities, Monotonic, SmbusExt};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use fugit::MillisDurationU64;

/// Write chunk buffer: in-chip offset bytes followed by payload.
pub type WriteBuffer = heapless::Vec<u8, WRITE_BUF_CAPACITY>;

/// How transfers are put on the bus.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferMode {
    /// Plain I2C messages.
    I2c,
    /// SMBus byte and word commands only.
    SmbusByte,
}

impl TransferMode {
    /// Pick a transfer mode from the adapter functionality.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedBus`] if the adapter can neither send
    /// I2C messages nor read through any SMBus command.
    pub fn negotiate(capabilities: BusCapabilities) -> Result<Self, Error> {
        if capabilities.contains(BusCapabilities::I2C) {
            return Ok(TransferMode::I2c);
        }
        let smbus_reads = BusCapabilities::SMBUS_READ_I2C_BLOCK
            | BusCapabilities::SMBUS_READ_WORD_DATA
            | BusCapabilities::SMBUS_READ_BYTE_DATA;
        if capabilities.intersects(smbus_reads) {
            Ok(TransferMode::SmbusByte)
        } else {
            Err(Error::UnsupportedBus)
        }
    }

    /// Whether writes can be issued in this mode.
    #[must_use]
    pub fn can_write(self, capabilities: BusCapabilities) -> bool {
        match self {
            TransferMode::I2c => true,
            TransferMode::SmbusByte => {
                capabilities.contains(BusCapabilities::SMBUS_WRITE_I2C_BLOCK)
            }
        }
    }

    /// Largest chunk one write may carry.
    ///
    /// Capped so that the offset bytes and the chunk fit one [`WriteBuffer`].
    #[must_use]
    pub fn write_max(self, page_size: u32, io_limit: u32) -> usize {
        let write_max = (page_size.min(io_limit) as usize).min(WRITE_BUF_CAPACITY - 2);
        match self {
            TransferMode::I2c => write_max,
            TransferMode::SmbusByte => write_max.min(SMBUS_BLOCK_MAX),
        }
    }
}

/// Bytes one write at in-chip `offset` may carry.
///
/// The chunk is capped at `write_max` and never crosses the end of the page
/// holding `offset`, since the chip would wrap back to the page start.
#[must_use]
pub fn clamp_write_len(offset: u32, count: usize, write_max: usize, page_size: u32) -> usize {
    let count = count.min(write_max);
    let page = page_size.max(1);
    let next_page = (offset + 1).div_ceil(page) * page;
    let room = (next_page - offset) as usize;
    count.min(room)
}

/// Bus, timing seams and logger owned by one chip.
pub struct Transport<I, C, D, L> {
    pub bus: I,
    pub clock: C,
    pub delay: D,
    pub logger: L,
}

impl<I, C, D, L> Transport<I, C, D, L>
where
    I: I2c,
    C: Monotonic,
    D: DelayNs,
    L: Logger,
{
    /// Run `op` until it succeeds or the write timeout has passed.
    ///
    /// An attempt started before the deadline is always followed by another
    /// one, so a chip finishing its write cycle right at the deadline is
    /// still picked up.
    fn retry<T>(
        &mut self,
        config: &IoConfig,
        what: &str,
        count: usize,
        offset: u16,
        mut op: impl FnMut(&mut I) -> Result<T, I::Error>,
    ) -> Result<T, Error> {
        let budget = MillisDurationU64::millis(u64::from(config.write_timeout().to_millis()));
        let deadline = self.clock.now() + budget;
        loop {
            let attempt_at = self.clock.now();
            match op(&mut self.bus) {
                Ok(value) => {
                    self.logger.debug(format_args!(
                        "{what} {count}@{offset} --> ok ({})",
                        attempt_at.ticks()
                    ));
                    return Ok(value);
                }
                Err(err) => self.logger.debug(format_args!(
                    "{what} {count}@{offset} --> {err:?} ({})",
                    attempt_at.ticks()
                )),
            }
            self.delay.delay_ms(config.poll_interval().to_millis());
            if attempt_at >= deadline {
                return Err(Error::Timeout);
            }
        }
    }

    /// Read the byte at `at` through `client`.
    ///
    /// The chip's address pointer is always set first: another master may
    /// have moved it since our last access. In I2C mode pointer set and
    /// data read share one transaction joined by a repeated start.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the chip stayed busy.
    pub fn read_byte(
        &mut self,
        config: &IoConfig,
        flags: EepromFlags,
        mode: TransferMode,
        client: Client,
        at: TranslatedAddress,
    ) -> Result<u8, Error> {
        let addr = client.address();
        let wire = at.wire_bytes(flags);
        self.retry(config, "read", 1, at.offset, |bus| match mode {
            TransferMode::I2c => {
                let mut byte = [0u8; 1];
                bus.write_read(addr, &wire, &mut byte)?;
                let [value] = byte;
                Ok(value)
            }
            TransferMode::SmbusByte => {
                match wire.as_slice() {
                    [hi, lo] => bus.smbus_write_byte_data(addr, *hi, *lo)?,
                    [lo] => bus.smbus_write_byte(addr, *lo)?,
                    _ => bus.smbus_write_byte(addr, 0)?,
                }
                bus.smbus_read_byte(addr)
            }
        })
    }

    /// Write the start of `data` at `at` through `client`.
    ///
    /// `data` must already be clamped to the page and chunk limits. SMBus
    /// mode carries a single data byte per command. Returns the number of
    /// bytes the chip accepted.
    ///
    /// # Errors
    ///
    /// - [`Error::AllocationFailure`] if the chunk does not fit `writebuf`
    /// - [`Error::Timeout`] if the chip stayed busy
    pub fn write_chunk(
        &mut self,
        config: &IoConfig,
        flags: EepromFlags,
        mode: TransferMode,
        client: Client,
        at: TranslatedAddress,
        data: &[u8],
        writebuf: &mut WriteBuffer,
    ) -> Result<usize, Error> {
        let addr = client.address();
        let wire = at.wire_bytes(flags);
        let Some(&first) = data.first() else {
            return Ok(0);
        };

        match mode {
            TransferMode::I2c => {
                writebuf.clear();
                writebuf
                    .extend_from_slice(&wire)
                    .and_then(|()| writebuf.extend_from_slice(data))
                    .map_err(|()| Error::AllocationFailure)?;
                let frame: &[u8] = writebuf;
                self.retry(config, "write", data.len(), at.offset, |bus| bus.write(addr, frame))?;
                Ok(data.len())
            }
            TransferMode::SmbusByte => {
                self.retry(config, "write", 1, at.offset, |bus| match wire.as_slice() {
                    [hi, lo] => {
                        bus.smbus_write_word_data(addr, *hi, u16::from_le_bytes([*lo, first]))
                    }
                    [lo] => bus.smbus_write_byte_data(addr, *lo, first),
                    _ => bus.smbus_write_byte_data(addr, 0, first),
                })?;
                Ok(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::NoOpLogger;
    use crate::eeprom::common::IoConfigBuilder;
    use crate::eeprom::geometry::translate;
    use crate::eeprom::sim::{SimChip, SimClock, SimDelay, SimEeprom, SimTime};
    use fugit::MillisDurationU32;

    fn transport(
        chip: &SimEeprom,
        time: &SimTime,
    ) -> Transport<SimEeprom, SimClock, SimDelay, NoOpLogger> {
        Transport {
            bus: chip.clone(),
            clock: SimClock::new(time),
            delay: SimDelay::new(time),
            logger: NoOpLogger,
        }
    }

    #[test]
    fn test_negotiate_modes() {
        assert_eq!(
            TransferMode::negotiate(BusCapabilities::I2C),
            Ok(TransferMode::I2c)
        );
        assert_eq!(
            TransferMode::negotiate(BusCapabilities::SMBUS_READ_WORD_DATA),
            Ok(TransferMode::SmbusByte)
        );
        assert_eq!(
            TransferMode::negotiate(BusCapabilities::SMBUS_WRITE_I2C_BLOCK),
            Err(Error::UnsupportedBus)
        );
        assert_eq!(
            TransferMode::negotiate(BusCapabilities::empty()),
            Err(Error::UnsupportedBus)
        );
    }

    #[test]
    fn test_write_max_limits() {
        assert_eq!(TransferMode::I2c.write_max(64, 128), 64);
        assert_eq!(TransferMode::I2c.write_max(256, 128), 128);
        assert_eq!(TransferMode::I2c.write_max(512, 1024), 256);
        assert_eq!(TransferMode::SmbusByte.write_max(512, 1024), 32);
        assert_eq!(TransferMode::SmbusByte.write_max(64, 128), 32);
        assert_eq!(TransferMode::SmbusByte.write_max(8, 128), 8);
        assert!(!TransferMode::SmbusByte.can_write(BusCapabilities::SMBUS_READ_BYTE_DATA));
        assert!(TransferMode::SmbusByte.can_write(BusCapabilities::SMBUS_WRITE_I2C_BLOCK));
    }

    #[test]
    fn test_clamp_to_page_boundary() {
        // 16-byte pages: a write at 10 may only reach 15
        assert_eq!(clamp_write_len(10, 20, 64, 16), 6);
        assert_eq!(clamp_write_len(16, 20, 64, 16), 16);
        assert_eq!(clamp_write_len(31, 4, 64, 16), 1);
        // inside one page the request goes through as is
        assert_eq!(clamp_write_len(32, 4, 64, 16), 4);
        // write_max still applies
        assert_eq!(clamp_write_len(0, 64, 8, 64), 8);
        // one-byte pages
        assert_eq!(clamp_write_len(7, 5, 128, 1), 1);
    }

    #[test]
    fn test_clamp_ends_on_next_boundary() {
        let page = 32u32;
        for offset in 0..(4 * page) {
            let len = clamp_write_len(offset, 1000, 1000, page);
            let next_boundary = (offset / page + 1) * page;
            assert_eq!(offset + len as u32, next_boundary);
        }
    }

    #[test]
    fn test_page_write_and_read_back() {
        let time = SimTime::default();
        let chip = SimEeprom::new(SimChip::new(0x50, 4096, true, &time));
        let mut t = transport(&chip, &time);
        let config = IoConfig::default();
        let mut writebuf = WriteBuffer::new();
        let flags = EepromFlags::ADDR16;
        let client = Client::new(0x50).unwrap();

        let at = translate(flags, 0x0123);
        let data = [0xDE, 0xAD, 0xBE, 0xEF];
        let n = t
            .write_chunk(&config, flags, TransferMode::I2c, client, at, &data, &mut writebuf)
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(chip.last_write(), Some((0x50, vec![0x01, 0x23, 0xDE, 0xAD, 0xBE, 0xEF])));

        // read right after the write waits out the write cycle
        for (i, expected) in data.iter().enumerate() {
            let at = translate(flags, 0x0123 + i as u32);
            let value = t
                .read_byte(&config, flags, TransferMode::I2c, client, at)
                .unwrap();
            assert_eq!(value, *expected);
        }
        assert!(time.now_ms() >= 5);
    }

    #[test]
    fn test_smbus_word_write_wire_format() {
        let time = SimTime::default();
        let chip = SimEeprom::new(SimChip::new(0x50, 4096, true, &time));
        let mut t = transport(&chip, &time);
        let mut writebuf = WriteBuffer::new();
        let flags = EepromFlags::ADDR16;
        let client = Client::new(0x50).unwrap();

        let n = t
            .write_chunk(
                &IoConfig::default(),
                flags,
                TransferMode::SmbusByte,
                client,
                translate(flags, 0x0A0B),
                &[0x5A, 0x77],
                &mut writebuf,
            )
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(chip.last_write(), Some((0x50, vec![0x0A, 0x0B, 0x5A])));
        assert_eq!(chip.peek(0x0A0B), 0x5A);
        assert_eq!(chip.peek(0x0A0C), 0xFF);
    }

    #[test]
    fn test_zero_timeout_makes_a_single_attempt() {
        let time = SimTime::default();
        let chip = SimEeprom::new(SimChip::new(0x50, 256, false, &time));
        chip.set_always_busy(true);
        let mut t = transport(&chip, &time);
        let config = IoConfigBuilder::new()
            .write_timeout(MillisDurationU32::millis(0))
            .build()
            .unwrap();
        let flags = EepromFlags::empty();

        let result = t.read_byte(
            &config,
            flags,
            TransferMode::I2c,
            Client::new(0x50).unwrap(),
            translate(flags, 0),
        );
        assert_eq!(result, Err(Error::Timeout));
        assert_eq!(chip.transactions(), 1);
    }

    #[test]
    fn test_i2c_read_uses_one_transaction() {
        let time = SimTime::default();
        let chip = SimEeprom::new(SimChip::new(0x50, 4096, true, &time));
        chip.fill(0x0456, &[0x6B]);
        let mut t = transport(&chip, &time);
        let flags = EepromFlags::ADDR16;

        let value = t
            .read_byte(
                &IoConfig::default(),
                flags,
                TransferMode::I2c,
                Client::new(0x50).unwrap(),
                translate(flags, 0x0456),
            )
            .unwrap();
        assert_eq!(value, 0x6B);
        assert_eq!(chip.transactions(), 1);
        assert_eq!(chip.last_write(), Some((0x50, vec![0x04, 0x56])));
    }

    #[test]
    fn test_smbus_8bit_read_sets_single_offset_byte() {
        let time = SimTime::default();
        let chip = SimEeprom::new(SimChip::new(0x50, 512, false, &time));
        chip.fill(0x1A0, &[0x42]);
        let mut t = transport(&chip, &time);
        let flags = EepromFlags::empty();
        let at = translate(flags, 0x1A0);
        let client = Client::new(0x50 + at.alias_index as u8).unwrap();

        let value = t
            .read_byte(&IoConfig::default(), flags, TransferMode::SmbusByte, client, at)
            .unwrap();
        assert_eq!(value, 0x42);
        assert_eq!(chip.last_write(), Some((0x51, vec![0xA0])));
    }

    #[test]
    fn test_read_times_out_after_write_timeout() {
        let time = SimTime::default();
        let chip = SimEeprom::new(SimChip::new(0x50, 256, false, &time));
        chip.set_always_busy(true);
        let mut t = transport(&chip, &time);
        let config = IoConfigBuilder::new()
            .write_timeout(MillisDurationU32::millis(25))
            .poll_interval(MillisDurationU32::millis(1))
            .build()
            .unwrap();
        let flags = EepromFlags::empty();

        let result = t.read_byte(
            &config,
            flags,
            TransferMode::I2c,
            Client::new(0x50).unwrap(),
            translate(flags, 0),
        );

        assert_eq!(result, Err(Error::Timeout));
        let elapsed = time.now_ms();
        assert!(elapsed >= 25, "gave up early after {elapsed} ms");
        assert!(elapsed <= 27, "overran budget: {elapsed} ms");
    }

    #[test]
    fn test_write_times_out_after_write_timeout() {
        let time = SimTime::default();
        let chip = SimEeprom::new(SimChip::new(0x50, 256, false, &time));
        chip.set_always_busy(true);
        let mut t = transport(&chip, &time);
        let config = IoConfigBuilder::new()
            .write_timeout(MillisDurationU32::millis(10))
            .poll_interval(MillisDurationU32::millis(2))
            .build()
            .unwrap();
        let flags = EepromFlags::empty();
        let mut writebuf = WriteBuffer::new();

        let result = t.write_chunk(
            &config,
            flags,
            TransferMode::I2c,
            Client::new(0x50).unwrap(),
            translate(flags, 3),
            &[1],
            &mut writebuf,
        );

        assert_eq!(result, Err(Error::Timeout));
        let elapsed = time.now_ms();
        assert!((10..=14).contains(&elapsed), "elapsed {elapsed} ms");
    }

    #[test]
    fn test_oversized_chunk_is_allocation_failure() {
        let time = SimTime::default();
        let chip = SimEeprom::new(SimChip::new(0x50, 4096, true, &time));
        let mut t = transport(&chip, &time);
        let mut writebuf = WriteBuffer::new();
        let flags = EepromFlags::ADDR16;
        let data = [0u8; WRITE_BUF_CAPACITY];

        let result = t.write_chunk(
            &IoConfig::default(),
            flags,
            TransferMode::I2c,
            Client::new(0x50).unwrap(),
            translate(flags, 0),
            &data,
            &mut writebuf,
        );
        assert_eq!(result, Err(Error::AllocationFailure));
        assert_eq!(chip.transactions(), 0);
    }
}
