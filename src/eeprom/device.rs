// Licensed under the Apache-2.0 license

//! AT24 chip instance: probe, byte-range access and remove.
//!
//! One [`At24Device`] owns everything needed to talk to a chip: its bus
//! handle, the timing seams, the alias addresses and the write chunk
//! buffer. All of it sits behind a single lock, so reads and writes from
//! this host are serialized per chip. Other masters on the same bus are not
//! covered by the lock; their interference shows up as busy NAKs that the
//! transfer engine retries through.

use crate::common::{Logger, NoOpLogger};
use crate::eeprom::alias::{AliasSet, Client};
use crate::eeprom::common::{
    ChipConfig, EepromFlags, Error, GeometryWarnings, IoConfig,
};
use crate::eeprom::geometry::{self, translate};
use crate::eeprom::table::DeviceId;
use crate::eeprom::traits::{DeviceHost, EepromAttribute, Monotonic};
use crate::eeprom::transfer::{clamp_write_len, TransferMode, Transport, WriteBuffer};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Bytes handed to the transfer engine per write call.
///
/// Page writes are not used: every byte goes out as its own write cycle.
const BYTES_PER_WRITE: usize = 1;

/// Resources a chip takes over at probe and gives back at remove.
pub struct BusResources<I, C, D, L = NoOpLogger> {
    pub bus: I,
    pub clock: C,
    pub delay: D,
    pub logger: L,
}

impl<I, C, D> BusResources<I, C, D, NoOpLogger> {
    pub fn new(bus: I, clock: C, delay: D) -> Self {
        Self {
            bus,
            clock,
            delay,
            logger: NoOpLogger,
        }
    }
}

impl<I, C, D, L> BusResources<I, C, D, L> {
    pub fn with_logger<L2: Logger>(self, logger: L2) -> BusResources<I, C, D, L2> {
        BusResources {
            bus: self.bus,
            clock: self.clock,
            delay: self.delay,
            logger,
        }
    }
}

struct Inner<I, C, D, L> {
    transport: Transport<I, C, D, L>,
    aliases: AliasSet,
    writebuf: Option<WriteBuffer>,
}

/// Everything fixed at probe time.
#[derive(Copy, Clone, Debug)]
struct Layout {
    chip: ChipConfig,
    config: IoConfig,
    mode: TransferMode,
    write_max: usize,
}

impl<I, C, D, L> Inner<I, C, D, L>
where
    I: I2c,
    C: Monotonic,
    D: DelayNs,
    L: Logger,
{
    fn client_for(&self, alias_index: usize) -> Result<Client, Error> {
        self.aliases.get(alias_index).ok_or(Error::OutOfRange)
    }

    fn read_chunk(&mut self, layout: &Layout, offset: u32, out: &mut [u8]) -> Result<usize, Error> {
        let at = translate(layout.chip.flags, offset);
        let client = self.client_for(at.alias_index)?;
        let Some(slot) = out.first_mut() else {
            return Ok(0);
        };
        *slot = self.transport.read_byte(
            &layout.config,
            layout.chip.flags,
            layout.mode,
            client,
            at,
        )?;
        Ok(1)
    }

    fn write_chunk(&mut self, layout: &Layout, offset: u32, data: &[u8]) -> Result<usize, Error> {
        let at = translate(layout.chip.flags, offset);
        let client = self.client_for(at.alias_index)?;
        let count = clamp_write_len(
            u32::from(at.offset),
            data.len(),
            layout.write_max,
            layout.chip.page_size,
        );
        let writebuf = self.writebuf.as_mut().ok_or(Error::ReadOnly)?;
        let chunk = data.get(..count).unwrap_or_default();
        self.transport.write_chunk(
            &layout.config,
            layout.chip.flags,
            layout.mode,
            client,
            at,
            chunk,
            writebuf,
        )
    }
}

/// A bound AT24 chip.
///
/// The lock is a spinlock held for a whole `read` or `write`, busy-poll
/// sleeps included. A caller contending for the same chip spins for up to
/// one write timeout per byte of the request in flight; on a hosted system
/// with several threads per chip, keep requests short.
pub struct At24Device<I, C, D, L = NoOpLogger> {
    layout: Layout,
    attribute: EepromAttribute,
    inner: spin::Mutex<Inner<I, C, D, L>>,
}

impl<I, C, D, L> At24Device<I, C, D, L>
where
    I: I2c,
    C: Monotonic,
    D: DelayNs,
    L: Logger,
{
    /// Bind a chip found at `client`.
    ///
    /// Resolves the geometry, negotiates the transfer mode with the adapter,
    /// reserves the alias addresses and exposes the `eeprom` file. If a
    /// step fails, the aliases reserved so far are released before the
    /// error is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::NoDevice`] if neither the id table nor the host describe
    ///   the chip
    /// - [`Error::ZeroPageSize`] for a page size of 0
    /// - [`Error::UnsupportedBus`] if the adapter cannot transfer at all
    /// - [`Error::AllocationFailure`] if the chip needs more bus addresses
    ///   than the driver provides
    /// - [`Error::AliasAddressConflict`] if an alias address is taken
    /// - [`Error::AttributeRegistration`] if the file cannot be created
    pub fn probe<H: DeviceHost>(
        client: Client,
        id: &DeviceId,
        config: &IoConfig,
        resources: BusResources<I, C, D, L>,
        host: &mut H,
    ) -> Result<Self, Error> {
        let BusResources {
            bus,
            clock,
            delay,
            mut logger,
        } = resources;

        let chip = geometry::resolve(id, &*host)?;
        let warnings = match geometry::validate(&chip) {
            Ok(warnings) => warnings,
            Err(err) => {
                logger.error(format_args!("page_size must not be 0!"));
                return Err(err);
            }
        };
        if warnings.contains(GeometryWarnings::CAPACITY_NOT_POW2) {
            logger.warn(format_args!(
                "byte_len {} looks suspicious (no power of 2)!",
                chip.byte_len
            ));
        }
        if warnings.contains(GeometryWarnings::PAGE_SIZE_NOT_POW2) {
            logger.warn(format_args!(
                "page_size {} looks suspicious (no power of 2)!",
                chip.page_size
            ));
        }

        let capabilities = host.capabilities();
        let mode = TransferMode::negotiate(capabilities)?;
        let num_addresses = geometry::num_addresses(&chip);

        let mut write_max = 0;
        let mut writebuf = None;
        if !chip.flags.contains(EepromFlags::READONLY) {
            if mode.can_write(capabilities) {
                write_max = mode.write_max(chip.page_size, config.io_limit());
                writebuf = Some(WriteBuffer::new());
            } else {
                logger.warn(format_args!(
                    "cannot write due to controller restrictions."
                ));
            }
        }
        let attribute = EepromAttribute::new(chip.byte_len, chip.flags, writebuf.is_some());

        let aliases = AliasSet::acquire(client, num_addresses, host, &mut logger)?;
        if host.create_bin_file(&attribute).is_err() {
            logger.error(format_args!("cannot create {} attribute", attribute.name));
            aliases.release(host);
            return Err(Error::AttributeRegistration);
        }

        logger.debug(format_args!(
            "{} at 0x{:02x}: {} bytes, page {}, flags {:#04x}, {:?}, {} address(es), write_max {}",
            id.name,
            client.address(),
            chip.byte_len,
            chip.page_size,
            chip.flags.bits(),
            mode,
            num_addresses,
            write_max
        ));

        Ok(Self {
            layout: Layout {
                chip,
                config: *config,
                mode,
                write_max,
            },
            attribute,
            inner: spin::Mutex::new(Inner {
                transport: Transport {
                    bus,
                    clock,
                    delay,
                    logger,
                },
                aliases,
                writebuf,
            }),
        })
    }

    /// Unbind the chip: drop the `eeprom` file, then release the alias
    /// addresses. The primary address stays with the caller.
    pub fn remove<H: DeviceHost>(self, host: &mut H) -> BusResources<I, C, D, L> {
        host.remove_bin_file(&self.attribute);
        let Inner {
            transport,
            aliases,
            ..
        } = self.inner.into_inner();
        aliases.release(host);
        BusResources {
            bus: transport.bus,
            clock: transport.clock,
            delay: transport.delay,
            logger: transport.logger,
        }
    }

    /// Read `buf.len()` bytes starting at `offset`.
    ///
    /// Requests running past the end of the chip are cut short; a read
    /// starting at or past the end returns 0. If the chip stalls midway the
    /// bytes read so far are reported as a short read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if not even the first byte could be read.
    pub fn read(&self, offset: u32, buf: &mut [u8]) -> Result<usize, Error> {
        let len = self.clamp_to_size(offset, buf.len());
        if len == 0 {
            return Ok(0);
        }
        let (buf, _) = buf.split_at_mut(len);
        buf.fill(0);

        let mut inner = self.inner.lock();
        let mut moved = 0;
        while let Some(out) = buf.get_mut(moved..).filter(|rest| !rest.is_empty()) {
            match inner.read_chunk(&self.layout, offset + moved as u32, out) {
                Ok(0) => break,
                Ok(n) => moved += n,
                Err(err) if moved == 0 => return Err(err),
                Err(_) => break,
            }
        }
        Ok(moved)
    }

    /// Write `data` starting at `offset`.
    ///
    /// Data running past the end of the chip is dropped. If the chip stalls
    /// midway the bytes written so far are reported as a short write.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfRange`] if `offset` is at or past the end of the chip
    /// - [`Error::ReadOnly`] if the chip was bound without write access
    /// - [`Error::Timeout`] if not even the first byte could be written
    pub fn write(&self, offset: u32, data: &[u8]) -> Result<usize, Error> {
        if offset >= self.attribute.size {
            return Err(Error::OutOfRange);
        }
        if data.is_empty() {
            return Ok(0);
        }
        if !self.attribute.is_writable() {
            return Err(Error::ReadOnly);
        }
        let len = self.clamp_to_size(offset, data.len());
        let (data, _) = data.split_at(len);

        let mut inner = self.inner.lock();
        let mut moved = 0;
        while let Some(rest) = data.get(moved..).filter(|rest| !rest.is_empty()) {
            let chunk = rest.get(..BYTES_PER_WRITE).unwrap_or(rest);
            match inner.write_chunk(&self.layout, offset + moved as u32, chunk) {
                Ok(0) => break,
                Ok(n) => moved += n,
                Err(err) if moved == 0 => return Err(err),
                Err(_) => break,
            }
        }
        Ok(moved)
    }

    /// Read callback of the `eeprom` file: bytes read or a negative errno.
    pub fn bin_read(&self, offset: u64, buf: &mut [u8]) -> isize {
        let Ok(offset) = u32::try_from(offset) else {
            return 0;
        };
        match self.read(offset, buf) {
            Ok(n) => n as isize,
            Err(err) => err.to_errno() as isize,
        }
    }

    /// Write callback of the `eeprom` file: bytes written or a negative
    /// errno.
    pub fn bin_write(&self, offset: u64, data: &[u8]) -> isize {
        let result = u32::try_from(offset)
            .map_err(|_| Error::OutOfRange)
            .and_then(|offset| self.write(offset, data));
        match result {
            Ok(n) => n as isize,
            Err(err) => err.to_errno() as isize,
        }
    }

    /// Read a plain-old-data record stored at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShortTransfer`] if the chip stalled before the whole
    /// record was read, or the error of the first failed transfer.
    pub fn read_value<V>(&self, offset: u32) -> Result<V, Error>
    where
        V: FromBytes + IntoBytes + KnownLayout + Immutable,
    {
        let mut value = V::new_zeroed();
        let bytes = value.as_mut_bytes();
        let expected = bytes.len();
        let actual = self.read(offset, bytes)?;
        if actual != expected {
            return Err(Error::ShortTransfer { expected, actual });
        }
        Ok(value)
    }

    /// Store a plain-old-data record at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShortTransfer`] if the chip stalled before the whole
    /// record was written, or the error of the first failed transfer.
    pub fn write_value<V>(&self, offset: u32, value: &V) -> Result<(), Error>
    where
        V: IntoBytes + Immutable,
    {
        let bytes = value.as_bytes();
        let actual = self.write(offset, bytes)?;
        if actual != bytes.len() {
            return Err(Error::ShortTransfer {
                expected: bytes.len(),
                actual,
            });
        }
        Ok(())
    }

    fn clamp_to_size(&self, offset: u32, len: usize) -> usize {
        let room = self.attribute.size.saturating_sub(offset) as usize;
        len.min(room)
    }

    #[must_use]
    pub fn chip(&self) -> &ChipConfig {
        &self.layout.chip
    }

    #[must_use]
    pub fn attribute(&self) -> &EepromAttribute {
        &self.attribute
    }

    #[must_use]
    pub fn mode(&self) -> TransferMode {
        self.layout.mode
    }

    /// Negotiated write chunk limit; 0 for chips bound read-only.
    #[must_use]
    pub fn write_max(&self) -> usize {
        self.layout.write_max
    }

    #[must_use]
    pub fn num_addresses(&self) -> usize {
        self.inner.lock().aliases.len()
    }

    #[must_use]
    pub fn size(&self) -> u32 {
        self.attribute.size
    }
}
