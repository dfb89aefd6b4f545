// Licensed under the Apache-2.0 license

//! Common types and constants for the AT24 EEPROM driver.
//!
//! This module provides the chip description record, the process-wide I/O
//! configuration, and the error type shared by every layer of the driver.

use bitflags::bitflags;
use fugit::MillisDurationU32;

/// Width of the log2(byte length) field at the bottom of a device magic.
pub const SIZE_BYTELEN: u32 = 5;
/// Width of the flags field sitting above the length field.
pub const SIZE_FLAGS: u32 = 8;

/// Bytes reachable through one bus address with 8-bit in-chip offsets.
pub const SPAN_ADDR8: u32 = 256;
/// Bytes reachable through one bus address with 16-bit in-chip offsets.
pub const SPAN_ADDR16: u32 = 65536;

/// Largest transfer an SMBus block command can carry.
pub const SMBUS_BLOCK_MAX: usize = 32;

/// Upper bound on bus addresses one chip may claim (A0..A2 pins).
pub const MAX_ADDRESSES: usize = 8;

/// Write chunk buffer capacity: offset bytes plus the largest chunk.
pub const WRITE_BUF_CAPACITY: usize = 258;

pub const DEFAULT_IO_LIMIT: u32 = 128;
pub const DEFAULT_WRITE_TIMEOUT_MS: u32 = 25;
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 1;

bitflags! {
    /// Chip capability flags, as packed in the device magic.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EepromFlags: u8 {
        /// Two-byte in-chip offsets.
        const ADDR16         = 0x80;
        const READONLY       = 0x40;
        /// Expose the contents to every user, not just the owner.
        const WORLD_READABLE = 0x20;
        /// Chip answers on 8 consecutive addresses whatever its size.
        const TAKE8ADDR      = 0x10;
        /// Factory-programmed serial number area.
        const SERIAL         = 0x08;
        /// Factory-programmed MAC address area.
        const MAC            = 0x04;
    }
}

bitflags! {
    /// Non-fatal findings about a resolved geometry.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct GeometryWarnings: u8 {
        const CAPACITY_NOT_POW2  = 0b01;
        const PAGE_SIZE_NOT_POW2 = 0b10;
    }
}

/// Chip description: either board-supplied or decoded from the id table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChipConfig {
    pub byte_len: u32,
    pub page_size: u32,
    pub flags: EepromFlags,
}

pub struct ChipConfigBuilder {
    byte_len: u32,
    page_size: u32,
    flags: EepromFlags,
}

impl ChipConfigBuilder {
    /// Start from a chip of `byte_len` bytes written one byte per cycle.
    #[must_use]
    pub fn new(byte_len: u32) -> Self {
        Self {
            byte_len,
            page_size: 1,
            flags: EepromFlags::empty(),
        }
    }
    #[must_use]
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }
    #[must_use]
    pub fn flags(mut self, flags: EepromFlags) -> Self {
        self.flags = flags;
        self
    }
    #[must_use]
    pub fn read_only(mut self, enabled: bool) -> Self {
        self.flags.set(EepromFlags::READONLY, enabled);
        self
    }
    #[must_use]
    pub fn build(self) -> ChipConfig {
        ChipConfig {
            byte_len: self.byte_len,
            page_size: self.page_size,
            flags: self.flags,
        }
    }
}

/// Driver-wide I/O tunables, fixed once at initialization.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IoConfig {
    io_limit: u32,
    write_timeout: MillisDurationU32,
    poll_interval: MillisDurationU32,
}

impl IoConfig {
    /// Maximum bytes per negotiated write chunk; always a power of two.
    #[must_use]
    pub fn io_limit(&self) -> u32 {
        self.io_limit
    }
    /// Busy-retry budget of one transfer.
    #[must_use]
    pub fn write_timeout(&self) -> MillisDurationU32 {
        self.write_timeout
    }
    /// Sleep between two attempts while the chip is busy.
    #[must_use]
    pub fn poll_interval(&self) -> MillisDurationU32 {
        self.poll_interval
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            io_limit: DEFAULT_IO_LIMIT,
            write_timeout: MillisDurationU32::millis(DEFAULT_WRITE_TIMEOUT_MS),
            poll_interval: MillisDurationU32::millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

pub struct IoConfigBuilder {
    io_limit: u32,
    write_timeout: MillisDurationU32,
    poll_interval: MillisDurationU32,
}

impl Default for IoConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IoConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            io_limit: DEFAULT_IO_LIMIT,
            write_timeout: MillisDurationU32::millis(DEFAULT_WRITE_TIMEOUT_MS),
            poll_interval: MillisDurationU32::millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
    #[must_use]
    pub fn io_limit(mut self, bytes: u32) -> Self {
        self.io_limit = bytes;
        self
    }
    #[must_use]
    pub fn write_timeout(mut self, timeout: MillisDurationU32) -> Self {
        self.write_timeout = timeout;
        self
    }
    #[must_use]
    pub fn poll_interval(mut self, interval: MillisDurationU32) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Validate and normalize the tunables.
    ///
    /// `io_limit` is rounded down to a power of two so that chunks stay
    /// page aligned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIoLimit`] when `io_limit` is zero.
    pub fn build(self) -> Result<IoConfig, Error> {
        if self.io_limit == 0 {
            return Err(Error::InvalidIoLimit);
        }
        Ok(IoConfig {
            io_limit: 1 << self.io_limit.ilog2(),
            write_timeout: self.write_timeout,
            poll_interval: self.poll_interval,
        })
    }
}

/// Errno values reported through the byte-range file callbacks.
pub mod errno {
    pub const EACCES: i32 = 13;
    pub const ENODEV: i32 = 19;
    pub const EINVAL: i32 = 22;
    pub const EFBIG: i32 = 27;
    pub const ENOMEM: i32 = 12;
    pub const EIO: i32 = 5;
    pub const EPFNOSUPPORT: i32 = 96;
    pub const EADDRINUSE: i32 = 98;
    pub const ETIMEDOUT: i32 = 110;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// No id table geometry and no platform data for this chip.
    NoDevice,
    ZeroPageSize,
    /// Adapter offers neither plain I2C nor any SMBus read command.
    UnsupportedBus,
    AllocationFailure,
    /// An alias address could not be claimed.
    AliasAddressConflict { address: u8 },
    AttributeRegistration,
    InvalidIoLimit,
    /// The chip stayed busy for the whole write timeout.
    Timeout,
    OutOfRange,
    ReadOnly,
    ShortTransfer { expected: usize, actual: usize },
}

impl Error {
    /// Negative errno for the byte-range file callbacks.
    #[must_use]
    pub fn to_errno(self) -> i32 {
        let code = match self {
            Error::NoDevice => errno::ENODEV,
            Error::ZeroPageSize | Error::InvalidIoLimit => errno::EINVAL,
            Error::UnsupportedBus => errno::EPFNOSUPPORT,
            Error::AllocationFailure | Error::AttributeRegistration => errno::ENOMEM,
            Error::AliasAddressConflict { .. } => errno::EADDRINUSE,
            Error::Timeout => errno::ETIMEDOUT,
            Error::OutOfRange => errno::EFBIG,
            Error::ReadOnly => errno::EACCES,
            Error::ShortTransfer { .. } => errno::EIO,
        };
        -code
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::NoDevice => f.write_str("no geometry for device"),
            Error::ZeroPageSize => f.write_str("page_size must not be 0"),
            Error::UnsupportedBus => f.write_str("adapter lacks usable transfer functionality"),
            Error::AllocationFailure => f.write_str("out of driver buffer space"),
            Error::AliasAddressConflict { address } => {
                write!(f, "address 0x{address:02x} unavailable")
            }
            Error::AttributeRegistration => f.write_str("could not expose eeprom attribute"),
            Error::InvalidIoLimit => f.write_str("io_limit must not be 0"),
            Error::Timeout => f.write_str("device stayed busy past write timeout"),
            Error::OutOfRange => f.write_str("offset beyond device size"),
            Error::ReadOnly => f.write_str("device is read-only"),
            Error::ShortTransfer { expected, actual } => {
                write!(f, "short transfer: {actual} of {expected} bytes")
            }
        }
    }
}

impl embedded_io::Error for Error {
    fn kind(&self) -> embedded_io::ErrorKind {
        use embedded_io::ErrorKind;
        match self {
            Error::Timeout => ErrorKind::TimedOut,
            Error::OutOfRange | Error::InvalidIoLimit | Error::ZeroPageSize => {
                ErrorKind::InvalidInput
            }
            Error::ReadOnly => ErrorKind::PermissionDenied,
            Error::AliasAddressConflict { .. } => ErrorKind::AddrInUse,
            Error::AllocationFailure => ErrorKind::OutOfMemory,
            Error::UnsupportedBus => ErrorKind::Unsupported,
            Error::NoDevice => ErrorKind::NotFound,
            Error::AttributeRegistration | Error::ShortTransfer { .. } => ErrorKind::Other,
        }
    }
}
