// Licensed under the Apache-2.0 license

//! AT24 EEPROM driver module.
//!
//! Binds serial EEPROMs of the AT24 family sitting on an I2C or SMBus
//! adapter and exposes their contents as a byte-range file. The pieces are
//! layered bottom-up:
//!
//! - [`table`] and [`geometry`]: chip ids, capacity, page size and offset
//!   translation
//! - [`alias`]: the extra bus addresses of chips spanning several of them
//! - [`transfer`]: single transfers with busy polling
//! - [`device`]: probe, remove and byte-range access
//! - [`file`]: a seekable `embedded-io` stream over a bound chip

pub mod alias;
pub mod common;
pub mod device;
pub mod file;
pub mod geometry;
#[cfg(test)]
pub(crate) mod sim;
pub mod table;
pub mod traits;
pub mod transfer;

pub use common::{ChipConfig, ChipConfigBuilder, EepromFlags, Error, IoConfig, IoConfigBuilder};
pub use device::{At24Device, BusResources};
pub use file::EepromFile;
pub use traits::{BusAdapter, BusCapabilities, ConfigSource, DeviceHost, Monotonic};
