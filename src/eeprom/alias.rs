// Licensed under the Apache-2.0 license

//! Alias bus addresses for chips spanning several I2C addresses.
//!
//! Slot 0 is the chip's own address and belongs to whoever bound the chip.
//! Slots `1..n` are reserved on the adapter during probe and handed back on
//! remove, or as soon as a later probe step fails.

use crate::common::Logger;
use crate::eeprom::common::{Error, MAX_ADDRESSES};
use crate::eeprom::traits::BusAdapter;
use embedded_hal::i2c::SevenBitAddress;

const MAX_SEVEN_BIT_ADDRESS: u8 = 0x7f;

/// One bus address the chip answers on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Client(SevenBitAddress);

impl Client {
    /// # Errors
    ///
    /// Returns [`Error::AliasAddressConflict`] for addresses outside the
    /// 7-bit range.
    pub fn new(address: SevenBitAddress) -> Result<Self, Error> {
        if address > MAX_SEVEN_BIT_ADDRESS {
            return Err(Error::AliasAddressConflict { address });
        }
        Ok(Self(address))
    }

    #[must_use]
    pub fn address(self) -> SevenBitAddress {
        self.0
    }

    fn nth_alias(self, index: usize) -> Result<Self, Error> {
        let address = u8::try_from(index)
            .ok()
            .and_then(|i| self.0.checked_add(i))
            .ok_or(Error::AliasAddressConflict { address: u8::MAX })?;
        Self::new(address)
    }
}

/// Ordered set of addresses owned by one chip.
#[derive(Debug)]
pub struct AliasSet {
    clients: heapless::Vec<Client, MAX_ADDRESSES>,
}

impl AliasSet {
    /// Reserve `count - 1` consecutive addresses after `primary`.
    ///
    /// On failure every address reserved so far is released again, newest
    /// first, before the error is returned.
    ///
    /// At most [`MAX_ADDRESSES`] addresses are held, the most a real AT24
    /// part decodes through its A0..A2 pins. Larger counts only come from
    /// board-supplied geometries with 8-bit offsets beyond 2 KiB and are
    /// refused.
    ///
    /// # Errors
    ///
    /// - [`Error::AllocationFailure`] if `count` exceeds [`MAX_ADDRESSES`]
    /// - [`Error::AliasAddressConflict`] if an address is out of range or
    ///   already taken
    pub fn acquire<A: BusAdapter + ?Sized, L: Logger>(
        primary: Client,
        count: usize,
        adapter: &mut A,
        logger: &mut L,
    ) -> Result<Self, Error> {
        if count > MAX_ADDRESSES {
            return Err(Error::AllocationFailure);
        }
        let mut set = Self {
            clients: heapless::Vec::new(),
        };
        set.clients
            .push(primary)
            .map_err(|_| Error::AllocationFailure)?;

        for index in 1..count {
            let claimed = primary.nth_alias(index).and_then(|client| {
                adapter
                    .new_dummy(client.address())
                    .map(|()| client)
                    .map_err(|_| Error::AliasAddressConflict {
                        address: client.address(),
                    })
            });
            match claimed {
                Ok(client) => {
                    // capacity was checked against count above
                    let _ = set.clients.push(client);
                }
                Err(err) => {
                    if let Error::AliasAddressConflict { address } = err {
                        logger.error(format_args!("address 0x{address:02x} unavailable"));
                    }
                    set.release(adapter);
                    return Err(err);
                }
            }
        }
        Ok(set)
    }

    /// Hand every alias back to the adapter, newest first.
    ///
    /// The primary address is left alone.
    pub fn release<A: BusAdapter + ?Sized>(mut self, adapter: &mut A) {
        while self.clients.len() > 1 {
            if let Some(client) = self.clients.pop() {
                adapter.unregister_dummy(client.address());
            }
        }
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Client> {
        self.clients.get(index).copied()
    }

    #[must_use]
    pub fn primary(&self) -> Option<Client> {
        self.clients.first().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
