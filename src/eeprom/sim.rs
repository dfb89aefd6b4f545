// Licensed under the Apache-2.0 license

//! Simulated AT24 chip and clock for host tests.

use crate::eeprom::traits::{MillisInstant, Monotonic};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

/// Shared simulated time in nanoseconds; only sleeping advances it.
#[derive(Clone, Default)]
pub struct SimTime(Arc<AtomicU64>);

impl SimTime {
    pub fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst) / 1_000_000
    }

    pub fn advance_ns(&self, ns: u64) {
        self.0.fetch_add(ns, Ordering::SeqCst);
    }
}

pub struct SimClock(SimTime);

impl SimClock {
    pub fn new(time: &SimTime) -> Self {
        Self(time.clone())
    }
}

impl Monotonic for SimClock {
    fn now(&mut self) -> MillisInstant {
        MillisInstant::from_ticks(self.0.now_ms())
    }
}

pub struct SimDelay(SimTime);

impl SimDelay {
    pub fn new(time: &SimTime) -> Self {
        Self(time.clone())
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.advance_ns(u64::from(ns));
    }
}

/// Chip state behind a [`SimEeprom`] handle.
pub struct SimChip {
    base: u8,
    addr16: bool,
    memory: Vec<u8>,
    pointer: usize,
    time: SimTime,
    write_cycle_ms: u64,
    busy_until_ms: u64,
    always_busy: bool,
    ops_before_stall: Option<usize>,
    transactions: usize,
    writes: Vec<(u8, Vec<u8>)>,
    issuers: Vec<ThreadId>,
}

impl SimChip {
    /// Blank (0xFF) chip of `size` bytes answering from `base` upwards.
    pub fn new(base: u8, size: usize, addr16: bool, time: &SimTime) -> Self {
        Self {
            base,
            addr16,
            memory: vec![0xFF; size],
            pointer: 0,
            time: time.clone(),
            write_cycle_ms: 5,
            busy_until_ms: 0,
            always_busy: false,
            ops_before_stall: None,
            transactions: 0,
            writes: Vec::new(),
            issuers: Vec::new(),
        }
    }

    fn span(&self) -> usize {
        if self.addr16 {
            65536
        } else {
            256
        }
    }

    fn nak() -> ErrorKind {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
    }

    fn busy(&mut self) -> bool {
        if self.always_busy || self.time.now_ms() < self.busy_until_ms {
            return true;
        }
        match self.ops_before_stall {
            Some(0) => true,
            Some(ref mut left) => {
                *left -= 1;
                false
            }
            None => false,
        }
    }

    fn block(&self, address: u8) -> Option<usize> {
        let block = usize::from(address.checked_sub(self.base)?);
        (block * self.span() < self.memory.len()).then_some(block)
    }
}

/// Cloneable bus handle onto one simulated chip, shareable across threads.
#[derive(Clone)]
pub struct SimEeprom(Arc<Mutex<SimChip>>);

impl SimEeprom {
    pub fn new(chip: SimChip) -> Self {
        Self(Arc::new(Mutex::new(chip)))
    }

    fn chip(&self) -> MutexGuard<'_, SimChip> {
        self.0.lock().unwrap()
    }

    pub fn set_always_busy(&self, busy: bool) {
        self.chip().always_busy = busy;
    }

    /// Let `ops` more transactions through, then NAK everything.
    pub fn stall_after(&self, ops: usize) {
        self.chip().ops_before_stall = Some(ops);
    }

    pub fn fill(&self, offset: usize, bytes: &[u8]) {
        self.chip().memory[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn peek(&self, offset: usize) -> u8 {
        self.chip().memory[offset]
    }

    pub fn transactions(&self) -> usize {
        self.chip().transactions
    }

    pub fn last_write(&self) -> Option<(u8, Vec<u8>)> {
        self.chip().writes.last().cloned()
    }

    /// Thread that issued each transaction, in bus order.
    pub fn issuers(&self) -> Vec<ThreadId> {
        self.chip().issuers.clone()
    }
}

impl ErrorType for SimEeprom {
    type Error = ErrorKind;
}

impl I2c for SimEeprom {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut chip = self.chip();
        chip.transactions += 1;
        chip.issuers.push(thread::current().id());
        if chip.busy() {
            return Err(SimChip::nak());
        }
        let block = chip.block(address).ok_or_else(SimChip::nak)?;
        let size = chip.memory.len();

        for op in operations {
            match op {
                Operation::Write(bytes) => {
                    chip.writes.push((address, bytes.to_vec()));
                    let offset_len = if chip.addr16 { 2 } else { 1 };
                    if bytes.len() < offset_len {
                        return Err(ErrorKind::Other);
                    }
                    let (offset, data) = bytes.split_at(offset_len);
                    let offset = offset
                        .iter()
                        .fold(0usize, |acc, b| (acc << 8) | usize::from(*b));
                    chip.pointer = (block * chip.span() + offset) % size;
                    for byte in data {
                        let at = chip.pointer;
                        chip.memory[at] = *byte;
                        chip.pointer = (at + 1) % size;
                    }
                    if !data.is_empty() {
                        chip.busy_until_ms = chip.time.now_ms() + chip.write_cycle_ms;
                    }
                }
                Operation::Read(buf) => {
                    for slot in buf.iter_mut() {
                        let at = chip.pointer;
                        *slot = chip.memory[at];
                        chip.pointer = (at + 1) % size;
                    }
                }
            }
        }
        Ok(())
    }
}
