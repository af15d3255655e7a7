//! Simulated sensor for unit tests: paged register file behind an async I2C
//! bus, scripted read responses and a log of every register write.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use embedded_hal::i2c::{Error, ErrorKind, ErrorType, Operation, SevenBitAddress};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

const PAGE_SELECT: u8 = 0xFF;
const PAGES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBusError {
    Nack,
}

impl Error for FakeBusError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[derive(Debug)]
pub struct FakeSensor {
    pages: [[u8; 256]; PAGES],
    page: usize,
    /// Responses consumed one per read before falling back to the register
    /// file, `None` fails the read.
    scripted: BTreeMap<u8, VecDeque<Option<u8>>>,
    /// Registers that always read the same value on any page.
    pinned: BTreeMap<u8, u8>,
    failing: BTreeSet<u8>,
    writes: Vec<(u8, u8)>,
    last_address: Option<SevenBitAddress>,
}

impl FakeSensor {
    pub fn new() -> Self {
        Self {
            pages: [[0; 256]; PAGES],
            page: 0,
            scripted: BTreeMap::new(),
            pinned: BTreeMap::new(),
            failing: BTreeSet::new(),
            writes: Vec::new(),
            last_address: None,
        }
    }

    /// Sensor that completes every poll of the bring-up and ranging
    /// sequences immediately. Reference SPAD info reports 5 aperture SPADs.
    pub fn booted() -> Self {
        let mut sensor = Self::new();

        sensor.set_register(1, 0x91, 0x3C);
        sensor.set_register(7, 0x92, 0x85);
        for register in 0xB0..=0xB5 {
            sensor.set_register(0, register, 0xFF);
        }
        sensor.set_register(0, 0x1E, 0x01);
        sensor.set_register(0, 0x1F, 0x2C);
        sensor.set_register(0, 0xF8, 0x00);
        sensor.set_register(0, 0xF9, 0x10);

        // device side of the handshakes: SPAD info ready, start bit
        // cleared, new sample ready
        sensor.pin(0x83, 0x10);
        sensor.pin(0x00, 0x00);
        sensor.pin(0x13, 0x01);

        sensor
    }

    pub fn register(&self, page: usize, register: u8) -> u8 {
        self.pages[page][register as usize]
    }

    pub fn register_word(&self, page: usize, register: u8) -> u16 {
        u16::from_be_bytes([
            self.register(page, register),
            self.register(page, register + 1),
        ])
    }

    pub fn set_register(&mut self, page: usize, register: u8, value: u8) {
        self.pages[page][register as usize] = value;
    }

    pub fn pin(&mut self, register: u8, value: u8) {
        self.pinned.insert(register, value);
    }

    pub fn unpin(&mut self, register: u8) {
        self.pinned.remove(&register);
    }

    pub fn script(&mut self, register: u8, responses: &[Option<u8>]) {
        self.scripted
            .entry(register)
            .or_default()
            .extend(responses.iter().copied());
    }

    pub fn fail_reads_of(&mut self, register: u8) {
        self.failing.insert(register);
    }

    pub fn writes(&self) -> &[(u8, u8)] {
        &self.writes
    }

    pub fn writes_to(&self, register: u8) -> Vec<u8> {
        self.writes
            .iter()
            .filter(|(written, _)| *written == register)
            .map(|(_, value)| *value)
            .collect()
    }

    pub fn last_address(&self) -> Option<SevenBitAddress> {
        self.last_address
    }

    fn read(&mut self, register: u8) -> Result<u8, FakeBusError> {
        if let Some(response) = self
            .scripted
            .get_mut(&register)
            .and_then(|responses| responses.pop_front())
        {
            return response.ok_or(FakeBusError::Nack);
        }

        if self.failing.contains(&register) {
            return Err(FakeBusError::Nack);
        }

        if register == PAGE_SELECT {
            return Ok(self.page as u8);
        }

        Ok(self
            .pinned
            .get(&register)
            .copied()
            .unwrap_or(self.pages[self.page][register as usize]))
    }

    fn write(&mut self, register: u8, value: u8) {
        self.writes.push((register, value));

        if register == PAGE_SELECT {
            self.page = value as usize % PAGES;
        } else {
            self.pages[self.page][register as usize] = value;
        }
    }
}

impl ErrorType for FakeSensor {
    type Error = FakeBusError;
}

impl I2c for FakeSensor {
    async fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.last_address = Some(address);

        // first written byte selects the register, the device auto-increments
        let mut pointer: Option<u8> = None;

        for operation in operations {
            match operation {
                Operation::Write(bytes) => {
                    for &byte in bytes.iter() {
                        match pointer {
                            None => pointer = Some(byte),
                            Some(register) => {
                                self.write(register, byte);
                                pointer = Some(register.wrapping_add(1));
                            }
                        }
                    }
                }
                Operation::Read(buf) => {
                    let mut register = pointer.unwrap_or(0);

                    for byte in buf.iter_mut() {
                        *byte = self.read(register)?;
                        register = register.wrapping_add(1);
                    }

                    pointer = Some(register);
                }
            }
        }

        Ok(())
    }
}

/// Delay that returns immediately and only accounts the requested time.
#[derive(Debug, Default)]
pub struct FakeDelay {
    elapsed_ns: u64,
}

impl FakeDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns / 1_000_000
    }
}

impl DelayNs for FakeDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += u64::from(ns);
    }
}
