use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::i2c::{I2cDevice, MAX_ADDRESS};

/// One operation seen on a [`MockI2cDevice`], in bus order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer {
    Select(u16),
    Write { address: u16, bytes: Vec<u8> },
    Read { address: u16, len: usize },
}

#[derive(Default)]
struct MockBusState {
    selected: Option<u16>,
    devices: FxHashMap<u16, MockChip>,
    busy: FxHashSet<u16>,
    transfer_limit: Option<usize>,
    log: Vec<Transfer>,
}

struct MockChip {
    registers: [u8; 256],
    pointer: u8,
}

impl Default for MockChip {
    fn default() -> Self {
        Self {
            registers: [0; 256],
            pointer: 0,
        }
    }
}

/// Virtual bus with 256 byte-wide registers per attached device.
///
/// A write stores its first byte as the register pointer and the rest as
/// register contents; a read returns bytes from the pointer on. The pointer
/// auto-increments, as on most register-mapped chips. Clones share state, so
/// a test can keep one clone to inspect traffic while the bus owns another.
#[derive(Clone, Default)]
pub struct MockI2cDevice {
    state: Arc<Mutex<MockBusState>>,
}

impl MockI2cDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, address: u16) -> &Self {
        self.state.lock().devices.entry(address).or_default();
        self
    }

    /// Makes device select fail for `address`, as when a kernel driver owns it.
    pub fn mark_busy(&self, address: u16) {
        self.state.lock().busy.insert(address);
    }

    /// Caps every read and write at `limit` bytes to simulate a flaky wire.
    pub fn limit_transfers(&self, limit: Option<usize>) {
        self.state.lock().transfer_limit = limit;
    }

    pub fn set_registers(&self, address: u16, register: u8, bytes: &[u8]) {
        let mut state = self.state.lock();
        let chip = state.devices.entry(address).or_default();
        for (offset, byte) in bytes.iter().enumerate() {
            chip.registers[register.wrapping_add(offset as u8) as usize] = *byte;
        }
    }

    pub fn registers(&self, address: u16, register: u8, len: usize) -> Vec<u8> {
        let state = self.state.lock();
        state
            .devices
            .get(&address)
            .map(|chip| {
                (0..len)
                    .map(|offset| chip.registers[register.wrapping_add(offset as u8) as usize])
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        self.state.lock().log.clone()
    }
}

impl MockBusState {
    fn selected_chip(&mut self) -> io::Result<(u16, &mut MockChip)> {
        let address = self
            .selected
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no device selected"))?;
        let chip = self.devices.get_mut(&address).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no device acknowledged at 0x{address:02x}"),
            )
        })?;
        Ok((address, chip))
    }
}

impl I2cDevice for MockI2cDevice {
    fn select(&mut self, address: u16) -> io::Result<()> {
        let mut state = self.state.lock();
        if address > MAX_ADDRESS {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "address out of range"));
        }
        if state.busy.contains(&address) {
            return Err(io::Error::new(io::ErrorKind::ResourceBusy, "device busy"));
        }
        state.selected = Some(address);
        state.log.push(Transfer::Select(address));
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        let limit = state.transfer_limit.unwrap_or(usize::MAX);
        let bytes = &bytes[..bytes.len().min(limit)];
        let (address, chip) = state.selected_chip()?;

        if let Some((&pointer, data)) = bytes.split_first() {
            chip.pointer = pointer;
            for byte in data {
                chip.registers[chip.pointer as usize] = *byte;
                chip.pointer = chip.pointer.wrapping_add(1);
            }
        }

        state.log.push(Transfer::Write {
            address,
            bytes: bytes.to_vec(),
        });
        Ok(bytes.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        let limit = state.transfer_limit.unwrap_or(usize::MAX);
        let len = buf.len().min(limit);
        let (address, chip) = state.selected_chip()?;

        for slot in &mut buf[..len] {
            *slot = chip.registers[chip.pointer as usize];
            chip.pointer = chip.pointer.wrapping_add(1);
        }

        state.log.push(Transfer::Read { address, len });
        Ok(len)
    }
}
