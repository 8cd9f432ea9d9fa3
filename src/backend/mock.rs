use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use crate::error::HwError;
use crate::gpio::{Direction, Edge, EdgeEvents, GpioBackend};

/// In-memory stand-in for the kernel's line interface.
///
/// [`MockGpioBackend::drive`] plays the part of an external signal: it sets
/// the level of a line and, when edges are armed, wakes every poller.
#[derive(Default)]
pub struct MockGpioBackend {
    pins: Mutex<FxHashMap<u32, Arc<MockPin>>>, // keyed by line number
}

#[derive(Default)]
struct MockPin {
    state: Mutex<MockPinState>,
    changed: Condvar,
}

struct MockPinState {
    exported: bool,
    direction: Direction,
    edge: Edge,
    value: u8,
    edges: u64,
}

impl Default for MockPinState {
    fn default() -> Self {
        Self {
            exported: false,
            direction: Direction::In,
            edge: Edge::None,
            value: b'0',
            edges: 0,
        }
    }
}

impl MockGpioBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn pin(&self, line: u32) -> Arc<MockPin> {
        self.pins.lock().entry(line).or_default().clone()
    }

    fn exported_pin(&self, line: u32, op: &'static str) -> Result<Arc<MockPin>, HwError> {
        let pin = self.pins.lock().get(&line).cloned();
        match pin {
            Some(pin) if pin.state.lock().exported => Ok(pin),
            _ => Err(HwError::GpioIo {
                line,
                op,
                source: io::Error::new(io::ErrorKind::NotFound, "line not exported"),
            }),
        }
    }

    /// Marks a line as exported by someone else.
    pub fn claim_externally(&self, line: u32) {
        self.pin(line).state.lock().exported = true;
    }

    /// Drives a raw value byte onto a line, as the outside world would.
    pub fn drive_raw(&self, line: u32, byte: u8) {
        let pin = self.pin(line);
        let mut state = pin.state.lock();
        let changed = state.value != byte;
        state.value = byte;
        if changed && state.edge != Edge::None {
            state.edges += 1;
            pin.changed.notify_all();
        }
    }

    pub fn drive(&self, line: u32, level: bool) {
        self.drive_raw(line, if level { b'1' } else { b'0' });
    }

    /// Current raw value byte of a line.
    pub fn level(&self, line: u32) -> u8 {
        self.pin(line).state.lock().value
    }

    pub fn direction(&self, line: u32) -> Direction {
        self.pin(line).state.lock().direction
    }

    pub fn edge(&self, line: u32) -> Edge {
        self.pin(line).state.lock().edge
    }
}

impl GpioBackend for MockGpioBackend {
    fn is_exported(&self, line: u32) -> bool {
        self.pins
            .lock()
            .get(&line)
            .is_some_and(|pin| pin.state.lock().exported)
    }

    fn export(&self, line: u32) -> Result<(), HwError> {
        let pin = self.pin(line);
        let mut state = pin.state.lock();
        if state.exported {
            return Err(HwError::GpioIo {
                line,
                op: "export",
                source: io::Error::new(io::ErrorKind::ResourceBusy, "already exported"),
            });
        }
        *state = MockPinState {
            exported: true,
            value: state.value,
            edges: state.edges,
            ..MockPinState::default()
        };
        Ok(())
    }

    fn unexport(&self, line: u32) -> Result<(), HwError> {
        let pin = self.exported_pin(line, "unexport")?;
        let mut state = pin.state.lock();
        state.exported = false;
        state.edge = Edge::None;
        Ok(())
    }

    fn set_direction(&self, line: u32, direction: Direction) -> Result<(), HwError> {
        self.exported_pin(line, "set direction")?.state.lock().direction = direction;
        Ok(())
    }

    fn set_edge(&self, line: u32, edge: Edge) -> Result<(), HwError> {
        self.exported_pin(line, "set edge")?.state.lock().edge = edge;
        Ok(())
    }

    fn read_value(&self, line: u32) -> Result<u8, HwError> {
        Ok(self.exported_pin(line, "read value")?.state.lock().value)
    }

    fn write_value(&self, line: u32, value: bool) -> Result<(), HwError> {
        let pin = self.exported_pin(line, "write value")?;
        if pin.state.lock().direction != Direction::Out {
            return Err(HwError::GpioIo {
                line,
                op: "write value",
                source: io::Error::new(io::ErrorKind::PermissionDenied, "line is an input"),
            });
        }
        drop(pin);
        self.drive(line, value);
        Ok(())
    }

    fn open_edge_events(&self, line: u32) -> Result<Box<dyn EdgeEvents>, HwError> {
        let pin = self.exported_pin(line, "open value for polling")?;
        let seen = pin.state.lock().edges;
        Ok(Box::new(MockEdgeEvents { pin, seen }))
    }
}

struct MockEdgeEvents {
    pin: Arc<MockPin>,
    seen: u64,
}

impl EdgeEvents for MockEdgeEvents {
    fn drain(&mut self) -> Result<(), HwError> {
        self.seen = self.pin.state.lock().edges;
        Ok(())
    }

    fn wait(&mut self, timeout: Option<Duration>) -> Result<bool, HwError> {
        let seen = self.seen;
        let mut state = self.pin.state.lock();
        match timeout {
            Some(timeout) => {
                let result = self
                    .pin
                    .changed
                    .wait_while_for(&mut state, |s| s.edges == seen, timeout);
                Ok(!result.timed_out())
            }
            None => {
                self.pin.changed.wait_while(&mut state, |s| s.edges == seen);
                Ok(true)
            }
        }
    }

    fn read_value(&mut self) -> Result<u8, HwError> {
        let state = self.pin.state.lock();
        self.seen = state.edges;
        Ok(state.value)
    }
}
