use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::{Mutex, const_mutex};
use serde::{Deserialize, Serialize};

use crate::config::GpioConfig;
use crate::error::HwError;
use crate::observable::{Observable, ObserverId};

/// Serializes the exported-check and export request across the process.
static RESERVATION_LOCK: Mutex<()> = const_mutex(());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Edge {
    #[default]
    None,
    Rising,
    Falling,
    Both,
}

impl Edge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Edge::None => "none",
            Edge::Rising => "rising",
            Edge::Falling => "falling",
            Edge::Both => "both",
        }
    }
}

/// Maps a raw value byte to a level. Anything but `'0'`/`'1'` is spurious.
pub fn decode_level(byte: u8) -> Option<bool> {
    match byte {
        b'0' => Some(false),
        b'1' => Some(true),
        _ => None,
    }
}

/// A pollable handle on one line's value, opened for edge notification.
pub trait EdgeEvents: Send {
    /// Discards any pending notification so only later edges wake `wait`.
    fn drain(&mut self) -> Result<(), HwError>;
    /// Blocks until an edge or `timeout`; `None` waits forever.
    /// Returns `false` on timeout.
    fn wait(&mut self, timeout: Option<Duration>) -> Result<bool, HwError>;
    /// Reads the value byte behind the last edge and rewinds for the next one.
    fn read_value(&mut self) -> Result<u8, HwError>;
}

/// OS surface for digital lines.
pub trait GpioBackend: Send + Sync {
    fn is_exported(&self, line: u32) -> bool;
    fn export(&self, line: u32) -> Result<(), HwError>;
    fn unexport(&self, line: u32) -> Result<(), HwError>;
    fn set_direction(&self, line: u32, direction: Direction) -> Result<(), HwError>;
    fn set_edge(&self, line: u32, edge: Edge) -> Result<(), HwError>;
    fn read_value(&self, line: u32) -> Result<u8, HwError>;
    fn write_value(&self, line: u32, value: bool) -> Result<(), HwError>;
    fn open_edge_events(&self, line: u32) -> Result<Box<dyn EdgeEvents>, HwError>;
}

/// Read capability of a line or sensor.
pub trait Input<T> {
    fn read_value(&self) -> Result<T, HwError>;
}

/// Write capability of a line or actuator.
pub trait Output<T> {
    fn write_value(&self, value: T) -> Result<(), HwError>;
}

/// Hands out exclusive line reservations against one backend.
#[derive(Clone)]
pub struct Gpio {
    config: Arc<GpioConfig>,
    backend: Arc<dyn GpioBackend>,
}

impl Gpio {
    pub fn new(config: GpioConfig, backend: Arc<dyn GpioBackend>) -> Self {
        Self {
            config: Arc::new(config),
            backend,
        }
    }

    #[cfg(feature = "hardware")]
    pub fn sysfs(config: GpioConfig) -> Self {
        let backend = Arc::new(crate::backend::SysfsGpioBackend::new(&config.sysfs_root));
        Self::new(config, backend)
    }

    pub fn config(&self) -> &GpioConfig {
        &self.config
    }

    /// Reserves `line` as an input with both edges armed for interrupts.
    pub fn input(&self, line: u32) -> Result<GpioInput, HwError> {
        let line = GpioLine::reserve(self.backend.clone(), &self.config, line, Direction::In)?;
        Ok(GpioInput {
            line,
            observers: Arc::new(Observable::new()),
            watcher: Mutex::new(None),
            poll_timeout: self.config.watch_poll_timeout(),
        })
    }

    pub fn output(&self, line: u32) -> Result<GpioOutput, HwError> {
        let line = GpioLine::reserve(self.backend.clone(), &self.config, line, Direction::Out)?;
        Ok(GpioOutput { line })
    }
}

/// Exclusive claim on one numbered line. Released on drop.
pub struct GpioLine {
    number: u32,
    direction: Direction,
    backend: Arc<dyn GpioBackend>,
    reserved: bool,
}

impl GpioLine {
    fn reserve(
        backend: Arc<dyn GpioBackend>,
        config: &GpioConfig,
        number: u32,
        direction: Direction,
    ) -> Result<Self, HwError> {
        if number < config.min_line || number > config.max_line {
            return Err(HwError::GpioOutOfRange {
                line: number,
                min: config.min_line,
                max: config.max_line,
            });
        }

        {
            let _guard = RESERVATION_LOCK.lock();
            if backend.is_exported(number) {
                return Err(HwError::GpioAlreadyReserved { line: number });
            }
            debug!("exporting GPIO {number}");
            backend.export(number)?;
        }

        thread::sleep(config.export_settle());

        if !backend.is_exported(number) {
            return Err(HwError::GpioExport {
                line: number,
                reason: "line did not appear after export".into(),
            });
        }

        // From here on the line is ours; dropping `line` unexports it.
        let line = Self {
            number,
            direction,
            backend,
            reserved: true,
        };

        line.backend.set_direction(number, direction)?;
        if direction == Direction::In {
            line.backend.set_edge(number, Edge::Both)?;
        }

        info!("reserved GPIO {number} as {}", direction.as_str());
        Ok(line)
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_reserved(&self) -> bool {
        self.reserved
    }

    fn read_level(&self) -> Result<bool, HwError> {
        let byte = self.backend.read_value(self.number)?;
        decode_level(byte).ok_or(HwError::GpioValue {
            line: self.number,
            byte,
        })
    }

    /// Unexports the line. Calling it again is a no-op.
    pub fn release(&mut self) -> Result<(), HwError> {
        if !self.reserved {
            return Ok(());
        }
        self.reserved = false;
        info!("releasing GPIO {}", self.number);
        self.backend.unexport(self.number)
    }
}

impl Drop for GpioLine {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("failed to release GPIO {}: {e}", self.number);
        }
    }
}

/// Background thread turning edges on one line into published levels.
struct EdgeWatcher {
    line: u32,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<(), HwError>>>,
}

impl EdgeWatcher {
    /// `events` must already be drained so stale edges are never reported.
    fn spawn(
        line: u32,
        mut events: Box<dyn EdgeEvents>,
        poll_timeout: Duration,
        observers: Arc<Observable<bool>>,
    ) -> Result<Self, HwError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_flag = cancel.clone();

        let handle = thread::Builder::new()
            .name(format!("gpio{line}-watch"))
            .spawn(move || -> Result<(), HwError> {
                loop {
                    let woke = events.wait(Some(poll_timeout));

                    // checked before notifying: a stop requested while we
                    // were blocked must not deliver the event that woke us
                    if cancel_flag.load(Ordering::Acquire) {
                        return Ok(());
                    }

                    let woke = woke.inspect_err(|e| error!("watcher for GPIO {line}: {e}"))?;
                    if !woke {
                        continue;
                    }

                    let byte = events
                        .read_value()
                        .inspect_err(|e| error!("watcher for GPIO {line}: {e}"))?;
                    match decode_level(byte) {
                        Some(level) => observers.publish(&level),
                        None => debug!("ignoring spurious value 0x{byte:02x} on GPIO {line}"),
                    }
                }
            })
            .map_err(HwError::gpio_io(line, "spawn watcher"))?;

        Ok(Self {
            line,
            cancel,
            handle: Some(handle),
        })
    }

    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Requests cancellation and waits for the thread to exit.
    fn stop(mut self) -> Result<(), HwError> {
        self.cancel.store(true, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(HwError::GpioWatcher {
                line: self.line,
                reason: "watcher thread panicked".into(),
            }),
        }
    }
}

impl Drop for EdgeWatcher {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// A reserved input line with blocking and interrupt-driven change detection.
///
/// Listeners run on the watcher thread and must not call [`GpioInput::stop`]
/// or [`GpioInput::release`] on the same input.
pub struct GpioInput {
    line: GpioLine,
    observers: Arc<Observable<bool>>,
    watcher: Mutex<Option<EdgeWatcher>>,
    poll_timeout: Duration,
}

impl GpioInput {
    pub fn number(&self) -> u32 {
        self.line.number()
    }

    /// Blocks until the next edge and returns the level it produced.
    pub fn wait_for_change(&self) -> Result<bool, HwError> {
        let line = self.line.number();
        let mut events = self.line.backend.open_edge_events(line)?;
        events.drain()?;

        loop {
            if !events.wait(None)? {
                continue;
            }
            let byte = events.read_value()?;
            match decode_level(byte) {
                Some(level) => return Ok(level),
                None => debug!("ignoring spurious value 0x{byte:02x} on GPIO {line}"),
            }
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> ObserverId
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.observers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ObserverId) {
        self.observers.unsubscribe(id);
    }

    /// Starts the background watcher. A no-op while one is already running.
    pub fn start(&self) -> Result<(), HwError> {
        let line = self.line.number();
        let mut slot = self.watcher.lock();

        if let Some(watcher) = slot.as_ref()
            && watcher.is_running()
        {
            return Ok(());
        }
        if let Some(dead) = slot.take()
            && let Err(e) = dead.stop()
        {
            warn!("previous watcher for GPIO {line} ended with: {e}");
        }

        let mut events = self.line.backend.open_edge_events(line)?;
        events.drain()?;
        *slot = Some(EdgeWatcher::spawn(
            line,
            events,
            self.poll_timeout,
            self.observers.clone(),
        )?);
        debug!("started watcher for GPIO {line}");
        Ok(())
    }

    /// Stops the watcher and waits for its thread to exit.
    ///
    /// Returns the error that killed the watcher, if it died on its own.
    pub fn stop(&self) -> Result<(), HwError> {
        let watcher = self.watcher.lock().take();
        match watcher {
            Some(watcher) => {
                debug!("stopping watcher for GPIO {}", self.line.number());
                watcher.stop()
            }
            None => Ok(()),
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.lock().as_ref().is_some_and(EdgeWatcher::is_running)
    }

    /// Stops any watcher, then unexports the line. Idempotent.
    pub fn release(&mut self) -> Result<(), HwError> {
        let stopped = self.stop();
        let released = self.line.release();
        stopped.and(released)
    }
}

impl Input<bool> for GpioInput {
    fn read_value(&self) -> Result<bool, HwError> {
        self.line.read_level()
    }
}

impl Drop for GpioInput {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("watcher for GPIO {} ended with: {e}", self.line.number());
        }
    }
}

/// A reserved output line. Its level can be read back as well as driven.
pub struct GpioOutput {
    line: GpioLine,
}

impl GpioOutput {
    pub fn number(&self) -> u32 {
        self.line.number()
    }

    pub fn release(&mut self) -> Result<(), HwError> {
        self.line.release()
    }
}

impl Input<bool> for GpioOutput {
    fn read_value(&self) -> Result<bool, HwError> {
        self.line.read_level()
    }
}

impl Output<bool> for GpioOutput {
    fn write_value(&self, value: bool) -> Result<(), HwError> {
        if !self.line.is_reserved() {
            return Err(HwError::GpioExport {
                line: self.line.number(),
                reason: "line has been released".into(),
            });
        }
        self.line.backend.write_value(self.line.number(), value)
    }
}
