use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

use crate::error::HwError;
use crate::gpio::{Direction, Edge, EdgeEvents, GpioBackend};

/// Digital lines through the kernel's `/sys/class/gpio` pseudo-files.
pub struct SysfsGpioBackend {
    root: PathBuf,
}

impl SysfsGpioBackend {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn line_dir(&self, line: u32) -> PathBuf {
        self.root.join(format!("gpio{line}"))
    }

    fn write_attr(path: &Path, line: u32, op: &'static str, text: &str) -> Result<(), HwError> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(HwError::gpio_io(line, op))?;
        file.write_all(text.as_bytes())
            .map_err(HwError::gpio_io(line, op))
    }
}

impl GpioBackend for SysfsGpioBackend {
    fn is_exported(&self, line: u32) -> bool {
        self.line_dir(line).exists()
    }

    fn export(&self, line: u32) -> Result<(), HwError> {
        Self::write_attr(&self.root.join("export"), line, "export", &line.to_string())
    }

    fn unexport(&self, line: u32) -> Result<(), HwError> {
        Self::write_attr(
            &self.root.join("unexport"),
            line,
            "unexport",
            &line.to_string(),
        )
    }

    fn set_direction(&self, line: u32, direction: Direction) -> Result<(), HwError> {
        Self::write_attr(
            &self.line_dir(line).join("direction"),
            line,
            "set direction",
            direction.as_str(),
        )
    }

    fn set_edge(&self, line: u32, edge: Edge) -> Result<(), HwError> {
        Self::write_attr(
            &self.line_dir(line).join("edge"),
            line,
            "set edge",
            edge.as_str(),
        )
    }

    fn read_value(&self, line: u32) -> Result<u8, HwError> {
        let contents =
            fs::read(self.line_dir(line).join("value")).map_err(HwError::gpio_io(line, "read value"))?;
        contents.first().copied().ok_or_else(|| HwError::GpioIo {
            line,
            op: "read value",
            source: std::io::ErrorKind::UnexpectedEof.into(),
        })
    }

    fn write_value(&self, line: u32, value: bool) -> Result<(), HwError> {
        Self::write_attr(
            &self.line_dir(line).join("value"),
            line,
            "write value",
            if value { "1" } else { "0" },
        )
    }

    fn open_edge_events(&self, line: u32) -> Result<Box<dyn EdgeEvents>, HwError> {
        let file = File::open(self.line_dir(line).join("value"))
            .map_err(HwError::gpio_io(line, "open value for polling"))?;
        Ok(Box::new(SysfsEdgeEvents { line, file }))
    }
}

/// A `value` file polled for `POLLPRI`, which sysfs raises on armed edges.
struct SysfsEdgeEvents {
    line: u32,
    file: File,
}

impl EdgeEvents for SysfsEdgeEvents {
    fn drain(&mut self) -> Result<(), HwError> {
        let mut stale = Vec::new();
        self.file
            .read_to_end(&mut stale)
            .map_err(HwError::gpio_io(self.line, "drain value"))?;
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(HwError::gpio_io(self.line, "rewind value"))?;
        debug!("GPIO {}: drained {} stale bytes", self.line, stale.len());
        Ok(())
    }

    fn wait(&mut self, timeout: Option<Duration>) -> Result<bool, HwError> {
        let timeout = match timeout {
            Some(t) => PollTimeout::from(u16::try_from(t.as_millis()).unwrap_or(u16::MAX)),
            None => PollTimeout::NONE,
        };
        let mut fds = [PollFd::new(
            self.file.as_fd(),
            PollFlags::POLLPRI | PollFlags::POLLERR,
        )];
        match poll(&mut fds, timeout) {
            Ok(n) => Ok(n > 0),
            // a signal cut the wait short; report it as a timeout
            Err(Errno::EINTR) => Ok(false),
            Err(errno) => Err(HwError::GpioIo {
                line: self.line,
                op: "poll value",
                source: errno.into(),
            }),
        }
    }

    fn read_value(&mut self) -> Result<u8, HwError> {
        let mut byte = [0u8; 1];
        self.file
            .read_exact(&mut byte)
            .map_err(HwError::gpio_io(self.line, "read value"))?;
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(HwError::gpio_io(self.line, "rewind value"))?;
        Ok(byte[0])
    }
}
