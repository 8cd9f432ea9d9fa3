use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::path::Path;

use crate::error::HwError;
use crate::i2c::I2cDevice;

/// `I2C_SLAVE` from `linux/i2c-dev.h`.
const I2C_SLAVE: u16 = 0x0703;

nix::ioctl_write_int_bad!(i2c_set_slave, I2C_SLAVE);

/// A `/dev/i2c-N` adapter node.
pub struct LinuxI2cDevice {
    file: File,
}

impl LinuxI2cDevice {
    pub fn open(path: &Path) -> Result<Self, HwError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| HwError::I2cBusOpen {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self { file })
    }
}

impl I2cDevice for LinuxI2cDevice {
    fn select(&mut self, address: u16) -> io::Result<()> {
        // SAFETY: the fd is owned by `self.file` and stays open for the call;
        // I2C_SLAVE takes the address by value.
        unsafe { i2c_set_slave(self.file.as_raw_fd(), i32::from(address)) }?;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.file.write(bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}
