use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why a register transfer on the bus did not complete.
#[derive(Debug, Error)]
pub enum TransferFault {
    #[error("short transfer, {actual} of {expected} bytes")]
    Short { expected: usize, actual: usize },
    #[error("{0}")]
    Os(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum HwError {
    #[error("Bad GPIO number {line}, valid range is {min}..={max}")]
    GpioOutOfRange { line: u32, min: u32, max: u32 },
    #[error("GPIO {line} already reserved")]
    GpioAlreadyReserved { line: u32 },
    #[error("Failed to export GPIO {line}: {reason}")]
    GpioExport { line: u32, reason: String },
    #[error("GPIO {line}: {op} failed: {source}")]
    GpioIo {
        line: u32,
        op: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("GPIO {line}: unexpected value byte 0x{byte:02x}")]
    GpioValue { line: u32, byte: u8 },
    #[error("GPIO {line}: watcher stopped abnormally: {reason}")]
    GpioWatcher { line: u32, reason: String },
    #[error("Failed to open I2C bus {}: {source}", .path.display())]
    I2cBusOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid I2C address 0x{address:02x}, expected a 7-bit address")]
    I2cInvalidAddress { address: u16 },
    #[error("Failed to connect to I2C device 0x{address:02x}: {source}")]
    I2cDeviceConnection {
        address: u16,
        #[source]
        source: io::Error,
    },
    #[error("I2C register access attempted outside of a transaction")]
    I2cOutOfTransaction,
    #[error("Failed to read register 0x{register:02x} of I2C device 0x{address:02x}: {fault}")]
    I2cReadRegister {
        address: u16,
        register: u8,
        #[source]
        fault: TransferFault,
    },
    #[error(
        "Failed to write value {value} to register 0x{register:02x} of I2C device 0x{address:02x}: {fault}"
    )]
    I2cWriteRegister {
        address: u16,
        register: u8,
        value: i128,
        #[source]
        fault: TransferFault,
    },
    #[error("Register value type mismatch: expected {expected} bytes, got {actual}")]
    RegisterWidth { expected: usize, actual: usize },
    #[error("Configuration error: {0}")]
    Config(String),
}

impl HwError {
    pub(crate) fn gpio_io(line: u32, op: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| HwError::GpioIo { line, op, source }
    }
}
