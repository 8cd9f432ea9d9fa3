//! Typed, thread-safe access to the digital lines and the shared I2C bus of a
//! Raspberry Pi class board.

pub mod backend;
pub mod codec;
pub mod config;
pub mod error;
pub mod gpio;
pub mod i2c;
pub mod observable;

pub use codec::{ByteOrder, RegisterValue};
pub use config::{GpioConfig, HwConfig, I2cConfig};
pub use error::{HwError, TransferFault};
pub use gpio::{
    Direction, Edge, EdgeEvents, Gpio, GpioBackend, GpioInput, GpioOutput, Input, Output,
};
pub use i2c::{I2cBus, I2cDevice, I2cTransaction};
pub use observable::{Observable, ObserverId};

#[cfg(feature = "hardware")]
pub use backend::{LinuxI2cDevice, SysfsGpioBackend};
pub use backend::{MockGpioBackend, MockI2cDevice, Transfer};
