#[cfg(feature = "hardware")]
pub mod i2cdev;
pub mod mock;
pub mod mock_i2c;
#[cfg(feature = "hardware")]
pub mod sysfs;

#[cfg(feature = "hardware")]
pub use i2cdev::LinuxI2cDevice;
pub use mock::MockGpioBackend;
pub use mock_i2c::{MockI2cDevice, Transfer};
#[cfg(feature = "hardware")]
pub use sysfs::SysfsGpioBackend;
