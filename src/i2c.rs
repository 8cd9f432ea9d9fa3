use std::io;

use log::debug;
use parking_lot::{Mutex, MutexGuard};

use crate::codec::{ByteOrder, RegisterValue};
use crate::error::{HwError, TransferFault};

#[cfg(feature = "hardware")]
use {crate::config::I2cConfig, once_cell::sync::OnceCell, std::sync::Arc};

/// Highest 7-bit device address.
pub const MAX_ADDRESS: u16 = 0x7f;

/// Largest register value supported by the typed accessors.
const MAX_REGISTER_WIDTH: usize = 8;

#[cfg(feature = "hardware")]
static SHARED_BUS: OnceCell<Arc<I2cBus>> = OnceCell::new();

/// Raw access to a bus adapter: device select plus unframed reads and writes.
pub trait I2cDevice: Send {
    fn select(&mut self, address: u16) -> io::Result<()>;
    /// Returns the number of bytes actually written.
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;
    /// Returns the number of bytes actually read.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// A two-wire bus shared by every device hanging off one adapter.
///
/// All traffic goes through [`I2cBus::begin_transaction`], which holds the
/// bus lock for as long as the returned transaction lives.
pub struct I2cBus {
    name: String,
    device: Mutex<Box<dyn I2cDevice>>,
}

impl I2cBus {
    /// Wraps an arbitrary adapter, e.g. a [`MockI2cDevice`](crate::MockI2cDevice).
    pub fn with_device(name: impl Into<String>, device: Box<dyn I2cDevice>) -> Self {
        Self {
            name: name.into(),
            device: Mutex::new(device),
        }
    }

    /// The process-wide bus on the default adapter, opened on first use.
    #[cfg(feature = "hardware")]
    pub fn shared() -> Result<Arc<I2cBus>, HwError> {
        Self::shared_with(&I2cConfig::default())
    }

    /// Like [`I2cBus::shared`]; `config` only matters for the first caller.
    #[cfg(feature = "hardware")]
    pub fn shared_with(config: &I2cConfig) -> Result<Arc<I2cBus>, HwError> {
        SHARED_BUS
            .get_or_try_init(|| {
                let path = config.device_path();
                let device = crate::backend::LinuxI2cDevice::open(&path)?;
                debug!("opened I2C bus {}", path.display());
                Ok(Arc::new(Self::with_device(
                    path.display().to_string(),
                    Box::new(device),
                )))
            })
            .cloned()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for exclusive use of the bus and binds it to `address`.
    ///
    /// If the device select fails the bus lock is released before the error
    /// is returned.
    pub fn begin_transaction(&self, address: u16) -> Result<I2cTransaction<'_>, HwError> {
        if address > MAX_ADDRESS {
            return Err(HwError::I2cInvalidAddress { address });
        }

        let mut device = self.device.lock();
        device
            .select(address)
            .map_err(|source| HwError::I2cDeviceConnection { address, source })?;
        debug!("{}: transaction with device 0x{address:02x}", self.name);

        Ok(I2cTransaction {
            address,
            device: Some(device),
        })
    }
}

/// Exclusive, address-bound window on an [`I2cBus`].
///
/// Register operations are only valid while the transaction still holds the
/// bus; after [`I2cTransaction::end`] they fail with
/// [`HwError::I2cOutOfTransaction`].
pub struct I2cTransaction<'a> {
    address: u16,
    device: Option<MutexGuard<'a, Box<dyn I2cDevice>>>,
}

impl I2cTransaction<'_> {
    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn is_active(&self) -> bool {
        self.device.is_some()
    }

    /// Releases the bus before the transaction goes out of scope.
    pub fn end(&mut self) {
        if self.device.take().is_some() {
            debug!("transaction with device 0x{:02x} ended", self.address);
        }
    }

    fn device(&mut self) -> Result<&mut Box<dyn I2cDevice>, HwError> {
        self.device
            .as_deref_mut()
            .ok_or(HwError::I2cOutOfTransaction)
    }

    /// Reads `N` raw bytes starting at `register`, in wire order.
    pub fn read_register_bytes<const N: usize>(
        &mut self,
        register: u8,
    ) -> Result<[u8; N], HwError> {
        let mut buf = [0u8; N];
        self.read_into(register, &mut buf)?;
        Ok(buf)
    }

    pub fn read_register<T: RegisterValue>(
        &mut self,
        register: u8,
        order: ByteOrder,
    ) -> Result<T, HwError> {
        let mut buf = [0u8; MAX_REGISTER_WIDTH];
        let raw = buf
            .get_mut(..T::WIDTH)
            .ok_or(HwError::RegisterWidth {
                expected: MAX_REGISTER_WIDTH,
                actual: T::WIDTH,
            })?;
        self.read_into(register, raw)?;
        crate::codec::decode(raw, order)
    }

    pub fn write_register<T: RegisterValue>(
        &mut self,
        register: u8,
        value: T,
        order: ByteOrder,
    ) -> Result<(), HwError> {
        let address = self.address;
        let device = self.device()?;

        let mut buf = [0u8; MAX_REGISTER_WIDTH + 1];
        let len = T::WIDTH + 1;
        let frame = buf.get_mut(..len).ok_or(HwError::RegisterWidth {
            expected: MAX_REGISTER_WIDTH,
            actual: T::WIDTH,
        })?;
        frame[0] = register;
        crate::codec::encode_into(value, order, &mut frame[1..])?;

        let fail = |fault: TransferFault| HwError::I2cWriteRegister {
            address,
            register,
            value: value.to_i128(),
            fault,
        };
        let written = device.write(frame).map_err(|e| fail(e.into()))?;
        if written != len {
            return Err(fail(TransferFault::Short {
                expected: len,
                actual: written,
            }));
        }
        Ok(())
    }

    fn read_into(&mut self, register: u8, buf: &mut [u8]) -> Result<(), HwError> {
        let address = self.address;
        let device = self.device()?;
        let fail = |fault: TransferFault| HwError::I2cReadRegister {
            address,
            register,
            fault,
        };

        let written = device.write(&[register]).map_err(|e| fail(e.into()))?;
        if written != 1 {
            return Err(fail(TransferFault::Short {
                expected: 1,
                actual: written,
            }));
        }

        let read = device.read(buf).map_err(|e| fail(e.into()))?;
        if read != buf.len() {
            return Err(fail(TransferFault::Short {
                expected: buf.len(),
                actual: read,
            }));
        }
        Ok(())
    }
}
