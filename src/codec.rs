//! Conversion between fixed-width register values and their on-wire bytes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HwError;

/// Order in which the bytes of a multi-byte register travel on the bus.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ByteOrder {
    /// Most-significant byte first (big-endian framing).
    #[default]
    MsbFirst,
    /// Least-significant byte first.
    LsbFirst,
}

impl ByteOrder {
    /// `false` keeps network order, `true` reverses it.
    pub fn from_invert(invert: bool) -> Self {
        if invert {
            ByteOrder::LsbFirst
        } else {
            ByteOrder::MsbFirst
        }
    }
}

/// A fixed-width integer that can be stored in a device register.
pub trait RegisterValue: Copy + fmt::Debug + Send + 'static {
    /// Width of the register in bytes.
    const WIDTH: usize;

    /// Writes the value into `out`, which must be exactly `WIDTH` bytes long.
    fn write_bytes(self, order: ByteOrder, out: &mut [u8]);

    /// Assembles a value from exactly `WIDTH` bytes.
    fn read_bytes(bytes: &[u8], order: ByteOrder) -> Self;

    /// Value widened for diagnostics.
    fn to_i128(self) -> i128;
}

macro_rules! impl_register_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl RegisterValue for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                fn write_bytes(self, order: ByteOrder, out: &mut [u8]) {
                    let bytes = match order {
                        ByteOrder::MsbFirst => self.to_be_bytes(),
                        ByteOrder::LsbFirst => self.to_le_bytes(),
                    };
                    out.copy_from_slice(&bytes);
                }

                fn read_bytes(bytes: &[u8], order: ByteOrder) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    match order {
                        ByteOrder::MsbFirst => <$ty>::from_be_bytes(raw),
                        ByteOrder::LsbFirst => <$ty>::from_le_bytes(raw),
                    }
                }

                fn to_i128(self) -> i128 {
                    i128::from(self)
                }
            }
        )*
    };
}

impl_register_value!(u8, i8, u16, i16, u32, i32, u64, i64);

pub fn encode_into<T: RegisterValue>(
    value: T,
    order: ByteOrder,
    out: &mut [u8],
) -> Result<(), HwError> {
    if out.len() != T::WIDTH {
        return Err(HwError::RegisterWidth {
            expected: T::WIDTH,
            actual: out.len(),
        });
    }
    value.write_bytes(order, out);
    Ok(())
}

pub fn decode<T: RegisterValue>(bytes: &[u8], order: ByteOrder) -> Result<T, HwError> {
    if bytes.len() != T::WIDTH {
        return Err(HwError::RegisterWidth {
            expected: T::WIDTH,
            actual: bytes.len(),
        });
    }
    Ok(T::read_bytes(bytes, order))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: RegisterValue + PartialEq>(value: T) {
        for order in [ByteOrder::MsbFirst, ByteOrder::LsbFirst] {
            let mut buf = vec![0u8; T::WIDTH];
            encode_into(value, order, &mut buf).unwrap();
            assert_eq!(decode::<T>(&buf, order).unwrap(), value);
        }
    }

    #[test]
    fn round_trips_every_width() {
        round_trip(0xa5u8);
        round_trip(-3i8);
        round_trip(0xbeefu16);
        round_trip(-12345i16);
        round_trip(0xdead_beefu32);
        round_trip(i32::MIN);
        round_trip(0x0123_4567_89ab_cdefu64);
        round_trip(-1i64);
    }

    #[test]
    fn msb_first_puts_high_byte_on_the_wire_first() {
        let mut buf = [0u8; 4];
        encode_into(0x1122_3344u32, ByteOrder::MsbFirst, &mut buf).unwrap();
        assert_eq!(buf, [0x11, 0x22, 0x33, 0x44]);

        encode_into(0x1122_3344u32, ByteOrder::LsbFirst, &mut buf).unwrap();
        assert_eq!(buf, [0x44, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn decode_honours_invert_flag() {
        let wire = [0x01, 0x02];
        assert_eq!(decode::<u16>(&wire, ByteOrder::from_invert(false)).unwrap(), 0x0102);
        assert_eq!(decode::<u16>(&wire, ByteOrder::from_invert(true)).unwrap(), 0x0201);
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let err = decode::<u32>(&[0u8; 2], ByteOrder::MsbFirst).unwrap_err();
        assert!(matches!(
            err,
            HwError::RegisterWidth {
                expected: 4,
                actual: 2
            }
        ));

        let mut out = [0u8; 3];
        assert!(encode_into(7u16, ByteOrder::MsbFirst, &mut out).is_err());
    }
}
