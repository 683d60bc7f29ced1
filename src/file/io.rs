//! Bounds-checked little-endian primitives.
//!
//! Method bodies, constants and instruction operands are all stored little-endian.
//! [`CilIO`] gives every primitive numeric type a fixed-size byte representation so
//! that [`read_le`], [`read_le_at`] and [`write_le`] can be written once.

use crate::{Error::OutOfBounds, Result};

/// Numeric types with a fixed little-endian byte representation.
pub trait CilIO: Sized + Copy {
    /// Byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read `Self` from little-endian bytes
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write `Self` as little-endian bytes
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Read a `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than `T`.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Read a `T` at `offset` and advance `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the read would run past the end of `data`.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let size = std::mem::size_of::<T>();
    let end = offset.checked_add(size).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(bytes) = T::Bytes::try_from(&data[*offset..end]) else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(bytes))
}

/// Append `value` to `out` in little-endian order.
pub fn write_le<T: CilIO>(out: &mut Vec<u8>, value: T) {
    out.extend_from_slice(value.to_le_bytes().as_ref());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_values() {
        let data = [0x2A, 0x00, 0x00, 0x00, 0xFF];
        assert_eq!(read_le::<u32>(&data).unwrap(), 42);

        let mut offset = 4;
        assert_eq!(read_le_at::<i8>(&data, &mut offset).unwrap(), -1);
        assert_eq!(offset, 5);
    }

    #[test]
    fn read_past_end() {
        let data = [0x01, 0x02];
        assert!(matches!(read_le::<u32>(&data), Err(OutOfBounds)));

        let mut offset = usize::MAX;
        assert!(read_le_at::<u8>(&data, &mut offset).is_err());
    }

    #[test]
    fn write_values() {
        let mut out = Vec::new();
        write_le(&mut out, 0x0600_0001_u32);
        write_le(&mut out, -2_i16);
        assert_eq!(out, vec![0x01, 0x00, 0x00, 0x06, 0xFE, 0xFF]);
    }
}
