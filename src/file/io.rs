//! Bounds-checked little-endian reads of primitive values.
//!
//! Instruction operands are stored little-endian. The
//! [`CilIO`] trait abstracts over the primitive widths so a single generic reader
//! covers every operand shape the decoder needs.
//!
//! # Examples
//!
//! ```rust
//! use cilfront::file::io::read_le_at;
//!
//! let data = [0x01, 0x00, 0x02, 0x00, 0x00, 0x00];
//! let mut offset = 0;
//! let first: u16 = read_le_at(&data, &mut offset)?;
//! let second: u32 = read_le_at(&data, &mut offset)?;
//! assert_eq!((first, second, offset), (1, 2, 6));
//! # Ok::<(), cilfront::Error>(())
//! ```

use crate::Result;

/// Primitive values that can be decoded from a little-endian byte slice.
pub trait CilIO: Sized {
    /// Fixed-size byte representation of the value
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    /// Decode the value from its little-endian representation
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_cil_io {
    ($($ty:ty => $len:literal),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }
            }
        )*
    };
}

impl_cil_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
}

/// Read a `T` at `offset` and advance `offset` past it.
///
/// ## Arguments
/// * 'data'    - The byte slice to read from
/// * 'offset'  - Position of the value, updated on success
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let end = offset
        .checked_add(type_len)
        .ok_or_else(|| out_of_bounds_error!())?;
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(bytes) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;
    Ok(T::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BUFFER: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    fn read_first<T: CilIO>(data: &[u8]) -> crate::Result<T> {
        let mut offset = 0;
        read_le_at(data, &mut offset)
    }

    #[test]
    fn read_le_widths() {
        assert_eq!(read_first::<u8>(&TEST_BUFFER).unwrap(), 0x01);
        assert_eq!(read_first::<u16>(&TEST_BUFFER).unwrap(), 0x0201);
        assert_eq!(read_first::<u32>(&TEST_BUFFER).unwrap(), 0x0403_0201);
        assert_eq!(read_first::<u64>(&TEST_BUFFER).unwrap(), 0x0807_0605_0403_0201);
        assert_eq!(read_first::<i8>(&[0xFF]).unwrap(), -1);
    }

    #[test]
    fn read_le_floats() {
        let data = 1.5_f32.to_le_bytes();
        assert_eq!(read_first::<f32>(&data).unwrap(), 1.5);

        let data = (-2.25_f64).to_le_bytes();
        assert_eq!(read_first::<f64>(&data).unwrap(), -2.25);
    }

    #[test]
    fn read_le_at_advances() {
        let mut offset = 2;
        let value = read_le_at::<u16>(&TEST_BUFFER, &mut offset).unwrap();
        assert_eq!(value, 0x0403);
        assert_eq!(offset, 4);
    }

    #[test]
    fn read_le_at_out_of_bounds() {
        let mut offset = 6;
        let result = read_le_at::<u32>(&TEST_BUFFER, &mut offset);
        assert!(matches!(result, Err(crate::Error::OutOfBounds { .. })));
        assert_eq!(offset, 6);

        let mut offset = usize::MAX;
        assert!(read_le_at::<u8>(&TEST_BUFFER, &mut offset).is_err());
    }
}
