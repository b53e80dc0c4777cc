//! Sequential cursor over an instruction byte stream.
//!
//! [`Parser`] keeps a position into a borrowed byte slice and offers bounds-checked
//! reads of the primitive widths used by instruction operands. The decoder drives one
//! parser per method body.

use crate::{
    file::io::{read_le_at, CilIO},
    Result,
};

/// A cursor over a borrowed byte slice.
///
/// # Examples
///
/// ```rust
/// use cilfront::file::parser::Parser;
///
/// let mut parser = Parser::new(&[0x2A, 0x05, 0x00, 0x00, 0x00]);
/// assert_eq!(parser.read_le::<u8>()?, 0x2A);
/// assert_eq!(parser.read_le::<i32>()?, 5);
/// assert!(!parser.has_more_data());
/// # Ok::<(), cilfront::Error>(())
/// ```
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total length of the underlying data
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the underlying data is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True while the cursor has not reached the end
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Current cursor position
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Number of bytes left after the cursor
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Read a little-endian `T` and advance past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value does not fit in the remaining data.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }
}
