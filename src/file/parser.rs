//! Cursor over an immutable byte slice.
//!
//! Used by the instruction decoder and the method body header reader. All reads are
//! bounds checked and advance the cursor only on success.

use crate::{
    file::io::{read_le_at, CilIO},
    Result,
};

/// A forward-only reader over encoded data.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser positioned at the start of `data`
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total length of the underlying data
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the underlying data is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if unread bytes remain
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Current cursor position
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Read a little-endian `T` and advance.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the read would exceed the data length.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_reads() {
        let data = [0x20, 0x78, 0x56, 0x34, 0x12, 0x2A];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_le::<u8>().unwrap(), 0x20);
        assert_eq!(parser.read_le::<u32>().unwrap(), 0x1234_5678);
        assert_eq!(parser.pos(), 5);
        assert!(parser.has_more_data());
    }

    #[test]
    fn failed_read_keeps_position() {
        let data = [0x01, 0x02, 0x03];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_le::<u16>().unwrap(), 0x0201);

        assert!(parser.read_le::<u16>().is_err());
        assert_eq!(parser.pos(), 2);
        assert_eq!(parser.read_le::<u8>().unwrap(), 0x03);
        assert!(!parser.has_more_data());
    }
}
