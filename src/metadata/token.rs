//! Metadata tokens.
//!
//! Every declared entity (type, field, method, parameter, generic parameter, property,
//! method instantiation) is identified by a 32-bit token whose high byte names the
//! metadata table and whose low 24 bits name the row. Emitted CIL references other
//! entities exclusively through these tokens, so they are also the identity used for
//! deduplication and cache keys.

use std::fmt;

use strum::{Display, EnumIter};

/// Metadata tables that the registry allocates tokens in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[repr(u8)]
pub enum TableId {
    /// Type definitions, including synthesized proxies
    TypeDef = 0x02,
    /// Field definitions
    Field = 0x04,
    /// Method definitions
    MethodDef = 0x06,
    /// Parameter rows, including return parameters
    Param = 0x08,
    /// Custom attribute rows
    CustomAttribute = 0x0C,
    /// Stand-alone signatures, used for local variable layouts
    StandAloneSig = 0x11,
    /// Property definitions
    Property = 0x17,
    /// Constructed types: generic instances, arrays, generic parameter placeholders
    TypeSpec = 0x1B,
    /// Generic parameter rows
    GenericParam = 0x2A,
    /// Generic method instantiations
    MethodSpec = 0x2B,
}

impl TableId {
    /// Index into per-table counter arrays
    #[must_use]
    pub fn slot(self) -> usize {
        match self {
            TableId::TypeDef => 0,
            TableId::Field => 1,
            TableId::MethodDef => 2,
            TableId::Param => 3,
            TableId::CustomAttribute => 4,
            TableId::Property => 5,
            TableId::TypeSpec => 6,
            TableId::GenericParam => 7,
            TableId::MethodSpec => 8,
            TableId::StandAloneSig => 9,
        }
    }

    /// Number of tables tracked
    pub const COUNT: usize = 10;
}

/// A metadata token: table id in the high byte, 1-based row in the low 24 bits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub u32);

impl Token {
    /// Create a token from its raw value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Compose a token from a table and a row
    #[must_use]
    pub fn from_parts(table: TableId, row: u32) -> Self {
        Token((u32::from(table as u8) << 24) | (row & 0x00FF_FFFF))
    }

    /// Raw token value, as written into instruction operands
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Table byte
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Row index
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// True for the nil token
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// True if the token lives in `table`
    #[must_use]
    pub fn is_table(&self, table: TableId) -> bool {
        self.table() == table as u8
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_parts() {
        let token = Token::from_parts(TableId::MethodDef, 1);
        assert_eq!(token.value(), 0x0600_0001);
        assert_eq!(token.table(), 0x06);
        assert_eq!(token.row(), 1);
        assert!(token.is_table(TableId::MethodDef));
        assert!(!token.is_table(TableId::TypeDef));
    }

    #[test]
    fn test_token_row_is_masked() {
        let token = Token::from_parts(TableId::TypeSpec, 0xFF00_0005);
        assert_eq!(token.table(), 0x1B);
        assert_eq!(token.row(), 5);
    }

    #[test]
    fn test_token_is_null() {
        assert!(Token::default().is_null());
        assert!(!Token(0x0200_0001).is_null());
    }

    #[test]
    fn test_token_formatting() {
        let token = Token(0x2B00_0003);
        assert_eq!(format!("{token}"), "0x2b000003");
        assert_eq!(
            format!("{token:?}"),
            "Token(0x2b000003, table: 0x2b, row: 3)"
        );
    }

    #[test]
    fn test_token_hash_identity() {
        let mut set = HashSet::new();
        set.insert(Token(0x0200_0001));
        set.insert(Token::from_parts(TableId::TypeDef, 1));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_table_slots_are_unique() {
        use strum::IntoEnumIterator;

        let slots: HashSet<usize> = TableId::iter().map(TableId::slot).collect();
        assert_eq!(slots.len(), TableId::COUNT);
        assert_eq!(TableId::MethodSpec.to_string(), "MethodSpec");
    }
}
