use std::fmt;

/// Metadata table id for type references
pub const TABLE_TYPE_REF: u8 = 0x01;
/// Metadata table id for type definitions
pub const TABLE_TYPE_DEF: u8 = 0x02;
/// Metadata table id for field definitions
pub const TABLE_FIELD: u8 = 0x04;
/// Metadata table id for method definitions
pub const TABLE_METHOD_DEF: u8 = 0x06;
/// Metadata table id for member references (fields or methods on other types)
pub const TABLE_MEMBER_REF: u8 = 0x0A;
/// Metadata table id for stand-alone signatures (`calli` call sites)
pub const TABLE_STANDALONE_SIG: u8 = 0x11;
/// Metadata table id for type specifications (constructed and generic types)
pub const TABLE_TYPE_SPEC: u8 = 0x1B;
/// Metadata table id for generic method instantiations
pub const TABLE_METHOD_SPEC: u8 = 0x2B;
/// Pseudo-table id of the user string heap (`ldstr`)
pub const TABLE_USER_STRING: u8 = 0x70;

/// A metadata token as found in instruction operands.
///
/// The high byte selects the metadata table, the low 24 bits the row. Tokens are only
/// meaningful relative to the module that owns the method body they appear in.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub u32);

impl Token {
    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token from a table id and a row index
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true if this is a null token (row 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.row() == 0
    }

    /// True for tokens that can only denote a type
    #[must_use]
    pub fn is_type(&self) -> bool {
        matches!(
            self.table(),
            TABLE_TYPE_REF | TABLE_TYPE_DEF | TABLE_TYPE_SPEC
        )
    }

    /// True for tokens that index the user string heap
    #[must_use]
    pub fn is_string(&self) -> bool {
        self.table() == TABLE_USER_STRING
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

    #[test]
    fn parts() {
        let token = Token::from_parts(TABLE_METHOD_DEF, 1);
        assert_eq!(token.value(), 0x0600_0001);
        assert_eq!(token.table(), 0x06);
        assert_eq!(token.row(), 1);
        assert!(!token.is_null());
        assert!(!token.is_type());

        let truncated = Token::from_parts(TABLE_TYPE_SPEC, 0x0100_0002);
        assert_eq!(truncated.row(), 2);
        assert!(truncated.is_type());
    }

    #[test]
    fn classification() {
        assert!(Token(0x7000_0010).is_string());
        assert!(Token(0x0200_0000).is_null());
        assert!(Token(0x0100_0003).is_type());
        assert!(!Token(0x0A00_0003).is_type());
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", Token(0x0600_0001)), "0x06000001");
        assert_eq!(
            format!("{:?}", Token(0x0200_0005)),
            "Token(0x02000005, table: 0x02, row: 5)"
        );

        let back: u32 = Token::from(0x0400_0002).into();
        assert_eq!(back, 0x0400_0002);
    }
}
