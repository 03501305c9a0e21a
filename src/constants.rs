pub const MAGIC: [u8; 4] = [0x58, 0x42, 0x46, 0x00];

pub const HASH_LEN: usize = 64;

pub const TABLE_COUNT: usize = 6;

/// Namespace that markup directives (`x:Key`, `x:Name`, ...) resolve against.
pub const DIRECTIVES_NAMESPACE: &str = "http://schemas.microsoft.com/winfx/2006/xaml";

pub const PRESENTATION_NAMESPACE: &str =
    "http://schemas.microsoft.com/winfx/2006/xaml/presentation";

pub const DEFAULT_COMPILED_EXTENSION: &str = "xbf";

pub(crate) const NULL_PARAMETER: &str = "null";

pub(crate) const NO_DECLARING_TYPE: u32 = u32::MAX;

pub(crate) const TRUSTED_REF_BIT: u32 = 0x8000_0000;

pub(crate) mod tag {
    pub const TRUSTED: u8 = 0x80;

    pub const NAMESPACE: u8 = 0x01;
    pub const START_OBJECT: u8 = 0x02;
    pub const END_OBJECT: u8 = 0x03;
    pub const START_MEMBER: u8 = 0x04;
    pub const START_MULTI_MEMBER: u8 = 0x05;
    pub const END_MEMBER: u8 = 0x06;
    pub const END_OF_ATTRIBUTES: u8 = 0x07;
    pub const TEXT: u8 = 0x08;
    pub const VALUE: u8 = 0x09;
    pub const LINE_ABSOLUTE: u8 = 0x0A;
    pub const LINE_DELTA: u8 = 0x0B;
    pub const END_OF_STREAM: u8 = 0x0C;

    #[inline]
    pub fn carries_symbol(tag: u8) -> bool {
        matches!(tag, START_OBJECT | START_MEMBER | START_MULTI_MEMBER)
    }
}

pub(crate) mod value_kind {
    pub const BOOL: u8 = 0;
    pub const FLOAT: u8 = 1;
    pub const INT: u8 = 2;
    pub const STRING: u8 = 3;
    pub const COLOR: u8 = 4;
    pub const THICKNESS: u8 = 5;
    pub const GRID_LENGTH: u8 = 6;
}

pub(crate) mod flags {
    pub const DIRECTIVE: u32 = 0x1;
    pub const UNKNOWN: u32 = 0x2;
    pub const KNOWN_BITS: u32 = DIRECTIVE | UNKNOWN;
}

#[inline]
pub fn has_magic(bytes: &[u8]) -> bool {
    bytes.len() >= MAGIC.len() && bytes[..MAGIC.len()] == MAGIC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    fn test_has_magic() {
        assert!(has_magic(b"XBF\0rest"));
        assert!(!has_magic(b"XBF"));
        assert!(!has_magic(b"<Page/>"));
        assert!(!has_magic(b""));
    }

    #[rstest::rstest]
    fn test_symbol_tags() {
        assert!(tag::carries_symbol(tag::START_OBJECT));
        assert!(tag::carries_symbol(tag::START_MULTI_MEMBER));
        assert!(!tag::carries_symbol(tag::TEXT));
        assert!(!tag::carries_symbol(tag::END_OF_STREAM));
    }
}
