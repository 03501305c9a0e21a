pub(crate) mod bytes;

use std::fmt;
use std::io::{self, Write};
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{has_magic, HASH_LEN, MAGIC, TABLE_COUNT};
use crate::error::FormatError;
use self::bytes::{ByteReader, WriteLe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FormatVersion {
    pub major: u32,
    pub minor: u32,
}

impl FormatVersion {
    pub const V1: Self = Self::new(1, 0);
    pub const V2: Self = Self::new(2, 0);
    /// Version 2 with a null terminator after every string record.
    pub const V2_1: Self = Self::new(2, 1);
    pub const LATEST: Self = Self::V2_1;

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub fn is_supported(self) -> bool {
        matches!((self.major, self.minor), (1, 0) | (2, 0) | (2, 1))
    }

    pub fn has_hash(self) -> bool {
        self.major >= 2
    }

    pub fn null_terminated_strings(self) -> bool {
        self.major == 2 && self.minor >= 1
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::LATEST
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for FormatVersion {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (major, minor) = match raw.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (raw, "0"),
        };
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| format!("invalid format version \"{raw}\""))
        };
        let version = Self::new(parse(major)?, parse(minor)?);
        if !version.is_supported() {
            return Err(format!("unsupported format version {version}"));
        }
        Ok(version)
    }
}

/// The six metadata tables in their serialized order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TableKind {
    Strings,
    Assemblies,
    TypeNamespaces,
    Types,
    Properties,
    XmlNamespaces,
}

impl TableKind {
    pub const ALL: [TableKind; TABLE_COUNT] = [
        TableKind::Strings,
        TableKind::Assemblies,
        TableKind::TypeNamespaces,
        TableKind::Types,
        TableKind::Properties,
        TableKind::XmlNamespaces,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            TableKind::Strings => "string",
            TableKind::Assemblies => "assembly",
            TableKind::TypeNamespaces => "type-namespace",
            TableKind::Types => "type",
            TableKind::Properties => "property",
            TableKind::XmlNamespaces => "xml-namespace",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: FormatVersion,
    /// Table offsets, relative to the first byte after the header.
    pub offsets: [u64; TABLE_COUNT],
    pub hash: [u8; HASH_LEN],
}

impl Header {
    pub fn new(version: FormatVersion) -> Self {
        Self {
            version,
            offsets: [0; TABLE_COUNT],
            hash: [0; HASH_LEN],
        }
    }

    pub fn encoded_len(version: FormatVersion) -> usize {
        let hash = if version.has_hash() { HASH_LEN } else { 0 };
        8 + 8 * TABLE_COUNT + hash
    }

    pub fn offset(&self, table: TableKind) -> u64 {
        self.offsets[table.index()]
    }

    pub(crate) fn write<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        out.put_u32(self.version.major)?;
        out.put_u32(self.version.minor)?;
        for offset in self.offsets {
            out.put_u64(offset)?;
        }
        if self.version.has_hash() {
            out.write_all(&self.hash)?;
        }
        Ok(())
    }

    pub(crate) fn read(reader: &mut ByteReader<'_>) -> Result<Self, FormatError> {
        let truncated = |err: FormatError| match err {
            FormatError::TruncatedStream { offset } => {
                FormatError::deserialization("header", offset, "unexpected end of data")
            }
            other => other,
        };
        let major = reader.read_u32().map_err(truncated)?;
        let minor = reader.read_u32().map_err(truncated)?;
        let version = FormatVersion::new(major, minor);
        if !version.is_supported() {
            return Err(FormatError::UnsupportedVersion(version));
        }
        let mut header = Header::new(version);
        for slot in header.offsets.iter_mut() {
            *slot = reader.read_u64().map_err(truncated)?;
        }
        if version.has_hash() {
            header.hash = reader.read_array().map_err(truncated)?;
        }
        Ok(header)
    }
}

/// Byte ranges of the two sections inside a complete file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sections {
    pub metadata: Range<usize>,
    pub nodes: Range<usize>,
}

pub const PREAMBLE_LEN: usize = MAGIC.len() + 8;

pub fn split_sections(bytes: &[u8]) -> Result<Sections, FormatError> {
    if !has_magic(bytes) {
        return Err(FormatError::BadMagic);
    }
    let mut reader = ByteReader::new(&bytes[MAGIC.len()..], MAGIC.len());
    let metadata_len = reader.read_u32()? as usize;
    let nodes_len = reader.read_u32()? as usize;
    let metadata = PREAMBLE_LEN..PREAMBLE_LEN.saturating_add(metadata_len);
    let nodes = metadata.end..metadata.end.saturating_add(nodes_len);
    if nodes.end > bytes.len() {
        return Err(FormatError::TruncatedStream { offset: bytes.len() });
    }
    Ok(Sections { metadata, nodes })
}

pub(crate) fn write_preamble<W: Write + ?Sized>(
    out: &mut W,
    metadata_len: usize,
    nodes_len: usize,
) -> Result<(), FormatError> {
    let section_len = |len: usize| {
        u32::try_from(len)
            .map_err(|_| FormatError::Io(format!("section of {len} bytes exceeds u32 range")))
    };
    out.write_all(&MAGIC)?;
    out.put_u32(section_len(metadata_len)?)?;
    out.put_u32(section_len(nodes_len)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    #[case("1", FormatVersion::V1)]
    #[case("2", FormatVersion::V2)]
    #[case("2.1", FormatVersion::V2_1)]
    fn test_parse_version(#[case] raw: &str, #[case] expected: FormatVersion) {
        assert_eq!(raw.parse::<FormatVersion>().unwrap(), expected);
    }

    #[rstest::rstest]
    fn test_parse_version_rejects_unknown() {
        assert!("3".parse::<FormatVersion>().is_err());
        assert!("1.1".parse::<FormatVersion>().is_err());
        assert!("two".parse::<FormatVersion>().is_err());
    }

    #[rstest::rstest]
    fn test_header_layouts_differ_by_hash() {
        assert_eq!(Header::encoded_len(FormatVersion::V1), 56);
        assert_eq!(Header::encoded_len(FormatVersion::V2), 56 + HASH_LEN);
    }

    #[rstest::rstest]
    fn test_header_round_trip() {
        let mut header = Header::new(FormatVersion::V2_1);
        header.offsets = [0, 10, 20, 30, 40, 50];
        header.hash[0] = 0xAB;
        let mut out = Vec::new();
        header.write(&mut out).unwrap();
        assert_eq!(out.len(), Header::encoded_len(FormatVersion::V2_1));
        let mut reader = ByteReader::new(&out, 0);
        assert_eq!(Header::read(&mut reader).unwrap(), header);
    }

    #[rstest::rstest]
    fn test_header_rejects_unsupported_version() {
        let mut out = Vec::new();
        out.put_u32(9).unwrap();
        out.put_u32(0).unwrap();
        let mut reader = ByteReader::new(&out, 0);
        assert_eq!(
            Header::read(&mut reader).unwrap_err(),
            FormatError::UnsupportedVersion(FormatVersion::new(9, 0))
        );
    }

    #[rstest::rstest]
    fn test_split_sections_checks_bounds() {
        let mut bytes = MAGIC.to_vec();
        bytes.put_u32(4).unwrap();
        bytes.put_u32(2).unwrap();
        bytes.extend_from_slice(&[0; 5]);
        assert!(matches!(
            split_sections(&bytes),
            Err(FormatError::TruncatedStream { .. })
        ));
        bytes.push(0);
        let sections = split_sections(&bytes).unwrap();
        assert_eq!(sections.metadata, 12..16);
        assert_eq!(sections.nodes, 16..18);
    }
}
