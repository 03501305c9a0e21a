use std::io::{self, Write};
use std::sync::Arc;

use serde::Serialize;

use crate::constants::{flags, NO_DECLARING_TYPE, TRUSTED_REF_BIT};
use crate::error::FormatError;
use crate::format::bytes::{ByteReader, WriteLe};
use crate::format::{FormatVersion, TableKind};
use crate::options::StringMode;
use crate::schema::ProviderKind;
use crate::stable;
use crate::text::{Span, XbfStr};

/// Reference to a type or property: a table slot, or a trusted index into
/// the fixed table of well-known symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SymbolIndex {
    Table(u32),
    Stable(u16),
}

impl SymbolIndex {
    #[inline]
    pub fn is_trusted(self) -> bool {
        matches!(self, SymbolIndex::Stable(_))
    }

    pub(crate) fn to_ref(self) -> u32 {
        match self {
            SymbolIndex::Table(index) => index & !TRUSTED_REF_BIT,
            SymbolIndex::Stable(index) => TRUSTED_REF_BIT | u32::from(index),
        }
    }

    pub(crate) fn from_ref(raw: u32) -> Option<Self> {
        if raw & TRUSTED_REF_BIT == 0 {
            return Some(SymbolIndex::Table(raw));
        }
        u16::try_from(raw & !TRUSTED_REF_BIT)
            .ok()
            .map(SymbolIndex::Stable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct SymbolFlags(u32);

impl SymbolFlags {
    pub const NONE: Self = Self(0);
    pub const DIRECTIVE: Self = Self(flags::DIRECTIVE);
    pub const UNKNOWN: Self = Self(flags::UNKNOWN);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        (bits & !flags::KNOWN_BITS == 0).then_some(Self(bits))
    }

    pub fn is_directive(self) -> bool {
        self.0 & flags::DIRECTIVE != 0
    }

    pub fn is_unknown(self) -> bool {
        self.0 & flags::UNKNOWN != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for SymbolFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AssemblyRecord {
    pub provider: ProviderKind,
    pub name: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TypeNamespaceRecord {
    pub assembly: u32,
    pub name: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TypeRecord {
    pub flags: SymbolFlags,
    pub namespace: u32,
    pub name: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PropertyRecord {
    pub flags: SymbolFlags,
    pub declaring_type: Option<SymbolIndex>,
    pub name: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct XmlNamespaceRecord {
    pub uri: u32,
}

/// The six persisted tables, in first-seen order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Tables {
    pub strings: Vec<XbfStr>,
    pub assemblies: Vec<AssemblyRecord>,
    pub type_namespaces: Vec<TypeNamespaceRecord>,
    pub types: Vec<TypeRecord>,
    pub properties: Vec<PropertyRecord>,
    pub xml_namespaces: Vec<XmlNamespaceRecord>,
}

impl Tables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, table: TableKind) -> usize {
        match table {
            TableKind::Strings => self.strings.len(),
            TableKind::Assemblies => self.assemblies.len(),
            TableKind::TypeNamespaces => self.type_namespaces.len(),
            TableKind::Types => self.types.len(),
            TableKind::Properties => self.properties.len(),
            TableKind::XmlNamespaces => self.xml_namespaces.len(),
        }
    }

    pub(crate) fn write_table<W: Write + ?Sized>(
        &self,
        table: TableKind,
        version: FormatVersion,
        out: &mut W,
    ) -> io::Result<()> {
        out.put_u32(count(self.len(table))?)?;
        match table {
            TableKind::Strings => {
                for value in &self.strings {
                    let bytes = value.as_str().as_bytes();
                    out.put_u32(count(bytes.len())?)?;
                    out.write_all(bytes)?;
                    if version.null_terminated_strings() {
                        out.put_u8(0)?;
                    }
                }
            }
            TableKind::Assemblies => {
                for record in &self.assemblies {
                    out.put_u32(record.provider.to_u32())?;
                    out.put_u32(record.name)?;
                }
            }
            TableKind::TypeNamespaces => {
                for record in &self.type_namespaces {
                    out.put_u32(record.assembly)?;
                    out.put_u32(record.name)?;
                }
            }
            TableKind::Types => {
                for record in &self.types {
                    out.put_u32(record.flags.bits())?;
                    out.put_u32(record.namespace)?;
                    out.put_u32(record.name)?;
                }
            }
            TableKind::Properties => {
                for record in &self.properties {
                    out.put_u32(record.flags.bits())?;
                    out.put_u32(
                        record
                            .declaring_type
                            .map_or(NO_DECLARING_TYPE, SymbolIndex::to_ref),
                    )?;
                    out.put_u32(record.name)?;
                }
            }
            TableKind::XmlNamespaces => {
                for record in &self.xml_namespaces {
                    out.put_u32(record.uri)?;
                }
            }
        }
        Ok(())
    }

    /// Reads one table into `self`. Errors name the table being read.
    pub(crate) fn read_table(
        &mut self,
        table: TableKind,
        reader: &mut ByteReader<'_>,
        source: &TableSource<'_>,
    ) -> Result<(), FormatError> {
        let len = reader.read_u32()? as usize;
        // Every record is at least four bytes; reject counts the data cannot hold.
        if len.saturating_mul(4) > reader.remaining() {
            return Err(FormatError::deserialization(
                table.name(),
                reader.absolute(),
                format!("record count {len} exceeds remaining data"),
            ));
        }
        match table {
            TableKind::Strings => {
                self.strings.reserve(len);
                for _ in 0..len {
                    let value = read_string(reader, source)?;
                    self.strings.push(value);
                }
            }
            TableKind::Assemblies => {
                self.assemblies.reserve(len);
                for _ in 0..len {
                    let offset = reader.absolute();
                    let raw = reader.read_u32()?;
                    let provider = ProviderKind::from_u32(raw).ok_or_else(|| {
                        FormatError::deserialization(
                            table.name(),
                            offset,
                            format!("unknown provider kind {raw}"),
                        )
                    })?;
                    let name = reader.read_u32()?;
                    self.assemblies.push(AssemblyRecord { provider, name });
                }
            }
            TableKind::TypeNamespaces => {
                self.type_namespaces.reserve(len);
                for _ in 0..len {
                    let assembly = reader.read_u32()?;
                    let name = reader.read_u32()?;
                    self.type_namespaces
                        .push(TypeNamespaceRecord { assembly, name });
                }
            }
            TableKind::Types => {
                self.types.reserve(len);
                for _ in 0..len {
                    let flags = read_flags(reader, table)?;
                    let namespace = reader.read_u32()?;
                    let name = reader.read_u32()?;
                    self.types.push(TypeRecord {
                        flags,
                        namespace,
                        name,
                    });
                }
            }
            TableKind::Properties => {
                self.properties.reserve(len);
                for _ in 0..len {
                    let flags = read_flags(reader, table)?;
                    let offset = reader.absolute();
                    let raw = reader.read_u32()?;
                    let declaring_type = if raw == NO_DECLARING_TYPE {
                        None
                    } else {
                        Some(SymbolIndex::from_ref(raw).ok_or_else(|| {
                            FormatError::deserialization(
                                table.name(),
                                offset,
                                format!("malformed type reference {raw:#x}"),
                            )
                        })?)
                    };
                    let name = reader.read_u32()?;
                    self.properties.push(PropertyRecord {
                        flags,
                        declaring_type,
                        name,
                    });
                }
            }
            TableKind::XmlNamespaces => {
                self.xml_namespaces.reserve(len);
                for _ in 0..len {
                    let uri = reader.read_u32()?;
                    self.xml_namespaces.push(XmlNamespaceRecord { uri });
                }
            }
        }
        Ok(())
    }

    /// Checks every cross-table reference so that later lookups through a
    /// record cannot leave the tables.
    pub fn validate_references(&self, version: FormatVersion) -> Result<(), FormatError> {
        let strings = self.strings.len();
        let check = |table: TableKind, slot: usize, target: TableKind, index: u32, len: usize| {
            if (index as usize) < len {
                Ok(())
            } else {
                Err(FormatError::deserialization(
                    table.name(),
                    0,
                    format!("record {slot} refers to {target} {index} of {len}"),
                ))
            }
        };
        for (slot, record) in self.assemblies.iter().enumerate() {
            check(TableKind::Assemblies, slot, TableKind::Strings, record.name, strings)?;
        }
        for (slot, record) in self.type_namespaces.iter().enumerate() {
            check(
                TableKind::TypeNamespaces,
                slot,
                TableKind::Assemblies,
                record.assembly,
                self.assemblies.len(),
            )?;
            check(TableKind::TypeNamespaces, slot, TableKind::Strings, record.name, strings)?;
        }
        for (slot, record) in self.types.iter().enumerate() {
            if !record.flags.is_directive() {
                check(
                    TableKind::Types,
                    slot,
                    TableKind::TypeNamespaces,
                    record.namespace,
                    self.type_namespaces.len(),
                )?;
            }
            check(TableKind::Types, slot, TableKind::Strings, record.name, strings)?;
        }
        let stable_types = stable::type_count(version);
        for (slot, record) in self.properties.iter().enumerate() {
            match record.declaring_type {
                Some(SymbolIndex::Table(index)) => check(
                    TableKind::Properties,
                    slot,
                    TableKind::Types,
                    index,
                    self.types.len(),
                )?,
                Some(SymbolIndex::Stable(index)) => check(
                    TableKind::Properties,
                    slot,
                    TableKind::Types,
                    u32::from(index),
                    stable_types as usize,
                )?,
                None if record.flags.is_directive() => {}
                None => {
                    return Err(FormatError::deserialization(
                        TableKind::Properties.name(),
                        0,
                        format!("record {slot} has no declaring type"),
                    ))
                }
            }
            check(TableKind::Properties, slot, TableKind::Strings, record.name, strings)?;
        }
        for (slot, record) in self.xml_namespaces.iter().enumerate() {
            check(TableKind::XmlNamespaces, slot, TableKind::Strings, record.uri, strings)?;
        }
        Ok(())
    }
}

/// Where string records are decoded from, and how they are stored.
pub(crate) struct TableSource<'a> {
    pub buffer: &'a Arc<[u8]>,
    pub version: FormatVersion,
    pub mode: StringMode,
}

fn count(len: usize) -> io::Result<u32> {
    u32::try_from(len).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "table too large"))
}

fn read_flags(reader: &mut ByteReader<'_>, table: TableKind) -> Result<SymbolFlags, FormatError> {
    let offset = reader.absolute();
    let bits = reader.read_u32()?;
    SymbolFlags::from_bits(bits).ok_or_else(|| {
        FormatError::deserialization(table.name(), offset, format!("unknown flags {bits:#x}"))
    })
}

fn read_string(reader: &mut ByteReader<'_>, source: &TableSource<'_>) -> Result<XbfStr, FormatError> {
    let len = reader.read_u32()? as usize;
    let start = reader.absolute();
    let bytes = reader.take(len)?;
    if source.version.null_terminated_strings() {
        let terminator_at = reader.absolute();
        if reader.read_u8()? != 0 {
            return Err(FormatError::deserialization(
                TableKind::Strings.name(),
                terminator_at,
                "missing string terminator",
            ));
        }
    }
    if memchr::memchr(0, bytes).is_some() {
        return Err(FormatError::deserialization(
            TableKind::Strings.name(),
            start,
            "embedded null in string record",
        ));
    }
    let invalid = || {
        FormatError::deserialization(TableKind::Strings.name(), start, "string is not valid UTF-8")
    };
    match source.mode {
        StringMode::View => XbfStr::view(
            source.buffer.clone(),
            Span {
                start,
                end: start + len,
            },
        )
        .ok_or_else(invalid),
        StringMode::Owned | StringMode::Auto => std::str::from_utf8(bytes)
            .map(XbfStr::owned)
            .map_err(|_| invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    #[case(SymbolIndex::Table(0))]
    #[case(SymbolIndex::Table(0x7FFF_FFFF))]
    #[case(SymbolIndex::Stable(0))]
    #[case(SymbolIndex::Stable(23))]
    fn test_symbol_ref_encoding(#[case] index: SymbolIndex) {
        assert_eq!(SymbolIndex::from_ref(index.to_ref()), Some(index));
    }

    #[rstest::rstest]
    fn test_oversized_trusted_ref_is_malformed() {
        assert_eq!(SymbolIndex::from_ref(TRUSTED_REF_BIT | 0x1_0000), None);
    }

    #[rstest::rstest]
    fn test_flags_reject_unknown_bits() {
        assert_eq!(SymbolFlags::from_bits(0x3), Some(SymbolFlags::DIRECTIVE | SymbolFlags::UNKNOWN));
        assert_eq!(SymbolFlags::from_bits(0x8), None);
    }

    #[rstest::rstest]
    fn test_validate_references_catches_dangling_string() {
        let mut tables = Tables::new();
        tables.strings.push(XbfStr::owned("App"));
        tables.assemblies.push(AssemblyRecord {
            provider: ProviderKind::Native,
            name: 3,
        });
        let err = tables.validate_references(FormatVersion::V2).unwrap_err();
        assert!(matches!(err, FormatError::Deserialization { .. }), "{err}");
    }

    #[rstest::rstest]
    fn test_validate_references_checks_stable_range() {
        let mut tables = Tables::new();
        tables.strings.push(XbfStr::owned("Tag"));
        tables.properties.push(PropertyRecord {
            flags: SymbolFlags::NONE,
            declaring_type: Some(SymbolIndex::Stable(20)),
            name: 0,
        });
        assert!(tables.validate_references(FormatVersion::V2).is_ok());
        assert!(tables.validate_references(FormatVersion::V1).is_err());
    }

    #[rstest::rstest]
    fn test_strings_round_trip_with_terminators() {
        let mut tables = Tables::new();
        tables.strings.push(XbfStr::owned("Grid"));
        tables.strings.push(XbfStr::owned(""));
        let mut out = Vec::new();
        tables
            .write_table(TableKind::Strings, FormatVersion::V2_1, &mut out)
            .unwrap();
        assert_eq!(out.len(), 4 + (4 + 4 + 1) + (4 + 1));

        let buffer: Arc<[u8]> = Arc::from(out.into_boxed_slice());
        let source = TableSource {
            buffer: &buffer,
            version: FormatVersion::V2_1,
            mode: StringMode::View,
        };
        let mut reader = ByteReader::new(&buffer, 0);
        let mut decoded = Tables::new();
        decoded
            .read_table(TableKind::Strings, &mut reader, &source)
            .unwrap();
        assert_eq!(decoded.strings, tables.strings);
        assert!(decoded.strings.iter().all(XbfStr::is_view));
    }
}
