use std::collections::HashMap;
use std::hash::Hash;
use std::io::{Cursor, Seek, SeekFrom, Write};

use serde::Serialize;
use smol_str::SmolStr;

use crate::constants::{DIRECTIVES_NAMESPACE, HASH_LEN, NO_DECLARING_TYPE};
use crate::error::FormatError;
use crate::format::{FormatVersion, Header, TableKind};
use crate::options::WriteOptions;
use crate::schema::ProviderKind;
use crate::stable;
use crate::tables::{
    AssemblyRecord, PropertyRecord, SymbolFlags, SymbolIndex, Tables, TypeNamespaceRecord,
    TypeRecord, XmlNamespaceRecord,
};
use crate::text::XbfStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AssemblyName {
    pub name: SmolStr,
    pub provider: ProviderKind,
}

impl AssemblyName {
    pub fn new(name: impl Into<SmolStr>, provider: ProviderKind) -> Self {
        Self {
            name: name.into(),
            provider,
        }
    }

    pub fn native(name: impl Into<SmolStr>) -> Self {
        Self::new(name, ProviderKind::Native)
    }

    pub fn managed(name: impl Into<SmolStr>) -> Self {
        Self::new(name, ProviderKind::Managed)
    }
}

/// A type as the compiler names it, before interning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TypeName {
    pub assembly: AssemblyName,
    pub namespace: SmolStr,
    pub name: SmolStr,
    pub flags: SymbolFlags,
}

impl TypeName {
    pub fn new(
        assembly: AssemblyName,
        namespace: impl Into<SmolStr>,
        name: impl Into<SmolStr>,
    ) -> Self {
        Self {
            assembly,
            namespace: namespace.into(),
            name: name.into(),
            flags: SymbolFlags::NONE,
        }
    }

    /// A markup directive type, such as `x:String`.
    pub fn directive(name: impl Into<SmolStr>) -> Self {
        Self {
            assembly: AssemblyName::new("", ProviderKind::Unknown),
            namespace: SmolStr::new_static(DIRECTIVES_NAMESPACE),
            name: name.into(),
            flags: SymbolFlags::DIRECTIVE,
        }
    }

    pub fn with_flags(mut self, flags: SymbolFlags) -> Self {
        self.flags = flags;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PropertyName {
    /// Always present unless `flags` marks a directive.
    pub declaring_type: Option<TypeName>,
    pub name: SmolStr,
    pub flags: SymbolFlags,
}

impl PropertyName {
    pub fn new(declaring_type: TypeName, name: impl Into<SmolStr>) -> Self {
        Self {
            declaring_type: Some(declaring_type),
            name: name.into(),
            flags: SymbolFlags::NONE,
        }
    }

    /// A markup directive member, such as `x:Key` or `x:Uid`.
    pub fn directive(name: impl Into<SmolStr>) -> Self {
        Self {
            declaring_type: None,
            name: name.into(),
            flags: SymbolFlags::DIRECTIVE,
        }
    }

    pub fn with_flags(mut self, flags: SymbolFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Deduplicating builder for the six metadata tables.
///
/// Every `intern_*` call returns the slot of a content-equal record if one
/// exists, otherwise appends. First-seen order is serialization order.
#[derive(Debug)]
pub struct MetadataStore {
    version: FormatVersion,
    use_stable_indices: bool,
    tables: Tables,
    strings: HashMap<SmolStr, u32>,
    assemblies: HashMap<AssemblyRecord, u32>,
    type_namespaces: HashMap<TypeNamespaceRecord, u32>,
    types: HashMap<TypeRecord, u32>,
    properties: HashMap<PropertyRecord, u32>,
    xml_namespaces: HashMap<XmlNamespaceRecord, u32>,
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self::new(&WriteOptions::default())
    }
}

fn intern_record<K: Hash + Eq + Copy>(
    map: &mut HashMap<K, u32>,
    records: &mut Vec<K>,
    record: K,
) -> u32 {
    *map.entry(record).or_insert_with(|| {
        records.push(record);
        (records.len() - 1) as u32
    })
}

impl MetadataStore {
    pub fn new(options: &WriteOptions) -> Self {
        Self {
            version: options.version,
            use_stable_indices: options.use_stable_indices,
            tables: Tables::new(),
            strings: HashMap::new(),
            assemblies: HashMap::new(),
            type_namespaces: HashMap::new(),
            types: HashMap::new(),
            properties: HashMap::new(),
            xml_namespaces: HashMap::new(),
        }
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn intern_string(&mut self, value: &str) -> u32 {
        if let Some(&index) = self.strings.get(value) {
            return index;
        }
        let index = self.tables.strings.len() as u32;
        self.tables.strings.push(XbfStr::owned(value));
        self.strings.insert(SmolStr::new(value), index);
        tracing::trace!(index, value, "interned string");
        index
    }

    pub fn intern_assembly(&mut self, assembly: &AssemblyName) -> u32 {
        let record = AssemblyRecord {
            provider: assembly.provider,
            name: self.intern_string(&assembly.name),
        };
        intern_record(&mut self.assemblies, &mut self.tables.assemblies, record)
    }

    pub fn intern_type_namespace(&mut self, assembly: &AssemblyName, namespace: &str) -> u32 {
        let record = TypeNamespaceRecord {
            assembly: self.intern_assembly(assembly),
            name: self.intern_string(namespace),
        };
        intern_record(
            &mut self.type_namespaces,
            &mut self.tables.type_namespaces,
            record,
        )
    }

    pub fn intern_type(&mut self, ty: &TypeName) -> SymbolIndex {
        let name = stable::alias_type_name(self.version, &ty.namespace, &ty.name);
        if let Some(index) = self.stable_type(ty, name) {
            return SymbolIndex::Stable(index);
        }
        let namespace = if ty.flags.is_directive() {
            NO_DECLARING_TYPE
        } else {
            self.intern_type_namespace(&ty.assembly, &ty.namespace)
        };
        let record = TypeRecord {
            flags: ty.flags,
            namespace,
            name: self.intern_string(name),
        };
        SymbolIndex::Table(intern_record(
            &mut self.types,
            &mut self.tables.types,
            record,
        ))
    }

    pub fn intern_property(&mut self, property: &PropertyName) -> SymbolIndex {
        debug_assert!(
            property.declaring_type.is_some() || property.flags.is_directive(),
            "non-directive property {} has no declaring type",
            property.name
        );
        let declaring_type = property
            .declaring_type
            .as_ref()
            .map(|ty| self.intern_type(ty));
        if let Some(SymbolIndex::Stable(owner)) = declaring_type {
            if self.use_stable_indices && property.flags.is_empty() {
                if let Some(index) = stable::property_index(self.version, owner, &property.name) {
                    return SymbolIndex::Stable(index);
                }
            }
        }
        let record = PropertyRecord {
            flags: property.flags,
            declaring_type,
            name: self.intern_string(&property.name),
        };
        SymbolIndex::Table(intern_record(
            &mut self.properties,
            &mut self.tables.properties,
            record,
        ))
    }

    pub fn intern_xml_namespace(&mut self, uri: &str) -> u32 {
        let record = XmlNamespaceRecord {
            uri: self.intern_string(uri),
        };
        intern_record(
            &mut self.xml_namespaces,
            &mut self.tables.xml_namespaces,
            record,
        )
    }

    fn stable_type(&self, ty: &TypeName, name: &str) -> Option<u16> {
        if !self.use_stable_indices
            || !ty.flags.is_empty()
            || ty.assembly.provider != ProviderKind::Native
        {
            return None;
        }
        stable::type_index(self.version, &ty.namespace, name)
    }

    /// Serializes the metadata section into `out` and returns its length.
    ///
    /// The header is written twice: as a placeholder, then with the final
    /// offsets. `out` itself never needs to seek.
    pub fn write_metadata<W: Write + ?Sized>(
        &self,
        out: &mut W,
        hash: &[u8; HASH_LEN],
    ) -> Result<usize, FormatError> {
        let mut scratch = Cursor::new(Vec::new());
        let mut header = Header::new(self.version);
        header.write(&mut scratch)?;
        let base = scratch.position();
        for table in TableKind::ALL {
            header.offsets[table.index()] = scratch.position() - base;
            self.tables.write_table(table, self.version, &mut scratch)?;
        }
        header.hash = *hash;
        scratch.seek(SeekFrom::Start(0))?;
        header.write(&mut scratch)?;

        let bytes = scratch.into_inner();
        tracing::debug!(
            version = %self.version,
            strings = self.tables.strings.len(),
            types = self.tables.types.len(),
            properties = self.tables.properties.len(),
            bytes = bytes.len(),
            "wrote metadata section"
        );
        out.write_all(&bytes)?;
        Ok(bytes.len())
    }
}
