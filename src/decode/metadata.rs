use std::cell::OnceCell;
use std::ops::Range;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::FormatError;
use crate::format::bytes::ByteReader;
use crate::format::{FormatVersion, Header, TableKind};
use crate::options::{LoadOptions, ResolvePolicy, StringMode};
use crate::report::report_format_error;
use crate::schema::{
    Assembly, DirectiveKind, ProviderKind, Resolution, SchemaHandle, TypeNamespace, XamlProperty,
    XamlType, XmlNamespace,
};
use crate::stable;
use crate::tables::{PropertyRecord, SymbolFlags, SymbolIndex, TableSource, Tables, TypeRecord};
use crate::text::XbfStr;

use super::{fail_fast, ReaderContext};

type Slots<T> = Vec<OnceCell<Rc<T>>>;

fn slots<T>(len: usize) -> Slots<T> {
    (0..len).map(|_| OnceCell::new()).collect()
}

/// Returns the memoized value, initializing it on first use.
fn memoize<T>(
    cell: &OnceCell<Rc<T>>,
    init: impl FnOnce() -> Result<Rc<T>, FormatError>,
) -> Result<Rc<T>, FormatError> {
    if let Some(value) = cell.get() {
        return Ok(Rc::clone(value));
    }
    let value = init()?;
    Ok(Rc::clone(cell.get_or_init(|| value)))
}

/// Symbol tables of one compiled file, resolved lazily against a schema.
///
/// Every `get_*` accessor resolves its entry on first use and hands out the
/// same `Rc` afterwards.
pub struct MetadataReader {
    buffer: Arc<[u8]>,
    range: Range<usize>,
    header: Header,
    string_mode: StringMode,
    policy: ResolvePolicy,
    ctx: ReaderContext,
    tables: Tables,
    assemblies: Slots<Assembly>,
    type_namespaces: Slots<TypeNamespace>,
    types: Slots<XamlType>,
    properties: Slots<XamlProperty>,
    xml_namespaces: Slots<XmlNamespace>,
    stable_assembly: OnceCell<Rc<Assembly>>,
    stable_types: Slots<XamlType>,
    stable_properties: Slots<XamlProperty>,
}

impl std::fmt::Debug for MetadataReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataReader")
            .field("range", &self.range)
            .field("version", &self.header.version)
            .field("string_mode", &self.string_mode)
            .field("strings", &self.tables.strings.len())
            .field("types", &self.tables.types.len())
            .field("properties", &self.tables.properties.len())
            .finish_non_exhaustive()
    }
}

impl MetadataReader {
    /// Loads the metadata section at `range` of `buffer`.
    ///
    /// Every table must start exactly at the offset its header records.
    /// On failure the error is reported and nothing is retained.
    pub fn load(
        buffer: Arc<[u8]>,
        range: Range<usize>,
        ctx: &ReaderContext,
        options: &LoadOptions,
    ) -> Result<Self, FormatError> {
        let failed = |err: FormatError| {
            tracing::warn!(error = %err, table = ?err.table(), "failed to load xbf metadata");
            report_format_error(ctx.reporter.as_ref(), &err);
            err
        };
        let bytes = buffer.get(range.clone()).ok_or_else(|| {
            failed(FormatError::TruncatedStream {
                offset: buffer.len(),
            })
        })?;
        let mut reader = ByteReader::new(bytes, range.start);
        let header = Header::read(&mut reader).map_err(failed)?;
        let version = header.version;

        let string_mode = match options.string_mode.for_version(version) {
            StringMode::View if !version.null_terminated_strings() => {
                tracing::debug!(%version, "string views need terminated strings, copying instead");
                StringMode::Owned
            }
            mode => mode,
        };
        let source = TableSource {
            buffer: &buffer,
            version,
            mode: string_mode,
        };

        let base = reader.position();
        let mut tables = Tables::new();
        for table in TableKind::ALL {
            let expected = header.offset(table);
            let actual = (reader.position() - base) as u64;
            if actual != expected {
                return Err(failed(FormatError::OffsetMismatch {
                    table,
                    expected,
                    actual,
                }));
            }
            tables
                .read_table(table, &mut reader, &source)
                .map_err(|err| failed(err.in_table(table)))?;
            tracing::trace!(%table, records = tables.len(table), "read table");
        }
        tables.validate_references(version).map_err(failed)?;

        tracing::debug!(
            %version,
            strings = tables.strings.len(),
            types = tables.types.len(),
            properties = tables.properties.len(),
            ?string_mode,
            "loaded xbf metadata"
        );
        Ok(Self {
            assemblies: slots(tables.assemblies.len()),
            type_namespaces: slots(tables.type_namespaces.len()),
            types: slots(tables.types.len()),
            properties: slots(tables.properties.len()),
            xml_namespaces: slots(tables.xml_namespaces.len()),
            stable_assembly: OnceCell::new(),
            stable_types: slots(stable::type_count(version) as usize),
            stable_properties: slots(stable::property_count(version) as usize),
            buffer,
            range,
            header,
            string_mode,
            policy: options.resolve_policy,
            ctx: ctx.clone(),
            tables,
        })
    }

    pub fn version(&self) -> FormatVersion {
        self.header.version
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn buffer(&self) -> &Arc<[u8]> {
        &self.buffer
    }

    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// The storage strings were decoded into.
    pub fn string_mode(&self) -> StringMode {
        self.string_mode
    }

    pub fn context(&self) -> &ReaderContext {
        &self.ctx
    }

    fn check(&self, table: TableKind, index: u32) -> Result<usize, FormatError> {
        let len = self.tables.len(table);
        if (index as usize) < len {
            Ok(index as usize)
        } else {
            Err(FormatError::IndexOutOfRange { table, index, len })
        }
    }

    fn check_stable(&self, table: TableKind, index: u16, count: u32) -> Result<usize, FormatError> {
        if u32::from(index) < count {
            Ok(usize::from(index))
        } else {
            Err(FormatError::OutOfRange {
                table,
                index: u32::from(index),
                count,
            })
        }
    }

    /// A known symbol failed to resolve: the binary and the schema disagree.
    fn unresolved<T>(&self, table: TableKind, name: String) -> Result<T, FormatError> {
        let err = FormatError::UnresolvedSymbol { table, name };
        match self.policy {
            ResolvePolicy::FailFast => fail_fast(self.ctx.reporter.as_ref(), &err),
            ResolvePolicy::Report => {
                report_format_error(self.ctx.reporter.as_ref(), &err);
                Err(err)
            }
        }
    }

    pub fn get_string(&self, index: u32) -> Result<XbfStr, FormatError> {
        let slot = self.check(TableKind::Strings, index)?;
        Ok(self.tables.strings[slot].clone())
    }

    pub fn get_assembly(&self, index: u32) -> Result<Rc<Assembly>, FormatError> {
        let slot = self.check(TableKind::Assemblies, index)?;
        memoize(&self.assemblies[slot], || {
            let record = self.tables.assemblies[slot];
            Ok(Rc::new(Assembly {
                name: self.get_string(record.name)?,
                provider: record.provider,
            }))
        })
    }

    pub fn get_type_namespace(&self, index: u32) -> Result<Rc<TypeNamespace>, FormatError> {
        let slot = self.check(TableKind::TypeNamespaces, index)?;
        memoize(&self.type_namespaces[slot], || {
            let record = self.tables.type_namespaces[slot];
            Ok(Rc::new(TypeNamespace {
                name: self.get_string(record.name)?,
                assembly: self.get_assembly(record.assembly)?,
            }))
        })
    }

    pub fn get_type(&self, index: SymbolIndex) -> Result<Rc<XamlType>, FormatError> {
        match index {
            SymbolIndex::Stable(stable_index) => {
                let count = stable::type_count(self.version());
                let slot = self.check_stable(TableKind::Types, stable_index, count)?;
                memoize(&self.stable_types[slot], || self.resolve_stable_type(stable_index))
            }
            SymbolIndex::Table(table_index) => {
                let slot = self.check(TableKind::Types, table_index)?;
                memoize(&self.types[slot], || {
                    self.resolve_type(index, self.tables.types[slot])
                })
            }
        }
    }

    pub fn get_property(&self, index: SymbolIndex) -> Result<Rc<XamlProperty>, FormatError> {
        match index {
            SymbolIndex::Stable(stable_index) => {
                let count = stable::property_count(self.version());
                let slot = self.check_stable(TableKind::Properties, stable_index, count)?;
                memoize(&self.stable_properties[slot], || {
                    self.resolve_stable_property(stable_index)
                })
            }
            SymbolIndex::Table(table_index) => {
                let slot = self.check(TableKind::Properties, table_index)?;
                memoize(&self.properties[slot], || {
                    self.resolve_property(index, self.tables.properties[slot])
                })
            }
        }
    }

    pub fn get_xml_namespace(&self, index: u32) -> Result<Rc<XmlNamespace>, FormatError> {
        let slot = self.check(TableKind::XmlNamespaces, index)?;
        memoize(&self.xml_namespaces[slot], || {
            let uri = self.get_string(self.tables.xml_namespaces[slot].uri)?;
            let handle = self.ctx.schema.xml_namespace(uri.as_str());
            if handle.is_none() {
                tracing::debug!(uri = %uri, "xml namespace not known to schema");
            }
            Ok(Rc::new(XmlNamespace {
                index,
                uri,
                handle,
            }))
        })
    }

    fn lookup_type(&self, namespace: &TypeNamespace, name: &str) -> Option<SchemaHandle> {
        let provider = namespace.provider();
        let schema = &self.ctx.schema;
        schema
            .type_by_name(namespace.name.as_str(), name, provider)
            .or_else(|| {
                let fallback = provider.fallback()?;
                let handle = schema.type_by_name(namespace.name.as_str(), name, fallback);
                if handle.is_some() {
                    tracing::warn!(
                        namespace = %namespace.name,
                        name,
                        "resolved native type through the managed provider"
                    );
                }
                handle
            })
    }

    fn resolve_type(&self, index: SymbolIndex, record: TypeRecord) -> Result<Rc<XamlType>, FormatError> {
        let name = self.get_string(record.name)?;
        if record.flags.is_directive() {
            let resolution = match self.ctx.schema.directive(name.as_str()) {
                Some(handle) => Resolution::Known(handle),
                None if record.flags.is_unknown() => Resolution::Unknown,
                None => return self.unresolved(TableKind::Types, format!("x:{name}")),
            };
            return Ok(Rc::new(XamlType {
                index,
                flags: record.flags,
                name,
                namespace: None,
                resolution,
            }));
        }

        let namespace = self.get_type_namespace(record.namespace)?;
        let handle = self.lookup_type(&namespace, name.as_str());
        let resolution = match handle {
            Some(handle) => Resolution::Known(handle),
            // Conditional markup can make this resolvable later; stay unknown.
            None if record.flags.is_unknown() => Resolution::Unknown,
            None => {
                return self.unresolved(TableKind::Types, format!("{}.{name}", namespace.name))
            }
        };
        tracing::trace!(name = %name, ?resolution, "resolved type");
        Ok(Rc::new(XamlType {
            index,
            flags: record.flags,
            name,
            namespace: Some(namespace),
            resolution,
        }))
    }

    fn resolve_stable_type(&self, stable_index: u16) -> Result<Rc<XamlType>, FormatError> {
        let Some((namespace, name)) = stable::stable_type(self.version(), stable_index) else {
            return Err(FormatError::OutOfRange {
                table: TableKind::Types,
                index: u32::from(stable_index),
                count: stable::type_count(self.version()),
            });
        };
        let assembly = Rc::clone(self.stable_assembly.get_or_init(|| {
            Rc::new(Assembly {
                name: XbfStr::owned(stable::STABLE_ASSEMBLY),
                provider: ProviderKind::Native,
            })
        }));
        let namespace = Rc::new(TypeNamespace {
            name: XbfStr::owned(namespace),
            assembly,
        });
        let Some(handle) = self.lookup_type(&namespace, name) else {
            return self.unresolved(TableKind::Types, format!("{}.{name}", namespace.name));
        };
        Ok(Rc::new(XamlType {
            index: SymbolIndex::Stable(stable_index),
            flags: SymbolFlags::NONE,
            name: XbfStr::owned(name),
            namespace: Some(namespace),
            resolution: Resolution::Known(handle),
        }))
    }

    fn resolve_property(
        &self,
        index: SymbolIndex,
        record: PropertyRecord,
    ) -> Result<Rc<XamlProperty>, FormatError> {
        let name = self.get_string(record.name)?;
        let declaring_type = record
            .declaring_type
            .map(|owner| self.get_type(owner))
            .transpose()?;
        let unknown = record.flags.is_unknown();

        if record.flags.is_directive() {
            let resolution = match self.ctx.schema.directive(name.as_str()) {
                Some(handle) => Resolution::Known(handle),
                None if unknown => Resolution::Unknown,
                None => return self.unresolved(TableKind::Properties, format!("x:{name}")),
            };
            return Ok(Rc::new(XamlProperty {
                index,
                flags: record.flags,
                directive: Some(DirectiveKind::from_name(name.as_str())),
                name,
                declaring_type,
                resolution,
            }));
        }

        let owner_handle = declaring_type
            .as_ref()
            .and_then(|owner| owner.resolution.handle());
        let handle = owner_handle
            .and_then(|owner| self.ctx.schema.property_by_name(owner, name.as_str()));
        let resolution = match handle {
            Some(handle) => Resolution::Known(handle),
            // Members of an unknown type cannot be known either.
            None if unknown || owner_handle.is_none() => Resolution::Unknown,
            None => {
                let owner = declaring_type
                    .as_ref()
                    .map_or_else(String::new, |owner| owner.to_string());
                return self.unresolved(TableKind::Properties, format!("{owner}.{name}"));
            }
        };
        Ok(Rc::new(XamlProperty {
            index,
            flags: record.flags,
            name,
            declaring_type,
            resolution,
            directive: None,
        }))
    }

    fn resolve_stable_property(&self, stable_index: u16) -> Result<Rc<XamlProperty>, FormatError> {
        let Some((owner, name)) = stable::stable_property(self.version(), stable_index) else {
            return Err(FormatError::OutOfRange {
                table: TableKind::Properties,
                index: u32::from(stable_index),
                count: stable::property_count(self.version()),
            });
        };
        let declaring_type = self.get_type(SymbolIndex::Stable(owner))?;
        let handle = declaring_type
            .resolution
            .handle()
            .and_then(|owner| self.ctx.schema.property_by_name(owner, name));
        let Some(handle) = handle else {
            return self.unresolved(
                TableKind::Properties,
                format!("{}.{name}", declaring_type.name),
            );
        };
        Ok(Rc::new(XamlProperty {
            index: SymbolIndex::Stable(stable_index),
            flags: SymbolFlags::NONE,
            name: XbfStr::owned(name),
            declaring_type: Some(declaring_type),
            resolution: Resolution::Known(handle),
            directive: None,
        }))
    }
}
