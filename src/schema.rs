//! Schema collaborator and the resolved symbols handed out by the reader.
//!
//! Resolved symbols form a DAG (property → declaring type → type namespace →
//! assembly) held together with `Rc`, so no weak references are needed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::constants::DIRECTIVES_NAMESPACE;
use crate::tables::{SymbolFlags, SymbolIndex};
use crate::text::XbfStr;

/// Which type system a namespace is served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Unknown,
    Native,
    Managed,
}

impl ProviderKind {
    pub fn to_u32(self) -> u32 {
        match self {
            ProviderKind::Unknown => 0,
            ProviderKind::Native => 1,
            ProviderKind::Managed => 2,
        }
    }

    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(ProviderKind::Unknown),
            1 => Some(ProviderKind::Native),
            2 => Some(ProviderKind::Managed),
            _ => None,
        }
    }

    /// Provider to retry against when a lookup through `self` fails.
    ///
    /// Native namespaces historically leaked managed types, so a failed native
    /// lookup is retried against the managed provider.
    pub fn fallback(self) -> Option<Self> {
        match self {
            ProviderKind::Native => Some(ProviderKind::Managed),
            _ => None,
        }
    }
}

/// Opaque identity of a schema object, chosen by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SchemaHandle(pub u32);

/// Maps symbolic names to schema objects. Implemented outside this crate.
pub trait SchemaResolver {
    fn xml_namespace(&self, uri: &str) -> Option<SchemaHandle>;

    fn type_by_name(
        &self,
        namespace: &str,
        name: &str,
        provider: ProviderKind,
    ) -> Option<SchemaHandle>;

    fn property_by_name(&self, declaring_type: SchemaHandle, name: &str) -> Option<SchemaHandle>;

    fn directive(&self, name: &str) -> Option<SchemaHandle>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Resolution {
    Known(SchemaHandle),
    Unknown,
}

impl Resolution {
    pub fn is_known(self) -> bool {
        matches!(self, Resolution::Known(_))
    }

    pub fn handle(self) -> Option<SchemaHandle> {
        match self {
            Resolution::Known(handle) => Some(handle),
            Resolution::Unknown => None,
        }
    }
}

impl From<Option<SchemaHandle>> for Resolution {
    fn from(handle: Option<SchemaHandle>) -> Self {
        handle.map_or(Resolution::Unknown, Resolution::Known)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DirectiveKind {
    Uid,
    Name,
    Key,
    Class,
    Other,
}

impl DirectiveKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "Uid" => DirectiveKind::Uid,
            "Name" => DirectiveKind::Name,
            "Key" => DirectiveKind::Key,
            "Class" => DirectiveKind::Class,
            _ => DirectiveKind::Other,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Assembly {
    pub name: XbfStr,
    pub provider: ProviderKind,
}

#[derive(Debug, Serialize)]
pub struct TypeNamespace {
    pub name: XbfStr,
    pub assembly: Rc<Assembly>,
}

impl TypeNamespace {
    pub fn provider(&self) -> ProviderKind {
        self.assembly.provider
    }
}

#[derive(Debug, Serialize)]
pub struct XamlType {
    pub index: SymbolIndex,
    pub flags: SymbolFlags,
    pub name: XbfStr,
    /// `None` for markup directives, which live in the directives namespace.
    pub namespace: Option<Rc<TypeNamespace>>,
    pub resolution: Resolution,
}

impl XamlType {
    pub fn is_directive(&self) -> bool {
        self.flags.is_directive()
    }

    pub fn namespace_name(&self) -> &str {
        match &self.namespace {
            Some(namespace) => namespace.name.as_str(),
            None => DIRECTIVES_NAMESPACE,
        }
    }

    pub fn is_unknown(&self) -> bool {
        !self.resolution.is_known()
    }
}

impl fmt::Display for XamlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) if !namespace.name.is_empty() => {
                write!(f, "{}.{}", namespace.name, self.name)
            }
            Some(_) => f.write_str(self.name.as_str()),
            None => write!(f, "x:{}", self.name),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct XamlProperty {
    pub index: SymbolIndex,
    pub flags: SymbolFlags,
    pub name: XbfStr,
    pub declaring_type: Option<Rc<XamlType>>,
    pub resolution: Resolution,
    pub directive: Option<DirectiveKind>,
}

impl XamlProperty {
    pub fn is_directive(&self) -> bool {
        self.directive.is_some()
    }

    pub fn is_unknown(&self) -> bool {
        !self.resolution.is_known()
    }
}

impl fmt::Display for XamlProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.declaring_type, self.directive) {
            (_, Some(_)) => write!(f, "x:{}", self.name),
            (Some(owner), None) => write!(f, "{}.{}", owner.name, self.name),
            (None, None) => f.write_str(self.name.as_str()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct XmlNamespace {
    pub index: u32,
    pub uri: XbfStr,
    pub handle: Option<SchemaHandle>,
}

/// Resolver that accepts every name, handing out one handle per distinct
/// symbol. Useful for tooling that inspects binaries without a schema.
#[derive(Debug, Default)]
pub struct PermissiveResolver {
    handles: RefCell<HashMap<(SmolStr, SmolStr), SchemaHandle>>,
}

impl PermissiveResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.handles.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.borrow().is_empty()
    }

    fn handle(&self, scope: &str, name: &str) -> SchemaHandle {
        let mut handles = self.handles.borrow_mut();
        let next = SchemaHandle(handles.len() as u32);
        *handles
            .entry((SmolStr::new(scope), SmolStr::new(name)))
            .or_insert(next)
    }
}

impl SchemaResolver for PermissiveResolver {
    fn xml_namespace(&self, uri: &str) -> Option<SchemaHandle> {
        Some(self.handle("xmlns", uri))
    }

    fn type_by_name(
        &self,
        namespace: &str,
        name: &str,
        _provider: ProviderKind,
    ) -> Option<SchemaHandle> {
        Some(self.handle(namespace, name))
    }

    fn property_by_name(&self, declaring_type: SchemaHandle, name: &str) -> Option<SchemaHandle> {
        let mut scope = String::from("property:");
        scope.push_str(itoa::Buffer::new().format(declaring_type.0));
        Some(self.handle(&scope, name))
    }

    fn directive(&self, name: &str) -> Option<SchemaHandle> {
        Some(self.handle(DIRECTIVES_NAMESPACE, name))
    }
}
