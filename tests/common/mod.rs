#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use xbf::cache::{ResourceProvider, TextMarkupParser};
use xbf::encode::{AssemblyName, PropertyName, TypeName};
use xbf::report::CollectingReporter;
use xbf::schema::{PermissiveResolver, ProviderKind, SchemaHandle};
use xbf::{Error, ReaderContext, SchemaResolver, TextSettings, TokenSource, WriteOptions, XbfWriter};

pub const HASH: [u8; 64] = [0; 64];

/// Permissive schema that counts lookups and refuses the names it is told to.
#[derive(Debug, Default)]
pub struct CountingSchema {
    inner: PermissiveResolver,
    missing_types: RefCell<HashSet<(String, String)>>,
    native_only_managed: RefCell<HashSet<String>>,
    pub type_lookups: Cell<usize>,
    pub property_lookups: Cell<usize>,
    pub directive_lookups: Cell<usize>,
    pub namespace_lookups: Cell<usize>,
}

impl CountingSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_type(self, namespace: &str, name: &str) -> Self {
        self.missing_types
            .borrow_mut()
            .insert((namespace.to_string(), name.to_string()));
        self
    }

    /// Makes `name` resolvable only through the managed provider.
    pub fn managed_only(self, name: &str) -> Self {
        self.native_only_managed.borrow_mut().insert(name.to_string());
        self
    }

    pub fn lookups(&self) -> usize {
        self.type_lookups.get()
            + self.property_lookups.get()
            + self.directive_lookups.get()
            + self.namespace_lookups.get()
    }
}

impl SchemaResolver for CountingSchema {
    fn xml_namespace(&self, uri: &str) -> Option<SchemaHandle> {
        self.namespace_lookups.set(self.namespace_lookups.get() + 1);
        self.inner.xml_namespace(uri)
    }

    fn type_by_name(
        &self,
        namespace: &str,
        name: &str,
        provider: ProviderKind,
    ) -> Option<SchemaHandle> {
        self.type_lookups.set(self.type_lookups.get() + 1);
        let key = (namespace.to_string(), name.to_string());
        if self.missing_types.borrow().contains(&key) {
            return None;
        }
        if provider == ProviderKind::Native && self.native_only_managed.borrow().contains(name) {
            return None;
        }
        self.inner.type_by_name(namespace, name, provider)
    }

    fn property_by_name(&self, declaring_type: SchemaHandle, name: &str) -> Option<SchemaHandle> {
        self.property_lookups.set(self.property_lookups.get() + 1);
        self.inner.property_by_name(declaring_type, name)
    }

    fn directive(&self, name: &str) -> Option<SchemaHandle> {
        self.directive_lookups.set(self.directive_lookups.get() + 1);
        self.inner.directive(name)
    }
}

pub fn context(schema: Rc<dyn SchemaResolver>) -> (ReaderContext, Rc<CollectingReporter>) {
    let reporter = Rc::new(CollectingReporter::new());
    let ctx = ReaderContext::new(schema).with_reporter(reporter.clone());
    (ctx, reporter)
}

pub fn shared(bytes: Vec<u8>) -> Arc<[u8]> {
    Arc::from(bytes.into_boxed_slice())
}

pub fn controls(name: &str) -> TypeName {
    TypeName::new(
        AssemblyName::native("Microsoft.UI.Xaml"),
        "Microsoft.UI.Xaml.Controls",
        name,
    )
}

pub fn app_type(name: &str) -> TypeName {
    TypeName::new(AssemblyName::managed("App"), "App.Views", name)
}

/// A page with a managed root, a directive, and a nested native child.
pub fn page(options: WriteOptions, root: &str) -> Vec<u8> {
    let mut writer = XbfWriter::new(options);
    writer.line_info(1, 1);
    writer.namespace("x", xbf::constants::DIRECTIVES_NAMESPACE);
    writer.start_object(&app_type(root));
    writer.line_info(1, 12);
    writer.start_member(&PropertyName::directive("Class"), false);
    writer.text("App.Views.MainPage");
    writer.end_member();
    writer.end_of_attributes();
    writer.line_info(2, 5);
    writer.start_member(&PropertyName::new(app_type(root), "Content"), false);
    writer.start_object(&controls("TextBlock"));
    writer.end_of_attributes();
    writer.end_object();
    writer.end_member();
    writer.end_object();
    writer.finish(&HASH).expect("write page")
}

/// In-memory resources that count how often each URI is loaded.
#[derive(Debug, Default)]
pub struct MemoryResources {
    files: RefCell<HashMap<String, Arc<[u8]>>>,
    loads: RefCell<HashMap<String, usize>>,
}

impl MemoryResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uri: &str, bytes: Vec<u8>) {
        self.files.borrow_mut().insert(uri.to_string(), shared(bytes));
    }

    pub fn remove(&self, uri: &str) {
        self.files.borrow_mut().remove(uri);
    }

    pub fn loads(&self, uri: &str) -> usize {
        self.loads.borrow().get(uri).copied().unwrap_or(0)
    }
}

impl ResourceProvider for MemoryResources {
    fn load(&self, uri: &str) -> Option<Arc<[u8]>> {
        *self.loads.borrow_mut().entry(uri.to_string()).or_default() += 1;
        self.files.borrow().get(uri).cloned()
    }
}

/// Understands exactly `<Name/>`, producing one managed object.
#[derive(Debug, Default)]
pub struct TinyMarkupParser {
    pub parses: Cell<usize>,
}

impl TextMarkupParser for TinyMarkupParser {
    fn parse(
        &self,
        ctx: &ReaderContext,
        text: &[u8],
        _settings: &TextSettings,
    ) -> Result<Box<dyn TokenSource>, Error> {
        self.parses.set(self.parses.get() + 1);
        let text = std::str::from_utf8(text).map_err(|err| Error::text(err.to_string()))?;
        let name = text
            .trim()
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix("/>"))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::text("expected a single empty element"))?;

        let mut writer = XbfWriter::new(WriteOptions::default());
        writer.start_object(&app_type(name));
        writer.end_object();
        let bytes = writer.finish(&HASH)?;
        Ok(Box::new(xbf::decode::open(
            shared(bytes),
            ctx,
            &xbf::LoadOptions::default(),
        )?))
    }
}
