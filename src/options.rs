use smol_str::SmolStr;

use crate::constants::DEFAULT_COMPILED_EXTENSION;
use crate::format::FormatVersion;

/// How string records are stored once a file is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringMode {
    /// Views when the format guarantees terminated strings, copies otherwise.
    #[default]
    Auto,
    View,
    Owned,
}

impl StringMode {
    /// The concrete mode used for a file of `version`.
    pub fn for_version(self, version: FormatVersion) -> StringMode {
        match self {
            StringMode::Auto if version.null_terminated_strings() => StringMode::View,
            StringMode::Auto => StringMode::Owned,
            other => other,
        }
    }
}

/// What happens when a symbol the file claims is known cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolvePolicy {
    /// Report, then abort: the compiler and the schema disagree.
    #[default]
    FailFast,
    /// Return `FormatError::UnresolvedSymbol` to the caller.
    Report,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadOptions {
    pub string_mode: StringMode,
    pub resolve_policy: ResolvePolicy,
    pub validate_grammar: bool,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_string_mode(mut self, string_mode: StringMode) -> Self {
        self.string_mode = string_mode;
        self
    }

    pub fn with_resolve_policy(mut self, resolve_policy: ResolvePolicy) -> Self {
        self.resolve_policy = resolve_policy;
        self
    }

    pub fn with_validate_grammar(mut self, validate_grammar: bool) -> Self {
        self.validate_grammar = validate_grammar;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    pub version: FormatVersion,
    /// Emit trusted indices for well-known types and properties.
    pub use_stable_indices: bool,
    pub emit_line_info: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            version: FormatVersion::LATEST,
            use_stable_indices: true,
            emit_line_info: true,
        }
    }
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: FormatVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_stable_indices(mut self, use_stable_indices: bool) -> Self {
        self.use_stable_indices = use_stable_indices;
        self
    }

    pub fn with_line_info(mut self, emit_line_info: bool) -> Self {
        self.emit_line_info = emit_line_info;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// Extension swapped in to locate a compiled sibling, without the dot.
    pub compiled_extension: SmolStr,
    pub validate_grammar: bool,
    pub load: LoadOptions,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            compiled_extension: SmolStr::new_static(DEFAULT_COMPILED_EXTENSION),
            validate_grammar: true,
            load: LoadOptions::default(),
        }
    }
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compiled_extension(mut self, extension: impl Into<SmolStr>) -> Self {
        self.compiled_extension = extension.into();
        self
    }

    pub fn with_validate_grammar(mut self, validate_grammar: bool) -> Self {
        self.validate_grammar = validate_grammar;
        self
    }

    pub fn with_load_options(mut self, load: LoadOptions) -> Self {
        self.load = load;
        self
    }
}

/// Settings forwarded to the text markup parser.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextSettings {
    pub base_uri: Option<SmolStr>,
    pub strict: bool,
}

impl TextSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<SmolStr>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}
