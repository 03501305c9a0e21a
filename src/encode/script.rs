//! JSON description of a token stream, compiled through `XbfWriter`.
//!
//! ```json
//! {
//!   "version": "2.1",
//!   "nodes": [
//!     { "line": [1, 1] },
//!     { "start_object": { "namespace": "Microsoft.UI.Xaml.Controls", "name": "Grid" } },
//!     "end_of_attributes",
//!     "end_object"
//!   ]
//! }
//! ```

use serde::Deserialize;
use smol_str::SmolStr;

use crate::constants::HASH_LEN;
use crate::error::FormatError;
use crate::format::FormatVersion;
use crate::options::WriteOptions;
use crate::schema::ProviderKind;
use crate::tables::SymbolFlags;
use crate::token::{GridUnit, Value};

use super::{AssemblyName, LineRecord, PropertyName, TypeName, XbfWriter};

const DEFAULT_ASSEMBLY: &str = "Microsoft.UI.Xaml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    #[serde(default)]
    pub version: Option<SmolStr>,
    #[serde(default)]
    pub line_info: Option<bool>,
    pub nodes: Vec<ScriptNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum ScriptNode {
    Namespace {
        #[serde(default)]
        prefix: SmolStr,
        uri: SmolStr,
    },
    StartObject(ScriptType),
    EndObject,
    StartMember(ScriptMember),
    EndMember,
    EndOfAttributes,
    Text(String),
    Value(ScriptValue),
    /// `[line, column]`, encoded as the shortest record.
    Line(u32, u32),
    /// `[line, column]` as an explicit absolute record.
    LineAbsolute(u32, u32),
    /// `[line delta, column]` as an explicit delta record.
    LineDelta(i16, i16),
}

fn default_assembly() -> SmolStr {
    SmolStr::new_static(DEFAULT_ASSEMBLY)
}

fn default_provider() -> ProviderKind {
    ProviderKind::Native
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptType {
    #[serde(default = "default_assembly")]
    pub assembly: SmolStr,
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    #[serde(default)]
    pub namespace: SmolStr,
    pub name: SmolStr,
    #[serde(default)]
    pub directive: bool,
    #[serde(default)]
    pub unknown: bool,
}

impl ScriptType {
    fn flags(&self) -> SymbolFlags {
        let mut flags = SymbolFlags::NONE;
        if self.directive {
            flags = flags | SymbolFlags::DIRECTIVE;
        }
        if self.unknown {
            flags = flags | SymbolFlags::UNKNOWN;
        }
        flags
    }

    pub fn to_type_name(&self) -> TypeName {
        if self.directive {
            return TypeName::directive(self.name.clone()).with_flags(self.flags());
        }
        TypeName::new(
            AssemblyName::new(self.assembly.clone(), self.provider),
            self.namespace.clone(),
            self.name.clone(),
        )
        .with_flags(self.flags())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptMember {
    /// Omitted for directives.
    #[serde(default, rename = "type")]
    pub declaring_type: Option<ScriptType>,
    pub name: SmolStr,
    #[serde(default)]
    pub multi: bool,
    #[serde(default)]
    pub directive: bool,
    #[serde(default)]
    pub unknown: bool,
}

impl ScriptMember {
    pub fn to_property_name(&self) -> PropertyName {
        let mut flags = SymbolFlags::NONE;
        if self.directive {
            flags = flags | SymbolFlags::DIRECTIVE;
        }
        if self.unknown {
            flags = flags | SymbolFlags::UNKNOWN;
        }
        PropertyName {
            declaring_type: self.declaring_type.as_ref().map(ScriptType::to_type_name),
            name: self.name.clone(),
            flags,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ScriptValue {
    Bool(bool),
    Float(f32),
    Int(i32),
    String(String),
    Color(u32),
    Thickness([f32; 4]),
    GridLength { value: f32, unit: GridUnit },
}

impl From<&ScriptValue> for Value {
    fn from(value: &ScriptValue) -> Self {
        match value {
            ScriptValue::Bool(flag) => Value::Bool(*flag),
            ScriptValue::Float(number) => Value::Float(*number),
            ScriptValue::Int(number) => Value::Int(*number),
            ScriptValue::String(text) => Value::String(text.as_str().into()),
            ScriptValue::Color(argb) => Value::Color(*argb),
            ScriptValue::Thickness([left, top, right, bottom]) => Value::Thickness {
                left: *left,
                top: *top,
                right: *right,
                bottom: *bottom,
            },
            ScriptValue::GridLength { value, unit } => Value::GridLength {
                value: *value,
                unit: *unit,
            },
        }
    }
}

impl Script {
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    /// `base` with the version and line-info settings the script names.
    pub fn write_options(&self, base: &WriteOptions) -> Result<WriteOptions, FormatError> {
        let mut options = base.clone();
        if let Some(raw) = &self.version {
            options.version = raw
                .parse::<FormatVersion>()
                .map_err(|reason| FormatError::deserialization("script", 0, reason))?;
        }
        if let Some(line_info) = self.line_info {
            options.emit_line_info = line_info;
        }
        Ok(options)
    }

    pub fn compile(&self, options: &WriteOptions) -> Result<Vec<u8>, FormatError> {
        let mut writer = XbfWriter::new(options.clone());
        for node in &self.nodes {
            match node {
                ScriptNode::Namespace { prefix, uri } => writer.namespace(prefix, uri),
                ScriptNode::StartObject(ty) => writer.start_object(&ty.to_type_name()),
                ScriptNode::EndObject => writer.end_object(),
                ScriptNode::StartMember(member) => {
                    writer.start_member(&member.to_property_name(), member.multi)
                }
                ScriptNode::EndMember => writer.end_member(),
                ScriptNode::EndOfAttributes => writer.end_of_attributes(),
                ScriptNode::Text(text) => writer.text(text),
                ScriptNode::Value(value) => writer.value(&Value::from(value)),
                ScriptNode::Line(line, column) => writer.line_info(*line, *column),
                ScriptNode::LineAbsolute(line, column) => writer.line_record(LineRecord::Absolute {
                    line: *line,
                    column: *column,
                }),
                ScriptNode::LineDelta(line, column) => writer.line_record(LineRecord::Delta {
                    line: *line,
                    column: *column,
                }),
            }
        }
        writer.finish(&[0; HASH_LEN])
    }
}
