//! Logical markup tokens and the producers that yield them.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::FormatError;
use crate::schema::{XamlProperty, XamlType, XmlNamespace};
use crate::text::XbfStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridUnit {
    Auto,
    Pixel,
    Star,
}

impl GridUnit {
    pub fn to_u8(self) -> u8 {
        match self {
            GridUnit::Auto => 0,
            GridUnit::Pixel => 1,
            GridUnit::Star => 2,
        }
    }

    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(GridUnit::Auto),
            1 => Some(GridUnit::Pixel),
            2 => Some(GridUnit::Star),
            _ => None,
        }
    }
}

/// Inline literal carried by a value record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Float(f32),
    Int(i32),
    String(XbfStr),
    /// ARGB, alpha in the high byte.
    Color(u32),
    Thickness {
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
    },
    GridLength {
        value: f32,
        unit: GridUnit,
    },
}

fn push_float(out: &mut String, value: f32) {
    if value.is_finite() {
        out.push_str(ryu::Buffer::new().format(value));
    } else {
        out.push_str(&value.to_string());
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        match self {
            Value::Bool(value) => out.push_str(if *value { "True" } else { "False" }),
            Value::Float(value) => push_float(&mut out, *value),
            Value::Int(value) => out.push_str(itoa::Buffer::new().format(*value)),
            Value::String(value) => out.push_str(value.as_str()),
            Value::Color(argb) => out.push_str(&format!("#{argb:08X}")),
            Value::Thickness {
                left,
                top,
                right,
                bottom,
            } => {
                for (idx, side) in [left, top, right, bottom].into_iter().enumerate() {
                    if idx > 0 {
                        out.push(',');
                    }
                    push_float(&mut out, *side);
                }
            }
            Value::GridLength { value, unit } => match unit {
                GridUnit::Auto => out.push_str("Auto"),
                GridUnit::Pixel => push_float(&mut out, *value),
                GridUnit::Star => {
                    push_float(&mut out, *value);
                    out.push('*');
                }
            },
        }
        f.write_str(&out)
    }
}

/// One logical event of the markup token stream.
#[derive(Debug, Clone)]
pub enum Token {
    Namespace {
        prefix: XbfStr,
        namespace: Rc<XmlNamespace>,
    },
    StartObject(Rc<XamlType>),
    EndObject,
    StartMember {
        property: Rc<XamlProperty>,
        multi_item: bool,
    },
    EndMember,
    EndOfAttributes,
    Text(XbfStr),
    Value(Value),
    EndOfStream,
}

impl Token {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Token::Namespace { .. } => "Namespace",
            Token::StartObject(_) => "StartObject",
            Token::EndObject => "EndObject",
            Token::StartMember { .. } => "StartMember",
            Token::EndMember => "EndMember",
            Token::EndOfAttributes => "EndOfAttributes",
            Token::Text(_) => "Text",
            Token::Value(_) => "Value",
            Token::EndOfStream => "EndOfStream",
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Token::EndOfStream)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Namespace { prefix, namespace } => {
                write!(f, "Namespace {prefix}={}", namespace.uri)
            }
            Token::StartObject(ty) => write!(f, "StartObject {ty}"),
            Token::StartMember {
                property,
                multi_item,
            } => {
                let arity = if *multi_item { " [multi]" } else { "" };
                write!(f, "StartMember {property}{arity}")
            }
            Token::Text(text) => write!(f, "Text {text:?}"),
            Token::Value(value) => write!(f, "Value {value}"),
            other => f.write_str(other.kind_name()),
        }
    }
}

/// Running source position; line info records update it in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LineInfo {
    pub line: u32,
    pub column: u32,
}

impl LineInfo {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// A nonzero line delta moves to a new line and takes the column as-is;
    /// otherwise the column delta is relative.
    pub fn apply_delta(&mut self, line_delta: i16, column_delta: i16) {
        if line_delta != 0 {
            self.line = offset(self.line, line_delta);
            self.column = offset(0, column_delta);
        } else {
            self.column = offset(self.column, column_delta);
        }
    }
}

fn offset(base: u32, delta: i16) -> u32 {
    let moved = i64::from(base) + i64::from(delta);
    moved.clamp(0, i64::from(u32::MAX)) as u32
}

impl fmt::Display for LineInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub token: Token,
    pub line: LineInfo,
}

impl Node {
    pub fn new(token: Token, line: LineInfo) -> Self {
        Self { token, line }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut node = match &self.token {
            Token::Namespace { prefix, namespace } => json!({
                "prefix": prefix,
                "uri": namespace.uri,
            }),
            Token::StartObject(ty) => json!({
                "namespace": ty.namespace_name(),
                "name": ty.name,
                "trusted": ty.index.is_trusted(),
                "unknown": ty.is_unknown(),
            }),
            Token::StartMember {
                property,
                multi_item,
            } => json!({
                "name": property.name,
                "declaring_type": property.declaring_type.as_ref().map(|ty| ty.to_string()),
                "directive": property.is_directive(),
                "multi_item": multi_item,
                "trusted": property.index.is_trusted(),
            }),
            Token::Text(text) => json!({ "text": text }),
            Token::Value(value) => json!({ "value": value }),
            _ => json!({}),
        };
        if let Some(object) = node.as_object_mut() {
            object.insert("token".into(), json!(self.token.kind_name()));
            object.insert("line".into(), json!(self.line.line));
            object.insert("column".into(), json!(self.line.column));
        }
        node
    }
}

/// A producer of markup tokens.
///
/// `read` advances by one logical token and returns `false` once the stream
/// is exhausted; `EndOfStream` itself is delivered as the final token.
/// `current` is meaningful only after `read` returned `true`.
pub trait TokenSource {
    fn read(&mut self) -> Result<bool, FormatError>;

    fn current(&self) -> &Node;
}

impl<S: TokenSource + ?Sized> TokenSource for Box<S> {
    fn read(&mut self) -> Result<bool, FormatError> {
        (**self).read()
    }

    fn current(&self) -> &Node {
        (**self).current()
    }
}

/// Materialized token sequence, replayable any number of times.
#[derive(Debug, Clone, Default)]
pub struct TokenList {
    nodes: Vec<Node>,
}

impl TokenList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains `source` into a list.
    pub fn capture<S: TokenSource + ?Sized>(source: &mut S) -> Result<Self, FormatError> {
        let mut nodes = Vec::new();
        while source.read()? {
            nodes.push(source.current().clone());
        }
        Ok(Self { nodes })
    }

    pub fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    pub fn reader(self: &Rc<Self>) -> TokenListReader {
        TokenListReader::new(Rc::clone(self))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.nodes.iter().map(Node::to_json).collect())
    }
}

impl<'a> IntoIterator for &'a TokenList {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

/// Replays a shared `TokenList`.
#[derive(Debug, Clone)]
pub struct TokenListReader {
    list: Rc<TokenList>,
    next: usize,
    placeholder: Node,
}

impl TokenListReader {
    pub fn new(list: Rc<TokenList>) -> Self {
        Self {
            list,
            next: 0,
            placeholder: Node::new(Token::EndOfStream, LineInfo::default()),
        }
    }

    pub fn list(&self) -> &Rc<TokenList> {
        &self.list
    }
}

impl TokenSource for TokenListReader {
    fn read(&mut self) -> Result<bool, FormatError> {
        if self.next >= self.list.len() {
            return Ok(false);
        }
        self.next += 1;
        Ok(true)
    }

    fn current(&self) -> &Node {
        match self.next.checked_sub(1) {
            Some(index) => &self.list.nodes[index],
            None => &self.placeholder,
        }
    }
}
