use crate::constants::{tag, value_kind};
use crate::tables::SymbolIndex;
use crate::token::Value;

/// Explicit line info record, written as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRecord {
    Absolute { line: u32, column: u32 },
    Delta { line: i16, column: i16 },
}

/// Appends tagged node records to an in-memory buffer.
#[derive(Debug, Default)]
pub(crate) struct NodeStream {
    buffer: Vec<u8>,
}

impl NodeStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn simple(&mut self, record: u8) {
        self.buffer.push(record);
    }

    pub fn symbol(&mut self, record: u8, index: SymbolIndex) {
        debug_assert!(tag::carries_symbol(record));
        match index {
            SymbolIndex::Stable(index) => {
                self.buffer.push(record | tag::TRUSTED);
                self.buffer.extend_from_slice(&index.to_le_bytes());
            }
            SymbolIndex::Table(index) => {
                self.buffer.push(record);
                self.buffer.extend_from_slice(&index.to_le_bytes());
            }
        }
    }

    pub fn namespace(&mut self, xml_namespace: u32, prefix: u32) {
        self.buffer.push(tag::NAMESPACE);
        self.buffer.extend_from_slice(&xml_namespace.to_le_bytes());
        self.buffer.extend_from_slice(&prefix.to_le_bytes());
    }

    pub fn text(&mut self, string: u32) {
        self.buffer.push(tag::TEXT);
        self.buffer.extend_from_slice(&string.to_le_bytes());
    }

    /// `string` is the interned index for `Value::String`, ignored otherwise.
    pub fn value(&mut self, value: &Value, string: u32) {
        let out = &mut self.buffer;
        out.push(tag::VALUE);
        match value {
            Value::Bool(flag) => {
                out.push(value_kind::BOOL);
                out.push(u8::from(*flag));
            }
            Value::Float(number) => {
                out.push(value_kind::FLOAT);
                out.extend_from_slice(&number.to_le_bytes());
            }
            Value::Int(number) => {
                out.push(value_kind::INT);
                out.extend_from_slice(&number.to_le_bytes());
            }
            Value::String(_) => {
                out.push(value_kind::STRING);
                out.extend_from_slice(&string.to_le_bytes());
            }
            Value::Color(argb) => {
                out.push(value_kind::COLOR);
                out.extend_from_slice(&argb.to_le_bytes());
            }
            Value::Thickness {
                left,
                top,
                right,
                bottom,
            } => {
                out.push(value_kind::THICKNESS);
                for side in [left, top, right, bottom] {
                    out.extend_from_slice(&side.to_le_bytes());
                }
            }
            Value::GridLength { value, unit } => {
                out.push(value_kind::GRID_LENGTH);
                out.extend_from_slice(&value.to_le_bytes());
                out.push(unit.to_u8());
            }
        }
    }

    pub fn line(&mut self, record: LineRecord) {
        match record {
            LineRecord::Absolute { line, column } => {
                self.buffer.push(tag::LINE_ABSOLUTE);
                self.buffer.extend_from_slice(&line.to_le_bytes());
                self.buffer.extend_from_slice(&column.to_le_bytes());
            }
            LineRecord::Delta { line, column } => {
                self.buffer.push(tag::LINE_DELTA);
                self.buffer.extend_from_slice(&line.to_le_bytes());
                self.buffer.extend_from_slice(&column.to_le_bytes());
            }
        }
    }
}
