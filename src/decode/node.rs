use std::ops::Range;
use std::rc::Rc;
use std::sync::Arc;

use crate::constants::{tag, value_kind};
use crate::error::FormatError;
use crate::format::bytes::ByteReader;
use crate::report::report_format_error;
use crate::tables::SymbolIndex;
use crate::token::{GridUnit, LineInfo, Node, Token, TokenSource, Value};

use super::metadata::MetadataReader;

const CONTEXT: &str = "node stream";

/// Decodes the node stream section of a compiled file into tokens.
///
/// Line info records are folded into the running position and never
/// surface as tokens of their own.
#[derive(Debug)]
pub struct NodeStreamReader {
    metadata: Rc<MetadataReader>,
    buffer: Arc<[u8]>,
    end: usize,
    position: usize,
    line: LineInfo,
    current: Node,
    finished: bool,
}

impl NodeStreamReader {
    /// `nodes` is the absolute byte range of the node stream within the
    /// buffer `metadata` was loaded from.
    pub fn new(metadata: Rc<MetadataReader>, nodes: Range<usize>) -> Self {
        let buffer = Arc::clone(metadata.buffer());
        let end = nodes.end.min(buffer.len());
        Self {
            metadata,
            buffer,
            end,
            position: nodes.start.min(end),
            line: LineInfo::default(),
            current: Node::new(Token::EndOfStream, LineInfo::default()),
            finished: false,
        }
    }

    pub fn metadata(&self) -> &Rc<MetadataReader> {
        &self.metadata
    }

    /// Absolute offset of the next record.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn line(&self) -> LineInfo {
        self.line
    }

    fn decode_next(&mut self) -> Result<Token, FormatError> {
        let metadata = &self.metadata;
        let mut reader = ByteReader::new(&self.buffer[self.position..self.end], self.position);
        loop {
            let offset = reader.absolute();
            let raw = reader.read_u8()?;
            let trusted = raw & tag::TRUSTED != 0;
            let record = raw & !tag::TRUSTED;
            if trusted && !tag::carries_symbol(record) {
                return Err(FormatError::deserialization(
                    CONTEXT,
                    offset,
                    format!("trusted bit set on record tag {raw:#04x}"),
                ));
            }
            let token = match record {
                tag::LINE_ABSOLUTE => {
                    let line = reader.read_u32()?;
                    let column = reader.read_u32()?;
                    self.line = LineInfo::new(line, column);
                    continue;
                }
                tag::LINE_DELTA => {
                    let line = reader.read_i16()?;
                    let column = reader.read_i16()?;
                    self.line.apply_delta(line, column);
                    continue;
                }
                tag::NAMESPACE => {
                    let namespace = metadata.get_xml_namespace(reader.read_u32()?)?;
                    let prefix = metadata.get_string(reader.read_u32()?)?;
                    Token::Namespace { prefix, namespace }
                }
                tag::START_OBJECT => {
                    let index = read_symbol(&mut reader, trusted)?;
                    Token::StartObject(metadata.get_type(index)?)
                }
                tag::END_OBJECT => Token::EndObject,
                tag::START_MEMBER | tag::START_MULTI_MEMBER => {
                    let index = read_symbol(&mut reader, trusted)?;
                    Token::StartMember {
                        property: metadata.get_property(index)?,
                        multi_item: record == tag::START_MULTI_MEMBER,
                    }
                }
                tag::END_MEMBER => Token::EndMember,
                tag::END_OF_ATTRIBUTES => Token::EndOfAttributes,
                tag::TEXT => Token::Text(metadata.get_string(reader.read_u32()?)?),
                tag::VALUE => Token::Value(read_value(&mut reader, metadata)?),
                tag::END_OF_STREAM => Token::EndOfStream,
                _ => {
                    return Err(FormatError::deserialization(
                        CONTEXT,
                        offset,
                        format!("unknown record tag {raw:#04x}"),
                    ))
                }
            };
            self.position = reader.absolute();
            return Ok(token);
        }
    }
}

fn read_symbol(reader: &mut ByteReader<'_>, trusted: bool) -> Result<SymbolIndex, FormatError> {
    if trusted {
        Ok(SymbolIndex::Stable(reader.read_u16()?))
    } else {
        Ok(SymbolIndex::Table(reader.read_u32()?))
    }
}

fn read_value(reader: &mut ByteReader<'_>, metadata: &MetadataReader) -> Result<Value, FormatError> {
    let offset = reader.absolute();
    let kind = reader.read_u8()?;
    let value = match kind {
        value_kind::BOOL => match reader.read_u8()? {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            other => {
                return Err(FormatError::deserialization(
                    CONTEXT,
                    offset + 1,
                    format!("invalid boolean {other}"),
                ))
            }
        },
        value_kind::FLOAT => Value::Float(reader.read_f32()?),
        value_kind::INT => Value::Int(reader.read_i32()?),
        value_kind::STRING => Value::String(metadata.get_string(reader.read_u32()?)?),
        value_kind::COLOR => Value::Color(reader.read_u32()?),
        value_kind::THICKNESS => Value::Thickness {
            left: reader.read_f32()?,
            top: reader.read_f32()?,
            right: reader.read_f32()?,
            bottom: reader.read_f32()?,
        },
        value_kind::GRID_LENGTH => {
            let value = reader.read_f32()?;
            let unit_at = reader.absolute();
            let raw = reader.read_u8()?;
            let unit = GridUnit::from_u8(raw).ok_or_else(|| {
                FormatError::deserialization(CONTEXT, unit_at, format!("unknown grid unit {raw}"))
            })?;
            Value::GridLength { value, unit }
        }
        _ => {
            return Err(FormatError::deserialization(
                CONTEXT,
                offset,
                format!("unknown value kind {kind}"),
            ))
        }
    };
    Ok(value)
}

impl TokenSource for NodeStreamReader {
    fn read(&mut self) -> Result<bool, FormatError> {
        if self.finished {
            return Ok(false);
        }
        match self.decode_next() {
            Ok(token) => {
                self.finished = token.is_end_of_stream();
                tracing::trace!(token = token.kind_name(), line = %self.line, "decoded node");
                self.current = Node::new(token, self.line);
                Ok(true)
            }
            Err(err) => {
                report_format_error(self.metadata.context().reporter.as_ref(), &err);
                Err(err)
            }
        }
    }

    fn current(&self) -> &Node {
        &self.current
    }
}
