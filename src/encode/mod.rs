pub mod metadata;
pub mod script;
pub mod writer;

use std::io::Write;

use crate::constants::{tag, HASH_LEN};
use crate::error::FormatError;
use crate::format::{write_preamble, FormatVersion};
use crate::options::WriteOptions;
use crate::token::{LineInfo, Value};

pub use metadata::{AssemblyName, MetadataStore, PropertyName, TypeName};
pub use script::Script;
pub use writer::LineRecord;

use writer::NodeStream;

/// Builds a complete compiled file: symbols are interned as the node stream
/// is written, and the metadata section is laid down on `finish`.
///
/// # Examples
/// ```
/// use xbf::encode::{AssemblyName, TypeName, XbfWriter};
/// use xbf::WriteOptions;
///
/// let grid = TypeName::new(
///     AssemblyName::native("Microsoft.UI.Xaml"),
///     "Microsoft.UI.Xaml.Controls",
///     "Grid",
/// );
/// let mut writer = XbfWriter::new(WriteOptions::default());
/// writer.start_object(&grid);
/// writer.end_of_attributes();
/// writer.end_object();
/// let bytes = writer.finish(&[0; 64]).unwrap();
/// assert!(bytes.starts_with(b"XBF\0"));
/// ```
#[derive(Debug)]
pub struct XbfWriter {
    options: WriteOptions,
    store: MetadataStore,
    nodes: NodeStream,
    line: Option<LineInfo>,
}

impl XbfWriter {
    pub fn new(options: WriteOptions) -> Self {
        Self {
            store: MetadataStore::new(&options),
            options,
            nodes: NodeStream::new(),
            line: None,
        }
    }

    pub fn version(&self) -> FormatVersion {
        self.options.version
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut MetadataStore {
        &mut self.store
    }

    pub fn namespace(&mut self, prefix: &str, uri: &str) {
        let xml_namespace = self.store.intern_xml_namespace(uri);
        let prefix = self.store.intern_string(prefix);
        self.nodes.namespace(xml_namespace, prefix);
    }

    pub fn start_object(&mut self, ty: &TypeName) {
        let index = self.store.intern_type(ty);
        self.nodes.symbol(tag::START_OBJECT, index);
    }

    pub fn end_object(&mut self) {
        self.nodes.simple(tag::END_OBJECT);
    }

    pub fn start_member(&mut self, property: &PropertyName, multi_item: bool) {
        let index = self.store.intern_property(property);
        let record = if multi_item {
            tag::START_MULTI_MEMBER
        } else {
            tag::START_MEMBER
        };
        self.nodes.symbol(record, index);
    }

    pub fn end_member(&mut self) {
        self.nodes.simple(tag::END_MEMBER);
    }

    pub fn end_of_attributes(&mut self) {
        self.nodes.simple(tag::END_OF_ATTRIBUTES);
    }

    pub fn text(&mut self, text: &str) {
        let index = self.store.intern_string(text);
        self.nodes.text(index);
    }

    pub fn value(&mut self, value: &Value) {
        let string = match value {
            Value::String(text) => self.store.intern_string(text.as_str()),
            _ => 0,
        };
        self.nodes.value(value, string);
    }

    /// Moves the source position, choosing the shortest record that encodes
    /// it. Ignored when line info is disabled.
    pub fn line_info(&mut self, line: u32, column: u32) {
        if !self.options.emit_line_info {
            return;
        }
        let next = LineInfo::new(line, column);
        let record = match self.line {
            Some(previous) if previous == next => return,
            Some(previous) => delta_record(previous, next),
            None => None,
        };
        self.nodes
            .line(record.unwrap_or(LineRecord::Absolute { line, column }));
        self.line = Some(next);
    }

    /// Writes a line record verbatim.
    pub fn line_record(&mut self, record: LineRecord) {
        let mut line = self.line.unwrap_or_default();
        match record {
            LineRecord::Absolute { line: l, column } => line = LineInfo::new(l, column),
            LineRecord::Delta { line: dl, column } => line.apply_delta(dl, column),
        }
        self.nodes.line(record);
        self.line = Some(line);
    }

    /// Appends the end-of-stream record and writes the whole file to `out`.
    pub fn finish_into<W: Write + ?Sized>(
        mut self,
        out: &mut W,
        hash: &[u8; HASH_LEN],
    ) -> Result<(), FormatError> {
        self.nodes.simple(tag::END_OF_STREAM);
        let mut metadata = Vec::new();
        self.store.write_metadata(&mut metadata, hash)?;
        write_preamble(out, metadata.len(), self.nodes.len())?;
        out.write_all(&metadata)?;
        out.write_all(self.nodes.bytes())?;
        tracing::debug!(
            version = %self.options.version,
            metadata = metadata.len(),
            nodes = self.nodes.len(),
            "finished compiled markup"
        );
        Ok(())
    }

    pub fn finish(self, hash: &[u8; HASH_LEN]) -> Result<Vec<u8>, FormatError> {
        let mut out = Vec::new();
        self.finish_into(&mut out, hash)?;
        Ok(out)
    }
}

fn delta_record(previous: LineInfo, next: LineInfo) -> Option<LineRecord> {
    if next.line == previous.line {
        let column = i64::from(next.column) - i64::from(previous.column);
        return i16::try_from(column)
            .ok()
            .map(|column| LineRecord::Delta { line: 0, column });
    }
    if next.line < previous.line {
        return None;
    }
    let line = i16::try_from(next.line - previous.line).ok()?;
    let column = i16::try_from(next.column).ok()?;
    Some(LineRecord::Delta { line, column })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    #[case(LineInfo::new(9, 0), LineInfo::new(9, 4), Some(LineRecord::Delta { line: 0, column: 4 }))]
    #[case(LineInfo::new(9, 4), LineInfo::new(11, 7), Some(LineRecord::Delta { line: 2, column: 7 }))]
    #[case(LineInfo::new(9, 4), LineInfo::new(9, 1), Some(LineRecord::Delta { line: 0, column: -3 }))]
    #[case(LineInfo::new(9, 4), LineInfo::new(3, 1), None)]
    #[case(LineInfo::new(1, 0), LineInfo::new(2, 40_000), None)]
    #[case(LineInfo::new(1, 0), LineInfo::new(70_000, 0), None)]
    fn test_delta_record(
        #[case] previous: LineInfo,
        #[case] next: LineInfo,
        #[case] expected: Option<LineRecord>,
    ) {
        assert_eq!(delta_record(previous, next), expected);
    }

    #[rstest::rstest]
    fn test_line_info_can_be_disabled() {
        let mut enabled = XbfWriter::new(WriteOptions::default());
        enabled.line_info(1, 1);
        let mut disabled = XbfWriter::new(WriteOptions::new().with_line_info(false));
        disabled.line_info(1, 1);
        assert_eq!(enabled.nodes.len(), 9);
        assert_eq!(disabled.nodes.len(), 0);
    }

    #[rstest::rstest]
    fn test_repeated_position_is_not_written() {
        let mut writer = XbfWriter::new(WriteOptions::default());
        writer.line_info(3, 2);
        writer.line_info(3, 2);
        assert_eq!(writer.nodes.len(), 9);
    }

    #[rstest::rstest]
    fn test_finish_lays_out_sections() {
        let writer = XbfWriter::new(WriteOptions::new().with_version(FormatVersion::V1));
        let bytes = writer.finish(&[0; HASH_LEN]).unwrap();
        let sections = crate::format::split_sections(&bytes).unwrap();
        assert_eq!(sections.nodes.len(), 1);
        assert_eq!(bytes[sections.nodes.start], tag::END_OF_STREAM);
        assert_eq!(sections.nodes.end, bytes.len());
    }
}
