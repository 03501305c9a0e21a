use std::fmt;

use thiserror::Error;

use crate::decode::validation::{Production, Terminal};
use crate::format::{FormatVersion, TableKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct Location {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A token sequence that is not derivable from the markup grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "grammar violation in {production} at {location}: expected {}, found {found}",
    join_terminals(.expected)
)]
pub struct GrammarViolation {
    pub production: Production,
    pub expected: Vec<Terminal>,
    pub found: Terminal,
    pub location: Location,
}

fn join_terminals(terminals: &[Terminal]) -> String {
    if terminals.is_empty() {
        return "nothing".to_string();
    }
    let mut out = String::new();
    for (idx, terminal) in terminals.iter().enumerate() {
        if idx > 0 {
            out.push_str(" | ");
        }
        out.push_str(terminal.name());
    }
    out
}

/// Failures raised while loading or decoding a compiled binary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("missing XBF magic")]
    BadMagic,

    #[error("unsupported format version {0}")]
    UnsupportedVersion(FormatVersion),

    #[error("{table} table starts at offset {actual}, header records {expected}")]
    OffsetMismatch {
        table: TableKind,
        expected: u64,
        actual: u64,
    },

    #[error("failed to deserialize {context} at byte {offset}: {reason}")]
    Deserialization {
        context: String,
        offset: usize,
        reason: String,
    },

    #[error("{table} index {index} out of range ({len} entries)")]
    IndexOutOfRange {
        table: TableKind,
        index: u32,
        len: usize,
    },

    #[error("trusted {table} index {index} outside the stable range of {count}")]
    OutOfRange {
        table: TableKind,
        index: u32,
        count: u32,
    },

    #[error("unable to resolve {table} entry '{name}'")]
    UnresolvedSymbol { table: TableKind, name: String },

    #[error("node stream truncated at byte {offset}")]
    TruncatedStream { offset: usize },

    #[error(transparent)]
    Grammar(#[from] GrammarViolation),

    #[error("i/o failure: {0}")]
    Io(String),
}

impl FormatError {
    pub fn deserialization(
        context: impl Into<String>,
        offset: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self::Deserialization {
            context: context.into(),
            offset,
            reason: reason.into(),
        }
    }

    /// Rewrites a truncation inside a metadata table into a deserialization
    /// failure that names the table.
    pub(crate) fn in_table(self, table: TableKind) -> Self {
        match self {
            Self::TruncatedStream { offset } => {
                Self::deserialization(table.name(), offset, "unexpected end of data")
            }
            Self::Deserialization {
                offset, reason, ..
            } => Self::deserialization(table.name(), offset, reason),
            other => other,
        }
    }

    /// Whether a caller may fall back to another source for the same markup.
    /// Lookups that fail against already-validated tables are not.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::IndexOutOfRange { .. } | Self::UnresolvedSymbol { .. }
        )
    }

    pub fn table(&self) -> Option<TableKind> {
        match self {
            Self::OffsetMismatch { table, .. }
            | Self::IndexOutOfRange { table, .. }
            | Self::OutOfRange { table, .. }
            | Self::UnresolvedSymbol { table, .. } => Some(*table),
            _ => None,
        }
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            Self::Grammar(violation) => Some(violation.location),
            Self::Deserialization { offset, .. } | Self::TruncatedStream { offset } => {
                Some(Location {
                    offset: *offset,
                    ..Location::default()
                })
            }
            _ => None,
        }
    }
}

impl From<std::io::Error> for FormatError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Failures surfaced by the reader cache and the text fallback path.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("markup text parse failed: {message}")]
    Text {
        message: String,
        location: Option<Location>,
    },

    #[error("no markup content available for '{0}'")]
    NoContent(String),

    #[error("invalid token script: {0}")]
    Script(#[from] serde_json::Error),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn text(message: impl Into<String>) -> Self {
        Self::Text {
            message: message.into(),
            location: None,
        }
    }

    pub fn text_at(message: impl Into<String>, location: Location) -> Self {
        Self::Text {
            message: message.into(),
            location: Some(location),
        }
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            Self::Format(err) => err.location(),
            Self::Text { location, .. } => *location,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    fn test_in_table_rewrites_truncation() {
        let err = FormatError::TruncatedStream { offset: 12 }.in_table(TableKind::Types);
        assert_eq!(
            err,
            FormatError::deserialization("type", 12, "unexpected end of data")
        );
    }

    #[rstest::rstest]
    fn test_in_table_keeps_other_errors() {
        let err = FormatError::BadMagic.in_table(TableKind::Strings);
        assert_eq!(err, FormatError::BadMagic);
    }

    #[rstest::rstest]
    #[case(FormatError::BadMagic, true)]
    #[case(FormatError::TruncatedStream { offset: 3 }, true)]
    #[case(FormatError::OffsetMismatch { table: TableKind::Types, expected: 8, actual: 4 }, true)]
    #[case(FormatError::IndexOutOfRange { table: TableKind::Strings, index: 9, len: 2 }, false)]
    #[case(FormatError::UnresolvedSymbol { table: TableKind::Types, name: "Grid".into() }, false)]
    fn test_recoverable(#[case] err: FormatError, #[case] expected: bool) {
        assert_eq!(err.is_recoverable(), expected);
    }

    #[rstest::rstest]
    fn test_grammar_violation_message() {
        let violation = GrammarViolation {
            production: Production::Element,
            expected: vec![Terminal::EndObject, Terminal::StartSingleItemProp],
            found: Terminal::EndProp,
            location: Location {
                offset: 0,
                line: 3,
                column: 7,
            },
        };
        let message = FormatError::from(violation).to_string();
        assert!(message.contains("Element"), "{message}");
        assert!(message.contains("EndObject | StartSingleItemProp"), "{message}");
        assert!(message.contains("line 3, column 7"), "{message}");
    }
}
