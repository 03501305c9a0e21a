//! Error reporting collaborator.
//!
//! Every failure a reader observes is also surfaced here as an error code
//! plus up to two textual parameters, independent of how it is propagated.

use std::cell::RefCell;
use std::fmt;

use serde::Serialize;
use smol_str::SmolStr;

use crate::constants::NULL_PARAMETER;
use crate::error::{Error, FormatError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    BadMagic,
    UnsupportedVersion,
    OffsetMismatch,
    Deserialization,
    IndexOutOfRange,
    OutOfRange,
    UnresolvedSymbol,
    TruncatedStream,
    GrammarViolation,
    Io,
    TextParse,
    NoContent,
}

impl ErrorCode {
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::BadMagic => "BadMagic",
            ErrorCode::UnsupportedVersion => "UnsupportedVersion",
            ErrorCode::OffsetMismatch => "OffsetMismatch",
            ErrorCode::Deserialization => "DeserializationFailure",
            ErrorCode::IndexOutOfRange => "IndexOutOfRange",
            ErrorCode::OutOfRange => "OutOfRange",
            ErrorCode::UnresolvedSymbol => "UnresolvedSymbol",
            ErrorCode::TruncatedStream => "TruncatedStream",
            ErrorCode::GrammarViolation => "GrammarViolation",
            ErrorCode::Io => "Io",
            ErrorCode::TextParse => "TextParse",
            ErrorCode::NoContent => "NoContent",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&FormatError> for ErrorCode {
    fn from(err: &FormatError) -> Self {
        match err {
            FormatError::BadMagic => ErrorCode::BadMagic,
            FormatError::UnsupportedVersion(_) => ErrorCode::UnsupportedVersion,
            FormatError::OffsetMismatch { .. } => ErrorCode::OffsetMismatch,
            FormatError::Deserialization { .. } => ErrorCode::Deserialization,
            FormatError::IndexOutOfRange { .. } => ErrorCode::IndexOutOfRange,
            FormatError::OutOfRange { .. } => ErrorCode::OutOfRange,
            FormatError::UnresolvedSymbol { .. } => ErrorCode::UnresolvedSymbol,
            FormatError::TruncatedStream { .. } => ErrorCode::TruncatedStream,
            FormatError::Grammar(_) => ErrorCode::GrammarViolation,
            FormatError::Io(_) => ErrorCode::Io,
        }
    }
}

impl From<&Error> for ErrorCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::Format(err) => err.into(),
            Error::Text { .. } | Error::Script(_) => ErrorCode::TextParse,
            Error::NoContent(_) => ErrorCode::NoContent,
            Error::Io(_) => ErrorCode::Io,
        }
    }
}

pub trait ErrorReporter {
    /// Absent parameters arrive as the literal `"null"`.
    fn report(&self, code: ErrorCode, params: [&str; 2]);
}

/// Reports with absent parameters replaced by the null marker.
pub fn report(
    reporter: &dyn ErrorReporter,
    code: ErrorCode,
    first: Option<&str>,
    second: Option<&str>,
) {
    reporter.report(
        code,
        [
            first.unwrap_or(NULL_PARAMETER),
            second.unwrap_or(NULL_PARAMETER),
        ],
    );
}

/// Reports a format error: the first parameter names the table or context
/// it occurred in, the second carries the message.
pub fn report_format_error(reporter: &dyn ErrorReporter, err: &FormatError) {
    let context = match err {
        FormatError::Deserialization { context, .. } => Some(context.as_str()),
        other => other.table().map(|table| table.name()),
    };
    let message = err.to_string();
    report(reporter, err.into(), context, Some(&message));
}

pub fn report_error(reporter: &dyn ErrorReporter, err: &Error) {
    match err {
        Error::Format(err) => report_format_error(reporter, err),
        Error::NoContent(uri) => report(reporter, err.into(), Some(uri), None),
        other => {
            let message = other.to_string();
            report(reporter, other.into(), None, Some(&message));
        }
    }
}

/// Forwards reports to `tracing` at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, code: ErrorCode, params: [&str; 2]) {
        tracing::warn!(
            code = %code,
            param1 = params[0],
            param2 = params[1],
            "xbf error reported"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub code: ErrorCode,
    pub params: [SmolStr; 2],
}

/// Keeps every report in memory, in order.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: RefCell<Vec<Report>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.borrow().clone()
    }

    pub fn take(&self) -> Vec<Report> {
        std::mem::take(&mut *self.reports.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.reports.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.borrow().is_empty()
    }

    pub fn contains(&self, code: ErrorCode) -> bool {
        self.reports.borrow().iter().any(|report| report.code == code)
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, code: ErrorCode, params: [&str; 2]) {
        self.reports.borrow_mut().push(Report {
            code,
            params: [SmolStr::new(params[0]), SmolStr::new(params[1])],
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::TableKind;

    #[rstest::rstest]
    fn test_absent_parameters_become_null() {
        let reporter = CollectingReporter::new();
        report(&reporter, ErrorCode::NoContent, None, Some("page.xaml"));
        let reports = reporter.take();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].params[0], "null");
        assert_eq!(reports[0].params[1], "page.xaml");
        assert!(reporter.is_empty());
    }

    #[rstest::rstest]
    fn test_format_error_names_table() {
        let reporter = CollectingReporter::new();
        let err = FormatError::OffsetMismatch {
            table: TableKind::Properties,
            expected: 40,
            actual: 36,
        };
        report_format_error(&reporter, &err);
        let reports = reporter.reports();
        assert_eq!(reports[0].code, ErrorCode::OffsetMismatch);
        assert_eq!(reports[0].params[0], "property");
    }

    #[rstest::rstest]
    fn test_truncation_has_no_table() {
        let reporter = CollectingReporter::new();
        report_format_error(&reporter, &FormatError::TruncatedStream { offset: 7 });
        assert!(reporter.contains(ErrorCode::TruncatedStream));
        assert_eq!(reporter.reports()[0].params[0], "null");
    }
}
