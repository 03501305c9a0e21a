use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Serialize, Serializer};
use smol_str::SmolStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// String handle shared by every table entry and token.
///
/// `View` borrows a range of a backing buffer that is kept alive by shared
/// ownership; `Owned` is an independent copy. Callers never need to know
/// which one they hold.
#[derive(Clone)]
pub enum XbfStr {
    View { buffer: Arc<[u8]>, span: Span },
    Owned(SmolStr),
}

impl XbfStr {
    pub fn owned(value: impl Into<SmolStr>) -> Self {
        XbfStr::Owned(value.into())
    }

    /// Creates a view, validating the range once.
    pub fn view(buffer: Arc<[u8]>, span: Span) -> Option<Self> {
        let bytes = buffer.get(span.start..span.end)?;
        std::str::from_utf8(bytes).ok()?;
        Some(XbfStr::View { buffer, span })
    }

    pub fn as_str(&self) -> &str {
        match self {
            XbfStr::View { buffer, span } => {
                // Validated in `view`, the buffer is immutable behind the Arc.
                std::str::from_utf8(&buffer[span.start..span.end]).unwrap_or_default()
            }
            XbfStr::Owned(value) => value.as_str(),
        }
    }

    pub fn is_view(&self) -> bool {
        matches!(self, XbfStr::View { .. })
    }

    pub fn len(&self) -> usize {
        match self {
            XbfStr::View { span, .. } => span.len(),
            XbfStr::Owned(value) => value.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detaches the string from any backing buffer.
    pub fn to_owned_str(&self) -> SmolStr {
        match self {
            XbfStr::View { .. } => SmolStr::new(self.as_str()),
            XbfStr::Owned(value) => value.clone(),
        }
    }

    /// Identity of the backing buffer, if this is a view.
    pub fn buffer(&self) -> Option<&Arc<[u8]>> {
        match self {
            XbfStr::View { buffer, .. } => Some(buffer),
            XbfStr::Owned(_) => None,
        }
    }
}

impl Default for XbfStr {
    fn default() -> Self {
        XbfStr::Owned(SmolStr::default())
    }
}

impl fmt::Debug for XbfStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for XbfStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq for XbfStr {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for XbfStr {}

impl PartialEq<str> for XbfStr {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for XbfStr {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl Hash for XbfStr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl Borrow<str> for XbfStr {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for XbfStr {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for XbfStr {
    fn from(value: &str) -> Self {
        XbfStr::owned(value)
    }
}

impl From<String> for XbfStr {
    fn from(value: String) -> Self {
        XbfStr::owned(value)
    }
}

impl Serialize for XbfStr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
