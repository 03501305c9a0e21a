//! LL(1) check of a token stream against the markup grammar.
//!
//! ```text
//! Document       := Element
//! Element        := [Namespace]* [StartObject] DirectiveProps Property* [EndOfAttrs] Property* [EndObject]
//! DirectiveProps := (UidDirective | NameDirective | Directive)? Directive*
//! Property       := [StartMultiItemProp] PropContent* [EndProp]
//!                 | [StartSingleItemProp] PropContent? [EndProp]
//! PropContent    := Element | [Text] | [Value]
//! ```
//!
//! `EndOfAttrs` is accepted anywhere and never touches the stack, so the two
//! property runs of `Element` collapse into one.

use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use smallvec::SmallVec;

use crate::error::{FormatError, GrammarViolation, Location};
use crate::report::{report_format_error, ErrorReporter};
use crate::schema::DirectiveKind;
use crate::token::{LineInfo, Node, Token, TokenSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Terminal {
    Namespace,
    StartObject,
    EndObject,
    StartUidDirective,
    StartNameDirective,
    StartDirective,
    StartSingleItemProp,
    StartMultiItemProp,
    EndProp,
    Text,
    Value,
    EndOfAttrs,
    EndOfStream,
}

impl Terminal {
    pub fn name(self) -> &'static str {
        match self {
            Terminal::Namespace => "Namespace",
            Terminal::StartObject => "StartObject",
            Terminal::EndObject => "EndObject",
            Terminal::StartUidDirective => "StartUidDirective",
            Terminal::StartNameDirective => "StartNameDirective",
            Terminal::StartDirective => "StartDirective",
            Terminal::StartSingleItemProp => "StartSingleItemProp",
            Terminal::StartMultiItemProp => "StartMultiItemProp",
            Terminal::EndProp => "EndProp",
            Terminal::Text => "Text",
            Terminal::Value => "Value",
            Terminal::EndOfAttrs => "EndOfAttrs",
            Terminal::EndOfStream => "EndOfStream",
        }
    }

    pub fn of(token: &Token) -> Self {
        match token {
            Token::Namespace { .. } => Terminal::Namespace,
            Token::StartObject(_) => Terminal::StartObject,
            Token::EndObject => Terminal::EndObject,
            Token::StartMember {
                property,
                multi_item,
            } => match (property.directive, *multi_item) {
                (Some(DirectiveKind::Uid), _) => Terminal::StartUidDirective,
                (Some(DirectiveKind::Name), _) => Terminal::StartNameDirective,
                (Some(_), _) => Terminal::StartDirective,
                (None, true) => Terminal::StartMultiItemProp,
                (None, false) => Terminal::StartSingleItemProp,
            },
            Token::EndMember => Terminal::EndProp,
            Token::EndOfAttributes => Terminal::EndOfAttrs,
            Token::Text(_) => Terminal::Text,
            Token::Value(_) => Terminal::Value,
            Token::EndOfStream => Terminal::EndOfStream,
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Nonterminals of the grammar, used to name the rule a violation broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Production {
    Document,
    Element,
    NamespaceList,
    DirectiveProps,
    LeadingDirective,
    DirectiveList,
    UidDirective,
    NameDirective,
    Directive,
    PropertyList,
    Property,
    ContentList,
    OptionalContent,
    PropContent,
}

impl fmt::Display for Production {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Symbol {
    T(Terminal),
    N(Production),
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    symbol: Symbol,
    /// Production whose expansion pushed this entry.
    origin: Production,
}

use Symbol::{N, T};

const ELEMENT_FIRST: &[Terminal] = &[Terminal::Namespace, Terminal::StartObject];

/// Right-hand side chosen for `production` on `lookahead`, if any.
fn expand(production: Production, lookahead: Terminal) -> Option<&'static [Symbol]> {
    use Production as P;
    use Terminal as Tm;
    let rhs: &'static [Symbol] = match (production, lookahead) {
        (P::Document, Tm::Namespace | Tm::StartObject) => &[N(P::Element)],
        (P::Element, Tm::Namespace | Tm::StartObject) => &[
            N(P::NamespaceList),
            T(Tm::StartObject),
            N(P::DirectiveProps),
            N(P::PropertyList),
            T(Tm::EndObject),
        ],
        (P::NamespaceList, Tm::Namespace) => &[T(Tm::Namespace), N(P::NamespaceList)],
        (P::DirectiveProps, _) => &[N(P::LeadingDirective), N(P::DirectiveList)],
        (P::LeadingDirective, Tm::StartUidDirective) => &[N(P::UidDirective)],
        (P::LeadingDirective, Tm::StartNameDirective) => &[N(P::NameDirective)],
        (P::LeadingDirective, Tm::StartDirective) => &[N(P::Directive)],
        (P::DirectiveList, Tm::StartDirective) => &[N(P::Directive), N(P::DirectiveList)],
        (P::UidDirective, Tm::StartUidDirective) => &[
            T(Tm::StartUidDirective),
            N(P::OptionalContent),
            T(Tm::EndProp),
        ],
        (P::NameDirective, Tm::StartNameDirective) => &[
            T(Tm::StartNameDirective),
            N(P::OptionalContent),
            T(Tm::EndProp),
        ],
        (P::Directive, Tm::StartDirective) => &[
            T(Tm::StartDirective),
            N(P::OptionalContent),
            T(Tm::EndProp),
        ],
        (P::PropertyList, Tm::StartSingleItemProp | Tm::StartMultiItemProp) => {
            &[N(P::Property), N(P::PropertyList)]
        }
        (P::Property, Tm::StartMultiItemProp) => &[
            T(Tm::StartMultiItemProp),
            N(P::ContentList),
            T(Tm::EndProp),
        ],
        (P::Property, Tm::StartSingleItemProp) => &[
            T(Tm::StartSingleItemProp),
            N(P::OptionalContent),
            T(Tm::EndProp),
        ],
        (P::ContentList, Tm::Namespace | Tm::StartObject | Tm::Text | Tm::Value) => {
            &[N(P::PropContent), N(P::ContentList)]
        }
        (P::OptionalContent, Tm::Namespace | Tm::StartObject | Tm::Text | Tm::Value) => {
            &[N(P::PropContent)]
        }
        (P::PropContent, Tm::Namespace | Tm::StartObject) => &[N(P::Element)],
        (P::PropContent, Tm::Text) => &[T(Tm::Text)],
        (P::PropContent, Tm::Value) => &[T(Tm::Value)],
        _ => return None,
    };
    Some(rhs)
}

/// Lookaheads on which a nullable production derives the empty string.
fn follow(production: Production) -> &'static [Terminal] {
    use Terminal as Tm;
    match production {
        Production::NamespaceList => &[Tm::StartObject],
        Production::LeadingDirective => &[
            Tm::StartDirective,
            Tm::StartSingleItemProp,
            Tm::StartMultiItemProp,
            Tm::EndObject,
        ],
        Production::DirectiveList => {
            &[Tm::StartSingleItemProp, Tm::StartMultiItemProp, Tm::EndObject]
        }
        Production::PropertyList => &[Tm::EndObject],
        Production::ContentList | Production::OptionalContent => &[Tm::EndProp],
        _ => &[],
    }
}

fn first(production: Production) -> Vec<Terminal> {
    use Terminal as Tm;
    let mut terminals = match production {
        Production::Document | Production::Element => ELEMENT_FIRST.to_vec(),
        Production::NamespaceList => vec![Tm::Namespace],
        Production::DirectiveProps => first(Production::LeadingDirective),
        Production::LeadingDirective => vec![
            Tm::StartUidDirective,
            Tm::StartNameDirective,
            Tm::StartDirective,
        ],
        Production::DirectiveList | Production::Directive => vec![Tm::StartDirective],
        Production::UidDirective => vec![Tm::StartUidDirective],
        Production::NameDirective => vec![Tm::StartNameDirective],
        Production::PropertyList | Production::Property => {
            vec![Tm::StartSingleItemProp, Tm::StartMultiItemProp]
        }
        Production::ContentList | Production::OptionalContent | Production::PropContent => {
            vec![Tm::Namespace, Tm::StartObject, Tm::Text, Tm::Value]
        }
    };
    for terminal in follow(production) {
        if !terminals.contains(terminal) {
            terminals.push(*terminal);
        }
    }
    terminals
}

/// Wraps a token producer and rejects any sequence the grammar cannot
/// derive. Tokens pass through unchanged.
pub struct GrammarValidator<S: TokenSource> {
    inner: S,
    stack: SmallVec<[Entry; 16]>,
    reporter: Option<Rc<dyn ErrorReporter>>,
}

impl<S: TokenSource> GrammarValidator<S> {
    pub fn new(inner: S) -> Self {
        let mut stack = SmallVec::new();
        stack.push(Entry {
            symbol: T(Terminal::EndOfStream),
            origin: Production::Document,
        });
        stack.push(Entry {
            symbol: N(Production::Document),
            origin: Production::Document,
        });
        Self {
            inner,
            stack,
            reporter: None,
        }
    }

    pub fn with_reporter(mut self, reporter: Rc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Number of pending grammar symbols.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn step(&mut self, found: Terminal, line: LineInfo) -> Result<(), FormatError> {
        if found == Terminal::EndOfAttrs {
            return Ok(());
        }
        loop {
            let Some(top) = self.stack.pop() else {
                return Err(violation(Production::Document, Vec::new(), found, line));
            };
            match top.symbol {
                T(expected) if expected == found => return Ok(()),
                T(expected) => return Err(violation(top.origin, vec![expected], found, line)),
                N(production) => {
                    if let Some(rhs) = expand(production, found) {
                        self.stack.extend(rhs.iter().rev().map(|symbol| Entry {
                            symbol: *symbol,
                            origin: production,
                        }));
                    } else if !follow(production).contains(&found) {
                        return Err(violation(production, first(production), found, line));
                    }
                    tracing::trace!(%production, %found, depth = self.stack.len(), "expanded");
                }
            }
        }
    }

    fn finish(&self) -> Result<(), FormatError> {
        match self.stack.as_slice() {
            [] => Ok(()),
            [Entry {
                symbol: T(Terminal::EndOfStream),
                ..
            }] => Ok(()),
            [.., top] => {
                let expected = match top.symbol {
                    T(terminal) => vec![terminal],
                    N(production) => first(production),
                };
                let line = self.inner.current().line;
                Err(violation(top.origin, expected, Terminal::EndOfStream, line))
            }
        }
    }
}

fn violation(
    production: Production,
    expected: Vec<Terminal>,
    found: Terminal,
    line: LineInfo,
) -> FormatError {
    FormatError::Grammar(GrammarViolation {
        production,
        expected,
        found,
        location: Location {
            offset: 0,
            line: line.line as usize,
            column: line.column as usize,
        },
    })
}

impl<S: TokenSource> GrammarValidator<S> {
    fn advance(&mut self) -> Result<bool, FormatError> {
        if !self.inner.read()? {
            self.finish()?;
            return Ok(false);
        }
        let node = self.inner.current();
        let (found, line) = (Terminal::of(&node.token), node.line);
        self.step(found, line)?;
        Ok(true)
    }
}

impl<S: TokenSource> TokenSource for GrammarValidator<S> {
    fn read(&mut self) -> Result<bool, FormatError> {
        let result = self.advance();
        if let (Err(err @ FormatError::Grammar(_)), Some(reporter)) = (&result, &self.reporter) {
            tracing::debug!(error = %err, "grammar violation");
            report_format_error(reporter.as_ref(), err);
        }
        result
    }

    fn current(&self) -> &Node {
        self.inner.current()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::schema::{Resolution, XamlProperty, XamlType};
    use crate::tables::{SymbolFlags, SymbolIndex};
    use crate::token::TokenList;

    fn object() -> Token {
        Token::StartObject(Rc::new(XamlType {
            index: SymbolIndex::Stable(5),
            flags: SymbolFlags::NONE,
            name: "Grid".into(),
            namespace: None,
            resolution: Resolution::Unknown,
        }))
    }

    fn member(directive: Option<DirectiveKind>, multi_item: bool) -> Token {
        Token::StartMember {
            property: Rc::new(XamlProperty {
                index: SymbolIndex::Table(0),
                flags: if directive.is_some() {
                    SymbolFlags::DIRECTIVE
                } else {
                    SymbolFlags::NONE
                },
                name: "Member".into(),
                declaring_type: None,
                resolution: Resolution::Unknown,
                directive,
            }),
            multi_item,
        }
    }

    fn single() -> Token {
        member(None, false)
    }

    fn multi() -> Token {
        member(None, true)
    }

    fn directive(kind: DirectiveKind) -> Token {
        member(Some(kind), false)
    }

    fn validate(tokens: Vec<Token>) -> Result<usize, FormatError> {
        let mut list = TokenList::new();
        for (column, token) in tokens.into_iter().enumerate() {
            list.push(Node::new(token, LineInfo::new(1, column as u32)));
        }
        let mut validator = GrammarValidator::new(Rc::new(list).reader());
        let mut count = 0;
        while validator.read()? {
            count += 1;
        }
        Ok(count)
    }

    fn production_of(err: FormatError) -> Production {
        match err {
            FormatError::Grammar(violation) => violation.production,
            other => panic!("expected grammar violation, got {other}"),
        }
    }

    #[rstest::rstest]
    fn test_accepts_single_item_property() {
        let tokens = vec![object(), single(), Token::EndMember, Token::EndObject, Token::EndOfStream];
        assert_eq!(validate(tokens).unwrap(), 5);
    }

    #[rstest::rstest]
    fn test_rejects_unmatched_end_prop() {
        let tokens = vec![object(), Token::EndMember, Token::EndObject, Token::EndOfStream];
        let err = validate(tokens).unwrap_err();
        let FormatError::Grammar(violation) = &err else {
            panic!("expected grammar violation, got {err}");
        };
        assert_eq!(violation.found, Terminal::EndProp);
        assert_eq!(violation.location.column, 1);
        assert_eq!(violation.production, Production::LeadingDirective);
    }

    #[rstest::rstest]
    fn test_accepts_nested_content_and_directives() {
        let tokens = vec![
            Token::Namespace {
                prefix: "".into(),
                namespace: Rc::new(crate::schema::XmlNamespace {
                    index: 0,
                    uri: "urn:test".into(),
                    handle: None,
                }),
            },
            object(),
            directive(DirectiveKind::Uid),
            Token::Text("uid".into()),
            Token::EndMember,
            directive(DirectiveKind::Key),
            Token::Text("key".into()),
            Token::EndMember,
            single(),
            Token::Value(crate::token::Value::Int(3)),
            Token::EndMember,
            Token::EndOfAttributes,
            multi(),
            object(),
            Token::EndObject,
            Token::Text("tail".into()),
            object(),
            Token::EndOfAttributes,
            Token::EndObject,
            Token::EndMember,
            Token::EndObject,
            Token::EndOfStream,
        ];
        assert_eq!(validate(tokens).unwrap(), 22);
    }

    #[rstest::rstest]
    fn test_uid_must_lead() {
        let tokens = vec![
            object(),
            directive(DirectiveKind::Key),
            Token::EndMember,
            directive(DirectiveKind::Uid),
            Token::EndMember,
            Token::EndObject,
            Token::EndOfStream,
        ];
        assert_eq!(
            production_of(validate(tokens).unwrap_err()),
            Production::DirectiveList
        );
    }

    #[rstest::rstest]
    fn test_single_item_rejects_second_item() {
        let tokens = vec![
            object(),
            single(),
            Token::Text("a".into()),
            Token::Text("b".into()),
            Token::EndMember,
            Token::EndObject,
            Token::EndOfStream,
        ];
        assert_eq!(
            production_of(validate(tokens).unwrap_err()),
            Production::Property
        );
    }

    #[rstest::rstest]
    fn test_end_of_attributes_anywhere() {
        let tokens = vec![
            Token::EndOfAttributes,
            object(),
            Token::EndOfAttributes,
            Token::EndOfAttributes,
            Token::EndObject,
            Token::EndOfStream,
        ];
        assert_eq!(validate(tokens).unwrap(), 6);
    }

    #[rstest::rstest]
    fn test_truncated_stream_is_violation() {
        let tokens = vec![object(), single(), Token::EndMember];
        let err = validate(tokens).unwrap_err();
        let FormatError::Grammar(violation) = err else {
            panic!("expected grammar violation");
        };
        assert_eq!(violation.found, Terminal::EndOfStream);
        assert!(violation.expected.contains(&Terminal::EndObject));
    }

    #[rstest::rstest]
    fn test_missing_end_of_stream_token_is_tolerated() {
        let tokens = vec![object(), Token::EndObject];
        assert_eq!(validate(tokens).unwrap(), 2);
    }

    #[rstest::rstest]
    fn test_tokens_after_end_of_stream() {
        let tokens = vec![object(), Token::EndObject, Token::EndOfStream, Token::EndObject];
        assert_eq!(
            production_of(validate(tokens).unwrap_err()),
            Production::Document
        );
    }

    #[rstest::rstest]
    fn test_empty_document_is_rejected() {
        let err = validate(vec![Token::EndOfStream]).unwrap_err();
        assert_eq!(production_of(err), Production::Document);
    }
}
