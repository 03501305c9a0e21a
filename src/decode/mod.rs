pub mod metadata;
pub mod node;
pub mod validation;

use std::rc::Rc;
use std::sync::Arc;

use crate::error::FormatError;
use crate::format::split_sections;
use crate::options::LoadOptions;
use crate::report::{report_format_error, ErrorReporter, TracingReporter};
use crate::schema::SchemaResolver;
use crate::token::{TokenList, TokenSource};

pub use metadata::MetadataReader;
pub use node::NodeStreamReader;
pub use validation::{GrammarValidator, Production, Terminal};

/// Collaborators every reader resolves and reports through.
#[derive(Clone)]
pub struct ReaderContext {
    pub schema: Rc<dyn SchemaResolver>,
    pub reporter: Rc<dyn ErrorReporter>,
}

impl ReaderContext {
    pub fn new(schema: Rc<dyn SchemaResolver>) -> Self {
        Self {
            schema,
            reporter: Rc::new(TracingReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Rc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }
}

impl std::fmt::Debug for ReaderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderContext").finish_non_exhaustive()
    }
}

/// Reports an internal-consistency failure and aborts.
///
/// Reached only when a binary that passed load-time validation refers to a
/// symbol its schema cannot produce.
pub(crate) fn fail_fast(reporter: &dyn ErrorReporter, err: &FormatError) -> ! {
    report_format_error(reporter, err);
    tracing::error!(error = %err, "compiled markup is inconsistent with its schema");
    panic!("compiled markup is inconsistent with its schema: {err}")
}

/// Loads the metadata of a complete compiled file and positions a node
/// reader at the start of its node stream.
pub fn open(
    buffer: Arc<[u8]>,
    ctx: &ReaderContext,
    options: &LoadOptions,
) -> Result<NodeStreamReader, FormatError> {
    let sections = split_sections(&buffer).map_err(|err| {
        report_format_error(ctx.reporter.as_ref(), &err);
        err
    })?;
    let metadata = MetadataReader::load(buffer, sections.metadata, ctx, options)?;
    Ok(NodeStreamReader::new(Rc::new(metadata), sections.nodes))
}

/// Like [`open`], wrapped in a [`GrammarValidator`] when the options ask
/// for one.
pub fn reader(
    buffer: Arc<[u8]>,
    ctx: &ReaderContext,
    options: &LoadOptions,
) -> Result<Box<dyn TokenSource>, FormatError> {
    let nodes = open(buffer, ctx, options)?;
    if options.validate_grammar {
        Ok(Box::new(
            GrammarValidator::new(nodes).with_reporter(Rc::clone(&ctx.reporter)),
        ))
    } else {
        Ok(Box::new(nodes))
    }
}

/// Decodes a whole file into a replayable token list.
pub fn decode(
    buffer: Arc<[u8]>,
    ctx: &ReaderContext,
    options: &LoadOptions,
) -> Result<TokenList, FormatError> {
    let mut source = reader(buffer, ctx, options)?;
    TokenList::capture(&mut source)
}

/// Decodes and grammar-checks a whole file, returning the token count.
pub fn validate(
    buffer: Arc<[u8]>,
    ctx: &ReaderContext,
    options: &LoadOptions,
) -> Result<usize, FormatError> {
    let options = options.clone().with_validate_grammar(true);
    let mut source = reader(buffer, ctx, &options)?;
    let mut count = 0;
    while source.read()? {
        count += 1;
    }
    Ok(count)
}
