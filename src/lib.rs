pub mod batch;
pub mod cache;
pub mod constants;
pub mod decode;
pub mod encode;
pub mod error;
pub mod format;
pub mod options;
pub mod report;
pub mod schema;
pub mod stable;
pub mod tables;
pub mod text;
pub mod token;

use std::sync::Arc;

pub use crate::cache::{MarkupReader, ReaderCache, ResourceProvider, TextMarkupParser};
pub use crate::decode::{GrammarValidator, MetadataReader, NodeStreamReader, ReaderContext};
pub use crate::encode::{Script, XbfWriter};
pub use crate::error::{Error, FormatError, GrammarViolation, Location};
pub use crate::format::FormatVersion;
pub use crate::options::{
    CacheOptions, LoadOptions, ResolvePolicy, StringMode, TextSettings, WriteOptions,
};
pub use crate::report::{ErrorCode, ErrorReporter};
pub use crate::schema::SchemaResolver;
pub use crate::text::XbfStr;
pub use crate::token::{LineInfo, Node, Token, TokenList, TokenSource, Value};

pub type Result<T> = std::result::Result<T, Error>;

pub fn open(buffer: impl Into<Arc<[u8]>>, ctx: &ReaderContext) -> Result<NodeStreamReader> {
    open_with_options(buffer, ctx, &LoadOptions::default())
}

pub fn open_with_options(
    buffer: impl Into<Arc<[u8]>>,
    ctx: &ReaderContext,
    options: &LoadOptions,
) -> Result<NodeStreamReader> {
    Ok(decode::open(buffer.into(), ctx, options)?)
}

pub fn decode(buffer: impl Into<Arc<[u8]>>, ctx: &ReaderContext) -> Result<TokenList> {
    decode_with_options(buffer, ctx, &LoadOptions::default())
}

pub fn decode_with_options(
    buffer: impl Into<Arc<[u8]>>,
    ctx: &ReaderContext,
    options: &LoadOptions,
) -> Result<TokenList> {
    Ok(decode::decode(buffer.into(), ctx, options)?)
}

/// Decodes with grammar validation forced on, returning the token count.
pub fn validate(buffer: impl Into<Arc<[u8]>>, ctx: &ReaderContext) -> Result<usize> {
    validate_with_options(buffer, ctx, &LoadOptions::default())
}

pub fn validate_with_options(
    buffer: impl Into<Arc<[u8]>>,
    ctx: &ReaderContext,
    options: &LoadOptions,
) -> Result<usize> {
    Ok(decode::validate(buffer.into(), ctx, options)?)
}

/// Compiles a JSON token script into a complete file.
pub fn compile_script(input: &str) -> Result<Vec<u8>> {
    compile_script_with_options(input, &WriteOptions::default())
}

/// Settings named in the script itself override `options`.
pub fn compile_script_with_options(input: &str, options: &WriteOptions) -> Result<Vec<u8>> {
    let script = Script::from_json(input)?;
    let options = script.write_options(options)?;
    Ok(script.compile(&options)?)
}
