//! Maps resource identifiers to replayable token lists.
//!
//! Per identifier the cache moves from untracked, to tracked without a list,
//! to tracked with a list. A list is built once, from the compiled sibling
//! resource when one decodes cleanly, otherwise from the markup text, and
//! served from memory until [`ReaderCache::flush`].

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use serde::Serialize;
use smol_str::SmolStr;

use crate::constants::has_magic;
use crate::decode::{self, GrammarValidator, MetadataReader, NodeStreamReader, ReaderContext};
use crate::error::{Error, FormatError};
use crate::format::split_sections;
use crate::options::{CacheOptions, TextSettings};
use crate::report::{report_error, report_format_error};
use crate::token::{Node, TokenList, TokenListReader, TokenSource};

/// Maps a URI to the bytes of the resource it names.
pub trait ResourceProvider {
    fn load(&self, uri: &str) -> Option<Arc<[u8]>>;
}

/// Parses textual markup into tokens.
pub trait TextMarkupParser {
    fn parse(
        &self,
        ctx: &ReaderContext,
        text: &[u8],
        settings: &TextSettings,
    ) -> Result<Box<dyn TokenSource>, Error>;
}

/// Swaps a `.xaml` extension for `.{extension}`.
pub fn sibling_uri(uri: &str, extension: &str) -> Option<SmolStr> {
    const MARKUP_EXTENSION: &str = ".xaml";
    let split = uri.len().checked_sub(MARKUP_EXTENSION.len())?;
    let (stem, tail) = (uri.get(..split)?, uri.get(split..)?);
    if !tail.eq_ignore_ascii_case(MARKUP_EXTENSION) || stem.is_empty() {
        return None;
    }
    let mut sibling = String::with_capacity(stem.len() + 1 + extension.len());
    sibling.push_str(stem);
    sibling.push('.');
    sibling.push_str(extension);
    Some(SmolStr::new(sibling))
}

/// True when the first non-whitespace byte, after an optional UTF-8 BOM,
/// opens a tag.
pub fn looks_like_markup(raw: &[u8]) -> bool {
    let body = raw.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(raw);
    match memchr::memchr(b'<', body) {
        Some(at) => body[..at].iter().all(u8::is_ascii_whitespace),
        None => false,
    }
}

/// A reader handed out by the cache.
pub enum MarkupReader {
    /// Replays a cached list.
    Tokens(TokenListReader),
    /// Reads straight from the source; used when there is no identifier to
    /// cache under.
    Live(Box<dyn TokenSource>),
}

impl std::fmt::Debug for MarkupReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarkupReader::Tokens(reader) => f.debug_tuple("Tokens").field(reader).finish(),
            MarkupReader::Live(_) => f.debug_tuple("Live").finish_non_exhaustive(),
        }
    }
}

impl MarkupReader {
    pub fn token_list(&self) -> Option<&Rc<TokenList>> {
        match self {
            MarkupReader::Tokens(reader) => Some(reader.list()),
            MarkupReader::Live(_) => None,
        }
    }
}

impl TokenSource for MarkupReader {
    fn read(&mut self) -> Result<bool, FormatError> {
        match self {
            MarkupReader::Tokens(reader) => reader.read(),
            MarkupReader::Live(reader) => reader.read(),
        }
    }

    fn current(&self) -> &Node {
        match self {
            MarkupReader::Tokens(reader) => reader.current(),
            MarkupReader::Live(reader) => reader.current(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachedTokens {
    pub tokens: Rc<TokenList>,
    /// Whether the list came from a compiled binary rather than text.
    pub used_binary: bool,
}

#[derive(Debug, Default)]
struct CacheEntry {
    tokens: Option<Rc<TokenList>>,
    hits: u64,
    used_binary: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub binary_decodes: u64,
    pub text_parses: u64,
    pub metadata_loads: u64,
    pub fallbacks: u64,
}

#[derive(Debug)]
struct CompiledReader {
    uri: SmolStr,
    reader: Rc<MetadataReader>,
}

pub struct ReaderCache {
    options: CacheOptions,
    resources: Rc<dyn ResourceProvider>,
    text_parser: Option<Rc<dyn TextMarkupParser>>,
    entries: HashMap<SmolStr, CacheEntry>,
    /// `None` records that no compiled sibling exists.
    compiled_siblings: HashMap<SmolStr, Option<SmolStr>>,
    /// Keyed by backing buffer address. Each reader holds its buffer, so an
    /// address cannot be reused while its entry is present. At most one
    /// entry per resource URI.
    compiled_readers: HashMap<usize, CompiledReader>,
    stats: CacheStats,
}

impl ReaderCache {
    pub fn new(resources: Rc<dyn ResourceProvider>) -> Self {
        Self::with_options(resources, CacheOptions::default())
    }

    pub fn with_options(resources: Rc<dyn ResourceProvider>, options: CacheOptions) -> Self {
        Self {
            options,
            resources,
            text_parser: None,
            entries: HashMap::new(),
            compiled_siblings: HashMap::new(),
            compiled_readers: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn with_text_parser(mut self, parser: Rc<dyn TextMarkupParser>) -> Self {
        self.text_parser = Some(parser);
        self
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn is_tracked(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn hits(&self, id: &str) -> u64 {
        self.entries.get(id).map_or(0, |entry| entry.hits)
    }

    pub fn compiled_reader_count(&self) -> usize {
        self.compiled_readers.len()
    }

    /// Returns a reader for `id`, building and caching its token list on
    /// first use. Without an identifier `raw` is read directly.
    pub fn get_reader(
        &mut self,
        ctx: &ReaderContext,
        id: Option<&str>,
        raw: &[u8],
        settings: &TextSettings,
    ) -> Result<MarkupReader, Error> {
        let Some(id) = id else {
            return self.read_uncached(ctx, raw, settings);
        };
        let cached = self.get_token_list(ctx, id, raw, settings)?;
        Ok(MarkupReader::Tokens(cached.tokens.reader()))
    }

    pub fn get_token_list(
        &mut self,
        ctx: &ReaderContext,
        id: &str,
        raw: &[u8],
        settings: &TextSettings,
    ) -> Result<CachedTokens, Error> {
        let key = SmolStr::new(id);
        let entry = self.entries.entry(key.clone()).or_default();
        if let Some(tokens) = &entry.tokens {
            entry.hits += 1;
            self.stats.hits += 1;
            tracing::trace!(id, hits = entry.hits, "token list cache hit");
            return Ok(CachedTokens {
                tokens: Rc::clone(tokens),
                used_binary: entry.used_binary,
            });
        }

        let built = match self.decode_sibling(ctx, &key)? {
            Some(tokens) => Some((tokens, true)),
            None => self.build_from_raw(ctx, raw, settings)?,
        };
        let Some((tokens, used_binary)) = built else {
            let err = Error::NoContent(id.to_string());
            report_error(ctx.reporter.as_ref(), &err);
            return Err(err);
        };

        tracing::debug!(id, used_binary, tokens = tokens.len(), "cached token list");
        let entry = self.entries.entry(key).or_default();
        entry.tokens = Some(Rc::clone(&tokens));
        entry.used_binary = used_binary;
        Ok(CachedTokens {
            tokens,
            used_binary,
        })
    }

    /// Forgets every token list and sibling lookup.
    pub fn flush(&mut self) {
        tracing::debug!(
            entries = self.entries.len(),
            siblings = self.compiled_siblings.len(),
            "flushing reader cache"
        );
        self.entries.clear();
        self.compiled_siblings.clear();
    }

    /// Forgets the metadata readers kept per backing buffer. Strings handed
    /// out earlier keep their buffers alive on their own.
    pub fn reset_compiled_reader_cache(&mut self) {
        tracing::debug!(
            readers = self.compiled_readers.len(),
            "resetting compiled reader cache"
        );
        self.compiled_readers.clear();
    }

    fn sibling(&mut self, key: &SmolStr) -> Option<SmolStr> {
        if let Some(sibling) = self.compiled_siblings.get(key) {
            return sibling.clone();
        }
        let sibling = sibling_uri(key, &self.options.compiled_extension);
        self.compiled_siblings.insert(key.clone(), sibling.clone());
        sibling
    }

    /// Decodes the compiled sibling of `key`, if there is a usable one.
    fn decode_sibling(
        &mut self,
        ctx: &ReaderContext,
        key: &SmolStr,
    ) -> Result<Option<Rc<TokenList>>, Error> {
        let Some(uri) = self.sibling(key) else {
            return Ok(None);
        };
        let Some(buffer) = self.resources.load(&uri) else {
            tracing::trace!(%uri, "no compiled sibling");
            self.compiled_siblings.insert(key.clone(), None);
            return Ok(None);
        };
        match self.decode_buffer(ctx, buffer, Some(&uri)) {
            Ok(tokens) => Ok(Some(tokens)),
            Err(err) if err.is_recoverable() => {
                tracing::warn!(%uri, error = %err, "compiled markup unusable, falling back to text");
                self.stats.fallbacks += 1;
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Decodes `buffer` into a token list. Buffers loaded from `uri` share a
    /// metadata reader across decodes; anonymous buffers get a private one.
    fn decode_buffer(
        &mut self,
        ctx: &ReaderContext,
        buffer: Arc<[u8]>,
        uri: Option<&SmolStr>,
    ) -> Result<Rc<TokenList>, FormatError> {
        let sections = split_sections(&buffer).map_err(|err| {
            report_format_error(ctx.reporter.as_ref(), &err);
            err
        })?;
        let identity = Arc::as_ptr(&buffer) as *const u8 as usize;
        let metadata = match self.compiled_readers.get(&identity) {
            Some(entry) => Rc::clone(&entry.reader),
            None => {
                let reader = Rc::new(MetadataReader::load(
                    Arc::clone(&buffer),
                    sections.metadata,
                    ctx,
                    &self.options.load,
                )?);
                self.stats.metadata_loads += 1;
                if let Some(uri) = uri {
                    // A new buffer for the same resource supersedes the old one.
                    self.compiled_readers.retain(|_, entry| entry.uri != *uri);
                    self.compiled_readers.insert(
                        identity,
                        CompiledReader {
                            uri: uri.clone(),
                            reader: Rc::clone(&reader),
                        },
                    );
                }
                reader
            }
        };
        let mut nodes = NodeStreamReader::new(metadata, sections.nodes);
        let tokens = if self.options.validate_grammar {
            let mut validator =
                GrammarValidator::new(nodes).with_reporter(Rc::clone(&ctx.reporter));
            TokenList::capture(&mut validator)?
        } else {
            TokenList::capture(&mut nodes)?
        };
        self.stats.binary_decodes += 1;
        Ok(Rc::new(tokens))
    }

    /// Builds a list from the caller's bytes: binary when they carry the
    /// magic, text when they look like markup.
    fn build_from_raw(
        &mut self,
        ctx: &ReaderContext,
        raw: &[u8],
        settings: &TextSettings,
    ) -> Result<Option<(Rc<TokenList>, bool)>, Error> {
        if has_magic(raw) {
            let tokens = self.decode_buffer(ctx, Arc::from(raw), None)?;
            return Ok(Some((tokens, true)));
        }
        if !looks_like_markup(raw) {
            return Ok(None);
        }
        let mut source = self.parse_text(ctx, raw, settings)?;
        let tokens = TokenList::capture(&mut source)?;
        self.stats.text_parses += 1;
        Ok(Some((Rc::new(tokens), false)))
    }

    fn parse_text(
        &self,
        ctx: &ReaderContext,
        raw: &[u8],
        settings: &TextSettings,
    ) -> Result<Box<dyn TokenSource>, Error> {
        let Some(parser) = &self.text_parser else {
            let err = Error::text("no text markup parser configured");
            report_error(ctx.reporter.as_ref(), &err);
            return Err(err);
        };
        let source = parser.parse(ctx, raw, settings).map_err(|err| {
            report_error(ctx.reporter.as_ref(), &err);
            err
        })?;
        if self.options.validate_grammar {
            Ok(Box::new(
                GrammarValidator::new(source).with_reporter(Rc::clone(&ctx.reporter)),
            ))
        } else {
            Ok(source)
        }
    }

    fn read_uncached(
        &mut self,
        ctx: &ReaderContext,
        raw: &[u8],
        settings: &TextSettings,
    ) -> Result<MarkupReader, Error> {
        if has_magic(raw) {
            let load = self
                .options
                .load
                .clone()
                .with_validate_grammar(self.options.validate_grammar);
            let source = decode::reader(Arc::from(raw), ctx, &load)?;
            return Ok(MarkupReader::Live(source));
        }
        if looks_like_markup(raw) {
            return Ok(MarkupReader::Live(self.parse_text(ctx, raw, settings)?));
        }
        let err = Error::NoContent(String::new());
        report_error(ctx.reporter.as_ref(), &err);
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    #[case("ms-appx:///Views/MainPage.xaml", Some("ms-appx:///Views/MainPage.xbf"))]
    #[case("Page.XAML", Some("Page.xbf"))]
    #[case("Page.xbf", None)]
    #[case(".xaml", None)]
    #[case("xaml", None)]
    fn test_sibling_uri(#[case] uri: &str, #[case] expected: Option<&str>) {
        assert_eq!(sibling_uri(uri, "xbf").as_deref(), expected);
    }

    #[rstest::rstest]
    #[case(b"<Page/>".as_slice(), true)]
    #[case(b"  \r\n\t<Page/>".as_slice(), true)]
    #[case(b"\xEF\xBB\xBF<Page/>".as_slice(), true)]
    #[case(b"".as_slice(), false)]
    #[case(b"   ".as_slice(), false)]
    #[case(b"text <Page/>".as_slice(), false)]
    fn test_looks_like_markup(#[case] raw: &[u8], #[case] expected: bool) {
        assert_eq!(looks_like_markup(raw), expected);
    }
}
