//! TextPress markup pipeline.
//!
//! Raw post, page and comment text is parsed into a document tree, handed
//! to plugins through the `process-doc-tree` event, optionally collapsed
//! into static HTML, and stored as a blob next to the raw text. Rendering
//! loads the blob and lets `process-node-callback` listeners fill in the
//! dynamic parts.
//!
//! [`TextPress`] is the application context holding configuration, the
//! parser registry, the event bus and the cache. Nothing is global; build
//! one context and pass it where it is needed.
//!
//! # Example
//!
//! ```
//! use textpress::{StoredMarkup, TextPress};
//! use tp_config::Config;
//!
//! let mut config = Config::default();
//! config.cache_resolved.enabled = false;
//! let mut app = TextPress::new(config);
//! let post = StoredMarkup::new(&mut app, "Hello <b>World", None, "post-body")?;
//! assert_eq!(post.parser(), "default");
//! assert_eq!(post.render(&app)?, "Hello <b>World</b>");
//! # Ok::<(), textpress::Error>(())
//! ```

mod error;
mod stored;

use std::path::Path;

use tp_cache::{Cache, CacheBucketExt, FileCache, NullCache};
use tp_config::Config;
use tp_events::EventBus;
use tp_fragment::Document;
use tp_parsers::{
    AutoParagraphParser, DEFAULT_PARSER, Parser, ParserRegistry, SimpleHtmlParser,
};

pub use error::Error;
pub use stored::StoredMarkup;

/// Version tag of the on-disk cache. Bumped with the blob format.
const CACHE_VERSION: &str = concat!("textpress-", env!("CARGO_PKG_VERSION"), "-blob1");

/// Cache bucket for static renderings.
const RENDER_BUCKET: &str = "markup";

/// Application context.
pub struct TextPress {
    pub config: Config,
    pub parsers: ParserRegistry,
    pub events: EventBus,
    cache: Box<dyn Cache>,
    notices: Vec<String>,
}

impl std::fmt::Debug for TextPress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextPress")
            .field("config", &self.config)
            .field("parsers", &self.parsers)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl TextPress {
    /// Build a context with the built-in parsers and the cache described by
    /// `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let cache: Box<dyn Cache> = if config.cache_resolved.enabled {
            Box::new(FileCache::new(config.cache_resolved.dir.clone(), CACHE_VERSION))
        } else {
            Box::new(NullCache)
        };

        let mut parsers = ParserRegistry::with_builtin_parsers();
        let containers = config.markup.paragraph_containers.clone();
        parsers.register("autoparagraph", move |events| {
            let parser = AutoParagraphParser::new(events)?
                .with_paragraph_containers(containers.iter().cloned());
            Ok(Box::new(parser))
        });

        Self {
            config,
            parsers,
            events: EventBus::new(),
            cache,
            notices: Vec::new(),
        }
    }

    /// Load `textpress.toml` (or discover it) and build a context.
    pub fn load(config_path: Option<&Path>) -> Result<Self, Error> {
        Ok(Self::new(Config::load(config_path)?))
    }

    /// Replace the cache.
    #[must_use]
    pub fn with_cache(mut self, cache: impl Cache + 'static) -> Self {
        self.cache = Box::new(cache);
        self
    }

    /// Disable caching.
    #[must_use]
    pub fn without_cache(self) -> Self {
        self.with_cache(NullCache)
    }

    pub fn cache(&self) -> &dyn Cache {
        self.cache.as_ref()
    }

    /// Messages for the administrator collected since the last call, such
    /// as a reverted default parser.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    /// Resolve a parser id and build the parser.
    ///
    /// An explicit id must be registered. Without one the configured
    /// default parser is used; if that is gone the setting is reverted and
    /// the built-in simplified HTML parser takes over.
    pub(crate) fn resolve_parser(
        &mut self,
        parser: Option<&str>,
    ) -> Result<(String, Box<dyn Parser>), Error> {
        if let Some(id) = parser {
            return Ok((id.to_owned(), self.parsers.get(id, &self.events)?));
        }

        let configured = self.config.markup.default_parser.clone();
        if self.parsers.contains(&configured) {
            let built = self.parsers.get(&configured, &self.events)?;
            return Ok((configured, built));
        }

        tracing::warn!(
            parser = %configured,
            fallback = DEFAULT_PARSER,
            "Configured default parser is not available, reverting"
        );
        self.config.markup.revert_to_default("default_parser");
        self.notices.push(format!(
            "The default parser \"{configured}\" is not available anymore. \
             It was reset to \"{DEFAULT_PARSER}\"."
        ));
        let fallback = self.config.markup.default_parser.clone();
        let built: Box<dyn Parser> = match self.parsers.get(&fallback, &self.events) {
            Ok(parser) => parser,
            Err(_) => Box::new(SimpleHtmlParser::new(&self.events)?),
        };
        Ok((fallback, built))
    }

    /// Parse `input` into a tree.
    ///
    /// Line endings are normalized, the tree is passed through
    /// `process-doc-tree` (the first replacement offered wins) and, when
    /// `optimize` is set, collapsed into static HTML if nothing in it is
    /// dynamic.
    pub fn parse(
        &mut self,
        input: &str,
        parser: Option<&str>,
        reason: &str,
        optimize: bool,
    ) -> Result<Document, Error> {
        let (_, parser) = self.resolve_parser(parser)?;
        self.parse_with(parser.as_ref(), input, reason, optimize)
    }

    /// Parse comment text with the configured comment parser.
    pub fn parse_comment(&mut self, input: &str) -> Result<Document, Error> {
        let id = self.config.markup.comment_parser.clone();
        let optimize = self.config.markup.optimize;
        self.parse(input, Some(&id), "comment", optimize)
    }

    pub(crate) fn parse_with(
        &self,
        parser: &dyn Parser,
        input: &str,
        reason: &str,
        optimize: bool,
    ) -> Result<Document, Error> {
        let input = normalize_newlines(input);
        let tree = parser.parse(&input, reason)?;
        let tree = self.events.process_doc_tree(tree, &input, reason)?;
        if optimize {
            Ok(tree.optimize()?)
        } else {
            Ok(tree)
        }
    }

    /// Render a whole tree, routing callback nodes through the event bus.
    pub fn render(&self, doc: &Document) -> Result<String, Error> {
        Ok(doc.render(doc.root(), &self.events)?)
    }

    /// Render stored markup, serving static renderings from the cache.
    ///
    /// `etag` identifies the revision of the content, for example its
    /// modification time. Dynamic trees are rendered every time.
    pub fn render_cached(
        &self,
        key: &str,
        etag: &str,
        stored: &StoredMarkup,
    ) -> Result<String, Error> {
        let bucket = self.cache.bucket(RENDER_BUCKET);
        if let Some(html) = bucket.get_string(key, etag) {
            tracing::trace!(key, "Rendered markup served from cache");
            return Ok(html);
        }

        let tree = stored.tree()?;
        let html = self.render(&tree)?;
        if !tree.is_dynamic(tree.root()) {
            bucket.set_string(key, etag, &html);
        }
        Ok(html)
    }
}

fn normalize_newlines(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}
