//! Markup parsers for TextPress.
//!
//! Every parser turns source text into a [`tp_fragment::Document`]. Parsers
//! are looked up by id in a [`ParserRegistry`] and constructed per parse
//! with access to the [`tp_events::EventBus`], so plugins can adjust them.
//!
//! | id              | parser                   |
//! |-----------------|--------------------------|
//! | `default`       | [`SimpleHtmlParser`]     |
//! | `autoparagraph` | [`AutoParagraphParser`]  |
//! | `comment`       | [`CommentParser`]        |
//! | `creole`        | [`CreoleParser`]         |
//! | `markdown`      | [`MarkdownParser`]       |
//!
//! # Example
//!
//! ```
//! use tp_events::EventBus;
//! use tp_fragment::NoCallbacks;
//! use tp_parsers::ParserRegistry;
//!
//! let registry = ParserRegistry::with_builtin_parsers();
//! let parser = registry.get("default", &EventBus::new())?;
//! let doc = parser.parse("<p>Hello <b>World", "post-body")?;
//! assert_eq!(
//!     doc.render(doc.root(), &NoCallbacks)?,
//!     "<p>Hello <b>World</b></p>"
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod autoparagraph;
mod builder;
mod comment;
mod creole;
mod error;
mod markdown;
mod registry;
mod simplehtml;
mod validate;

pub use autoparagraph::{AutoParagraphParser, DEFAULT_PARAGRAPH_CONTAINERS};
pub use builder::TreeBuilder;
pub use comment::CommentParser;
pub use creole::{CreoleParser, WikiEvent, wiki_events};
pub use error::ParseError;
pub use markdown::MarkdownParser;
pub use registry::{DEFAULT_PARSER, ParserFactory, ParserRegistry};
pub use simplehtml::SimpleHtmlParser;
pub use validate::is_valid_url;

use tp_fragment::Document;

/// Converts markup into a document tree.
pub trait Parser {
    /// Human readable name.
    fn name(&self) -> &str;

    /// Parse `input`. `reason` names what is being parsed, for example
    /// `post-body`, `comment` or `page`.
    fn parse(&self, input: &str, reason: &str) -> Result<Document, ParseError>;
}
