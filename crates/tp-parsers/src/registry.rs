//! Parser lookup by id.

use std::collections::BTreeMap;
use std::fmt;

use tp_events::EventBus;

use crate::Parser;
use crate::autoparagraph::AutoParagraphParser;
use crate::comment::CommentParser;
use crate::creole::CreoleParser;
use crate::error::ParseError;
use crate::markdown::MarkdownParser;
use crate::simplehtml::SimpleHtmlParser;

/// Id of the parser used when nothing else is configured.
pub const DEFAULT_PARSER: &str = "default";

/// Builds a parser. Runs once per parse so that setup listeners on the
/// event bus see every construction.
pub type ParserFactory =
    dyn Fn(&EventBus) -> Result<Box<dyn Parser>, ParseError> + Send + Sync;

/// Parser factories keyed by id.
#[derive(Default)]
pub struct ParserRegistry {
    factories: BTreeMap<String, Box<ParserFactory>>,
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("ids", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ParserRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `default`, `autoparagraph`, `comment`, `creole` and
    /// `markdown`.
    #[must_use]
    pub fn with_builtin_parsers() -> Self {
        let mut registry = Self::new();
        registry.register(DEFAULT_PARSER, |events| {
            Ok(Box::new(SimpleHtmlParser::new(events)?))
        });
        registry.register("autoparagraph", |events| {
            Ok(Box::new(AutoParagraphParser::new(events)?))
        });
        registry.register("comment", |_| Ok(Box::new(CommentParser)));
        registry.register("creole", |_| Ok(Box::new(CreoleParser::default())));
        registry.register("markdown", |_| Ok(Box::new(MarkdownParser::default())));
        registry
    }

    /// Register `factory` under `id`, replacing any previous entry.
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(&EventBus) -> Result<Box<dyn Parser>, ParseError> + Send + Sync + 'static,
    {
        let id = id.into();
        tracing::debug!(parser = %id, "Registered parser");
        self.factories.insert(id, Box::new(factory));
    }

    /// Remove the parser registered under `id`. Returns whether it existed.
    pub fn unregister(&mut self, id: &str) -> bool {
        self.factories.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Build the parser registered under `id`.
    pub fn get(&self, id: &str, events: &EventBus) -> Result<Box<dyn Parser>, ParseError> {
        let factory = self
            .factories
            .get(id)
            .ok_or_else(|| ParseError::UnknownParser(id.to_owned()))?;
        factory(events)
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
