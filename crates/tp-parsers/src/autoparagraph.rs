//! Simplified HTML with automatic paragraphs.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use tp_events::EventBus;
use tp_fragment::{Document, FragmentError, NodeId, NodeKind};

use crate::error::ParseError;
use crate::simplehtml::SimpleHtmlParser;
use crate::Parser;

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\s*?\n){2,}").expect("invalid paragraph regex"));

/// Containers whose inline content is split into paragraphs.
pub const DEFAULT_PARAGRAPH_CONTAINERS: &[&str] = &["div", "blockquote"];

/// Elements that end the current paragraph and are kept as they are.
const BLOCK_TAGS: &[&str] = &[
    "address", "blockquote", "center", "dd", "del", "div", "dl", "dt", "fieldset", "form",
    "h1", "h2", "h3", "h4", "h5", "h6", "hr", "ins", "li", "noscript", "ol", "p", "pre",
    "script", "style", "table", "tbody", "td", "tfoot", "th", "thead", "tr", "ul",
];

/// Registered as `autoparagraph`.
#[derive(Debug)]
pub struct AutoParagraphParser {
    html: SimpleHtmlParser,
    containers: BTreeSet<String>,
}

impl AutoParagraphParser {
    pub fn new(events: &EventBus) -> Result<Self, ParseError> {
        Ok(Self::from_html(SimpleHtmlParser::new(events)?))
    }

    #[must_use]
    pub fn from_html(html: SimpleHtmlParser) -> Self {
        Self {
            html,
            containers: DEFAULT_PARAGRAPH_CONTAINERS
                .iter()
                .map(|&c| c.to_owned())
                .collect(),
        }
    }

    /// Replace the set of paragraph-bearing containers.
    #[must_use]
    pub fn with_paragraph_containers<I, S>(mut self, containers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.containers = containers.into_iter().map(Into::into).collect();
        self
    }

    fn is_block(doc: &Document, id: NodeId) -> bool {
        doc.kind(id) == NodeKind::Element
            && doc.name(id).is_some_and(|name| BLOCK_TAGS.contains(&name))
    }

    fn paragraphize(&self, doc: &mut Document, container: NodeId) -> Result<(), FragmentError> {
        let mut run = Vec::new();
        for child in doc.take_children(container)? {
            if Self::is_block(doc, child) {
                flush(doc, container, &mut run)?;
                if doc.name(child).is_some_and(|name| self.containers.contains(name)) {
                    self.paragraphize(doc, child)?;
                }
                doc.append(container, child)?;
            } else if doc.kind(child) == NodeKind::Text {
                let value = doc.value(child).unwrap_or_default().to_owned();
                for (i, piece) in PARAGRAPH_BREAK.split(&value).enumerate() {
                    if i > 0 {
                        flush(doc, container, &mut run)?;
                    }
                    if !piece.is_empty() {
                        run.push(doc.create_text(piece));
                    }
                }
            } else {
                run.push(child);
            }
        }
        flush(doc, container, &mut run)
    }
}

/// Wrap the pending inline run in a `<p>`. Whitespace-only runs are dropped.
fn flush(doc: &mut Document, container: NodeId, run: &mut Vec<NodeId>) -> Result<(), FragmentError> {
    let nodes = std::mem::take(run);
    let has_content = nodes.iter().any(|&n| {
        doc.kind(n) != NodeKind::Text || doc.value(n).is_some_and(|v| !v.trim().is_empty())
    });
    if !has_content {
        return Ok(());
    }
    if let Some(&first) = nodes.first()
        && doc.kind(first) == NodeKind::Text
    {
        let trimmed = doc.value(first).unwrap_or_default().trim_start().to_owned();
        doc.set_value(first, Some(trimmed))?;
    }
    if let Some(&last) = nodes.last()
        && doc.kind(last) == NodeKind::Text
    {
        let trimmed = doc.value(last).unwrap_or_default().trim_end().to_owned();
        doc.set_value(last, Some(trimmed))?;
    }
    let paragraph = doc.create_element("p");
    doc.extend(paragraph, nodes)?;
    doc.append(container, paragraph)
}

impl Parser for AutoParagraphParser {
    fn name(&self) -> &str {
        "Automatic Paragraphs"
    }

    fn parse(&self, input: &str, _reason: &str) -> Result<Document, ParseError> {
        let mut doc = self.html.parse_html(input)?;
        let root = doc.root();
        self.paragraphize(&mut doc, root)?;
        Ok(doc)
    }
}
