//! Markdown via `pulldown-cmark`.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Tag, TagEnd};
use tp_fragment::{Document, FragmentError};

use crate::Parser;
use crate::builder::TreeBuilder;
use crate::error::ParseError;

const NO_ATTRS: [(&str, String); 0] = [];

fn heading_tag(level: HeadingLevel) -> &'static str {
    match level {
        HeadingLevel::H1 => "h1",
        HeadingLevel::H2 => "h2",
        HeadingLevel::H3 => "h3",
        HeadingLevel::H4 => "h4",
        HeadingLevel::H5 => "h5",
        HeadingLevel::H6 => "h6",
    }
}

/// Image waiting for its alt text.
struct PendingImage {
    src: String,
    title: String,
    alt: String,
}

/// Replays markdown events into a [`TreeBuilder`].
struct MarkdownTree {
    builder: TreeBuilder,
    /// Elements opened by each start event still waiting for its end.
    pushed: Vec<usize>,
    image: Option<PendingImage>,
    in_table_head: bool,
}

impl MarkdownTree {
    fn new() -> Self {
        Self {
            builder: TreeBuilder::new(),
            pushed: Vec::new(),
            image: None,
            in_table_head: false,
        }
    }

    fn open(&mut self, name: &str) -> Result<usize, FragmentError> {
        self.builder.start(name, NO_ATTRS)?;
        Ok(1)
    }

    fn process_event(&mut self, event: Event<'_>) -> Result<(), FragmentError> {
        if let Some(image) = &mut self.image
            && let Event::Text(text) | Event::Code(text) = &event
        {
            image.alt.push_str(text);
            return Ok(());
        }
        match event {
            Event::Start(tag) => {
                let count = self.start_tag(tag)?;
                self.pushed.push(count);
            }
            Event::End(tag) => self.end_tag(tag)?,
            Event::Text(text) | Event::InlineMath(text) | Event::DisplayMath(text) => {
                self.builder.text(&text)?;
            }
            Event::Code(code) => {
                self.open("code")?;
                self.builder.text(&code)?;
                self.builder.end();
            }
            Event::Html(html) | Event::InlineHtml(html) => self.builder.raw(&html)?,
            Event::SoftBreak => self.builder.text("\n")?,
            Event::HardBreak => {
                self.builder.void("br", NO_ATTRS)?;
            }
            Event::Rule => {
                self.builder.void("hr", NO_ATTRS)?;
            }
            Event::TaskListMarker(checked) => {
                let mut attributes = vec![
                    ("type", "checkbox".to_owned()),
                    ("disabled", "disabled".to_owned()),
                ];
                if checked {
                    attributes.push(("checked", "checked".to_owned()));
                }
                self.builder.void("input", attributes)?;
            }
            Event::FootnoteReference(_) => {}
        }
        Ok(())
    }

    /// Open the elements for `tag` and return how many were opened.
    fn start_tag(&mut self, tag: Tag<'_>) -> Result<usize, FragmentError> {
        if self.image.is_some() {
            return Ok(0);
        }
        let count = match tag {
            Tag::Paragraph => self.open("p")?,
            Tag::Heading { level, .. } => self.open(heading_tag(level))?,
            Tag::BlockQuote(_) => self.open("blockquote")?,
            Tag::CodeBlock(kind) => {
                self.open("pre")?;
                match kind {
                    CodeBlockKind::Fenced(info) if !info.trim().is_empty() => {
                        let lang = info.split_whitespace().next().unwrap_or_default();
                        self.builder
                            .start("code", [("class", format!("language-{lang}"))])?;
                    }
                    _ => {
                        self.open("code")?;
                    }
                }
                2
            }
            Tag::List(start) => match start {
                Some(1) => self.open("ol")?,
                Some(n) => {
                    self.builder.start("ol", [("start", n.to_string())])?;
                    1
                }
                None => self.open("ul")?,
            },
            Tag::Item => self.open("li")?,
            Tag::FootnoteDefinition(_) | Tag::HtmlBlock | Tag::MetadataBlock(_) => 0,
            Tag::DefinitionList => self.open("dl")?,
            Tag::DefinitionListTitle => self.open("dt")?,
            Tag::DefinitionListDefinition => self.open("dd")?,
            Tag::Table(_) => self.open("table")?,
            Tag::TableHead => {
                self.in_table_head = true;
                self.open("thead")?;
                self.open("tr")?;
                2
            }
            Tag::TableRow => self.open("tr")?,
            Tag::TableCell => self.open(if self.in_table_head { "th" } else { "td" })?,
            Tag::Emphasis => self.open("em")?,
            Tag::Strong => self.open("strong")?,
            Tag::Strikethrough => self.open("del")?,
            Tag::Superscript => self.open("sup")?,
            Tag::Subscript => self.open("sub")?,
            Tag::Link {
                dest_url, title, ..
            } => {
                let mut attributes = vec![("href", dest_url.to_string())];
                if !title.is_empty() {
                    attributes.push(("title", title.to_string()));
                }
                self.builder.start("a", attributes)?;
                1
            }
            Tag::Image {
                dest_url, title, ..
            } => {
                self.image = Some(PendingImage {
                    src: dest_url.to_string(),
                    title: title.to_string(),
                    alt: String::new(),
                });
                0
            }
        };
        Ok(count)
    }

    fn end_tag(&mut self, tag: TagEnd) -> Result<(), FragmentError> {
        match tag {
            TagEnd::Image => {
                if let Some(image) = self.image.take() {
                    let mut attributes = vec![("src", image.src), ("alt", image.alt)];
                    if !image.title.is_empty() {
                        attributes.push(("title", image.title));
                    }
                    self.builder.void("img", attributes)?;
                }
            }
            TagEnd::TableHead => self.in_table_head = false,
            _ => {}
        }
        for _ in 0..self.pushed.pop().unwrap_or_default() {
            self.builder.end();
        }
        Ok(())
    }
}

/// Registered as `markdown`.
#[derive(Clone, Copy, Debug)]
pub struct MarkdownParser {
    gfm: bool,
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self { gfm: true }
    }
}

impl MarkdownParser {
    /// Enable or disable GitHub Flavored Markdown (tables, strikethrough,
    /// task lists).
    #[must_use]
    pub fn with_gfm(mut self, enabled: bool) -> Self {
        self.gfm = enabled;
        self
    }

    fn options(self) -> Options {
        if self.gfm {
            Options::ENABLE_TABLES
                | Options::ENABLE_STRIKETHROUGH
                | Options::ENABLE_TASKLISTS
                | Options::ENABLE_GFM
        } else {
            Options::empty()
        }
    }
}

impl Parser for MarkdownParser {
    fn name(&self) -> &str {
        "Markdown"
    }

    fn parse(&self, input: &str, _reason: &str) -> Result<Document, ParseError> {
        let mut tree = MarkdownTree::new();
        for event in pulldown_cmark::Parser::new_ext(input, self.options()) {
            tree.process_event(event)?;
        }
        Ok(tree.builder.finish())
    }
}
