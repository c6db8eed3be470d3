//! Creole 1.0 wiki markup.
//!
//! The parser is split in two: [`wiki_events`] turns markup into a flat
//! stream of [`WikiEvent`]s and [`CreoleParser`] replays them into a
//! [`TreeBuilder`]. Besides the core syntax the common additions are
//! supported: `##monospace##`, `^^superscript^^`, `,,subscript,,` and
//! `__underline__`.

use std::sync::LazyLock;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use tp_fragment::Document;

use crate::Parser;
use crate::builder::TreeBuilder;
use crate::error::ParseError;
use crate::validate::is_valid_url;

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A\s*(={1,6})\s*(.*?)\s*=*\s*\z").expect("invalid heading regex")
});

static RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A\s*-{4,}\s*\z").expect("invalid rule regex"));

static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A\s*([*#]+)\s*(.*)\z").expect("invalid list regex"));

static FREE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\A(?:https?|ftp)://[^\s|\]]+"#).expect("invalid free link regex")
});

/// Characters escaped in wiki page links.
const PAGE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// Inline toggles: delimiter and element.
const FORMATS: &[(&str, &str)] = &[
    ("**", "strong"),
    ("//", "em"),
    ("##", "code"),
    ("^^", "sup"),
    (",,", "sub"),
    ("__", "u"),
];

/// Event produced by the Creole tokenizer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WikiEvent {
    Start(&'static str, Vec<(&'static str, String)>),
    End,
    Text(String),
}

impl WikiEvent {
    fn start(name: &'static str) -> Self {
        Self::Start(name, Vec::new())
    }
}

enum Block {
    None,
    Paragraph(Vec<String>),
    List(Vec<char>),
    Table,
}

struct Generator<'a> {
    wiki_base: &'a str,
    events: Vec<WikiEvent>,
    block: Block,
}

impl Generator<'_> {
    fn emit(&mut self, event: WikiEvent) {
        self.events.push(event);
    }

    fn close_block(&mut self) {
        match std::mem::replace(&mut self.block, Block::None) {
            Block::None => {}
            Block::Paragraph(lines) => {
                self.emit(WikiEvent::start("p"));
                self.inline(&lines.join("\n"));
                self.emit(WikiEvent::End);
            }
            Block::List(levels) => {
                for _ in levels {
                    self.emit(WikiEvent::End);
                    self.emit(WikiEvent::End);
                }
            }
            Block::Table => self.emit(WikiEvent::End),
        }
    }

    fn line<'l>(&mut self, line: &'l str, rest: &mut impl Iterator<Item = &'l str>) {
        if line.trim().is_empty() {
            self.close_block();
            return;
        }

        if line.trim_end() == "{{{" {
            self.close_block();
            let mut body = Vec::new();
            for next in rest.by_ref() {
                if next.trim_end() == "}}}" {
                    break;
                }
                body.push(next);
            }
            self.emit(WikiEvent::start("pre"));
            self.emit(WikiEvent::Text(body.join("\n")));
            self.emit(WikiEvent::End);
            return;
        }

        if let Some(caps) = HEADING.captures(line) {
            self.close_block();
            let level = caps[1].len();
            let tag = ["h1", "h2", "h3", "h4", "h5", "h6"][level - 1];
            self.emit(WikiEvent::start(tag));
            self.inline(&caps[2]);
            self.emit(WikiEvent::End);
            return;
        }

        if RULE.is_match(line) {
            self.close_block();
            self.emit(WikiEvent::start("hr"));
            self.emit(WikiEvent::End);
            return;
        }

        if let Some(caps) = LIST_ITEM.captures(line) {
            let markers: Vec<char> = caps[1].chars().collect();
            let depth = match &self.block {
                Block::List(levels) => levels.len(),
                _ => 0,
            };
            // `**bold**` at the start of a paragraph is not a nested item.
            if markers.len() <= depth + 1 {
                self.list_item(&markers);
                self.inline(caps[2].trim_end());
                return;
            }
        }

        if line.trim_start().starts_with('|') {
            if !matches!(self.block, Block::Table) {
                self.close_block();
                self.emit(WikiEvent::start("table"));
                self.block = Block::Table;
            }
            self.table_row(line.trim());
            return;
        }

        match &mut self.block {
            Block::Paragraph(lines) => lines.push(line.trim().to_owned()),
            Block::List(_) => {
                self.emit(WikiEvent::Text("\n".to_owned()));
                self.inline(line.trim());
            }
            _ => {
                self.close_block();
                self.block = Block::Paragraph(vec![line.trim().to_owned()]);
            }
        }
    }

    /// Every open list level holds two elements: the list and its item.
    fn list_item(&mut self, markers: &[char]) {
        let mut levels = match std::mem::replace(&mut self.block, Block::None) {
            Block::List(levels) => levels,
            other => {
                self.block = other;
                self.close_block();
                Vec::new()
            }
        };
        let keep = levels
            .iter()
            .zip(markers)
            .take_while(|(a, b)| a == b)
            .count();

        while levels.len() > keep {
            levels.pop();
            self.emit(WikiEvent::End);
            self.emit(WikiEvent::End);
        }
        if keep == markers.len() {
            self.emit(WikiEvent::End);
            self.emit(WikiEvent::start("li"));
        } else {
            for &marker in &markers[keep..] {
                let list = if marker == '#' { "ol" } else { "ul" };
                self.emit(WikiEvent::start(list));
                self.emit(WikiEvent::start("li"));
                levels.push(marker);
            }
        }
        self.block = Block::List(levels);
    }

    fn table_row(&mut self, line: &str) {
        self.emit(WikiEvent::start("tr"));
        let line = line.strip_prefix('|').unwrap_or(line);
        let line = line.strip_suffix('|').unwrap_or(line);
        for cell in split_cells(line) {
            let (tag, content) = match cell.trim_start().strip_prefix('=') {
                Some(header) => ("th", header),
                None => ("td", cell),
            };
            self.emit(WikiEvent::start(tag));
            self.inline(content.trim());
            self.emit(WikiEvent::End);
        }
        self.emit(WikiEvent::End);
    }

    fn link(&mut self, target: &str, label: Option<&str>) {
        let target = target.trim();
        let href = if is_valid_url(target) {
            target.to_owned()
        } else {
            let page = target.replace(' ', "_");
            format!("{}{}", self.wiki_base, utf8_percent_encode(&page, PAGE))
        };
        self.emit(WikiEvent::Start("a", vec![("href", href)]));
        self.emit(WikiEvent::Text(label.map_or(target, str::trim).to_owned()));
        self.emit(WikiEvent::End);
    }

    fn flush_text(&mut self, buffer: &mut String) {
        if !buffer.is_empty() {
            self.emit(WikiEvent::Text(std::mem::take(buffer)));
        }
    }

    fn inline(&mut self, text: &str) {
        let mut open: Vec<&'static str> = Vec::new();
        let mut buffer = String::new();
        let mut pos = 0;

        'scan: while pos < text.len() {
            let rest = &text[pos..];

            if let Some(escaped) = rest.strip_prefix('~')
                && let Some(ch) = escaped.chars().next()
                && !ch.is_whitespace()
            {
                buffer.push(ch);
                pos += 1 + ch.len_utf8();
                continue;
            }

            if let Some(body) = rest.strip_prefix("{{{")
                && let Some(end) = find_nowiki_end(body)
            {
                self.flush_text(&mut buffer);
                self.emit(WikiEvent::start("code"));
                self.emit(WikiEvent::Text(body[..end].to_owned()));
                self.emit(WikiEvent::End);
                pos += 3 + end + 3;
                continue;
            }

            if let Some(body) = rest.strip_prefix("[[")
                && let Some(end) = body.find("]]")
            {
                self.flush_text(&mut buffer);
                let (target, label) = match body[..end].split_once('|') {
                    Some((target, label)) => (target, Some(label)),
                    None => (&body[..end], None),
                };
                self.link(target, label);
                pos += 2 + end + 2;
                continue;
            }

            if let Some(body) = rest.strip_prefix("{{")
                && let Some(end) = body.find("}}")
            {
                self.flush_text(&mut buffer);
                let (src, alt) = body[..end].split_once('|').unwrap_or((&body[..end], ""));
                self.emit(WikiEvent::Start(
                    "img",
                    vec![("src", src.trim().to_owned()), ("alt", alt.trim().to_owned())],
                ));
                self.emit(WikiEvent::End);
                pos += 2 + end + 2;
                continue;
            }

            if rest.starts_with("\\\\") {
                self.flush_text(&mut buffer);
                self.emit(WikiEvent::start("br"));
                self.emit(WikiEvent::End);
                pos += 2;
                continue;
            }

            let at_word_start = text[..pos]
                .chars()
                .next_back()
                .is_none_or(|c| !c.is_alphanumeric());
            if at_word_start && let Some(found) = FREE_LINK.find(rest) {
                let url = found
                    .as_str()
                    .trim_end_matches(['.', ',', ';', ':', '!', '?', '"', '\'', ')']);
                self.flush_text(&mut buffer);
                self.link(url, None);
                pos += url.len();
                continue;
            }

            for &(delimiter, tag) in FORMATS {
                if !rest.starts_with(delimiter) {
                    continue;
                }
                self.flush_text(&mut buffer);
                if let Some(index) = open.iter().rposition(|&t| t == tag) {
                    for _ in index..open.len() {
                        self.emit(WikiEvent::End);
                    }
                    open.truncate(index);
                } else {
                    self.emit(WikiEvent::start(tag));
                    open.push(tag);
                }
                pos += delimiter.len();
                continue 'scan;
            }

            let ch = rest.chars().next().unwrap_or_default();
            buffer.push(ch);
            pos += ch.len_utf8();
        }

        self.flush_text(&mut buffer);
        for _ in open {
            self.emit(WikiEvent::End);
        }
    }
}

/// Offset of the `}}}` closing inline nowiki. Extra closing braces belong
/// to the content.
fn find_nowiki_end(body: &str) -> Option<usize> {
    let start = body.find("}}}")?;
    let extra = body[start + 3..].chars().take_while(|&c| c == '}').count();
    Some(start + extra)
}

/// Split a table row on `|`, ignoring separators inside links and images.
fn split_cells(row: &str) -> Vec<&str> {
    let mut cells = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let bytes = row.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'[' | b'{' if bytes.get(i + 1) == Some(&bytes[i]) => {
                depth += 1;
                i += 2;
                continue;
            }
            b']' | b'}' if bytes.get(i + 1) == Some(&bytes[i]) => {
                depth = depth.saturating_sub(1);
                i += 2;
                continue;
            }
            b'|' if depth == 0 => {
                cells.push(&row[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    cells.push(&row[start..]);
    cells
}

/// Tokenize Creole markup. Wiki links point below `wiki_base`.
pub fn wiki_events(input: &str, wiki_base: &str) -> Vec<WikiEvent> {
    let mut generator = Generator {
        wiki_base,
        events: Vec::new(),
        block: Block::None,
    };
    let mut lines = input.lines();
    while let Some(line) = lines.next() {
        generator.line(line, &mut lines);
    }
    generator.close_block();
    generator.events
}

/// Registered as `creole`.
#[derive(Clone, Debug)]
pub struct CreoleParser {
    wiki_base: String,
}

impl Default for CreoleParser {
    fn default() -> Self {
        Self {
            wiki_base: "/".to_owned(),
        }
    }
}

impl CreoleParser {
    /// Prefix for links to wiki pages.
    #[must_use]
    pub fn with_wiki_base(mut self, base: impl Into<String>) -> Self {
        self.wiki_base = base.into();
        self
    }
}

impl Parser for CreoleParser {
    fn name(&self) -> &str {
        "Creole"
    }

    fn parse(&self, input: &str, _reason: &str) -> Result<Document, ParseError> {
        let mut builder = TreeBuilder::new();
        for event in wiki_events(input, &self.wiki_base) {
            match event {
                WikiEvent::Start(name, attributes) => {
                    builder.start(name, attributes)?;
                }
                WikiEvent::End => {
                    builder.end();
                }
                WikiEvent::Text(text) => builder.text(&text)?,
            }
        }
        Ok(builder.finish())
    }
}
