//! Lightweight markup for comments.
//!
//! HTML is not allowed; instead a handful of markers are recognized:
//!
//! | markup              | result                          |
//! |---------------------|---------------------------------|
//! | ``` ``code`` ```    | `<code>` with literal text      |
//! | `` `code` ``        | `<code>` with literal text      |
//! | `**bold**`          | `<strong>`                      |
//! | `*italic*`          | `<em>`                          |
//! | `[[href caption]]`  | `<a rel="nofollow">`            |
//! | `<quote>..</quote>` | `<blockquote>`                  |
//! | `<code>..</code>`   | `<pre>` block                   |
//! | blank line          | new paragraph                   |
//! | `\` at line end     | `<br>`                          |

use std::sync::LazyLock;

use regex::Regex;
use tp_fragment::{Attributes, Document, FragmentError, MAX_DEPTH, NodeId};

use crate::Parser;
use crate::error::ParseError;
use crate::validate::is_valid_url;

static START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\A(?:",
        r"(?P<quote><quote>)",
        r"|(?P<code_block><code>)",
        r"|(?P<paragraph>\n{2,})",
        r"|(?P<escaped_code>``)",
        r"|(?P<strong>\*\*)",
        r"|(?P<link>\[\[)",
        r"|(?P<newline>\\(?:\n|\z))",
        r"|(?P<code>`)",
        r"|(?P<emphasized>\*)",
        r")"
    ))
    .expect("invalid comment markup regex")
});

/// Balanced marker that may contain other markup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Marker {
    Strong,
    Emphasized,
    Quote,
}

impl Marker {
    fn end(self) -> &'static str {
        match self {
            Self::Strong => "**",
            Self::Emphasized => "*",
            Self::Quote => "</quote>",
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Self::Strong => "strong",
            Self::Emphasized => "em",
            Self::Quote => "blockquote",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Text(String),
    Begin(Marker),
    End(Marker),
    Code(String),
    Link(String),
    CodeBlock(String),
    Paragraph,
    Newline,
}

const GROUPS: [&str; 9] = [
    "quote",
    "code_block",
    "paragraph",
    "escaped_code",
    "strong",
    "link",
    "newline",
    "code",
    "emphasized",
];

/// Token for markup whose content is taken verbatim.
fn raw_token(group: &str, content: &str) -> Token {
    let content = content.to_owned();
    match group {
        "link" => Token::Link(content),
        "code_block" => Token::CodeBlock(content),
        _ => Token::Code(content),
    }
}

fn raw_end(group: &str) -> &'static str {
    match group {
        "link" => "]]",
        "code_block" => "</code>",
        "escaped_code" => "``",
        _ => "`",
    }
}

/// Split comment text into tokens. Markers still open at the end of the
/// input are closed in reverse order.
fn tokenize(input: &str) -> Vec<Token> {
    let text = input.lines().collect::<Vec<_>>().join("\n");
    let mut tokens = Vec::new();
    let mut stack: Vec<Marker> = Vec::new();
    let mut buffer = String::new();
    let mut pos = 0;

    let flush = |buffer: &mut String, tokens: &mut Vec<Token>| {
        if !buffer.is_empty() {
            tokens.push(Token::Text(std::mem::take(buffer)));
        }
    };

    while pos < text.len() {
        let rest = &text[pos..];
        if let Some(&top) = stack.last()
            && rest.starts_with(top.end())
        {
            flush(&mut buffer, &mut tokens);
            tokens.push(Token::End(top));
            stack.pop();
            pos += top.end().len();
            continue;
        }

        if let Some(caps) = START.captures(rest) {
            flush(&mut buffer, &mut tokens);
            let after = pos + caps[0].len();
            let group = GROUPS
                .into_iter()
                .find(|name| caps.name(name).is_some())
                .unwrap_or("emphasized");
            match group {
                "paragraph" => tokens.push(Token::Paragraph),
                "newline" => tokens.push(Token::Newline),
                "strong" | "emphasized" | "quote" => {
                    let marker = match group {
                        "strong" => Marker::Strong,
                        "quote" => Marker::Quote,
                        _ => Marker::Emphasized,
                    };
                    tokens.push(Token::Begin(marker));
                    stack.push(marker);
                }
                _ => {
                    let body = &text[after..];
                    let end = raw_end(group);
                    let Some(found) = body.find(end) else {
                        tokens.push(raw_token(group, body));
                        break;
                    };
                    tokens.push(raw_token(group, &body[..found]));
                    pos = after + found + end.len();
                    continue;
                }
            }
            pos = after;
            continue;
        }

        let ch = rest.chars().next().unwrap_or_default();
        buffer.push(ch);
        pos += ch.len_utf8();
    }

    flush(&mut buffer, &mut tokens);
    tokens.extend(stack.into_iter().rev().map(Token::End));
    tokens
}

/// Tree under construction: finished paragraphs plus the open one.
struct CommentTree {
    doc: Document,
    paragraph: NodeId,
    open: Vec<(Marker, NodeId)>,
    /// Markers begun past the depth limit; they add no element.
    flattened: usize,
}

impl CommentTree {
    fn new() -> Self {
        let mut doc = Document::new();
        let paragraph = doc.create_element("p");
        Self {
            doc,
            paragraph,
            open: Vec::new(),
            flattened: 0,
        }
    }

    fn current(&self) -> NodeId {
        self.open.last().map_or(self.paragraph, |&(_, id)| id)
    }

    fn append(&mut self, node: NodeId) -> Result<(), FragmentError> {
        let parent = self.current();
        self.doc.append(parent, node)
    }

    fn element_with_text(
        &mut self,
        name: &str,
        attributes: Attributes,
        text: &str,
    ) -> Result<NodeId, FragmentError> {
        let element = self.doc.create_element_with(name, attributes);
        let text = self.doc.create_text(text);
        self.doc.append(element, text)?;
        Ok(element)
    }

    /// Emit the current paragraph if it has content and start a new one,
    /// re-opening the markers that are still open.
    fn break_paragraph(&mut self) -> Result<(), FragmentError> {
        let root = self.doc.root();
        if self.doc.is_truthy(self.paragraph) {
            self.doc.append(root, self.paragraph)?;
        }
        self.paragraph = self.doc.create_element("p");
        let mut parent = self.paragraph;
        for entry in &mut self.open {
            let element = self.doc.create_element(entry.0.tag());
            self.doc.append(parent, element)?;
            entry.1 = element;
            parent = element;
        }
        Ok(())
    }

    fn apply(&mut self, token: Token) -> Result<(), FragmentError> {
        match token {
            Token::Begin(_) if self.open.len() >= MAX_DEPTH => self.flattened += 1,
            Token::Begin(marker) => {
                let element = self.doc.create_element(marker.tag());
                self.append(element)?;
                self.open.push((marker, element));
            }
            // Ends arrive innermost first, so flattened markers close first.
            Token::End(_) if self.flattened > 0 => self.flattened -= 1,
            Token::End(marker) => {
                if self.open.last().is_some_and(|&(m, _)| m == marker) {
                    self.open.pop();
                }
            }
            Token::Text(text) => {
                let node = self.doc.create_text(text);
                self.append(node)?;
            }
            Token::Code(code) => {
                let element = self.element_with_text("code", Attributes::new(), &code)?;
                self.append(element)?;
            }
            Token::Link(data) => {
                let (href, caption) = data.split_once(' ').unwrap_or((&data, &data));
                let node = if is_valid_url(href) {
                    let attributes = Attributes::from([
                        ("href".to_owned(), href.to_owned()),
                        ("rel".to_owned(), "nofollow".to_owned()),
                    ]);
                    self.element_with_text("a", attributes, caption)?
                } else {
                    self.doc.create_text(data.as_str())
                };
                self.append(node)?;
            }
            Token::CodeBlock(code) => {
                self.break_paragraph()?;
                let pre = self.element_with_text("pre", Attributes::new(), &code)?;
                let root = self.doc.root();
                self.doc.append(root, pre)?;
            }
            Token::Paragraph => self.break_paragraph()?,
            Token::Newline => {
                let br = self.doc.create_element("br");
                self.append(br)?;
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Document, FragmentError> {
        let root = self.doc.root();
        if self.doc.is_truthy(self.paragraph) {
            self.doc.append(root, self.paragraph)?;
        }
        Ok(self.doc)
    }
}

/// Registered as `comment`.
#[derive(Clone, Copy, Debug, Default)]
pub struct CommentParser;

impl Parser for CommentParser {
    fn name(&self) -> &str {
        "Emphasized Text"
    }

    fn parse(&self, input: &str, _reason: &str) -> Result<Document, ParseError> {
        let mut tree = CommentTree::new();
        for token in tokenize(input) {
            tree.apply(token)?;
        }
        Ok(tree.finish()?)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tp_fragment::NoCallbacks;

    use super::*;

    fn html(input: &str) -> String {
        let doc = CommentParser.parse(input, "comment").unwrap();
        doc.render(doc.root(), &NoCallbacks).unwrap()
    }

    #[test]
    fn test_bold_and_italic() {
        assert_eq!(
            html("**bold** and *italic*"),
            "<p><strong>bold</strong> and <em>italic</em></p>"
        );
    }

    #[test]
    fn test_inline_code() {
        assert_eq!(html("`code`"), "<p><code>code</code></p>");
        assert_eq!(html("``a ` b`` **x**"), "<p><code>a ` b</code> <strong>x</strong></p>");
        assert_eq!(html("`*not* em`"), "<p><code>*not* em</code></p>");
    }

    #[test]
    fn test_unterminated_markers_are_closed() {
        assert_eq!(html("**bold"), "<p><strong>bold</strong></p>");
        assert_eq!(html("**a *b"), "<p><strong>a <em>b</em></strong></p>");
        assert_eq!(html("`open code"), "<p><code>open code</code></p>");
    }

    #[test]
    fn test_line_break() {
        assert_eq!(html("line one\\\nline two"), "<p>line one<br>line two</p>");
    }

    #[test]
    fn test_paragraphs() {
        assert_eq!(html("first\n\nsecond"), "<p>first</p><p>second</p>");
        assert_eq!(html("\n\n\nonly\n\n\n"), "<p>only</p>");
        assert_eq!(html("a\r\n\r\nb"), "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_paragraph_break_reopens_markers() {
        assert_eq!(
            html("**one\n\ntwo**"),
            "<p><strong>one</strong></p><p><strong>two</strong></p>"
        );
    }

    #[test]
    fn test_links() {
        assert_eq!(
            html("see [[http://example.com/ the site]]"),
            "<p>see <a href=\"http://example.com/\" rel=\"nofollow\">the site</a></p>"
        );
        assert_eq!(
            html("[[https://example.org]]"),
            "<p><a href=\"https://example.org\" rel=\"nofollow\">https://example.org</a></p>"
        );
        assert_eq!(
            html("[[javascript:alert(1) click]]"),
            "<p>javascript:alert(1) click</p>"
        );
        assert_eq!(html("[[/relative]]"), "<p>/relative</p>");
    }

    #[test]
    fn test_quote_and_code_block() {
        assert_eq!(
            html("<quote>said *this*</quote>"),
            "<p><blockquote>said <em>this</em></blockquote></p>"
        );
        assert_eq!(
            html("intro<code>fn main() {\n\n}</code>outro"),
            "<p>intro</p><pre>fn main() {\n\n}</pre><p>outro</p>"
        );
    }

    #[test]
    fn test_html_is_escaped() {
        assert_eq!(html("<b>x</b> & y"), "<p>&lt;b&gt;x&lt;/b&gt; &amp; y</p>");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(html(""), "");
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_deep_quotes_are_capped() {
        let depth = 10_000;
        let input = format!("{}x{}", "<quote>".repeat(depth), "</quote>".repeat(depth));
        let doc = CommentParser.parse(&input, "comment").unwrap();

        let mut levels = 0;
        let mut cursor = doc.children(doc.root())[0];
        while let Some(&child) = doc.children(cursor).first() {
            if doc.name(child) == Some("blockquote") {
                levels += 1;
            }
            cursor = child;
        }
        assert_eq!(levels, MAX_DEPTH);
        assert_eq!(doc.text(doc.root(), &NoCallbacks).unwrap(), "x\n\n");

        // Unterminated markers nest just as deep and are closed at the end.
        let html = html(&format!("{}x", "<quote>*".repeat(depth)));
        assert!(html.starts_with("<p><blockquote><em><blockquote><em>"));
        assert!(html.ends_with("x</em></blockquote></em></blockquote></p>"));
        assert_eq!(html.matches("<em>").count(), MAX_DEPTH / 2);
    }

    #[test]
    fn test_flattened_markers_close_before_outer_ones() {
        let inner = "<quote>".repeat(MAX_DEPTH + 2);
        let closing = "</quote>".repeat(MAX_DEPTH + 2);
        let doc = CommentParser
            .parse(&format!("{inner}a{closing}tail"), "comment")
            .unwrap();
        let p = doc.children(doc.root())[0];

        assert_eq!(doc.children(p).len(), 2);
        assert_eq!(doc.value(doc.children(p)[1]), Some("tail"));
    }

    #[test]
    fn test_tokens() {
        assert_eq!(
            tokenize("*a*\\\n`b`"),
            vec![
                Token::Begin(Marker::Emphasized),
                Token::Text("a".to_owned()),
                Token::End(Marker::Emphasized),
                Token::Newline,
                Token::Code("b".to_owned()),
            ]
        );
    }
}
