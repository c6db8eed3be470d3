//! Lenient tag-soup HTML parser.
//!
//! Unclosed tags are balanced with the classic nesting rules: a
//! non-nestable tag closes a previous open tag of the same name, list and
//! table tags close back to their container, and block tags reset inline
//! nesting. Unmatched end tags are ignored, comments and declarations are
//! dropped, and the content of isolated tags (`script`, `style`, `pre`) is
//! kept as raw text.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tp_events::EventBus;
use tp_fragment::{Attributes, Document, TagRules};

use crate::builder::TreeBuilder;
use crate::error::ParseError;
use crate::Parser;

static TAG_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A<([A-Za-z][A-Za-z0-9:_.-]*)").expect("invalid tag open regex")
});

static TAG_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A\s*(/?)>").expect("invalid tag close regex"));

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\A\s*([^\s"'<>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
        .expect("invalid attribute regex")
});

static END_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A</\s*([A-Za-z][A-Za-z0-9:_.-]*)[^>]*>").expect("invalid end tag regex")
});

/// Tag name and the containers that stop an auto-close walk for it.
const LIST_NESTING: &[(&str, &[&str])] = &[
    ("ol", &[]),
    ("ul", &[]),
    ("li", &["ul", "ol"]),
    ("dl", &[]),
    ("dd", &["dl"]),
    ("dt", &["dl"]),
];

const TABLE_NESTING: &[(&str, &[&str])] = &[
    ("table", &[]),
    ("tr", &["table", "tbody", "tfoot", "thead"]),
    ("td", &["tr"]),
    ("th", &["tr"]),
    ("thead", &["table"]),
    ("tbody", &["table"]),
    ("tfoot", &["table"]),
];

/// Nesting tables derived from [`TagRules`].
#[derive(Debug)]
struct Nesting {
    /// Nestable tags mapped to their reset triggers.
    nestable: HashMap<String, Vec<String>>,
    /// Tags that stop the auto-close walk of other reset tags.
    reset: HashSet<String>,
}

impl Nesting {
    fn new(rules: &TagRules) -> Self {
        let mut nestable: HashMap<String, Vec<String>> = rules
            .nestable_inline_tags
            .iter()
            .chain(&rules.nestable_block_tags)
            .map(|tag| (tag.clone(), Vec::new()))
            .collect();
        let mut reset: HashSet<String> = rules
            .nestable_block_tags
            .iter()
            .chain(&rules.non_nestable_block_tags)
            .cloned()
            .collect();
        reset.insert("noscript".to_owned());
        for &(tag, triggers) in LIST_NESTING.iter().chain(TABLE_NESTING) {
            nestable.insert(
                tag.to_owned(),
                triggers.iter().map(|&t| t.to_owned()).collect(),
            );
            reset.insert(tag.to_owned());
        }
        Self { nestable, reset }
    }
}

/// The "Simplified HTML" parser, registered as `default`.
#[derive(Debug)]
pub struct SimpleHtmlParser {
    rules: TagRules,
    nesting: Nesting,
}

impl Default for SimpleHtmlParser {
    fn default() -> Self {
        Self::with_rules(TagRules::default())
    }
}

impl SimpleHtmlParser {
    /// Build a parser, letting `setup-simplehtml-parser` listeners adjust the
    /// default tag rules first.
    pub fn new(events: &EventBus) -> Result<Self, ParseError> {
        let mut rules = TagRules::default();
        events.emit_setup_simplehtml_parser(&mut rules)?;
        Ok(Self::with_rules(rules))
    }

    #[must_use]
    pub fn with_rules(rules: TagRules) -> Self {
        let nesting = Nesting::new(&rules);
        Self { rules, nesting }
    }

    pub fn rules(&self) -> &TagRules {
        &self.rules
    }

    /// Parse `input` into a document.
    pub fn parse_html(&self, input: &str) -> Result<Document, ParseError> {
        let mut tree = TreeBuilder::new();
        let mut pos = 0;
        while pos < input.len() {
            if let Some(name) = self.open_isolated(&tree) {
                let rest = &input[pos..];
                let end = find_end_tag(rest, &name);
                let raw = end.unwrap_or(rest.len());
                tree.text(&rest[..raw])?;
                pos += raw;
                if end.is_none() {
                    break;
                }
            }

            let rest = &input[pos..];
            let Some(lt) = rest.find('<') else {
                append_text(&mut tree, rest)?;
                break;
            };
            if lt > 0 {
                append_text(&mut tree, &rest[..lt])?;
                pos += lt;
                continue;
            }

            if let Some(comment) = rest.strip_prefix("<!--") {
                pos += comment.find("-->").map_or(rest.len(), |i| i + 7);
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                pos += rest.find('>').map_or(rest.len(), |i| i + 1);
            } else if let Some(caps) = END_TAG.captures(rest) {
                self.end_tag(&mut tree, &caps[1].to_ascii_lowercase());
                pos += caps[0].len();
            } else if let Some(consumed) = self.start_tag(&mut tree, rest)? {
                pos += consumed;
            } else {
                tree.text("<")?;
                pos += 1;
            }
        }
        Ok(tree.finish())
    }

    fn open_isolated(&self, tree: &TreeBuilder) -> Option<String> {
        let name = tree.document().name(tree.current())?;
        self.rules
            .isolated_tags
            .contains(name)
            .then(|| name.to_owned())
    }

    /// Parse a start tag at the beginning of `rest`, returning the number of
    /// bytes consumed.
    fn start_tag(&self, tree: &mut TreeBuilder, rest: &str) -> Result<Option<usize>, ParseError> {
        let Some(open) = TAG_OPEN.captures(rest) else {
            return Ok(None);
        };
        let name = open[1].to_ascii_lowercase();
        let mut pos = open[0].len();
        let mut attributes = Attributes::new();
        let mut explicit_close = false;
        loop {
            let tail = &rest[pos..];
            if let Some(close) = TAG_CLOSE.captures(tail) {
                explicit_close = !close[1].is_empty();
                pos += close[0].len();
                break;
            }
            if let Some(attr) = ATTRIBUTE.captures(tail) {
                let key = attr[1].to_ascii_lowercase();
                let value = attr
                    .get(2)
                    .or_else(|| attr.get(3))
                    .or_else(|| attr.get(4))
                    .map_or_else(|| key.clone(), |m| decode_entities(m.as_str()));
                attributes.entry(key).or_insert(value);
                pos += attr[0].len();
                continue;
            }
            match tail.chars().next() {
                Some(junk) => pos += junk.len_utf8(),
                None => break,
            }
        }

        self.smart_pop(tree, &name);
        tree.start(&name, attributes)?;
        if explicit_close || self.rules.self_closing_tags.contains(&name) {
            tree.end();
        }
        Ok(Some(pos))
    }

    /// Close open tags that cannot contain a new `name` tag.
    fn smart_pop(&self, tree: &mut TreeBuilder, name: &str) {
        let triggers = self.nesting.nestable.get(name);
        let resets = self.nesting.reset.contains(name);
        let doc = tree.document();
        let mut cut = None;
        for (depth, &id) in tree.stack().iter().enumerate().skip(1).rev() {
            let open = doc.name(id).unwrap_or_default();
            match triggers {
                None if open == name => {
                    cut = Some(depth);
                    break;
                }
                Some(triggers) if triggers.iter().any(|t| t == open) => {
                    cut = Some(depth + 1);
                    break;
                }
                None if resets && self.nesting.reset.contains(open) => {
                    cut = Some(depth + 1);
                    break;
                }
                _ => {}
            }
        }
        if let Some(depth) = cut {
            tree.truncate(depth);
        }
    }

    fn end_tag(&self, tree: &mut TreeBuilder, name: &str) {
        if self.rules.self_closing_tags.contains(name) {
            return;
        }
        let doc = tree.document();
        let open = tree
            .stack()
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .find(|&(_, &id)| doc.name(id) == Some(name))
            .map(|(depth, _)| depth);
        if let Some(depth) = open {
            tree.truncate(depth);
        }
    }
}

impl Parser for SimpleHtmlParser {
    fn name(&self) -> &str {
        "Simplified HTML"
    }

    fn parse(&self, input: &str, _reason: &str) -> Result<Document, ParseError> {
        self.parse_html(input)
    }
}

fn decode_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

fn append_text(tree: &mut TreeBuilder, text: &str) -> Result<(), ParseError> {
    tree.text(&html_escape::decode_html_entities(text))?;
    Ok(())
}

/// Byte offset of `</name` (any case) followed by a non-name character.
fn find_end_tag(haystack: &str, name: &str) -> Option<usize> {
    haystack.match_indices("</").map(|(i, _)| i).find(|&i| {
        let start = i + 2;
        let end = start + name.len();
        haystack
            .get(start..end)
            .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name))
            && haystack[end..]
                .chars()
                .next()
                .is_none_or(|c| !c.is_ascii_alphanumeric())
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tp_events::Position;
    use tp_fragment::NoCallbacks;

    use super::*;

    fn html(input: &str) -> String {
        let doc = SimpleHtmlParser::default().parse_html(input).unwrap();
        doc.render(doc.root(), &NoCallbacks).unwrap()
    }

    #[test]
    fn test_well_formed_input_round_trips() {
        assert_eq!(
            html("<p>Hello <a href=\"/x\" title='t'>world</a></p>"),
            "<p>Hello <a href=\"/x\" title=\"t\">world</a></p>"
        );
    }

    #[test]
    fn test_names_are_lowercased_and_entities_decoded() {
        let doc = SimpleHtmlParser::default()
            .parse_html("<P CLASS=Intro>caf&eacute; &amp; &#169;</P>")
            .unwrap();
        let p = doc.query(doc.root(), "p").unwrap().first().unwrap();

        assert_eq!(p.attribute("class"), Some("Intro"));
        assert_eq!(doc.query(doc.root(), "#").unwrap().text(), "café & ©");
    }

    #[test]
    fn test_unclosed_tags_are_balanced() {
        assert_eq!(html("<b>bold <i>both"), "<b>bold <i>both</i></b>");
        assert_eq!(html("<p>one<p>two"), "<p>one</p><p>two</p>");
        assert_eq!(
            html("<ul><li>a<li>b</ul>after"),
            "<ul><li>a</li><li>b</li></ul>after"
        );
        assert_eq!(
            html("<table><tr><td>1<td>2<tr><td>3</table>"),
            "<table><tr><td>1</td><td>2</td></tr><tr><td>3</td></tr></table>"
        );
    }

    #[test]
    fn test_block_resets_nesting() {
        assert_eq!(
            html("<div><p>in div<p>again</div>out"),
            "<div><p>in div</p><p>again</p></div>out"
        );
        assert_eq!(
            html("<div><div>nested</div></div>"),
            "<div><div>nested</div></div>"
        );
    }

    #[test]
    fn test_unmatched_end_tags_are_ignored() {
        assert_eq!(html("a</b>c</p>"), "ac");
        assert_eq!(html("<br/>x<br></br>"), "<br>x<br>");
    }

    #[test]
    fn test_self_closing_tags() {
        assert_eq!(
            html("<p>a<br>b<img src=\"x.png\" alt=\"\">c</p>"),
            "<p>a<br>b<img alt=\"\" src=\"x.png\">c</p>"
        );
    }

    #[test]
    fn test_comments_and_declarations_are_dropped() {
        assert_eq!(
            html("<!DOCTYPE html><!-- note -->a<?xml x?>b<!-- open"),
            "ab"
        );
    }

    #[test]
    fn test_isolated_tags_keep_raw_content() {
        assert_eq!(
            html("<pre><b>not bold</b> &amp;</pre>after"),
            "<pre>&lt;b&gt;not bold&lt;/b&gt; &amp;amp;</pre>after"
        );
        assert_eq!(html("<script>if (a < b) {}"), "<script>if (a &lt; b) {}</script>");
    }

    #[test]
    fn test_stray_angle_bracket_is_text() {
        assert_eq!(html("1 < 2 <3"), "1 &lt; 2 &lt;3");

        let doc = SimpleHtmlParser::default().parse_html(&"<".repeat(50_000)).unwrap();
        let children = doc.children(doc.root());
        assert_eq!(children.len(), 1);
        assert_eq!(doc.value(children[0]).map(str::len), Some(50_000));
    }

    #[test]
    fn test_setup_event_extends_rules() {
        let mut events = EventBus::new();
        events.connect_setup_simplehtml_parser(Position::After, |rules| {
            rules.isolated_tags.insert("code".to_owned());
            Ok(())
        });
        let parser = SimpleHtmlParser::new(&events).unwrap();
        let doc = parser.parse("<code><em>x</em></code>", "post-body").unwrap();

        assert!(parser.rules().isolated_tags.contains("code"));
        assert_eq!(
            doc.render(doc.root(), &NoCallbacks).unwrap(),
            "<code>&lt;em&gt;x&lt;/em&gt;</code>"
        );
    }

    #[test]
    fn test_find_end_tag() {
        assert_eq!(find_end_tag("abc</PRE>", "pre"), Some(3));
        assert_eq!(find_end_tag("</prefix></pre >", "pre"), Some(9));
        assert_eq!(find_end_tag("nothing", "pre"), None);
    }
}
