//! Tag classification shared by the renderer and the HTML parser.

use std::collections::BTreeSet;

/// Elements that never have content or a closing tag.
pub const SELF_CLOSING_TAGS: &[&str] = &[
    "br", "img", "area", "hr", "param", "meta", "link", "base", "input", "embed", "col",
];

const ISOLATED_TAGS: &[&str] = &["script", "style", "pre"];
const NESTABLE_BLOCK_TAGS: &[&str] = &["blockquote", "div", "fieldset", "ins", "del"];
const NON_NESTABLE_BLOCK_TAGS: &[&str] = &["address", "form", "p"];
const NESTABLE_INLINE_TAGS: &[&str] = &[
    "span", "font", "q", "object", "bdo", "sub", "sup", "center",
];

/// True if `name` renders without content or closing tag.
pub fn is_self_closing(name: &str) -> bool {
    SELF_CLOSING_TAGS.contains(&name)
}

/// Tag sets driving the lenient HTML parser.
///
/// Plugins receive a mutable reference before the parser is built and may
/// extend any of the sets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagRules {
    /// Tags parsed as void elements.
    pub self_closing_tags: BTreeSet<String>,
    /// Tags whose content is kept as raw text.
    pub isolated_tags: BTreeSet<String>,
    /// Block tags that may contain themselves.
    pub nestable_block_tags: BTreeSet<String>,
    /// Block tags that close a previous open tag of the same name.
    pub non_nestable_block_tags: BTreeSet<String>,
    /// Inline tags that may contain themselves.
    pub nestable_inline_tags: BTreeSet<String>,
}

fn to_set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|&n| n.to_owned()).collect()
}

impl Default for TagRules {
    fn default() -> Self {
        Self {
            self_closing_tags: to_set(SELF_CLOSING_TAGS),
            isolated_tags: to_set(ISOLATED_TAGS),
            nestable_block_tags: to_set(NESTABLE_BLOCK_TAGS),
            non_nestable_block_tags: to_set(NON_NESTABLE_BLOCK_TAGS),
            nestable_inline_tags: to_set(NESTABLE_INLINE_TAGS),
        }
    }
}
