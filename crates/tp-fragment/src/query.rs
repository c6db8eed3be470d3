//! Path-like query rules over a document tree.
//!
//! A rule is a `/`-separated list of steps. A step that starts with `/` only
//! looks at direct children of the current node set; any other step scans all
//! descendants, depth-first, yielding each node at most once.
//!
//! | step            | matches                                  |
//! |-----------------|------------------------------------------|
//! | `*`             | any element                              |
//! | `+`             | any node without a value                 |
//! | `#`             | any node with a value (text, raw markup) |
//! | `name`          | elements with that tag name              |
//! | `name[k=v]`     | attribute `k` equals `v`                 |
//! | `name[k!=v]`    | attribute `k` is absent or differs       |
//! | `name[@k]`      | attribute `k` is present                 |
//! | `name[!k]`      | attribute `k` is absent                  |
//!
//! Results are produced lazily and memoized by [`QueryResult`].

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::error::QueryError;
use crate::node::{Document, NodeId, NodeKind, NodeRef};

type NodeIter<'a> = Box<dyn Iterator<Item = NodeId> + 'a>;

#[derive(Clone, Debug, PartialEq, Eq)]
enum NodeTest {
    Element,
    NoValue,
    HasValue,
    Name(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Predicate {
    Equals(String, String),
    NotEquals(String, String),
    Present(String),
    Absent(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Step {
    anchored: bool,
    test: NodeTest,
    predicate: Option<Predicate>,
}

impl Step {
    fn matches(&self, doc: &Document, id: NodeId) -> bool {
        let passes_test = match &self.test {
            NodeTest::Element => doc.kind(id) == NodeKind::Element,
            NodeTest::NoValue => doc.value(id).is_none(),
            NodeTest::HasValue => doc.value(id).is_some(),
            NodeTest::Name(name) => doc.name(id) == Some(name.as_str()),
        };
        if !passes_test {
            return false;
        }
        let attributes = doc.attributes(id);
        match &self.predicate {
            None => true,
            Some(Predicate::Equals(key, value)) => attributes.get(key) == Some(value),
            Some(Predicate::NotEquals(key, value)) => attributes.get(key) != Some(value),
            Some(Predicate::Present(key)) => attributes.contains_key(key),
            Some(Predicate::Absent(key)) => !attributes.contains_key(key),
        }
    }
}

fn malformed(rule: &str, reason: &'static str) -> QueryError {
    QueryError::Malformed {
        rule: rule.to_owned(),
        reason,
    }
}

/// Split off the first step, ignoring `/` inside brackets.
fn split_step<'r>(rule: &str, rest: &'r str) -> Result<(&'r str, Option<&'r str>), QueryError> {
    let mut depth = 0usize;
    for (i, c) in rest.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '/' if depth == 0 => return Ok((&rest[..i], Some(&rest[i + 1..]))),
            _ => {}
        }
    }
    if depth > 0 {
        return Err(malformed(rule, "unterminated predicate"));
    }
    Ok((rest, None))
}

fn parse_predicate(inner: &str) -> Result<Predicate, QueryError> {
    let unknown = || QueryError::UnknownPredicate(inner.to_owned());
    let predicate = if let Some((key, value)) = inner.split_once("!=") {
        Predicate::NotEquals(key.to_owned(), value.to_owned())
    } else if let Some((key, value)) = inner.split_once('=') {
        Predicate::Equals(key.to_owned(), value.to_owned())
    } else if let Some(key) = inner.strip_prefix('@') {
        Predicate::Present(key.to_owned())
    } else if let Some(key) = inner.strip_prefix('!') {
        Predicate::Absent(key.to_owned())
    } else {
        return Err(unknown());
    };
    let key = match &predicate {
        Predicate::Equals(key, _)
        | Predicate::NotEquals(key, _)
        | Predicate::Present(key)
        | Predicate::Absent(key) => key,
    };
    if key.is_empty() {
        return Err(unknown());
    }
    Ok(predicate)
}

fn parse_step(rule: &str, part: &str, anchored: bool) -> Result<Step, QueryError> {
    let (test, predicate) = match part.find('[') {
        Some(open) => {
            let inner = part[open + 1..]
                .strip_suffix(']')
                .ok_or_else(|| malformed(rule, "text after predicate"))?;
            (&part[..open], Some(parse_predicate(inner)?))
        }
        None => (part, None),
    };
    let test = match test {
        "" => return Err(malformed(rule, "empty step")),
        "*" => NodeTest::Element,
        "+" => NodeTest::NoValue,
        "#" => NodeTest::HasValue,
        name => NodeTest::Name(name.to_owned()),
    };
    Ok(Step {
        anchored,
        test,
        predicate,
    })
}

fn parse_rule(rule: &str) -> Result<Rc<[Step]>, QueryError> {
    let mut steps = Vec::new();
    let mut rest = rule;
    loop {
        let anchored = rest.starts_with('/');
        if anchored {
            rest = &rest[1..];
        }
        let (part, tail) = split_step(rule, rest)?;
        steps.push(parse_step(rule, part, anchored)?);
        match tail {
            Some(tail) if !tail.is_empty() => rest = tail,
            _ => break,
        }
    }
    Ok(steps.into())
}

/// Pre-order walk over each input node and its subtree.
struct Descendants<'a> {
    doc: &'a Document,
    roots: NodeIter<'a>,
    stack: Vec<NodeId>,
    seen: HashSet<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        loop {
            let id = match self.stack.pop() {
                Some(id) => id,
                None => self.roots.next()?,
            };
            if !self.seen.insert(id) {
                continue;
            }
            self.stack
                .extend(self.doc.children(id).iter().rev().copied());
            return Some(id);
        }
    }
}

fn select<'a>(doc: &'a Document, nodes: NodeIter<'a>, steps: Rc<[Step]>, at: usize) -> NodeIter<'a> {
    let step = steps[at].clone();
    let candidates: NodeIter<'a> = if step.anchored {
        nodes
    } else {
        Box::new(Descendants {
            doc,
            roots: nodes,
            stack: Vec::new(),
            seen: HashSet::new(),
        })
    };
    let matched = candidates.filter(move |&id| step.matches(doc, id));
    if at + 1 == steps.len() {
        return Box::new(matched);
    }
    Box::new(matched.flat_map(move |id| {
        let children: NodeIter<'a> = Box::new(doc.children(id).iter().copied());
        select(doc, children, Rc::clone(&steps), at + 1)
    }))
}

/// Evaluate `rule` against a set of starting nodes.
pub(crate) fn query_nodes<'a>(
    doc: &'a Document,
    nodes: NodeIter<'a>,
    rule: &str,
) -> Result<QueryResult<'a>, QueryError> {
    let steps = parse_rule(rule)?;
    let mut seen = HashSet::new();
    let source = select(doc, nodes, steps, 0).filter(move |&id| seen.insert(id));
    Ok(QueryResult::new(doc, Box::new(source)))
}

struct QueryState<'a> {
    source: Option<NodeIter<'a>>,
    results: Vec<NodeId>,
}

/// Lazily evaluated, memoizing list of query matches.
///
/// Matches are pulled from the underlying traversal only as far as the caller
/// needs them and cached, so iterating twice replays the cache.
pub struct QueryResult<'a> {
    doc: &'a Document,
    state: RefCell<QueryState<'a>>,
}

impl fmt::Debug for QueryResult<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("QueryResult")
            .field("fetched", &state.results)
            .field("exhausted", &state.source.is_none())
            .finish()
    }
}

impl<'a> QueryResult<'a> {
    fn new(doc: &'a Document, source: NodeIter<'a>) -> Self {
        Self {
            doc,
            state: RefCell::new(QueryState {
                source: Some(source),
                results: Vec::new(),
            }),
        }
    }

    fn fetch(&self, index: usize) -> Option<NodeId> {
        let mut state = self.state.borrow_mut();
        while state.results.len() <= index {
            let next = state.source.as_mut()?.next();
            match next {
                Some(id) => state.results.push(id),
                None => {
                    state.source = None;
                    return None;
                }
            }
        }
        Some(state.results[index])
    }

    fn fetch_all(&self) -> usize {
        let mut state = self.state.borrow_mut();
        if let Some(source) = state.source.take() {
            state.results.extend(source);
        }
        state.results.len()
    }

    /// Match at `index`, evaluating only as far as needed.
    pub fn get(&self, index: usize) -> Result<NodeRef<'a>, QueryError> {
        self.fetch(index)
            .map(|id| self.doc.node(id))
            .ok_or(QueryError::IndexOutOfRange(index))
    }

    pub fn first(&self) -> Result<NodeRef<'a>, QueryError> {
        self.get(0)
    }

    /// Last match. Forces full evaluation.
    pub fn last(&self) -> Result<NodeRef<'a>, QueryError> {
        let len = self.fetch_all();
        len.checked_sub(1)
            .map_or(Err(QueryError::IndexOutOfRange(0)), |i| self.get(i))
    }

    /// Number of matches. Forces full evaluation.
    pub fn len(&self) -> usize {
        self.fetch_all()
    }

    pub fn is_empty(&self) -> bool {
        self.fetch(0).is_none()
    }

    pub fn iter(&self) -> QueryIter<'_, 'a> {
        QueryIter {
            result: self,
            position: 0,
        }
    }

    /// Ids of all matches.
    pub fn ids(&self) -> Vec<NodeId> {
        self.iter().map(|node| node.id()).collect()
    }

    /// Concatenated values of all matches that carry one.
    pub fn text(&self) -> String {
        self.iter().filter_map(|node| node.value()).collect()
    }

    /// Apply another rule to the matched nodes themselves.
    pub fn query(&self, rule: &str) -> Result<QueryResult<'_>, QueryError> {
        query_nodes(self.doc, Box::new(self.iter().map(|node| node.id())), rule)
    }
}

/// Iterator over a [`QueryResult`], backed by its cache.
pub struct QueryIter<'r, 'a> {
    result: &'r QueryResult<'a>,
    position: usize,
}

impl<'a> Iterator for QueryIter<'_, 'a> {
    type Item = NodeRef<'a>;

    fn next(&mut self) -> Option<NodeRef<'a>> {
        let id = self.result.fetch(self.position)?;
        self.position += 1;
        Some(self.result.doc.node(id))
    }
}

impl<'r, 'a> IntoIterator for &'r QueryResult<'a> {
    type Item = NodeRef<'a>;
    type IntoIter = QueryIter<'r, 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Document {
    /// Query the children of `id`.
    pub fn query(&self, id: NodeId, rule: &str) -> Result<QueryResult<'_>, QueryError> {
        query_nodes(self, Box::new(self.children(id).iter().copied()), rule)
    }
}

impl<'a> NodeRef<'a> {
    /// Query the children of this node.
    pub fn query(&self, rule: &str) -> Result<QueryResult<'a>, QueryError> {
        self.doc.query(self.id, rule)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::node::Attributes;

    /// `<div><p>hello</p><p class="x">world</p></div>`
    fn paragraphs() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let root = doc.root();
        let div = doc.create_element("div");
        let first = doc.create_element("p");
        let mut attrs = Attributes::new();
        attrs.insert("class".to_owned(), "x".to_owned());
        let second = doc.create_element_with("p", attrs);
        let hello = doc.create_text("hello");
        let world = doc.create_text("world");
        doc.append(root, div).unwrap();
        doc.extend(div, [first, second]).unwrap();
        doc.append(first, hello).unwrap();
        doc.append(second, world).unwrap();
        (doc, first, second)
    }

    /// `<a><b><c/></b></a>`
    fn nested() -> (Document, NodeId, NodeId, NodeId) {
        let mut doc = Document::new();
        let a = doc.create_element("a");
        let b = doc.create_element("b");
        let c = doc.create_element("c");
        doc.append(doc.root(), a).unwrap();
        doc.append(a, b).unwrap();
        doc.append(b, c).unwrap();
        (doc, a, b, c)
    }

    #[test]
    fn test_unanchored_matches_in_document_order() {
        let (doc, first, second) = paragraphs();

        assert_eq!(doc.query(doc.root(), "p").unwrap().ids(), vec![first, second]);
        assert_eq!(doc.query(doc.root(), "p[class=x]").unwrap().ids(), vec![second]);
    }

    #[test]
    fn test_anchored_matches_direct_children_only() {
        let (doc, a, b, c) = nested();

        assert_eq!(doc.query(a, "/b").unwrap().ids(), vec![b]);
        assert!(doc.query(a, "/c").unwrap().is_empty());
        assert_eq!(doc.query(a, "c").unwrap().ids(), vec![c]);
    }

    #[test]
    fn test_chained_steps() {
        let (doc, a, b, c) = nested();
        let root = doc.root();

        assert_eq!(doc.query(root, "a/c").unwrap().ids(), vec![c]);
        assert_eq!(doc.query(root, "/a/b").unwrap().ids(), vec![b]);
        assert_eq!(doc.query(root, "/a//b/c").unwrap().ids(), vec![c]);
        assert_eq!(doc.query(root, "/a/c").unwrap().ids(), vec![c]);
        assert!(doc.query(root, "/a//c").unwrap().is_empty());
        assert_eq!(doc.query(root, "/a/").unwrap().ids(), vec![a]);
    }

    #[test]
    fn test_chained_matches_are_deduplicated() {
        let mut doc = Document::new();
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        let span = doc.create_element("span");
        doc.append(doc.root(), outer).unwrap();
        doc.append(outer, inner).unwrap();
        doc.append(inner, span).unwrap();

        assert_eq!(doc.query(doc.root(), "div/span").unwrap().ids(), vec![span]);
        assert_eq!(doc.query(doc.root(), "div").unwrap().ids(), vec![outer, inner]);
    }

    #[test]
    fn test_value_tests_and_wildcard() {
        let (doc, first, second) = paragraphs();
        let root = doc.root();

        assert_eq!(doc.query(root, "#").unwrap().text(), "helloworld");
        assert_eq!(doc.query(root, "p/#").unwrap().len(), 2);
        assert_eq!(doc.query(root, "+").unwrap().len(), 3);
        assert_eq!(doc.query(root, "*").unwrap().len(), 3);
        assert_eq!(doc.query(root, "div/*").unwrap().ids(), vec![first, second]);
    }

    #[test]
    fn test_attribute_predicates() {
        let (doc, first, second) = paragraphs();
        let root = doc.root();

        assert_eq!(doc.query(root, "p[@class]").unwrap().ids(), vec![second]);
        assert_eq!(doc.query(root, "p[!class]").unwrap().ids(), vec![first]);
        assert_eq!(doc.query(root, "p[class!=x]").unwrap().ids(), vec![first]);
        assert_eq!(doc.query(root, "p[class!=y]").unwrap().ids(), vec![first, second]);
    }

    #[test]
    fn test_slash_inside_predicate() {
        let mut doc = Document::new();
        let mut attrs = Attributes::new();
        attrs.insert("href".to_owned(), "/about/".to_owned());
        let a = doc.create_element_with("a", attrs);
        doc.append(doc.root(), a).unwrap();

        assert_eq!(doc.query(doc.root(), "a[href=/about/]").unwrap().ids(), vec![a]);
    }

    #[test]
    fn test_bad_rules() {
        let (doc, _, _) = paragraphs();
        let root = doc.root();

        assert_eq!(
            doc.query(root, "p[class]").unwrap_err(),
            QueryError::UnknownPredicate("class".to_owned())
        );
        assert_eq!(
            doc.query(root, "p[=x]").unwrap_err(),
            QueryError::UnknownPredicate("=x".to_owned())
        );
        assert!(matches!(doc.query(root, ""), Err(QueryError::Malformed { .. })));
        assert!(matches!(doc.query(root, "p[class=x"), Err(QueryError::Malformed { .. })));
        assert!(matches!(doc.query(root, "p[a=b]c"), Err(QueryError::Malformed { .. })));
    }

    #[test]
    fn test_first_last_and_index_errors() {
        let (doc, first, second) = paragraphs();
        let result = doc.query(doc.root(), "p").unwrap();

        assert_eq!(result.first().unwrap().id(), first);
        assert_eq!(result.last().unwrap().id(), second);
        assert_eq!(result.get(2).unwrap_err(), QueryError::IndexOutOfRange(2));

        let empty = doc.query(doc.root(), "table").unwrap();
        assert_eq!(empty.first().unwrap_err(), QueryError::IndexOutOfRange(0));
        assert!(empty.last().is_err());
        assert_eq!(empty.len(), 0);
    }

    #[test]
    fn test_results_are_lazy_and_memoized() {
        let (doc, first, second) = paragraphs();
        let pulled = Cell::new(0);
        let source = doc.children(doc.root()).iter().copied().inspect(|_| {
            pulled.set(pulled.get() + 1);
        });
        let result = query_nodes(&doc, Box::new(source), "p").unwrap();

        assert_eq!(pulled.get(), 0);
        assert_eq!(result.first().unwrap().id(), first);
        assert_eq!(pulled.get(), 1);

        assert_eq!(result.len(), 2);
        assert_eq!(result.len(), 2);
        let replay: Vec<_> = result.iter().map(|n| n.id()).collect();
        assert_eq!(replay, vec![first, second]);
        assert_eq!(pulled.get(), 1);
    }

    #[test]
    fn test_query_on_result_set() {
        let (doc, _, second) = paragraphs();
        let divs = doc.query(doc.root(), "div").unwrap();

        let result = divs.query("/p[class=x]").unwrap();
        assert_eq!(result.ids(), Vec::<NodeId>::new());

        let result = divs.query("p[class=x]").unwrap();
        assert_eq!(result.ids(), vec![second]);
        assert_eq!(result.query("#").unwrap().text(), "world");
    }

    #[test]
    fn test_static_fragment_has_no_matches() {
        let doc = Document::new_static("<p>x</p>");

        assert!(doc.query(doc.root(), "p").unwrap().is_empty());
        assert!(doc.query(doc.root(), "*").unwrap().is_empty());
    }
}
