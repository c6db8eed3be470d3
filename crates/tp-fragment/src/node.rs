//! Arena-backed document tree.
//!
//! Nodes live in a flat `Vec` owned by [`Document`]; children and parent links
//! are [`NodeId`] indices into it. A node is linked into at most one children
//! list: attaching a node that already has a parent fails instead of silently
//! moving it.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Bound, RangeBounds};

use serde_json::Value;

use crate::error::FragmentError;

/// Attribute map of an element. Sorted so rendering is deterministic.
pub type Attributes = BTreeMap<String, String>;

/// Render callbacks attached to a node, in registration order.
pub type CallbackData = Vec<(String, Option<Value>)>;

/// Nesting depth parsers build trees up to. Deeper markup is flattened into
/// the innermost element that still fits.
pub const MAX_DEPTH: usize = 512;

/// Handle to a node inside one [`Document`].
///
/// Ids are only meaningful for the document that created them. Read accessors
/// panic on a foreign id like slice indexing does; mutations report
/// [`FragmentError::UnknownNode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in the document arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Concrete kind of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Named element such as `p` or `a`.
    Element,
    /// Literal text, escaped on render.
    Text,
    /// Raw markup, emitted verbatim.
    Data,
    /// Wrapper-less container, the root of a parsed document.
    Fragment,
    /// Pre-rendered fragment holding its HTML in `value`.
    StaticFragment,
}

impl NodeKind {
    /// Tag used in serialized blobs.
    pub fn tag(self) -> u8 {
        match self {
            Self::Element => 0,
            Self::Text => 1,
            Self::Data => 2,
            Self::Fragment => 3,
            Self::StaticFragment => 4,
        }
    }

    /// Inverse of [`NodeKind::tag`].
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Element),
            1 => Some(Self::Text),
            2 => Some(Self::Data),
            3 => Some(Self::Fragment),
            4 => Some(Self::StaticFragment),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct NodeData {
    pub(crate) kind: NodeKind,
    pub(crate) name: Option<String>,
    pub(crate) attributes: Attributes,
    pub(crate) children: Vec<NodeId>,
    pub(crate) value: Option<String>,
    pub(crate) callback_data: Option<CallbackData>,
    pub(crate) parent: Option<NodeId>,
}

impl NodeData {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            name: None,
            attributes: Attributes::new(),
            children: Vec::new(),
            value: None,
            callback_data: None,
            parent: None,
        }
    }
}

/// A parsed document: an arena of nodes with one root.
///
/// Detached nodes stay in the arena until the document is dropped; they are
/// simply unreachable from the root.
#[derive(Clone, Debug)]
pub struct Document {
    pub(crate) nodes: Vec<NodeData>,
    pub(crate) root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document whose root is a [`NodeKind::Fragment`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData::new(NodeKind::Fragment)],
            root: NodeId(0),
        }
    }

    /// Create a document whose root is a pre-rendered static fragment.
    #[must_use]
    pub fn new_static(html: impl Into<String>) -> Self {
        let mut root = NodeData::new(NodeKind::StaticFragment);
        root.value = Some(html.into());
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    /// Empty arena, filled by the serializer. The first pushed node is the root.
    pub(crate) fn empty_arena() -> Self {
        Self {
            nodes: Vec::new(),
            root: NodeId(0),
        }
    }

    pub(crate) fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(data);
        id
    }

    /// Root node of the document.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes in the arena, detached ones included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Create a detached element.
    pub fn create_element(&mut self, name: impl Into<String>) -> NodeId {
        self.create_element_with(name, Attributes::new())
    }

    /// Create a detached element with attributes.
    pub fn create_element_with(&mut self, name: impl Into<String>, attributes: Attributes) -> NodeId {
        let mut data = NodeData::new(NodeKind::Element);
        data.name = Some(name.into());
        data.attributes = attributes;
        self.push(data)
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, value: impl Into<String>) -> NodeId {
        let mut data = NodeData::new(NodeKind::Text);
        data.value = Some(value.into());
        self.push(data)
    }

    /// Create a detached raw-markup node.
    pub fn create_data(&mut self, value: impl Into<String>) -> NodeId {
        let mut data = NodeData::new(NodeKind::Data);
        data.value = Some(value.into());
        self.push(data)
    }

    /// Create a detached fragment, used to group nodes without a wrapper tag.
    pub fn create_fragment(&mut self) -> NodeId {
        self.push(NodeData::new(NodeKind::Fragment))
    }

    fn check(&self, id: NodeId) -> Result<(), FragmentError> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(FragmentError::UnknownNode(id))
        }
    }

    fn check_attachable(&self, parent: NodeId, child: NodeId) -> Result<(), FragmentError> {
        self.check(parent)?;
        self.check(child)?;
        if child == self.root {
            return Err(FragmentError::RootNode);
        }
        if let Some(current) = self.nodes[child.0].parent {
            return Err(FragmentError::AlreadyBound {
                node: child,
                parent: current,
            });
        }
        if child == parent {
            return Err(FragmentError::Cycle {
                node: child,
                parent,
            });
        }
        // A childless node cannot be an ancestor of anything else.
        if self.nodes[child.0].children.is_empty() {
            return Ok(());
        }
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if id == child {
                return Err(FragmentError::Cycle {
                    node: child,
                    parent,
                });
            }
            cursor = self.nodes[id.0].parent;
        }
        Ok(())
    }

    /// Append `child` to the children of `parent`.
    pub fn append(&mut self, parent: NodeId, child: NodeId) -> Result<(), FragmentError> {
        self.check_attachable(parent, child)?;
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
        Ok(())
    }

    /// Insert `child` at `index` in the children of `parent`.
    pub fn insert(&mut self, parent: NodeId, index: usize, child: NodeId) -> Result<(), FragmentError> {
        self.check_attachable(parent, child)?;
        let len = self.nodes[parent.0].children.len();
        if index > len {
            return Err(FragmentError::ChildIndex { index, len });
        }
        self.nodes[parent.0].children.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
        Ok(())
    }

    /// Append every node of `children` in order.
    ///
    /// Stops at the first node that cannot be attached; nodes before it stay
    /// attached.
    pub fn extend(
        &mut self,
        parent: NodeId,
        children: impl IntoIterator<Item = NodeId>,
    ) -> Result<(), FragmentError> {
        for child in children {
            self.append(parent, child)?;
        }
        Ok(())
    }

    /// Replace the child at `index`, detaching and returning the old one.
    pub fn set_child(
        &mut self,
        parent: NodeId,
        index: usize,
        child: NodeId,
    ) -> Result<NodeId, FragmentError> {
        self.check_attachable(parent, child)?;
        let len = self.nodes[parent.0].children.len();
        if index >= len {
            return Err(FragmentError::ChildIndex { index, len });
        }
        let old = std::mem::replace(&mut self.nodes[parent.0].children[index], child);
        self.nodes[old.0].parent = None;
        self.nodes[child.0].parent = Some(parent);
        Ok(old)
    }

    /// Replace the child `old` of `parent` with `new`.
    pub fn replace(&mut self, parent: NodeId, old: NodeId, new: NodeId) -> Result<(), FragmentError> {
        self.check(parent)?;
        let index = self.nodes[parent.0]
            .children
            .iter()
            .position(|&c| c == old)
            .ok_or(FragmentError::NotAChild(old))?;
        self.set_child(parent, index, new).map(|_| ())
    }

    /// Detach and return the child at `index`.
    pub fn remove_child(&mut self, parent: NodeId, index: usize) -> Result<NodeId, FragmentError> {
        self.check(parent)?;
        let len = self.nodes[parent.0].children.len();
        if index >= len {
            return Err(FragmentError::ChildIndex { index, len });
        }
        let child = self.nodes[parent.0].children.remove(index);
        self.nodes[child.0].parent = None;
        Ok(child)
    }

    /// Detach and return the last child, if any.
    pub fn pop_child(&mut self, parent: NodeId) -> Result<Option<NodeId>, FragmentError> {
        self.check(parent)?;
        let child = self.nodes[parent.0].children.pop();
        if let Some(child) = child {
            self.nodes[child.0].parent = None;
        }
        Ok(child)
    }

    /// Detach a range of children, returning them in order.
    pub fn remove_range(
        &mut self,
        parent: NodeId,
        range: impl RangeBounds<usize>,
    ) -> Result<Vec<NodeId>, FragmentError> {
        self.check(parent)?;
        let len = self.nodes[parent.0].children.len();
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s + 1,
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e + 1,
            Bound::Excluded(&e) => e,
            Bound::Unbounded => len,
        };
        if start > end || end > len {
            return Err(FragmentError::ChildIndex { index: end, len });
        }
        let removed: Vec<NodeId> = self.nodes[parent.0].children.drain(start..end).collect();
        for &child in &removed {
            self.nodes[child.0].parent = None;
        }
        Ok(removed)
    }

    /// Detach all children of `parent` and return them.
    pub fn take_children(&mut self, parent: NodeId) -> Result<Vec<NodeId>, FragmentError> {
        self.remove_range(parent, ..)
    }

    /// Detach `id` from its parent. Detaching a parentless node is a no-op.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), FragmentError> {
        self.check(id)?;
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
        Ok(())
    }

    /// Append `text` to the value of a node, creating the value if needed.
    pub fn push_value(&mut self, id: NodeId, text: &str) -> Result<(), FragmentError> {
        self.check(id)?;
        self.nodes[id.0]
            .value
            .get_or_insert_with(String::new)
            .push_str(text);
        Ok(())
    }

    /// Register a render callback on a node.
    pub fn add_render_callback(
        &mut self,
        id: NodeId,
        identifier: impl Into<String>,
        data: Option<Value>,
    ) -> Result<(), FragmentError> {
        self.check(id)?;
        self.nodes[id.0]
            .callback_data
            .get_or_insert_with(Vec::new)
            .push((identifier.into(), data));
        Ok(())
    }

    /// Overwrite the value of a node.
    pub fn set_value(&mut self, id: NodeId, value: Option<String>) -> Result<(), FragmentError> {
        self.check(id)?;
        self.nodes[id.0].value = value;
        Ok(())
    }

    /// Look up a node, returning `None` for a foreign id.
    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_>> {
        (id.0 < self.nodes.len()).then_some(NodeRef { doc: self, id })
    }

    /// Borrowed view of a node.
    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        assert!(id.0 < self.nodes.len(), "node {id} does not belong to this document");
        NodeRef { doc: self, id }
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.nodes[id.0].kind
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.0].name.as_deref()
    }

    pub fn attributes(&self, id: NodeId) -> &Attributes {
        &self.nodes[id.0].attributes
    }

    pub fn attributes_mut(&mut self, id: NodeId) -> &mut Attributes {
        &mut self.nodes[id.0].attributes
    }

    pub fn value(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.0].value.as_deref()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn callback_data(&self, id: NodeId) -> Option<&[(String, Option<Value>)]> {
        self.nodes[id.0].callback_data.as_deref()
    }

    /// A node is truthy if it has children, attributes, callback data or a
    /// non-empty value. Parsers use this to skip empty wrappers.
    pub fn is_truthy(&self, id: NodeId) -> bool {
        let node = &self.nodes[id.0];
        !node.children.is_empty()
            || !node.attributes.is_empty()
            || node.callback_data.is_some()
            || node.value.as_deref().is_some_and(|v| !v.is_empty())
    }

    /// True if the node or any descendant carries non-empty callback data.
    pub fn is_dynamic(&self, id: NodeId) -> bool {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current.0];
            if node.callback_data.as_ref().is_some_and(|c| !c.is_empty()) {
                return true;
            }
            stack.extend(node.children.iter().copied());
        }
        false
    }
}

/// Borrowed view of one node, handy for read-only traversal.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    pub(crate) doc: &'a Document,
    pub(crate) id: NodeId,
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.doc, other.doc) && self.id == other.id
    }
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn document(&self) -> &'a Document {
        self.doc
    }

    pub fn kind(&self) -> NodeKind {
        self.doc.kind(self.id)
    }

    pub fn name(&self) -> Option<&'a str> {
        self.doc.name(self.id)
    }

    pub fn attributes(&self) -> &'a Attributes {
        self.doc.attributes(self.id)
    }

    /// Value of a single attribute.
    pub fn attribute(&self, key: &str) -> Option<&'a str> {
        self.doc.attributes(self.id).get(key).map(String::as_str)
    }

    pub fn value(&self) -> Option<&'a str> {
        self.doc.value(self.id)
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.doc.parent(self.id).map(|id| NodeRef { doc: self.doc, id })
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let doc = self.doc;
        doc.children(self.id).iter().map(move |&id| NodeRef { doc, id })
    }

    pub fn callback_data(&self) -> Option<&'a [(String, Option<Value>)]> {
        self.doc.callback_data(self.id)
    }

    pub fn is_truthy(&self) -> bool {
        self.doc.is_truthy(self.id)
    }

    pub fn is_dynamic(&self) -> bool {
        self.doc.is_dynamic(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        let text = doc.create_text("hello");
        doc.append(doc.root(), div).unwrap();
        doc.append(div, text).unwrap();
        (doc, div, text)
    }

    #[test]
    fn test_append_sets_parent() {
        let (doc, div, text) = tree();

        assert_eq!(doc.parent(div), Some(doc.root()));
        assert_eq!(doc.parent(text), Some(div));
        assert_eq!(doc.children(div), &[text]);
        assert_eq!(doc.parent(doc.root()), None);
    }

    #[test]
    fn test_append_bound_node_fails() {
        let (mut doc, div, text) = tree();
        let other = doc.create_element("span");

        let err = doc.append(other, text).unwrap_err();

        assert_eq!(err, FragmentError::AlreadyBound { node: text, parent: div });
        assert!(doc.children(other).is_empty());
        assert_eq!(doc.parent(text), Some(div));
    }

    #[test]
    fn test_removed_node_can_be_reattached() {
        let (mut doc, div, text) = tree();
        let other = doc.create_element("span");

        let removed = doc.remove_child(div, 0).unwrap();
        assert_eq!(removed, text);
        assert_eq!(doc.parent(text), None);

        doc.append(other, text).unwrap();
        assert_eq!(doc.parent(text), Some(other));
    }

    #[test]
    fn test_cycle_rejected() {
        let (mut doc, div, _) = tree();
        let inner = doc.create_element("span");
        doc.append(div, inner).unwrap();
        doc.remove_node(div).unwrap();

        assert_eq!(
            doc.append(inner, div),
            Err(FragmentError::Cycle { node: div, parent: inner })
        );
        assert_eq!(
            doc.append(div, div),
            Err(FragmentError::Cycle { node: div, parent: div })
        );
    }

    #[test]
    fn test_root_cannot_be_attached() {
        let mut doc = Document::new();
        let div = doc.create_element("div");

        assert_eq!(doc.append(div, doc.root()), Err(FragmentError::RootNode));
    }

    #[test]
    fn test_unknown_node() {
        let mut doc = Document::new();

        assert_eq!(
            doc.append(doc.root(), NodeId(42)),
            Err(FragmentError::UnknownNode(NodeId(42)))
        );
        assert!(doc.get(NodeId(42)).is_none());
    }

    #[test]
    fn test_set_child_and_replace() {
        let (mut doc, div, text) = tree();
        let a = doc.create_text("a");
        let b = doc.create_text("b");

        let old = doc.set_child(div, 0, a).unwrap();
        assert_eq!(old, text);
        assert_eq!(doc.parent(text), None);

        doc.replace(div, a, b).unwrap();
        assert_eq!(doc.children(div), &[b]);
        assert_eq!(doc.parent(a), None);
        assert_eq!(doc.replace(div, a, text), Err(FragmentError::NotAChild(a)));
    }

    #[test]
    fn test_insert_extend_and_ranges() {
        let mut doc = Document::new();
        let root = doc.root();
        let nodes: Vec<NodeId> = (0..4).map(|i| doc.create_text(i.to_string())).collect();
        doc.extend(root, nodes[1..].iter().copied()).unwrap();
        doc.insert(root, 0, nodes[0]).unwrap();
        assert_eq!(doc.children(root), nodes.as_slice());

        let removed = doc.remove_range(root, 1..3).unwrap();
        assert_eq!(removed, vec![nodes[1], nodes[2]]);
        assert!(removed.iter().all(|&n| doc.parent(n).is_none()));
        assert_eq!(doc.children(root), &[nodes[0], nodes[3]]);

        assert_eq!(doc.pop_child(root).unwrap(), Some(nodes[3]));
        assert_eq!(doc.parent(nodes[3]), None);
        assert_eq!(
            doc.insert(root, 5, nodes[3]),
            Err(FragmentError::ChildIndex { index: 5, len: 1 })
        );
        assert_eq!(doc.take_children(root).unwrap(), vec![nodes[0]]);
    }

    #[test]
    fn test_truthiness() {
        let mut doc = Document::new();
        let empty = doc.create_element("p");
        let blank = doc.create_text("");
        let text = doc.create_text("x");
        let with_attr = doc.create_element("a");
        doc.attributes_mut(with_attr).insert("href".to_owned(), "/".to_owned());

        assert!(!doc.is_truthy(empty));
        assert!(!doc.is_truthy(blank));
        assert!(doc.is_truthy(text));
        assert!(doc.is_truthy(with_attr));
        doc.add_render_callback(empty, "clock", None).unwrap();
        assert!(doc.is_truthy(empty));
    }

    #[test]
    fn test_push_value() {
        let (mut doc, div, text) = tree();

        doc.push_value(text, ", world").unwrap();
        doc.push_value(div, "x").unwrap();

        assert_eq!(doc.value(text), Some("hello, world"));
        assert_eq!(doc.value(div), Some("x"));
        assert_eq!(
            doc.push_value(NodeId(42), "x"),
            Err(FragmentError::UnknownNode(NodeId(42)))
        );
    }

    #[test]
    fn test_deep_chain_appends() {
        let mut doc = Document::new();
        let mut parent = doc.root();
        for _ in 0..50_000 {
            let child = doc.create_element("blockquote");
            doc.append(parent, child).unwrap();
            parent = child;
        }

        assert_eq!(doc.node_count(), 50_001);
        assert!(!doc.is_dynamic(doc.root()));
    }

    #[test]
    fn test_is_dynamic() {
        let (mut doc, div, text) = tree();
        assert!(!doc.is_dynamic(doc.root()));

        doc.add_render_callback(text, "highlight", Some(serde_json::json!({"lang": "rust"})))
            .unwrap();

        assert!(doc.is_dynamic(doc.root()));
        assert!(doc.is_dynamic(div));
        assert_eq!(
            doc.callback_data(text).unwrap()[0].0,
            "highlight"
        );
    }

    #[test]
    fn test_node_ref_navigation() {
        let (doc, div, _) = tree();
        let node = doc.node(div);

        assert_eq!(node.name(), Some("div"));
        assert_eq!(node.kind(), NodeKind::Element);
        assert_eq!(node.parent().map(|p| p.id()), Some(doc.root()));
        let values: Vec<_> = node.children().filter_map(|c| c.value()).collect();
        assert_eq!(values, vec!["hello"]);
    }

    #[test]
    fn test_kind_tags() {
        for kind in [
            NodeKind::Element,
            NodeKind::Text,
            NodeKind::Data,
            NodeKind::Fragment,
            NodeKind::StaticFragment,
        ] {
            assert_eq!(NodeKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(NodeKind::from_tag(9), None);
    }
}
