//! Stack-based tree construction from start/end/text events.

use tp_fragment::{Document, FragmentError, MAX_DEPTH, NodeId, NodeKind};

/// Builds a [`Document`] from a stream of start, end and text events.
///
/// `start` appends an element to the current node and makes it current,
/// `end` returns to the parent, `text` appends text to the current node.
/// Adjacent text is merged into one node. The root is never popped.
///
/// Elements opened beyond [`MAX_DEPTH`] are still appended but do not become
/// current, so their content lands in the deepest open element.
#[derive(Debug)]
pub struct TreeBuilder {
    doc: Document,
    stack: Vec<NodeId>,
    /// Starts past the depth limit whose ends are still pending.
    overflow: usize,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    #[must_use]
    pub fn new() -> Self {
        let doc = Document::new();
        let root = doc.root();
        Self {
            doc,
            stack: vec![root],
            overflow: 0,
        }
    }

    /// Node new content is appended to.
    pub fn current(&self) -> NodeId {
        self.stack.last().copied().unwrap_or_else(|| self.doc.root())
    }

    /// Open nodes, root first.
    pub fn stack(&self) -> &[NodeId] {
        &self.stack
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Open an element. Tag and attribute names are lower-cased.
    pub fn start<I, K, V>(&mut self, name: &str, attributes: I) -> Result<NodeId, FragmentError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let attributes = attributes
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        let parent = self.current();
        let node = self
            .doc
            .create_element_with(name.to_ascii_lowercase(), attributes);
        self.doc.append(parent, node)?;
        if self.stack.len() > MAX_DEPTH {
            self.overflow += 1;
        } else {
            self.stack.push(node);
        }
        Ok(node)
    }

    /// Open and immediately close an element.
    pub fn void<I, K, V>(&mut self, name: &str, attributes: I) -> Result<NodeId, FragmentError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let node = self.start(name, attributes)?;
        self.end();
        Ok(node)
    }

    /// Close the current element. Returns `None` at the root or when the
    /// matching start was flattened.
    pub fn end(&mut self) -> Option<NodeId> {
        if self.overflow > 0 {
            self.overflow -= 1;
            return None;
        }
        if self.stack.len() > 1 { self.stack.pop() } else { None }
    }

    /// Close open elements until only `depth` entries remain on the stack.
    pub fn truncate(&mut self, depth: usize) {
        self.overflow = 0;
        self.stack.truncate(depth.max(1));
    }

    /// Append text, merging with a preceding text node.
    pub fn text(&mut self, text: &str) -> Result<(), FragmentError> {
        if text.is_empty() {
            return Ok(());
        }
        let parent = self.current();
        if let Some(&last) = self.doc.children(parent).last()
            && self.doc.kind(last) == NodeKind::Text
        {
            return self.doc.push_value(last, text);
        }
        let node = self.doc.create_text(text);
        self.doc.append(parent, node)
    }

    /// Append raw markup.
    pub fn raw(&mut self, html: &str) -> Result<(), FragmentError> {
        let parent = self.current();
        let node = self.doc.create_data(html);
        self.doc.append(parent, node)
    }

    pub fn finish(self) -> Document {
        self.doc
    }
}
