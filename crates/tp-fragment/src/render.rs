//! HTML rendering, text extraction and static collapse.

use serde_json::Value;

use crate::error::{CallbackError, RenderError};
use crate::node::{Document, NodeId, NodeKind, NodeRef};
use crate::tags::is_self_closing;

/// Context handed to a render callback for one `(identifier, data)` entry.
#[derive(Clone, Copy, Debug)]
pub struct NodeCallback<'a> {
    /// Identifier the plugin registered the callback under.
    pub identifier: &'a str,
    /// Opaque data stored alongside the identifier.
    pub data: Option<&'a Value>,
    /// Node being rendered.
    pub node: NodeRef<'a>,
    /// True when plain text is requested instead of HTML.
    pub text_only: bool,
}

/// Intercepts rendering of nodes that carry callback data.
///
/// Returning `Ok(Some(output))` replaces the default rendering of the node;
/// `Ok(None)` lets the next callback entry, and finally the default
/// algorithm, run.
pub trait RenderCallbacks {
    fn node_callback(&self, callback: &NodeCallback<'_>) -> Result<Option<String>, CallbackError>;
}

/// Callbacks that never intercept anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCallbacks;

impl RenderCallbacks for NoCallbacks {
    fn node_callback(&self, _callback: &NodeCallback<'_>) -> Result<Option<String>, CallbackError> {
        Ok(None)
    }
}

impl Document {
    /// Render a node and its subtree to HTML.
    pub fn render(&self, id: NodeId, callbacks: &dyn RenderCallbacks) -> Result<String, RenderError> {
        let mut out = String::new();
        self.write_html(id, callbacks, &mut out)?;
        Ok(out)
    }

    /// Render an element with `inject` (escaped) in place of its children.
    ///
    /// The element's own callback data is not consulted, which lets a callback
    /// wrap its own output in the node's tag. Other node kinds ignore the
    /// injection and render normally with `callbacks`.
    pub fn render_injected(
        &self,
        id: NodeId,
        inject: &str,
        callbacks: &dyn RenderCallbacks,
    ) -> Result<String, RenderError> {
        let node = &self.nodes[id.0];
        match (node.kind, node.name.as_deref()) {
            (NodeKind::Element, Some(name)) => {
                let mut out = String::new();
                self.write_start_tag(id, name, &mut out);
                if is_self_closing(name) {
                    if !inject.is_empty() || !node.children.is_empty() {
                        return Err(RenderError::VoidElementContent(name.to_owned()));
                    }
                    return Ok(out);
                }
                out.push_str(&html_escape::encode_text(inject));
                write_end_tag(name, &mut out);
                Ok(out)
            }
            _ => self.render(id, callbacks),
        }
    }

    /// Plain-text content of a node.
    ///
    /// `br` yields a newline and `p` is followed by a blank line. Raw markup
    /// and static fragments contribute nothing.
    pub fn text(&self, id: NodeId, callbacks: &dyn RenderCallbacks) -> Result<String, RenderError> {
        let mut out = String::new();
        self.write_text(id, callbacks, &mut out)?;
        Ok(out)
    }

    /// Collapse a static tree into a pre-rendered fragment.
    ///
    /// Dynamic trees, element roots and already static fragments are returned
    /// unchanged. The result can no longer be queried.
    pub fn optimize(self) -> Result<Self, RenderError> {
        if self.kind(self.root) != NodeKind::Fragment || self.is_dynamic(self.root) {
            return Ok(self);
        }
        let html = self.render(self.root, &NoCallbacks)?;
        Ok(Self::new_static(html))
    }

    fn run_callbacks(
        &self,
        id: NodeId,
        callbacks: &dyn RenderCallbacks,
        text_only: bool,
    ) -> Result<Option<String>, RenderError> {
        let Some(entries) = self.callback_data(id) else {
            return Ok(None);
        };
        for (identifier, data) in entries {
            let callback = NodeCallback {
                identifier,
                data: data.as_ref(),
                node: self.node(id),
                text_only,
            };
            let output = callbacks
                .node_callback(&callback)
                .map_err(|source| RenderError::Callback {
                    identifier: identifier.clone(),
                    source,
                })?;
            if output.is_some() {
                return Ok(output);
            }
        }
        Ok(None)
    }

    fn write_start_tag(&self, id: NodeId, name: &str, out: &mut String) {
        out.push('<');
        out.push_str(name);
        for (key, value) in &self.nodes[id.0].attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&html_escape::encode_double_quoted_attribute(value));
            out.push('"');
        }
        out.push('>');
    }

    fn write_html(
        &self,
        id: NodeId,
        callbacks: &dyn RenderCallbacks,
        out: &mut String,
    ) -> Result<(), RenderError> {
        let mut stack = vec![Step::Open(id)];
        while let Some(step) = stack.pop() {
            let current = match step {
                Step::Open(current) => current,
                Step::Close(name) => {
                    write_end_tag(name, out);
                    continue;
                }
                Step::Suffix(suffix) => {
                    out.push_str(suffix);
                    continue;
                }
            };
            let node = &self.nodes[current.0];
            match node.kind {
                NodeKind::Text => {
                    out.push_str(&html_escape::encode_text(node.value.as_deref().unwrap_or_default()));
                }
                NodeKind::Data | NodeKind::StaticFragment => {
                    out.push_str(node.value.as_deref().unwrap_or_default());
                }
                NodeKind::Fragment => push_children(&mut stack, &node.children),
                NodeKind::Element => {
                    if let Some(html) = self.run_callbacks(current, callbacks, false)? {
                        out.push_str(&html);
                        continue;
                    }
                    let name = node.name.as_deref().unwrap_or_default();
                    self.write_start_tag(current, name, out);
                    if is_self_closing(name) {
                        if !node.children.is_empty() {
                            return Err(RenderError::VoidElementContent(name.to_owned()));
                        }
                        continue;
                    }
                    stack.push(Step::Close(name));
                    push_children(&mut stack, &node.children);
                }
            }
        }
        Ok(())
    }

    fn write_text(
        &self,
        id: NodeId,
        callbacks: &dyn RenderCallbacks,
        out: &mut String,
    ) -> Result<(), RenderError> {
        let mut stack = vec![Step::Open(id)];
        while let Some(step) = stack.pop() {
            let current = match step {
                Step::Open(current) => current,
                Step::Suffix(suffix) => {
                    out.push_str(suffix);
                    continue;
                }
                Step::Close(_) => continue,
            };
            let node = &self.nodes[current.0];
            match node.kind {
                NodeKind::Text => out.push_str(node.value.as_deref().unwrap_or_default()),
                NodeKind::Data | NodeKind::StaticFragment => {}
                NodeKind::Fragment => push_children(&mut stack, &node.children),
                NodeKind::Element => {
                    if let Some(text) = self.run_callbacks(current, callbacks, true)? {
                        out.push_str(&text);
                        continue;
                    }
                    match node.name.as_deref() {
                        Some("br") => out.push('\n'),
                        Some("p") => {
                            stack.push(Step::Suffix("\n\n"));
                            push_children(&mut stack, &node.children);
                        }
                        _ => push_children(&mut stack, &node.children),
                    }
                }
            }
        }
        Ok(())
    }
}

/// Pending work while walking a tree without recursion.
enum Step<'a> {
    Open(NodeId),
    Close(&'a str),
    Suffix(&'static str),
}

fn push_children(stack: &mut Vec<Step<'_>>, children: &[NodeId]) {
    stack.extend(children.iter().rev().map(|&child| Step::Open(child)));
}

fn write_end_tag(name: &str, out: &mut String) {
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

impl NodeRef<'_> {
    pub fn render(&self, callbacks: &dyn RenderCallbacks) -> Result<String, RenderError> {
        self.doc.render(self.id, callbacks)
    }

    /// See [`Document::render_injected`].
    pub fn render_injected(
        &self,
        inject: &str,
        callbacks: &dyn RenderCallbacks,
    ) -> Result<String, RenderError> {
        self.doc.render_injected(self.id, inject, callbacks)
    }

    pub fn text(&self, callbacks: &dyn RenderCallbacks) -> Result<String, RenderError> {
        self.doc.text(self.id, callbacks)
    }
}
