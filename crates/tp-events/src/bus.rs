//! Listener registry and emission.

use tp_fragment::{CallbackError, Document, NodeCallback, RenderCallbacks, TagRules};

use crate::error::{EventError, ListenerError};

/// Emitted once per successful parse with the new tree.
pub const PROCESS_DOC_TREE: &str = "process-doc-tree";
/// Emitted while rendering a node that carries callback data.
pub const PROCESS_NODE_CALLBACK: &str = "process-node-callback";
/// Emitted when a simplified HTML parser is constructed.
pub const SETUP_SIMPLEHTML_PARSER: &str = "setup-simplehtml-parser";

/// Listener return value: `Ok(None)` means "not handled".
pub type ListenerResult<T> = Result<Option<T>, ListenerError>;

/// Opaque handle returned by the `connect_*` methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Where a new listener goes in the call order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Position {
    /// Run before every listener connected so far.
    Before,
    /// Run after every listener connected so far.
    #[default]
    After,
}

/// Arguments of [`PROCESS_DOC_TREE`].
#[derive(Debug)]
pub struct DocTreeEvent<'a> {
    /// Freshly parsed tree. Listeners may edit it in place.
    pub tree: &'a mut Document,
    /// Raw input the tree was parsed from.
    pub source: &'a str,
    /// Caller-supplied hint such as `post-body` or `comment`.
    pub reason: &'a str,
}

type DocTreeListener = dyn Fn(&mut DocTreeEvent<'_>) -> ListenerResult<Document> + Send + Sync;
type NodeCallbackListener = dyn Fn(&NodeCallback<'_>) -> ListenerResult<String> + Send + Sync;
type SetupHtmlListener = dyn Fn(&mut TagRules) -> Result<(), ListenerError> + Send + Sync;

struct Listeners<F: ?Sized> {
    event: &'static str,
    entries: Vec<(ListenerId, Box<F>)>,
}

impl<F: ?Sized> Listeners<F> {
    fn new(event: &'static str) -> Self {
        Self {
            event,
            entries: Vec::new(),
        }
    }

    fn insert(&mut self, id: ListenerId, position: Position, listener: Box<F>) {
        match position {
            Position::Before => self.entries.insert(0, (id, listener)),
            Position::After => self.entries.push((id, listener)),
        }
    }

    fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    fn iter(&self) -> impl Iterator<Item = &F> {
        tracing::trace!(event = self.event, listeners = self.entries.len(), "Emitting event");
        self.entries.iter().map(|(_, listener)| listener.as_ref())
    }

    fn fail(&self, source: ListenerError) -> EventError {
        EventError::Listener {
            event: self.event,
            source,
        }
    }
}

/// Ordered publish/subscribe hub for the markup pipeline.
///
/// Listeners run synchronously in registration order. Every emission calls
/// every listener; a listener error stops the emission and is returned to the
/// emitter.
pub struct EventBus {
    next_id: u64,
    doc_tree: Listeners<DocTreeListener>,
    node_callback: Listeners<NodeCallbackListener>,
    setup_simplehtml: Listeners<SetupHtmlListener>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field(PROCESS_DOC_TREE, &self.doc_tree.entries.len())
            .field(PROCESS_NODE_CALLBACK, &self.node_callback.entries.len())
            .field(SETUP_SIMPLEHTML_PARSER, &self.setup_simplehtml.entries.len())
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 0,
            doc_tree: Listeners::new(PROCESS_DOC_TREE),
            node_callback: Listeners::new(PROCESS_NODE_CALLBACK),
            setup_simplehtml: Listeners::new(SETUP_SIMPLEHTML_PARSER),
        }
    }

    fn allocate_id(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }

    /// Listen to [`PROCESS_DOC_TREE`]. Returning `Some(tree)` offers a
    /// replacement for the parsed tree.
    pub fn connect_doc_tree<F>(&mut self, position: Position, listener: F) -> ListenerId
    where
        F: Fn(&mut DocTreeEvent<'_>) -> ListenerResult<Document> + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.doc_tree.insert(id, position, Box::new(listener));
        id
    }

    /// Listen to [`PROCESS_NODE_CALLBACK`]. Returning `Some(output)` replaces
    /// the default rendering of the node.
    pub fn connect_node_callback<F>(&mut self, position: Position, listener: F) -> ListenerId
    where
        F: Fn(&NodeCallback<'_>) -> ListenerResult<String> + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.node_callback.insert(id, position, Box::new(listener));
        id
    }

    /// Listen to [`SETUP_SIMPLEHTML_PARSER`] to adjust the parser tag sets.
    pub fn connect_setup_simplehtml_parser<F>(&mut self, position: Position, listener: F) -> ListenerId
    where
        F: Fn(&mut TagRules) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.setup_simplehtml.insert(id, position, Box::new(listener));
        id
    }

    /// Remove a listener. Returns `false` if the id is not connected.
    pub fn disconnect(&mut self, id: ListenerId) -> bool {
        self.doc_tree.remove(id) || self.node_callback.remove(id) || self.setup_simplehtml.remove(id)
    }

    /// Number of listeners connected to the named event.
    pub fn listener_count(&self, event: &str) -> usize {
        match event {
            PROCESS_DOC_TREE => self.doc_tree.entries.len(),
            PROCESS_NODE_CALLBACK => self.node_callback.entries.len(),
            SETUP_SIMPLEHTML_PARSER => self.setup_simplehtml.entries.len(),
            _ => 0,
        }
    }

    /// Emit [`PROCESS_DOC_TREE`] and collect every listener's answer.
    pub fn emit_doc_tree(
        &self,
        tree: &mut Document,
        source: &str,
        reason: &str,
    ) -> Result<Vec<Option<Document>>, EventError> {
        let mut event = DocTreeEvent {
            tree,
            source,
            reason,
        };
        self.doc_tree
            .iter()
            .map(|listener| listener(&mut event).map_err(|e| self.doc_tree.fail(e)))
            .collect()
    }

    /// Run the parsed tree through [`PROCESS_DOC_TREE`].
    ///
    /// All listeners run. The first replacement returned wins; later
    /// replacements are dropped. Without one, the (possibly edited) input
    /// tree is returned.
    pub fn process_doc_tree(
        &self,
        mut tree: Document,
        source: &str,
        reason: &str,
    ) -> Result<Document, EventError> {
        let mut replacement = None;
        let mut event = DocTreeEvent {
            tree: &mut tree,
            source,
            reason,
        };
        for listener in self.doc_tree.iter() {
            let result = listener(&mut event).map_err(|e| self.doc_tree.fail(e))?;
            if replacement.is_none() {
                replacement = result;
            }
        }
        match replacement {
            Some(replacement) => {
                tracing::debug!(reason, "Document tree replaced by listener");
                Ok(replacement)
            }
            None => Ok(tree),
        }
    }

    /// Emit [`PROCESS_NODE_CALLBACK`] and collect every listener's answer.
    pub fn emit_node_callback(&self, callback: &NodeCallback<'_>) -> Result<Vec<Option<String>>, EventError> {
        self.node_callback
            .iter()
            .map(|listener| listener(callback).map_err(|e| self.node_callback.fail(e)))
            .collect()
    }

    /// Emit [`SETUP_SIMPLEHTML_PARSER`].
    pub fn emit_setup_simplehtml_parser(&self, rules: &mut TagRules) -> Result<(), EventError> {
        for listener in self.setup_simplehtml.iter() {
            listener(rules).map_err(|e| self.setup_simplehtml.fail(e))?;
        }
        Ok(())
    }
}

impl RenderCallbacks for EventBus {
    fn node_callback(&self, callback: &NodeCallback<'_>) -> Result<Option<String>, CallbackError> {
        let mut output = None;
        for listener in self.node_callback.iter() {
            let result = listener(callback).map_err(|e| self.node_callback.fail(e))?;
            if output.is_none() {
                output = result;
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;
    use tp_fragment::NodeKind;

    use super::*;

    type Calls = Arc<Mutex<Vec<&'static str>>>;

    fn record(calls: &Calls, name: &'static str) {
        calls.lock().unwrap().push(name);
    }

    fn replacement(text: &str) -> Document {
        let mut doc = Document::new();
        let node = doc.create_text(text);
        doc.append(doc.root(), node).unwrap();
        doc
    }

    fn rendered(doc: &Document) -> String {
        doc.render(doc.root(), &tp_fragment::NoCallbacks).unwrap()
    }

    #[test]
    fn test_first_replacement_wins_and_all_listeners_run() {
        let calls = Calls::default();
        let mut bus = EventBus::new();
        let (a, b, c) = (Arc::clone(&calls), Arc::clone(&calls), Arc::clone(&calls));
        bus.connect_doc_tree(Position::After, move |_| {
            record(&a, "A");
            Ok(None)
        });
        bus.connect_doc_tree(Position::After, move |_| {
            record(&b, "B");
            Ok(Some(replacement("from B")))
        });
        bus.connect_doc_tree(Position::After, move |_| {
            record(&c, "C");
            Ok(Some(replacement("from C")))
        });

        let tree = bus
            .process_doc_tree(replacement("original"), "raw", "post-body")
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["A", "B", "C"]);
        assert_eq!(rendered(&tree), "from B");
    }

    #[test]
    fn test_in_place_edits_are_kept() {
        let mut bus = EventBus::new();
        bus.connect_doc_tree(Position::After, |event| {
            let root = event.tree.root();
            let note = event.tree.create_text(format!(" [{}]", event.reason));
            event.tree.append(root, note)?;
            Ok(None)
        });

        let tree = bus.process_doc_tree(replacement("body"), "body", "comment").unwrap();

        assert_eq!(rendered(&tree), "body [comment]");
    }

    #[test]
    fn test_before_and_after_placement() {
        let calls = Calls::default();
        let mut bus = EventBus::new();
        for (position, name) in [
            (Position::After, "second"),
            (Position::Before, "first"),
            (Position::After, "third"),
            (Position::After, "third"),
        ] {
            let calls = Arc::clone(&calls);
            bus.connect_doc_tree(position, move |_| {
                record(&calls, name);
                Ok(None)
            });
        }

        let results = bus
            .emit_doc_tree(&mut Document::new(), "", "post-body")
            .unwrap();

        assert_eq!(results.len(), 4);
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second", "third", "third"]);
    }

    #[test]
    fn test_disconnect() {
        let mut bus = EventBus::new();
        let id = bus.connect_doc_tree(Position::After, |_| Ok(None));
        let other = bus.connect_setup_simplehtml_parser(Position::After, |_| Ok(()));
        assert_eq!(bus.listener_count(PROCESS_DOC_TREE), 1);

        assert!(bus.disconnect(id));
        assert!(!bus.disconnect(id));
        assert_eq!(bus.listener_count(PROCESS_DOC_TREE), 0);
        assert_eq!(bus.listener_count(SETUP_SIMPLEHTML_PARSER), 1);
        assert!(bus.disconnect(other));
        assert_eq!(bus.listener_count("unknown-event"), 0);
    }

    #[test]
    fn test_listener_error_stops_emission() {
        let calls = Calls::default();
        let mut bus = EventBus::new();
        bus.connect_doc_tree(Position::After, |_| Err("plugin crashed".into()));
        let after = Arc::clone(&calls);
        bus.connect_doc_tree(Position::After, move |_| {
            record(&after, "after");
            Ok(None)
        });

        let err = bus
            .process_doc_tree(Document::new(), "", "post-body")
            .unwrap_err();

        assert!(matches!(err, EventError::Listener { event: PROCESS_DOC_TREE, .. }));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_node_callbacks_drive_rendering() {
        let mut bus = EventBus::new();
        bus.connect_node_callback(Position::After, |cb| {
            if cb.identifier != "shout" {
                return Ok(None);
            }
            let word = cb.data.and_then(|d| d.as_str()).unwrap_or("hey");
            if cb.text_only {
                Ok(Some(word.to_uppercase()))
            } else {
                Ok(Some(cb.node.render_injected(&word.to_uppercase(), &tp_fragment::NoCallbacks)?))
            }
        });
        bus.connect_node_callback(Position::After, |_| Ok(Some("<ignored>".to_owned())));

        let mut doc = Document::new();
        let span = doc.create_element("span");
        doc.append(doc.root(), span).unwrap();
        doc.add_render_callback(span, "shout", Some(serde_json::json!("hi")))
            .unwrap();

        assert_eq!(doc.render(doc.root(), &bus).unwrap(), "<span>HI</span>");
        assert_eq!(doc.text(doc.root(), &bus).unwrap(), "HI");
        assert_eq!(doc.kind(doc.root()), NodeKind::Fragment);

        let node = doc.node(span);
        let callback = NodeCallback {
            identifier: "shout",
            data: None,
            node,
            text_only: true,
        };
        assert_eq!(
            bus.emit_node_callback(&callback).unwrap(),
            vec![Some("HEY".to_owned()), Some("<ignored>".to_owned())]
        );
    }

    #[test]
    fn test_setup_listeners_edit_rules() {
        let mut bus = EventBus::new();
        bus.connect_setup_simplehtml_parser(Position::After, |rules| {
            rules.isolated_tags.insert("code".to_owned());
            Ok(())
        });
        let mut rules = TagRules::default();

        bus.emit_setup_simplehtml_parser(&mut rules).unwrap();

        assert!(rules.isolated_tags.contains("code"));
    }
}
