//! Event bus for TextPress plugins.
//!
//! Plugins hook the markup pipeline exclusively through an [`EventBus`]:
//!
//! - [`PROCESS_DOC_TREE`]: inspect, edit or replace each freshly parsed tree
//! - [`PROCESS_NODE_CALLBACK`]: render nodes that carry callback data
//! - [`SETUP_SIMPLEHTML_PARSER`]: extend the tag sets of the HTML parser
//!
//! The bus implements [`tp_fragment::RenderCallbacks`], so it can be handed
//! straight to [`tp_fragment::Document::render`].
//!
//! # Example
//!
//! ```
//! use tp_events::{EventBus, Position};
//! use tp_fragment::Document;
//!
//! let mut bus = EventBus::new();
//! bus.connect_node_callback(Position::After, |cb| {
//!     Ok((cb.identifier == "year").then(|| "2008".to_owned()))
//! });
//!
//! let mut doc = Document::new();
//! let span = doc.create_element("span");
//! doc.append(doc.root(), span)?;
//! doc.add_render_callback(span, "year", None)?;
//! assert_eq!(doc.render(doc.root(), &bus)?, "2008");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod bus;
mod error;

pub use bus::{
    DocTreeEvent, EventBus, ListenerId, ListenerResult, PROCESS_DOC_TREE, PROCESS_NODE_CALLBACK,
    Position, SETUP_SIMPLEHTML_PARSER,
};
pub use error::{EventError, ListenerError};
