//! Document tree for TextPress markup.
//!
//! Parsers turn raw post and comment text into a [`Document`]; plugins may
//! query and rewrite it; the tree is then optionally collapsed into a static
//! fragment, serialized next to the raw text and later rendered back to HTML.
//!
//! # Architecture
//!
//! - [`Document`]: arena of nodes addressed by [`NodeId`], with ownership
//!   checks on every mutation
//! - [`QueryResult`]: lazy, memoizing results of path-like query rules
//! - [`RenderCallbacks`]: seam through which plugins intercept rendering of
//!   nodes that carry callback data
//! - [`dump_tree`] / [`load_tree`]: versioned binary blob format
//!
//! # Example
//!
//! ```
//! use tp_fragment::{Document, NoCallbacks, dump_tree, load_tree};
//!
//! let mut doc = Document::new();
//! let p = doc.create_element("p");
//! let text = doc.create_text("Hello & welcome");
//! doc.append(doc.root(), p)?;
//! doc.append(p, text)?;
//!
//! let blob = dump_tree(&doc)?;
//! let loaded = load_tree(&blob)?;
//! assert_eq!(
//!     loaded.render(loaded.root(), &NoCallbacks)?,
//!     "<p>Hello &amp; welcome</p>"
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod node;
mod query;
mod render;
mod serialize;
pub mod tags;

pub use error::{CallbackError, FragmentError, QueryError, RenderError, SerializeError};
pub use node::{Attributes, CallbackData, Document, MAX_DEPTH, NodeId, NodeKind, NodeRef};
pub use query::{QueryIter, QueryResult};
pub use render::{NoCallbacks, NodeCallback, RenderCallbacks};
pub use serialize::{dump_tree, load_tree};
pub use tags::TagRules;
