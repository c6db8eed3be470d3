//! Error types for the document tree.

use crate::node::NodeId;

/// Boxed error returned by render callbacks.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Error from a tree mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum FragmentError {
    /// The node is already linked into another children list.
    #[error("node {node} is already bound to parent {parent}")]
    AlreadyBound {
        /// Node being attached.
        node: NodeId,
        /// Its current parent.
        parent: NodeId,
    },

    /// Attaching the node would make it its own ancestor.
    #[error("attaching node {node} under {parent} would create a cycle")]
    Cycle {
        /// Node being attached.
        node: NodeId,
        /// Requested parent.
        parent: NodeId,
    },

    /// The document root cannot have a parent.
    #[error("the document root cannot be attached to another node")]
    RootNode,

    /// The id does not belong to this document.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// Child index past the end of the children list.
    #[error("child index {index} out of range for {len} children")]
    ChildIndex {
        /// Requested index.
        index: usize,
        /// Number of children.
        len: usize,
    },

    /// `replace` was given a node that is not a child.
    #[error("node {0} is not a child of the given parent")]
    NotAChild(NodeId),
}

/// Error from parsing or evaluating a query rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum QueryError {
    /// Bracketed predicate that is none of `=`, `!=`, `@`, `!`.
    #[error("unknown query predicate '[{0}]'")]
    UnknownPredicate(String),

    /// Empty step or unterminated bracket.
    #[error("malformed query rule '{rule}': {reason}")]
    Malformed {
        /// Full rule text.
        rule: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// Index beyond the number of matches.
    #[error("query result index {0} out of range")]
    IndexOutOfRange(usize),
}

/// Error while rendering a tree.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RenderError {
    /// A self-closing element was given children or injected content.
    #[error("self-closing element <{0}> cannot hold content")]
    VoidElementContent(String),

    /// A render callback failed.
    #[error("render callback '{identifier}' failed")]
    Callback {
        /// Callback identifier attached to the node.
        identifier: String,
        /// Underlying failure.
        #[source]
        source: CallbackError,
    },
}

/// Error while dumping or loading a tree blob.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SerializeError {
    /// The blob does not start with the tree magic.
    #[error("not a serialized document tree")]
    BadMagic,

    /// The blob was written by an unknown format version.
    #[error("unsupported tree format version {0}")]
    UnsupportedVersion(u8),

    /// Encoding the tree failed.
    #[error("failed to encode document tree")]
    Encode(#[source] bincode::Error),

    /// The payload is truncated or corrupt.
    #[error("failed to decode document tree")]
    Decode(#[source] bincode::Error),

    /// A node record carries an unknown kind tag.
    #[error("unknown node kind tag {0}")]
    UnknownKind(u8),

    /// Callback data could not be converted to or from JSON.
    #[error("invalid callback data")]
    CallbackData(#[from] serde_json::Error),

    /// Child counts do not describe exactly one tree.
    #[error("malformed tree structure: {0}")]
    Structure(&'static str),
}
