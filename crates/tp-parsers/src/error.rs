//! Parser errors.

use tp_events::EventError;
use tp_fragment::FragmentError;

/// Error from resolving, building or running a parser.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ParseError {
    /// No parser is registered under this id.
    #[error("parser '{0}' does not exist")]
    UnknownParser(String),

    /// A setup listener failed while the parser was built.
    #[error("parser setup failed")]
    Setup(#[from] EventError),

    /// The produced tree violated an ownership rule.
    #[error("failed to build document tree")]
    Tree(#[from] FragmentError),
}
