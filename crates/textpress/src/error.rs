//! Application-level error.

use tp_config::ConfigError;
use tp_events::EventError;
use tp_fragment::{QueryError, RenderError, SerializeError};
use tp_parsers::ParseError;

/// Any failure of the markup pipeline.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A `process-doc-tree` listener failed.
    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Render(#[from] RenderError),

    /// The stored blob could not be written or read back.
    #[error(transparent)]
    Serialize(#[from] SerializeError),
}
