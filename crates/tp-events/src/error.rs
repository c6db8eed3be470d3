//! Event emission errors.

/// Error a listener may return.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Error raised while emitting an event.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EventError {
    /// A listener failed; emission stopped at that listener.
    #[error("listener for '{event}' failed")]
    Listener {
        /// Event name.
        event: &'static str,
        /// Failure reported by the listener.
        #[source]
        source: ListenerError,
    },
}
