/// Result alias that carries the custom [`PlayerError`] type.
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// The host offers no audio processing API at all. Terminal for the
    /// calling flow.
    #[error("audio processing is not supported on this platform")]
    UnsupportedPlatform,
    /// A second source node was requested for a media element that is
    /// already bound. The graph manager treats this as "already connected".
    #[error("media element `{0}` is already bound to a source node")]
    StructuralConflict(String),
    /// Any other failure while building the context, analyser or source.
    #[error("failed to initialise the audio graph: {0}")]
    GraphInit(String),
    /// The drawing surface was not available when the visualizer was set up.
    #[error("drawing surface is not available")]
    MissingSurface,
    /// Relinking the filter chain failed. The previous wiring is restored.
    #[error("failed to reconnect the audio chain: {0}")]
    Reconnect(String),
    #[error("audio graph is not initialised")]
    NotInitialised,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("settings storage failed: {0}")]
    Storage(String),
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl PlayerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn invalid<T: Into<String>>(msg: T) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Errors the audio graph recovers from locally without interrupting
    /// playback.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::StructuralConflict(_) | Self::Reconnect(_))
    }
}

impl From<&str> for PlayerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PlayerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
