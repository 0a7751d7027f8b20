//! Error types shared by the ports.

/// Errors raised by a perception or input implementation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The device could not produce a frame.
    #[error("screen capture failed: {0}")]
    Capture(String),

    /// A tap or swipe could not be delivered.
    #[error("input transport failed: {0}")]
    Transport(String),

    /// The matcher failed for a reason other than "not found".
    #[error("perception failed: {0}")]
    Perception(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used by the ports.
pub type Result<T> = std::result::Result<T, Error>;
