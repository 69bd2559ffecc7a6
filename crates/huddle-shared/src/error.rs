use thiserror::Error;

/// Reasons a session token is refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Malformed session token.")]
    Malformed,

    #[error("Session token is expired.")]
    Expired,
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}
