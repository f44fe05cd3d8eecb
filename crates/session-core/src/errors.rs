//! Error types for session operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No compatible audio codec")]
    UnsupportedAudio,

    #[error("No compatible video codec")]
    UnsupportedVideo,

    #[error("Maximum concurrent sessions reached")]
    MaxSessions,

    #[error("A session with this peer already exists")]
    AlreadyInSession,

    #[error("Session is terminated")]
    Terminated,

    #[error("Session is not established")]
    NotEstablished,

    #[error("Invitation rejected with status {0}")]
    Rejected(u16),

    #[error("No response from peer")]
    NoResponse,

    #[error("ACK not received within the transaction timeout")]
    AckTimeout,

    #[error("Signaling error: {0}")]
    Signaling(#[from] rcsip_signaling_core::SignalingError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
