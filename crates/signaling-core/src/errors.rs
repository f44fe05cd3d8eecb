//! Error types for signaling operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Transaction timed out")]
    Timeout,

    #[error("Malformed session description: {0}")]
    MalformedSdp(String),
}

pub type Result<T> = std::result::Result<T, SignalingError>;
