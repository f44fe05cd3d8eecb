//! Error types for capability operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("Invalid contact identity: {0}")]
    InvalidContact(String),

    #[error("Malformed presence payload: {0}")]
    MalformedPayload(String),

    #[error("Signaling error: {0}")]
    Signaling(#[from] rcsip_signaling_core::SignalingError),

    #[error("Service is shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, CapabilityError>;
