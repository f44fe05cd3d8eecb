//! Error types for media operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("No compatible audio codec")]
    NoAudioMatch,

    #[error("No compatible video codec")]
    NoVideoMatch,

    #[error("Invalid codec parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, MediaError>;
