//! # Media-Core - Codec Model and Negotiation for RCSIP
//!
//! Audio and video codec value types plus the pure negotiation functions
//! that select a mutually supported codec from a local preference list and
//! a remote proposal. Media transport, rendering and playback are external
//! collaborators and are not modeled here.

pub mod codec;
pub mod errors;
pub mod negotiation;

pub use codec::{AudioCodec, VideoCodec};
pub use errors::{MediaError, Result};
pub use negotiation::{negotiate_audio, negotiate_video};
