//! # Session-Core - SIP Session State Machine for RCSIP
//!
//! The dialog lifecycle for interactive sessions, exemplified by the IP
//! call: INVITE, ringing, accept/reject/cancel/timeout, ACK, BYE, plus
//! re-INVITE sub-negotiations for hold/resume and adding/removing video.
//! One session struct carries a direction tag; direction-specific
//! behavior branches on the tag instead of living in subclasses.

pub mod call;
pub mod config;
pub mod errors;
pub mod events;
pub mod registry;
pub mod reinvite;
pub mod types;

pub use call::IpCallSession;
pub use config::SessionConfig;
pub use errors::{Result, SessionError};
pub use events::SessionEventHandler;
pub use registry::{CapabilityRefresher, SessionRegistry};
pub use types::{CallErrorReason, CallState, Direction, RenegotiationKind, SessionId};
