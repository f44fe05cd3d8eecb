//! Core types for session-core

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session ID type
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(format!("session-{}", Uuid::new_v4()))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who initiated the session. Direction-specific behavior branches on
/// this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// An in-progress re-negotiation within an established session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenegotiationKind {
    AddVideo,
    RemoveVideo,
    Hold,
    Resume,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    Idle,
    Created,
    /// Outbound INVITE sent, awaiting the final response.
    Inviting,
    /// Inbound INVITE received, awaiting the local decision.
    Invited,
    /// Provisional ringing exchanged.
    Ringing,
    Established,
    Negotiating(RenegotiationKind),
    Terminated,
}

impl CallState {
    pub fn is_terminated(&self) -> bool {
        matches!(self, CallState::Terminated)
    }
}

/// Application-visible reason for a failed or rejected call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallErrorReason {
    UnsupportedAudio,
    UnsupportedVideo,
    MaxSessionsReached,
    PeerBlocked,
    Busy,
    Declined,
    Cancelled,
    NotAnswered,
    NoResponse,
    AckTimeout,
    ProtocolError,
}

/// The local decision on an inbound invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteDecision {
    Accept,
    RejectBusy,
    RejectDecline,
    /// Remote side cancelled before we answered.
    RemoteCancelled,
}
