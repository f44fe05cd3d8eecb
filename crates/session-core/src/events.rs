//! Session event notification

use async_trait::async_trait;

use rcsip_capability_core::ContactId;

use crate::types::{CallErrorReason, RenegotiationKind, SessionId};

/// Session lifecycle listener. Default implementations are no-ops so
/// handlers only implement the callbacks they care about.
#[async_trait]
pub trait SessionEventHandler: Send + Sync {
    /// An inbound invitation is ringing and awaits a decision.
    async fn on_session_invited(&self, _contact: &ContactId, _session_id: &SessionId) {}

    /// The invitation was accepted locally or remotely.
    async fn on_session_accepted(&self, _contact: &ContactId) {}

    /// Media transfer has started; the session is established.
    async fn on_session_started(&self, _contact: &ContactId) {}

    /// The invitation was rejected; the reason distinguishes busy,
    /// decline, cancel and timeout.
    async fn on_session_rejected(&self, _contact: &ContactId, _reason: CallErrorReason) {}

    /// The session ended normally (local or remote BYE).
    async fn on_session_terminated(&self, _contact: &ContactId) {}

    /// The session failed.
    async fn on_call_error(&self, _contact: &ContactId, _reason: CallErrorReason) {}

    /// A re-negotiation (hold/resume, add/remove video) needs local
    /// confirmation before it is answered.
    async fn on_renegotiation_requested(&self, _contact: &ContactId, _kind: RenegotiationKind) {}

    /// A re-negotiation completed.
    async fn on_renegotiation_accepted(&self, _contact: &ContactId, _kind: RenegotiationKind) {}

    /// A re-negotiation was refused, timed out or failed.
    async fn on_renegotiation_aborted(&self, _contact: &ContactId, _kind: RenegotiationKind) {}
}
