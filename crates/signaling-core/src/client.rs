//! The send-and-await transaction contract
//!
//! Every SIP exchange in this stack is a blocking round-trip from the
//! issuing task's perspective: the task awaits a [`TransactionContext`]
//! holding either a final response or a timeout marker. Concurrency comes
//! from running multiple tasks, not from continuations.

use async_trait::async_trait;

use crate::errors::Result;
use crate::message::{SipRequest, SipResponse};

/// Outcome of one SIP request/response exchange.
#[derive(Debug, Clone)]
pub struct TransactionContext {
    /// Final status code, or 0 when the transaction timed out.
    pub status_code: u16,
    pub response: Option<SipResponse>,
    pub timeout: bool,
}

impl TransactionContext {
    pub fn from_response(response: SipResponse) -> Self {
        Self {
            status_code: response.status_code,
            response: Some(response),
            timeout: false,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            status_code: 0,
            response: None,
            timeout: true,
        }
    }
}

/// The transport/messaging stack, consumed as an opaque collaborator.
#[async_trait]
pub trait SignalingClient: Send + Sync {
    /// Send a request and wait for its final response or timeout.
    async fn send_and_await(&self, request: SipRequest) -> Result<TransactionContext>;

    /// Send a message for which no response is awaited (ACK, responses).
    async fn send_only(&self, request: SipRequest) -> Result<()>;

    /// Send a response to an inbound request.
    async fn send_response(&self, response: SipResponse) -> Result<()>;
}
