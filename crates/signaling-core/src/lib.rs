//! # Signaling-Core - SIP Messaging Boundary for RCSIP
//!
//! This crate defines the boundary between the RCS service layer and the
//! SIP transport/messaging stack. The wire-level stack itself (parsing,
//! transactions, transport) lives behind the [`client::SignalingClient`]
//! trait; what this crate owns is everything that crosses that boundary:
//!
//! - [`message`]: opaque request/response values with typed accessors
//! - [`dialog`]: dialog path identification (Call-ID, parties, CSeq)
//! - [`client`]: the send-and-await transaction contract
//! - [`auth`]: digest authentication and the shared challenge-retry
//!   transaction primitive used by every protocol in the stack
//! - [`sdp`]: the session description model used for codec negotiation
//!   and re-INVITE classification
//! - [`tags`]: RCS feature-tag constants and helpers

pub mod auth;
pub mod client;
pub mod dialog;
pub mod errors;
pub mod factory;
pub mod message;
pub mod sdp;
pub mod tags;

pub use client::{SignalingClient, TransactionContext};
pub use dialog::DialogPath;
pub use errors::{Result, SignalingError};
pub use message::{Method, SipRequest, SipResponse};
