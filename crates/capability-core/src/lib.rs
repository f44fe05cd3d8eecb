//! # Capability-Core - RCS Capability Discovery for RCSIP
//!
//! Determines what a remote contact can do and keeps that knowledge fresh:
//!
//! - [`capability`]: the immutable capability snapshot and its builder
//! - [`store`]: the contact/capability persistence boundary
//! - [`options`]: SIP OPTIONS capability exchange
//! - [`anonymous_fetch`]: one-shot presence SUBSCRIBE/NOTIFY exchange
//! - [`pidf`]: presence document parsing
//! - [`polling`]: time-based refresh policy engine
//! - [`service`]: the orchestrating facade owning workers, polling and the
//!   address-book synchronization handshake

pub mod anonymous_fetch;
pub mod capability;
pub mod config;
pub mod errors;
pub mod events;
pub mod options;
pub mod pidf;
pub mod polling;
pub mod service;
pub mod store;

pub use capability::{Capability, CapabilityBuilder, ContactId, RcsStatus, RegistrationState};
pub use config::CapabilityConfig;
pub use errors::{CapabilityError, Result};
pub use events::{CapabilityEventHandler, CapabilityNotifier};
pub use options::{OptionsDiscovery, RichcallContext};
pub use polling::PollingEngine;
pub use service::{AddressBook, CapabilityService};
pub use store::{CapabilityRecord, ContactStore, InMemoryContactStore};
