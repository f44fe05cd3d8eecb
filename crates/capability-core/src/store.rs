//! Contact/capability persistence boundary
//!
//! The real store is an external collaborator (contact database); this
//! module defines the consumed interface plus an in-memory implementation
//! used for wiring and tests. Reads and writes are per-contact; callers
//! must not assume atomicity across a read and a later write, except for
//! [`ContactStore::begin_request`], which performs the refresh-due check
//! and the last-request stamp as one atomic step to prevent duplicate
//! concurrent dispatches for the same peer.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::capability::{
    Capability, CapabilityBuilder, ContactId, RcsStatus, RegistrationState, INVALID_TIMESTAMP,
};

/// A stored capability snapshot with its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityRecord {
    pub capability: Capability,
    pub status: RcsStatus,
    pub registration: RegistrationState,
    pub display_name: Option<String>,
}

impl CapabilityRecord {
    pub fn new(capability: Capability, status: RcsStatus, registration: RegistrationState) -> Self {
        Self {
            capability,
            status,
            registration,
            display_name: None,
        }
    }

    /// True when this contact has never been queried.
    pub fn never_requested(&self) -> bool {
        self.capability.timestamp_of_last_request == INVALID_TIMESTAMP
    }
}

/// The contact/capability persistence service.
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn get(&self, contact: &ContactId) -> Option<CapabilityRecord>;

    /// Replace the stored snapshot wholesale.
    async fn set(
        &self,
        contact: &ContactId,
        capability: Capability,
        status: RcsStatus,
        registration: RegistrationState,
    );

    /// Merge a partial update: flags from `capability`, classification and
    /// display name applied over the existing record, timestamps kept.
    async fn merge_capabilities(
        &self,
        contact: &ContactId,
        capability: Capability,
        status: RcsStatus,
        registration: RegistrationState,
        display_name: Option<&str>,
    );

    async fn update_time_of_last_request(&self, contact: &ContactId, now_ms: i64);

    async fn update_time_of_last_response(&self, contact: &ContactId, now_ms: i64);

    async fn is_blocked(&self, contact: &ContactId) -> bool;

    /// Contacts with any stored record.
    async fn known_contacts(&self) -> Vec<ContactId>;

    /// Atomic refresh gate: returns true and stamps the last-request
    /// timestamp when a request for `contact` should be dispatched:
    /// no record yet, record older than `refresh_timeout_ms`, or a clock
    /// that moved backward. Returns false otherwise, with no state change.
    async fn begin_request(
        &self,
        contact: &ContactId,
        refresh_timeout_ms: i64,
        now_ms: i64,
    ) -> bool;
}

/// DashMap-backed store for wiring and tests.
pub struct InMemoryContactStore {
    records: DashMap<ContactId, CapabilityRecord>,
    blocked: DashMap<ContactId, ()>,
}

impl InMemoryContactStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            blocked: DashMap::new(),
        }
    }

    pub fn block(&self, contact: ContactId) {
        self.blocked.insert(contact, ());
    }
}

#[async_trait]
impl ContactStore for InMemoryContactStore {
    async fn get(&self, contact: &ContactId) -> Option<CapabilityRecord> {
        self.records.get(contact).map(|entry| entry.clone())
    }

    async fn set(
        &self,
        contact: &ContactId,
        capability: Capability,
        status: RcsStatus,
        registration: RegistrationState,
    ) {
        self.records
            .entry(contact.clone())
            .and_modify(|record| {
                record.capability = capability.clone();
                record.status = status;
                record.registration = registration;
            })
            .or_insert_with(|| CapabilityRecord::new(capability, status, registration));
    }

    async fn merge_capabilities(
        &self,
        contact: &ContactId,
        capability: Capability,
        status: RcsStatus,
        registration: RegistrationState,
        display_name: Option<&str>,
    ) {
        self.records
            .entry(contact.clone())
            .and_modify(|record| {
                let merged = CapabilityBuilder::from_capability(&capability)
                    .timestamp_of_last_request(record.capability.timestamp_of_last_request)
                    .timestamp_of_last_response(record.capability.timestamp_of_last_response)
                    .build();
                record.capability = merged;
                record.status = status;
                record.registration = registration;
                if let Some(name) = display_name {
                    record.display_name = Some(name.to_string());
                }
            })
            .or_insert_with(|| {
                let mut record = CapabilityRecord::new(capability, status, registration);
                record.display_name = display_name.map(|s| s.to_string());
                record
            });
    }

    async fn update_time_of_last_request(&self, contact: &ContactId, now_ms: i64) {
        self.records
            .entry(contact.clone())
            .and_modify(|record| {
                record.capability.timestamp_of_last_request = now_ms;
            })
            .or_insert_with(|| {
                let capability = CapabilityBuilder::new()
                    .timestamp_of_last_request(now_ms)
                    .build();
                CapabilityRecord::new(capability, RcsStatus::NoInfo, RegistrationState::Unknown)
            });
    }

    async fn update_time_of_last_response(&self, contact: &ContactId, now_ms: i64) {
        self.records.entry(contact.clone()).and_modify(|record| {
            record.capability.timestamp_of_last_response = now_ms;
        });
    }

    async fn is_blocked(&self, contact: &ContactId) -> bool {
        self.blocked.contains_key(contact)
    }

    async fn known_contacts(&self) -> Vec<ContactId> {
        self.records.iter().map(|entry| entry.key().clone()).collect()
    }

    async fn begin_request(
        &self,
        contact: &ContactId,
        refresh_timeout_ms: i64,
        now_ms: i64,
    ) -> bool {
        // The entry guard holds the shard lock, making check-and-stamp
        // atomic per contact.
        let mut due = false;
        self.records
            .entry(contact.clone())
            .and_modify(|record| {
                let last = record.capability.timestamp_of_last_request;
                if last == INVALID_TIMESTAMP || now_ms < last || now_ms - last >= refresh_timeout_ms
                {
                    record.capability.timestamp_of_last_request = now_ms;
                    due = true;
                }
            })
            .or_insert_with(|| {
                due = true;
                let capability = CapabilityBuilder::new()
                    .timestamp_of_last_request(now_ms)
                    .build();
                CapabilityRecord::new(capability, RcsStatus::NoInfo, RegistrationState::Unknown)
            });
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact() -> ContactId {
        ContactId::parse("+33612345678").unwrap()
    }

    #[tokio::test]
    async fn begin_request_passes_once_within_timeout() {
        let store = InMemoryContactStore::new();
        let peer = contact();

        assert!(store.begin_request(&peer, 60_000, 1_000_000).await);
        // Same window: the stamp from the first call blocks the second.
        assert!(!store.begin_request(&peer, 60_000, 1_000_100).await);
        // After the timeout has elapsed the request is due again.
        assert!(store.begin_request(&peer, 60_000, 1_070_000).await);
    }

    #[tokio::test]
    async fn begin_request_treats_clock_rewind_as_due() {
        let store = InMemoryContactStore::new();
        let peer = contact();

        assert!(store.begin_request(&peer, 60_000, 1_000_000).await);
        assert!(store.begin_request(&peer, 60_000, 500_000).await);
    }

    #[tokio::test]
    async fn merge_keeps_existing_timestamps() {
        let store = InMemoryContactStore::new();
        let peer = contact();

        store.update_time_of_last_request(&peer, 42).await;
        let update = Capability::builder().im_session(true).build();
        store
            .merge_capabilities(
                &peer,
                update,
                RcsStatus::RcsCapable,
                RegistrationState::Online,
                Some("Alice"),
            )
            .await;

        let record = store.get(&peer).await.unwrap();
        assert!(record.capability.im_session);
        assert_eq!(record.capability.timestamp_of_last_request, 42);
        assert_eq!(record.display_name.as_deref(), Some("Alice"));
    }
}
