//! Capability service facade
//!
//! Owns the two discovery protocols, the OPTIONS worker pool, the polling
//! engine, and the address-book synchronization handshake. Polling never
//! runs concurrently with an in-flight synchronization: every sync pass
//! stops the polling engine first and only restarts it once the pass has
//! fully drained.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use rcsip_infra_common::tasks::SerialQueue;
use rcsip_signaling_core::auth::AuthenticationAgent;
use rcsip_signaling_core::message::SipRequest;
use rcsip_signaling_core::SignalingClient;

use crate::anonymous_fetch::AnonymousFetchDiscovery;
use crate::capability::ContactId;
use crate::config::CapabilityConfig;
use crate::errors::Result;
use crate::events::{CapabilityEventHandler, CapabilityNotifier};
use crate::options::{OptionsDiscovery, RichcallContext};
use crate::polling::PollingEngine;
use crate::store::ContactStore;

/// The external address book, consumed for synchronization triggers.
#[async_trait]
pub trait AddressBook: Send + Sync {
    async fn all_contacts(&self) -> Vec<ContactId>;
}

/// Tracks one synchronization batch: complete exactly when every member's
/// completion callback has fired. Removal is idempotent, so a duplicate
/// delivery for the same peer cannot double-complete the batch.
struct SyncBatch {
    pending: std::sync::Mutex<HashSet<ContactId>>,
    drained: Notify,
}

impl SyncBatch {
    fn new(members: impl IntoIterator<Item = ContactId>) -> Self {
        Self {
            pending: std::sync::Mutex::new(members.into_iter().collect()),
            drained: Notify::new(),
        }
    }

    fn complete(&self, contact: &ContactId) {
        let mut pending = self.pending.lock().unwrap();
        pending.remove(contact);
        if pending.is_empty() {
            self.drained.notify_waiters();
        }
    }

    async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            if self.pending.lock().unwrap().is_empty() {
                return;
            }
            notified.await;
        }
    }
}

pub struct CapabilityService {
    options: Arc<OptionsDiscovery>,
    fetch: Arc<AnonymousFetchDiscovery>,
    polling: Arc<PollingEngine>,
    store: Arc<dyn ContactStore>,
    notifier: Arc<CapabilityNotifier>,
    address_book: Arc<dyn AddressBook>,
    ops_queue: SerialQueue,
    listening: AtomicBool,
    started: AtomicBool,
}

impl CapabilityService {
    pub fn new(
        client: Arc<dyn SignalingClient>,
        auth: Arc<dyn AuthenticationAgent>,
        store: Arc<dyn ContactStore>,
        address_book: Arc<dyn AddressBook>,
        config: CapabilityConfig,
        local_user: impl Into<String>,
    ) -> Self {
        let local_user = local_user.into();
        let notifier = Arc::new(CapabilityNotifier::new());
        let options = Arc::new(OptionsDiscovery::new(
            Arc::clone(&client),
            Arc::clone(&auth),
            Arc::clone(&store),
            Arc::clone(&notifier),
            config.clone(),
            local_user,
        ));
        let fetch = Arc::new(AnonymousFetchDiscovery::new(
            client,
            auth,
            Arc::clone(&store),
            Arc::clone(&notifier),
            config.clone(),
        ));
        let polling = Arc::new(PollingEngine::new(
            Arc::clone(&store),
            Arc::clone(&options),
            Arc::clone(&fetch),
            config,
        ));

        Self {
            options,
            fetch,
            polling,
            store,
            notifier,
            address_book,
            ops_queue: SerialQueue::new("capability-ops"),
            listening: AtomicBool::new(false),
            started: AtomicBool::new(false),
        }
    }

    pub fn add_event_handler(&self, handler: Arc<dyn CapabilityEventHandler>) {
        self.notifier.add_handler(handler);
    }

    pub fn set_richcall_context(&self, context: Arc<dyn RichcallContext>) {
        self.options.set_richcall_context(context);
    }

    /// Start the service: the OPTIONS worker pool is live, and a one-time
    /// full-contact synchronization runs before polling is armed.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("capability service already started");
            return;
        }
        info!("starting capability service");
        self.schedule_synchronization();
    }

    /// Stop background work: worker pool, polling, and address-book
    /// listening.
    pub fn stop(&self) {
        info!("stopping capability service");
        self.listening.store(false, Ordering::SeqCst);
        self.options.shutdown();
        self.polling.stop();
        self.ops_queue.shutdown();
    }

    /// Application-requested refresh for a single peer.
    pub async fn request_capabilities(&self, contact: ContactId) {
        self.options.request_capabilities(contact, None).await;
    }

    /// Application-requested refresh for a set of peers.
    pub async fn request_capabilities_for(&self, contacts: Vec<ContactId>) {
        for contact in contacts {
            self.options.request_capabilities(contact, None).await;
        }
    }

    /// Inbound OPTIONS: answer with local capabilities.
    pub async fn on_capability_request_received(&self, request: &SipRequest) -> Result<()> {
        self.options.handle_incoming(request).await
    }

    /// Inbound presence NOTIFY.
    pub async fn on_notification_received(&self, request: &SipRequest) -> Result<()> {
        self.fetch.on_notification_received(request).await
    }

    /// Signal that the external address book changed. Ignored until the
    /// initial synchronization has completed.
    pub fn address_book_changed(self: &Arc<Self>) {
        if !self.listening.load(Ordering::SeqCst) {
            debug!("address-book change before initial sync completed, ignoring");
            return;
        }
        self.schedule_synchronization();
    }

    fn schedule_synchronization(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let result = self.ops_queue.dispatch(async move {
            this.synchronize().await;
        });
        if result.is_err() {
            warn!("capability service stopped, synchronization not scheduled");
        }
    }

    /// Reconcile the address book against the known-contact set, querying
    /// every contact never queried before, in batches, until none remain.
    async fn synchronize(self: Arc<Self>) {
        // Polling must not observe a half-synchronized contact set.
        self.polling.stop();

        loop {
            let unqueried = self.unqueried_contacts().await;
            if unqueried.is_empty() {
                break;
            }
            info!("synchronizing {} unqueried contacts", unqueried.len());

            let batch = Arc::new(SyncBatch::new(unqueried.iter().cloned()));
            for contact in unqueried {
                let batch = Arc::clone(&batch);
                self.options
                    .request_capabilities(
                        contact,
                        Some(Box::new(move |peer| batch.complete(peer))),
                    )
                    .await;
            }
            batch.wait_drained().await;
            // New contacts may have appeared while the batch was in
            // flight; reconcile again before declaring completion.
        }

        info!("address-book synchronization complete");
        self.listening.store(true, Ordering::SeqCst);
        self.polling.start();
    }

    async fn unqueried_contacts(&self) -> Vec<ContactId> {
        let mut out = Vec::new();
        for contact in self.address_book.all_contacts().await {
            match self.store.get(&contact).await {
                None => out.push(contact),
                Some(record) if record.never_requested() => out.push(contact),
                Some(_) => {}
            }
        }
        out
    }

    pub fn polling(&self) -> &Arc<PollingEngine> {
        &self.polling
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Capability, RcsStatus, RegistrationState};
    use crate::store::InMemoryContactStore;
    use rcsip_signaling_core::auth::DigestAuthenticationAgent;
    use rcsip_signaling_core::message::{SipResponse};
    use rcsip_signaling_core::TransactionContext;
    use std::time::Duration;

    struct OkClient;

    #[async_trait]
    impl SignalingClient for OkClient {
        async fn send_and_await(
            &self,
            _request: SipRequest,
        ) -> rcsip_signaling_core::Result<TransactionContext> {
            let mut response = SipResponse::new(200, "OK");
            response.add_header("Contact", "<sip:peer@x>;+g.oma.sip-im");
            Ok(TransactionContext::from_response(response))
        }

        async fn send_only(&self, _request: SipRequest) -> rcsip_signaling_core::Result<()> {
            Ok(())
        }

        async fn send_response(&self, _response: SipResponse) -> rcsip_signaling_core::Result<()> {
            Ok(())
        }
    }

    struct FixedAddressBook(Vec<ContactId>);

    #[async_trait]
    impl AddressBook for FixedAddressBook {
        async fn all_contacts(&self) -> Vec<ContactId> {
            self.0.clone()
        }
    }

    #[test]
    fn batch_completion_is_idempotent_per_peer() {
        let a = ContactId::parse("+331").unwrap();
        let b = ContactId::parse("+332").unwrap();
        let batch = SyncBatch::new([a.clone(), b.clone()]);

        batch.complete(&a);
        // Duplicate delivery for the same peer must not drain the batch.
        batch.complete(&a);
        assert!(!batch.pending.lock().unwrap().is_empty());

        batch.complete(&b);
        assert!(batch.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn initial_sync_queries_unqueried_contacts_then_arms_polling() {
        let store = Arc::new(InMemoryContactStore::new());
        let queried = ContactId::parse("+33699999999").unwrap();
        store
            .set(
                &queried,
                Capability::builder().timestamp_of_last_request(1).build(),
                RcsStatus::RcsCapable,
                RegistrationState::Online,
            )
            .await;

        let fresh_a = ContactId::parse("+33611111111").unwrap();
        let fresh_b = ContactId::parse("+33622222222").unwrap();
        let address_book = FixedAddressBook(vec![queried.clone(), fresh_a.clone(), fresh_b.clone()]);

        let config = CapabilityConfig::default()
            .with_polling_period(Duration::from_secs(3600));
        let service = Arc::new(CapabilityService::new(
            Arc::new(OkClient),
            Arc::new(DigestAuthenticationAgent::new("alice", "secret")),
            Arc::clone(&store) as Arc<dyn ContactStore>,
            Arc::new(address_book),
            config,
            "sip:alice@ims.example.com",
        ));

        service.start();
        // Wait for the sync pass to drain and arm polling.
        for _ in 0..100 {
            if service.polling().is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(service.polling().is_running());
        let record = store.get(&fresh_a).await.unwrap();
        assert_eq!(record.status, RcsStatus::RcsCapable);
        assert!(record.capability.im_session);
        assert!(store.get(&fresh_b).await.unwrap().capability.im_session);

        service.stop();
        assert!(!service.polling().is_running());
    }
}
