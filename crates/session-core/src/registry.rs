//! Session registry
//!
//! Owns the per-peer call session cache behind one coarse lock: add,
//! remove and lookup are mutually exclusive, which keeps cross-cache
//! teardown sequences atomic at the cost of throughput. Resource limits
//! are enforced before any protocol work begins, and every rejected
//! inbound invitation produces a SIP-level negative response plus a
//! recorded reason code.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use rcsip_capability_core::options::RichcallContext;
use rcsip_capability_core::{ContactId, ContactStore};
use rcsip_signaling_core::auth::AuthenticationAgent;
use rcsip_signaling_core::factory::MessageFactory;
use rcsip_signaling_core::message::{status, SipRequest};
use rcsip_signaling_core::SignalingClient;

use crate::call::IpCallSession;
use crate::config::SessionConfig;
use crate::errors::{Result, SessionError};
use crate::events::SessionEventHandler;
use crate::types::CallErrorReason;

/// Hook invoked when a call failure suggests the peer's capabilities may
/// have changed.
#[async_trait]
pub trait CapabilityRefresher: Send + Sync {
    async fn refresh(&self, contact: &ContactId);
}

pub struct SessionRegistry {
    sessions: Mutex<HashMap<ContactId, Arc<IpCallSession>>>,
    config: SessionConfig,
    client: Arc<dyn SignalingClient>,
    auth: Arc<dyn AuthenticationAgent>,
    events: Arc<dyn SessionEventHandler>,
    store: Option<Arc<dyn ContactStore>>,
    refresher: Mutex<Option<Arc<dyn CapabilityRefresher>>>,
}

impl SessionRegistry {
    pub fn new(
        client: Arc<dyn SignalingClient>,
        auth: Arc<dyn AuthenticationAgent>,
        events: Arc<dyn SessionEventHandler>,
        config: SessionConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            config,
            client,
            auth,
            events,
            store: None,
            refresher: Mutex::new(None),
        })
    }

    pub fn with_contact_store(
        client: Arc<dyn SignalingClient>,
        auth: Arc<dyn AuthenticationAgent>,
        events: Arc<dyn SessionEventHandler>,
        config: SessionConfig,
        store: Arc<dyn ContactStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            config,
            client,
            auth,
            events,
            store: Some(store),
            refresher: Mutex::new(None),
        })
    }

    pub fn set_capability_refresher(&self, refresher: Arc<dyn CapabilityRefresher>) {
        *self.refresher.lock().unwrap() = Some(refresher);
    }

    /// Create an outbound session. Limits are checked before any
    /// signaling happens; the caller then drives it with
    /// [`IpCallSession::dial`].
    pub fn initiate_session(self: &Arc<Self>, contact: ContactId) -> Result<Arc<IpCallSession>> {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.len() >= self.config.max_sessions {
            return Err(SessionError::MaxSessions);
        }
        if sessions.contains_key(&contact) {
            return Err(SessionError::AlreadyInSession);
        }

        let session = IpCallSession::new_outgoing(
            contact.clone(),
            self.config.clone(),
            Arc::clone(&self.client),
            Arc::clone(&self.auth),
            Arc::clone(&self.events),
        );
        self.arm_closed_hook(&session);
        sessions.insert(contact, Arc::clone(&session));
        info!("session {} created (outgoing)", session.id());
        Ok(session)
    }

    /// Handle an inbound INVITE: enforce limits, create the session, and
    /// run its inbound flow in the background.
    pub async fn on_invitation_received(self: &Arc<Self>, request: SipRequest) -> Result<()> {
        let contact = match request.asserted_identity().and_then(ContactId::parse) {
            Some(contact) => contact,
            None => {
                warn!("inbound INVITE without a parsable caller identity");
                let response = MessageFactory::create_response(&request, 400, "Bad Request");
                self.client.send_response(response).await?;
                return Ok(());
            }
        };

        if let Some(store) = &self.store {
            if store.is_blocked(&contact).await {
                debug!("rejecting invitation from blocked contact {}", contact);
                let response =
                    MessageFactory::create_response(&request, status::DECLINE, "Decline");
                self.client.send_response(response).await?;
                self.events
                    .on_session_rejected(&contact, CallErrorReason::PeerBlocked)
                    .await;
                return Ok(());
            }
        }

        let session = {
            let mut sessions = self.sessions.lock().unwrap();
            if sessions.len() >= self.config.max_sessions {
                None
            } else {
                let session = IpCallSession::new_incoming(
                    contact.clone(),
                    request.clone(),
                    self.config.clone(),
                    Arc::clone(&self.client),
                    Arc::clone(&self.auth),
                    Arc::clone(&self.events),
                );
                self.arm_closed_hook(&session);
                sessions.insert(contact.clone(), Arc::clone(&session));
                Some(session)
            }
        };

        let session = match session {
            Some(session) => session,
            None => {
                debug!("rejecting invitation from {}: session limit reached", contact);
                let response =
                    MessageFactory::create_response(&request, status::BUSY_HERE, "Busy Here");
                self.client.send_response(response).await?;
                self.events
                    .on_session_rejected(&contact, CallErrorReason::MaxSessionsReached)
                    .await;
                return Ok(());
            }
        };

        info!("session {} created (incoming) from {}", session.id(), contact);
        let runner = Arc::clone(&session);
        tokio::spawn(async move {
            if let Err(e) = runner.run_incoming().await {
                debug!("inbound session ended with error: {}", e);
            }
        });
        Ok(())
    }

    /// Route an ACK to its session.
    pub fn on_ack_received(&self, contact: &ContactId) {
        if let Some(session) = self.get(contact) {
            session.on_ack_received();
        }
    }

    /// Route a CANCEL to its session.
    pub fn on_cancel_received(&self, contact: &ContactId) {
        if let Some(session) = self.get(contact) {
            session.on_cancel_received();
        }
    }

    /// Route a BYE to its session.
    pub async fn on_bye_received(&self, contact: &ContactId, request: &SipRequest) -> Result<()> {
        if let Some(session) = self.get(contact) {
            session.on_bye_received(request).await?;
        }
        Ok(())
    }

    /// Route an in-dialog re-INVITE to its session.
    pub async fn on_reinvite_received(&self, contact: &ContactId, request: SipRequest) -> Result<()> {
        if let Some(session) = self.get(contact) {
            session.on_reinvite_received(request).await?;
        }
        Ok(())
    }

    pub fn get(&self, contact: &ContactId) -> Option<Arc<IpCallSession>> {
        self.sessions.lock().unwrap().get(contact).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    fn remove(&self, contact: &ContactId) {
        self.sessions.lock().unwrap().remove(contact);
    }

    fn arm_closed_hook(self: &Arc<Self>, session: &Arc<IpCallSession>) {
        let registry = Arc::downgrade(self);
        session.set_on_closed(Box::new(move |contact, failed| {
            if let Some(registry) = registry.upgrade() {
                registry.remove(contact);
                if failed {
                    let refresher = registry.refresher.lock().unwrap().clone();
                    if let Some(refresher) = refresher {
                        let contact = contact.clone();
                        tokio::spawn(async move {
                            refresher.refresh(&contact).await;
                        });
                    }
                }
            }
        }));
    }
}

/// The registry is the source of truth for "in an active call-like
/// session with this peer", which gates the media-sharing feature tags
/// advertised by OPTIONS discovery.
impl RichcallContext for SessionRegistry {
    fn is_in_call_with(&self, contact: &ContactId) -> bool {
        self.sessions.lock().unwrap().contains_key(contact)
    }
}
