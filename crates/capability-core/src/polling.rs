//! Periodic capability refresh
//!
//! A self-rearming one-shot timer: each firing processes the full known
//! contact set, then schedules exactly one more period. Per contact, a
//! stale record is refreshed through anonymous fetch when the peer is
//! known to support presence discovery, through OPTIONS otherwise.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::anonymous_fetch::AnonymousFetchDiscovery;
use crate::capability::{epoch_millis, ContactId};
use crate::config::CapabilityConfig;
use crate::options::OptionsDiscovery;
use crate::store::ContactStore;

/// True when a record last refreshed at `last_refresh_ms` must be
/// re-validated: either the clock moved backward or the expiry window
/// has passed.
pub fn refresh_due(last_refresh_ms: i64, expiry_ms: i64, now_ms: i64) -> bool {
    now_ms < last_refresh_ms || now_ms > last_refresh_ms + expiry_ms
}

pub struct PollingEngine {
    store: Arc<dyn ContactStore>,
    options: Arc<OptionsDiscovery>,
    fetch: Arc<AnonymousFetchDiscovery>,
    config: CapabilityConfig,
    timer: std::sync::Mutex<Option<CancellationToken>>,
}

impl PollingEngine {
    pub fn new(
        store: Arc<dyn ContactStore>,
        options: Arc<OptionsDiscovery>,
        fetch: Arc<AnonymousFetchDiscovery>,
        config: CapabilityConfig,
    ) -> Self {
        Self {
            store,
            options,
            fetch,
            config,
            timer: std::sync::Mutex::new(None),
        }
    }

    /// Arm the polling timer. A zero polling period disables the engine.
    pub fn start(self: &Arc<Self>) {
        let period = self.config.polling_period;
        if period.is_zero() {
            info!("capability polling disabled (period is zero)");
            return;
        }

        let mut timer = self.timer.lock().unwrap();
        if timer.is_some() {
            debug!("capability polling already running");
            return;
        }

        let token = CancellationToken::new();
        *timer = Some(token.clone());

        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("capability polling stopped");
                        break;
                    }
                    _ = tokio::time::sleep(period) => {
                        this.process_contacts().await;
                        // The loop itself is the rearm: one more period.
                    }
                }
            }
        });

        info!("capability polling armed with period {:?}", period);
    }

    /// Cancel the pending rearm.
    pub fn stop(&self) {
        if let Some(token) = self.timer.lock().unwrap().take() {
            token.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.lock().unwrap().is_some()
    }

    async fn process_contacts(&self) {
        let contacts = self.store.known_contacts().await;
        debug!("polling {} known contacts", contacts.len());
        let expiry_ms = self.config.expiry_timeout.as_millis() as i64;

        for contact in contacts {
            match self.store.get(&contact).await {
                None => self.dispatch_options(contact).await,
                Some(record) => {
                    let last_refresh = record.capability.timestamp_of_last_response;
                    if !refresh_due(last_refresh, expiry_ms, epoch_millis()) {
                        continue;
                    }
                    if record.capability.presence_discovery {
                        self.fetch.request_capabilities(&contact).await;
                    } else {
                        self.dispatch_options(contact).await;
                    }
                }
            }
        }
    }

    async fn dispatch_options(&self, contact: ContactId) {
        self.options.request_capabilities(contact, None).await;
    }
}
