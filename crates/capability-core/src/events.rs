//! Capability event notification

use async_trait::async_trait;

use crate::capability::{Capability, ContactId};

/// Upstream listener notified when a contact's stored capabilities or
/// registration knowledge change.
#[async_trait]
pub trait CapabilityEventHandler: Send + Sync {
    async fn on_capabilities_updated(&self, contact: &ContactId, capability: &Capability);
}

/// Fan-out to the registered event handlers, shared by both discovery
/// protocols and the service facade.
#[derive(Default)]
pub struct CapabilityNotifier {
    handlers: std::sync::RwLock<Vec<std::sync::Arc<dyn CapabilityEventHandler>>>,
}

impl CapabilityNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&self, handler: std::sync::Arc<dyn CapabilityEventHandler>) {
        self.handlers.write().unwrap().push(handler);
    }

    pub async fn notify(&self, contact: &ContactId, capability: &Capability) {
        let handlers: Vec<_> = self.handlers.read().unwrap().clone();
        for handler in handlers {
            handler.on_capabilities_updated(contact, capability).await;
        }
    }
}
