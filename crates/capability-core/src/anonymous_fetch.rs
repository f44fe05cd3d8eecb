//! Anonymous-fetch capability discovery
//!
//! The alternate discovery path for peers known to support presence: a
//! one-shot SUBSCRIBE with an anonymous local identity requests a single
//! NOTIFY, whose PIDF body is folded into a stored [`Capability`]. The
//! protocol applies no staleness check of its own; the polling engine
//! decides when to use it.

use std::sync::Arc;

use tracing::{debug, warn};

use rcsip_signaling_core::auth::{send_with_auth_retry, AuthenticationAgent};
use rcsip_signaling_core::factory::{MessageFactory, ANONYMOUS_URI};
use rcsip_signaling_core::message::{status, SipRequest};
use rcsip_signaling_core::{DialogPath, SignalingClient};

use crate::capability::{epoch_millis, Capability, ContactId, RcsStatus, RegistrationState};
use crate::config::CapabilityConfig;
use crate::errors::{CapabilityError, Result};
use crate::events::CapabilityNotifier;
use crate::pidf::{self, BasicStatus};
use crate::store::ContactStore;

/// Service identifiers carried in presence tuples, each mapping to
/// exactly one capability flag.
mod service_ids {
    pub const VIDEO_SHARE: &str = "org.gsma.videoshare";
    pub const IMAGE_SHARE: &str = "org.gsma.imageshare";
    pub const FILE_TRANSFER: &str = "org.openmobilealliance:File-Transfer";
    pub const CS_VIDEO: &str = "org.3gpp.cs-videotelephony";
    pub const IM_SESSION: &str = "org.openmobilealliance:IM-session";
}

pub struct AnonymousFetchDiscovery {
    client: Arc<dyn SignalingClient>,
    auth: Arc<dyn AuthenticationAgent>,
    store: Arc<dyn ContactStore>,
    notifier: Arc<CapabilityNotifier>,
    config: CapabilityConfig,
}

impl AnonymousFetchDiscovery {
    pub fn new(
        client: Arc<dyn SignalingClient>,
        auth: Arc<dyn AuthenticationAgent>,
        store: Arc<dyn ContactStore>,
        notifier: Arc<CapabilityNotifier>,
        config: CapabilityConfig,
    ) -> Self {
        Self {
            client,
            auth,
            store,
            notifier,
            config,
        }
    }

    /// Send the one-shot SUBSCRIBE. Capability content only arrives with
    /// the NOTIFY; the immediate response merely accepts or rejects the
    /// subscription.
    pub async fn request_capabilities(&self, contact: &ContactId) {
        let now = epoch_millis();
        self.store.update_time_of_last_request(contact, now).await;

        let target = contact.to_sip_uri(&self.config.home_domain);
        let mut dialog = DialogPath::new(ANONYMOUS_URI, target.clone(), target);

        let result = send_with_auth_retry(
            self.client.as_ref(),
            self.auth.as_ref(),
            &mut dialog,
            |path, authorization| {
                let mut request = MessageFactory::create_anonymous_subscribe(path);
                if let Some(authorization) = authorization {
                    request.set_header("Proxy-Authorization", authorization);
                }
                request
            },
        )
        .await;

        let ctx = match result {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("anonymous fetch for {} failed: {}", contact, e);
                return;
            }
        };

        if ctx.timeout {
            debug!("anonymous fetch for {} timed out", contact);
            return;
        }

        match ctx.status_code {
            code if (200..300).contains(&code) => {
                // Accepted; the capability update arrives with the NOTIFY.
            }
            status::NOT_FOUND => {
                debug!("{} is not an RCS user (presence)", contact);
                let capability = Capability::builder()
                    .timestamp_of_last_request(now)
                    .timestamp_of_last_response(epoch_millis())
                    .build();
                self.store
                    .set(
                        contact,
                        capability.clone(),
                        RcsStatus::NotRcs,
                        RegistrationState::Unknown,
                    )
                    .await;
                self.notifier.notify(contact, &capability).await;
            }
            other => {
                debug!(
                    "anonymous fetch for {} answered {}, keeping stored capabilities",
                    contact, other
                );
            }
        }
    }

    /// Handle the NOTIFY delivering the fetch result.
    pub async fn on_notification_received(&self, notify: &SipRequest) -> Result<()> {
        let body = notify.body_str().map(str::trim).unwrap_or("");

        if body.is_empty() {
            // No presence info: the peer identity comes from the headers.
            let contact = match notify.asserted_identity().and_then(ContactId::parse) {
                Some(contact) => contact,
                None => {
                    debug!("empty NOTIFY without a parsable identity, discarding");
                    return Ok(());
                }
            };
            let capability = Capability::builder()
                .timestamp_of_last_response(epoch_millis())
                .build();
            self.store
                .set(
                    &contact,
                    capability.clone(),
                    RcsStatus::NoInfo,
                    RegistrationState::Unknown,
                )
                .await;
            self.notifier.notify(&contact, &capability).await;
            return Ok(());
        }

        let document = pidf::parse(body)?;
        let contact = match ContactId::parse(&document.entity) {
            Some(contact) => contact,
            None => {
                warn!(
                    "presence entity '{}' is not a contact identity, discarding",
                    document.entity
                );
                return Ok(());
            }
        };

        let mut builder = Capability::builder();
        for tuple in &document.tuples {
            let available = tuple.status == BasicStatus::Open;
            match tuple.service_id.as_deref() {
                Some(service_ids::VIDEO_SHARE) => builder = builder.video_sharing(available),
                Some(service_ids::IMAGE_SHARE) => builder = builder.image_sharing(available),
                Some(service_ids::FILE_TRANSFER) => {
                    builder = builder.file_transfer_msrp(available)
                }
                Some(service_ids::CS_VIDEO) => builder = builder.cs_video(available),
                Some(service_ids::IM_SESSION) => builder = builder.im_session(available),
                Some(other) => debug!("ignoring unknown presence service '{}'", other),
                None => {}
            }
        }

        // This protocol succeeding is itself proof of presence discovery.
        let capability = builder
            .presence_discovery(true)
            .timestamp_of_last_response(epoch_millis())
            .build();

        self.store
            .set(
                &contact,
                capability.clone(),
                RcsStatus::RcsCapable,
                RegistrationState::Unknown,
            )
            .await;
        self.notifier.notify(&contact, &capability).await;
        Ok(())
    }
}
