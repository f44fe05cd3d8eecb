//! SIP OPTIONS capability discovery
//!
//! Determines a peer's capabilities through an OPTIONS exchange: the
//! request advertises the local feature tags, the response's tags and SDP
//! are folded into a stored [`Capability`]. Exchanges run on a bounded
//! worker pool; the refresh gate and last-request stamp are one atomic
//! store operation, so rapid repeated calls for the same peer dispatch
//! one exchange.

use std::sync::Arc;

use tracing::{debug, warn};

use rcsip_infra_common::tasks::WorkerPool;
use rcsip_media_core::{negotiate_video, VideoCodec};
use rcsip_signaling_core::auth::{send_with_auth_retry, AuthenticationAgent};
use rcsip_signaling_core::factory::MessageFactory;
use rcsip_signaling_core::message::{status, SipRequest};
use rcsip_signaling_core::sdp::{MediaDescription, SessionDescription};
use rcsip_signaling_core::{tags, DialogPath, SignalingClient, TransactionContext};

use crate::capability::{epoch_millis, Capability, ContactId, RcsStatus, RegistrationState};
use crate::config::CapabilityConfig;
use crate::errors::Result;
use crate::events::CapabilityNotifier;
use crate::store::ContactStore;

/// Invoked exactly once when a discovery attempt reaches any terminal
/// state (success, rejection, timeout, or drop).
pub type CompletionCallback = Box<dyn FnOnce(&ContactId) + Send>;

/// Fires the completion callback on drop, so every terminal path
/// (including a worker pool dropping the job at shutdown) delivers it
/// exactly once.
struct CompletionGuard {
    contact: ContactId,
    callback: Option<CompletionCallback>,
}

impl CompletionGuard {
    fn new(contact: ContactId, callback: Option<CompletionCallback>) -> Self {
        Self { contact, callback }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(&self.contact);
        }
    }
}

/// Tells the discovery layer whether a richcall-class session is active
/// with a peer, which gates the media-sharing tags we advertise.
pub trait RichcallContext: Send + Sync {
    fn is_in_call_with(&self, contact: &ContactId) -> bool;
}

pub struct OptionsDiscovery {
    client: Arc<dyn SignalingClient>,
    auth: Arc<dyn AuthenticationAgent>,
    store: Arc<dyn ContactStore>,
    notifier: Arc<CapabilityNotifier>,
    config: CapabilityConfig,
    local_user: String,
    pool: Arc<WorkerPool>,
    richcall: std::sync::RwLock<Option<Arc<dyn RichcallContext>>>,
}

impl OptionsDiscovery {
    pub fn new(
        client: Arc<dyn SignalingClient>,
        auth: Arc<dyn AuthenticationAgent>,
        store: Arc<dyn ContactStore>,
        notifier: Arc<CapabilityNotifier>,
        config: CapabilityConfig,
        local_user: impl Into<String>,
    ) -> Self {
        let pool = Arc::new(WorkerPool::new(
            "options-discovery",
            config.max_concurrent_options,
        ));
        Self {
            client,
            auth,
            store,
            notifier,
            config,
            local_user: local_user.into(),
            pool,
            richcall: std::sync::RwLock::new(None),
        }
    }

    pub fn set_richcall_context(&self, context: Arc<dyn RichcallContext>) {
        *self.richcall.write().unwrap() = Some(context);
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Stop the worker pool; later requests are dropped, not queued.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// Request a capability refresh for `contact`.
    ///
    /// Skipped when the contact is the local user or when the stored
    /// record is fresh enough; every terminal path fires `completion`
    /// exactly once.
    pub async fn request_capabilities(
        self: &Arc<Self>,
        contact: ContactId,
        completion: Option<CompletionCallback>,
    ) {
        let guard = CompletionGuard::new(contact.clone(), completion);

        if self.local_user.contains(contact.as_str()) {
            debug!("skipping capability request for own identity {}", contact);
            return;
        }

        let now = epoch_millis();
        let refresh_ms = self.config.refresh_timeout.as_millis() as i64;
        if !self.store.begin_request(&contact, refresh_ms, now).await {
            debug!("capabilities for {} are fresh, not dispatching", contact);
            return;
        }

        let this = Arc::clone(self);
        // The guard travels with the job; dropping the job (pool shut
        // down) still fires the callback.
        self.pool.submit(format!("options:{}", contact), async move {
            this.run_exchange(&guard.contact).await;
            drop(guard);
        });
    }

    async fn run_exchange(&self, contact: &ContactId) {
        let target = contact.to_sip_uri(&self.config.home_domain);
        let mut dialog = DialogPath::new(self.local_user.clone(), target.clone(), target);

        let richcall = self
            .richcall
            .read()
            .unwrap()
            .as_ref()
            .map(|c| c.is_in_call_with(contact))
            .unwrap_or(false);
        let feature_tags = build_feature_tags(&self.config, richcall);

        let result = send_with_auth_retry(
            self.client.as_ref(),
            self.auth.as_ref(),
            &mut dialog,
            |path, authorization| {
                let mut request = MessageFactory::create_options(path, &feature_tags);
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
                // Transport failure: bookkeeping was stamped at dispatch,
                // stored capabilities stay untouched.
                warn!("OPTIONS exchange with {} failed: {}", contact, e);
                return;
            }
        };

        if ctx.timeout {
            debug!("OPTIONS exchange with {} timed out", contact);
            return;
        }

        match ctx.status_code {
            status::OK => self.handle_ok(contact, &ctx).await,
            status::NOT_FOUND => self.handle_not_found(contact).await,
            status::REQUEST_TIMEOUT | status::TEMPORARILY_UNAVAILABLE => {
                self.handle_not_registered(contact).await
            }
            other => {
                debug!(
                    "OPTIONS exchange with {} answered {}, keeping stored capabilities",
                    contact, other
                );
            }
        }
    }

    async fn handle_ok(&self, contact: &ContactId, ctx: &TransactionContext) {
        let response = match ctx.response.as_ref() {
            Some(r) => r,
            None => return,
        };

        let response_tags = response.feature_tags();
        let sdp = response
            .body_str()
            .and_then(|body| SessionDescription::parse(body).ok());

        let now = epoch_millis();
        let capability = extract_capabilities(&response_tags, sdp.as_ref())
            .timestamp_of_last_request(now)
            .timestamp_of_last_response(now)
            .build();

        // An automata responder answers on behalf of an absent user.
        let registration = if capability.sip_automata {
            RegistrationState::Offline
        } else {
            RegistrationState::Online
        };

        debug!("{} is RCS capable (registration {:?})", contact, registration);
        self.store
            .set(contact, capability.clone(), RcsStatus::RcsCapable, registration)
            .await;
        self.notifier.notify(contact, &capability).await;
    }

    async fn handle_not_found(&self, contact: &ContactId) {
        debug!("{} is not an RCS user", contact);
        let now = epoch_millis();
        let capability = Capability::builder()
            .timestamp_of_last_request(now)
            .timestamp_of_last_response(now)
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

    async fn handle_not_registered(&self, contact: &ContactId) {
        let record = self.store.get(contact).await;
        let has_info = record
            .as_ref()
            .map(|r| r.status != RcsStatus::NoInfo)
            .unwrap_or(false);

        if has_info {
            let record = record.unwrap();
            debug!("{} is currently not registered", contact);
            self.store
                .set(
                    contact,
                    record.capability.clone(),
                    record.status,
                    RegistrationState::Offline,
                )
                .await;
            self.notifier.notify(contact, &record.capability).await;
        } else {
            let capability = Capability::builder()
                .timestamp_of_last_request(epoch_millis())
                .build();
            self.store
                .set(
                    contact,
                    capability.clone(),
                    RcsStatus::NoInfo,
                    RegistrationState::Offline,
                )
                .await;
            self.notifier.notify(contact, &capability).await;
        }
    }

    /// Answer an inbound OPTIONS query with the local capabilities, and
    /// opportunistically learn the caller's from its feature tags.
    pub async fn handle_incoming(&self, request: &SipRequest) -> Result<()> {
        if let Some(caller) = request.asserted_identity().and_then(ContactId::parse) {
            let caller_tags = request.feature_tags();
            if !caller_tags.is_empty() {
                let now = epoch_millis();
                let capability = extract_capabilities(&caller_tags, None)
                    .timestamp_of_last_response(now)
                    .build();
                self.store
                    .set(
                        &caller,
                        capability.clone(),
                        RcsStatus::RcsCapable,
                        RegistrationState::Online,
                    )
                    .await;
                self.notifier.notify(&caller, &capability).await;
            }
        } else {
            debug!("inbound OPTIONS without a parsable caller identity");
        }

        let richcall = request
            .asserted_identity()
            .and_then(ContactId::parse)
            .map(|caller| {
                self.richcall
                    .read()
                    .unwrap()
                    .as_ref()
                    .map(|c| c.is_in_call_with(&caller))
                    .unwrap_or(false)
            })
            .unwrap_or(false);
        let local_tags = build_feature_tags(&self.config, richcall);
        let response =
            MessageFactory::create_options_response(request, &self.local_user, &local_tags, None);
        self.client.send_response(response).await?;
        Ok(())
    }
}

/// Build the local feature-tag set from configuration.
///
/// Media-sharing tags are only advertised in richcall context, and video
/// share additionally requires broadband access.
pub fn build_feature_tags(config: &CapabilityConfig, richcall: bool) -> Vec<String> {
    let supported = &config.supported;
    let mut out = Vec::new();
    let mut iaris = Vec::new();

    if supported.im_session {
        out.push(tags::TAG_OMA_IM.to_string());
    }
    if supported.ip_voice_call {
        out.push(tags::TAG_RCS_IP_VOICE_CALL.to_string());
        if supported.ip_video_call {
            out.push(tags::TAG_RCS_IP_VIDEO_CALL.to_string());
        }
    }
    if supported.cs_video {
        out.push(tags::TAG_3GPP_CS_VIDEO.to_string());
    }

    if richcall {
        if supported.image_sharing {
            iaris.push(tags::iari::IMAGE_SHARE);
        }
        if supported.video_sharing && config.network.has_broadband() {
            iaris.push(tags::iari::VIDEO_SHARE);
        }
    }
    if supported.file_transfer_msrp {
        iaris.push(tags::iari::FILE_TRANSFER);
    }
    if supported.file_transfer_http {
        iaris.push(tags::iari::FILE_TRANSFER_HTTP);
    }
    if supported.file_transfer_thumbnail {
        iaris.push(tags::iari::FILE_TRANSFER_THUMBNAIL);
    }
    if supported.file_transfer_store_forward {
        iaris.push(tags::iari::FILE_TRANSFER_SF);
    }
    if supported.group_chat_store_forward {
        iaris.push(tags::iari::GROUP_CHAT_SF);
    }
    if supported.presence_discovery {
        iaris.push(tags::iari::PRESENCE_DISCOVERY);
    }
    if supported.social_presence {
        iaris.push(tags::iari::SOCIAL_PRESENCE);
    }
    if supported.geolocation_push {
        iaris.push(tags::iari::GEOLOCATION_PUSH);
    }

    let mut urns: Vec<String> = iaris.iter().map(|s| s.to_string()).collect();
    if config.extensions_enabled {
        urns.extend(config.extensions.iter().cloned());
    }
    if !urns.is_empty() {
        out.push(format!("{}=\"{}\"", tags::TAG_IARI_REF, urns.join(",")));
    }

    out
}

/// Fold response feature tags and an optional SDP body into a capability
/// builder. When an SDP is present, its video section decides video
/// sharing by media-format intersection against the local codec list.
pub fn extract_capabilities(
    response_tags: &[String],
    sdp: Option<&SessionDescription>,
) -> crate::capability::CapabilityBuilder {
    let mut builder = Capability::builder()
        .im_session(tags::has_tag(response_tags, tags::TAG_OMA_IM))
        .ip_voice_call(tags::has_tag(response_tags, tags::TAG_RCS_IP_VOICE_CALL))
        .ip_video_call(tags::has_tag(response_tags, tags::TAG_RCS_IP_VIDEO_CALL))
        .cs_video(tags::has_tag(response_tags, tags::TAG_3GPP_CS_VIDEO))
        .sip_automata(tags::has_tag(response_tags, tags::TAG_SIP_AUTOMATA))
        .image_sharing(tags::has_iari(response_tags, tags::iari::IMAGE_SHARE))
        .video_sharing(tags::has_iari(response_tags, tags::iari::VIDEO_SHARE))
        .file_transfer_msrp(tags::has_iari(response_tags, tags::iari::FILE_TRANSFER))
        .file_transfer_http(tags::has_iari(response_tags, tags::iari::FILE_TRANSFER_HTTP))
        .file_transfer_thumbnail(tags::has_iari(
            response_tags,
            tags::iari::FILE_TRANSFER_THUMBNAIL,
        ))
        .file_transfer_store_forward(tags::has_iari(response_tags, tags::iari::FILE_TRANSFER_SF))
        .group_chat_store_forward(tags::has_iari(response_tags, tags::iari::GROUP_CHAT_SF))
        .presence_discovery(tags::has_iari(response_tags, tags::iari::PRESENCE_DISCOVERY))
        .social_presence(tags::has_iari(response_tags, tags::iari::SOCIAL_PRESENCE))
        .geolocation_push(tags::has_iari(response_tags, tags::iari::GEOLOCATION_PUSH))
        .extensions(tags::extension_urns(response_tags));

    if let Some(sdp) = sdp {
        let video_supported = sdp
            .video()
            .map(|video| {
                let proposed = video_codecs_from_sdp(video);
                negotiate_video(&VideoCodec::default_list(), &proposed).is_some()
            })
            .unwrap_or(false);
        builder = builder.video_sharing(video_supported);
    }

    builder
}

fn video_codecs_from_sdp(media: &MediaDescription) -> Vec<VideoCodec> {
    media
        .formats
        .iter()
        .map(|f| {
            VideoCodec::new(
                f.encoding.clone(),
                f.payload_type,
                f.clock_rate,
                f.params.clone(),
                f.width,
                f.height,
            )
        })
        .collect()
}
