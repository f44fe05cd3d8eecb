//! IP call session
//!
//! One session struct drives both directions of the dialog lifecycle.
//! Every completion handler checks the interruption flag on entry, so a
//! session that has already been torn down never re-enters termination
//! logic or re-notifies listeners.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use rcsip_capability_core::ContactId;
use rcsip_media_core::{negotiate_audio, negotiate_video, AudioCodec, VideoCodec};
use rcsip_signaling_core::auth::{send_with_auth_retry, AuthenticationAgent};
use rcsip_signaling_core::factory::MessageFactory;
use rcsip_signaling_core::message::{status, SipRequest, SipResponse};
use rcsip_signaling_core::sdp::{MediaDescription, MediaDirection, MediaKind, RtpMap, SessionDescription};
use rcsip_signaling_core::{tags, DialogPath, SignalingClient};

use crate::config::SessionConfig;
use crate::errors::{Result, SessionError};
use crate::events::SessionEventHandler;
use crate::types::{CallErrorReason, CallState, Direction, InviteDecision, SessionId};

pub(crate) const AUDIO_PORT: u16 = 5004;
pub(crate) const VIDEO_PORT: u16 = 5006;

/// Invoked once when the session leaves its owning registry; the flag
/// marks failure paths that should trigger a capability refresh.
pub(crate) type ClosedHook = Box<dyn FnOnce(&ContactId, bool) + Send>;

pub struct IpCallSession {
    id: SessionId,
    contact: ContactId,
    direction: Direction,
    config: SessionConfig,
    client: Arc<dyn SignalingClient>,
    auth: Arc<dyn AuthenticationAgent>,
    events: Arc<dyn SessionEventHandler>,

    state: Mutex<CallState>,
    interrupted: AtomicBool,
    pub(crate) dialog: tokio::sync::Mutex<DialogPath>,

    /// The inbound INVITE, kept for response correlation.
    invite: Mutex<Option<SipRequest>>,
    remote_offer: Mutex<Option<SessionDescription>>,
    pub(crate) negotiated_audio: Mutex<Option<AudioCodec>>,
    pub(crate) negotiated_video: Mutex<Option<VideoCodec>>,

    decision_tx: Mutex<Option<oneshot::Sender<InviteDecision>>>,
    pub(crate) confirm_tx: Mutex<Option<oneshot::Sender<bool>>>,
    ack_tx: Mutex<Option<oneshot::Sender<()>>>,

    on_closed: Mutex<Option<ClosedHook>>,
}

impl IpCallSession {
    pub fn new_outgoing(
        contact: ContactId,
        config: SessionConfig,
        client: Arc<dyn SignalingClient>,
        auth: Arc<dyn AuthenticationAgent>,
        events: Arc<dyn SessionEventHandler>,
    ) -> Arc<Self> {
        let target = contact.to_sip_uri(&config.home_domain);
        let dialog = DialogPath::new(config.local_user.clone(), target.clone(), target);
        Arc::new(Self {
            id: SessionId::new(),
            contact,
            direction: Direction::Outgoing,
            config,
            client,
            auth,
            events,
            state: Mutex::new(CallState::Created),
            interrupted: AtomicBool::new(false),
            dialog: tokio::sync::Mutex::new(dialog),
            invite: Mutex::new(None),
            remote_offer: Mutex::new(None),
            negotiated_audio: Mutex::new(None),
            negotiated_video: Mutex::new(None),
            decision_tx: Mutex::new(None),
            confirm_tx: Mutex::new(None),
            ack_tx: Mutex::new(None),
            on_closed: Mutex::new(None),
        })
    }

    pub fn new_incoming(
        contact: ContactId,
        invite: SipRequest,
        config: SessionConfig,
        client: Arc<dyn SignalingClient>,
        auth: Arc<dyn AuthenticationAgent>,
        events: Arc<dyn SessionEventHandler>,
    ) -> Arc<Self> {
        let call_id = invite.header("Call-ID").unwrap_or_default().to_string();
        let cseq = invite
            .header("CSeq")
            .and_then(|v| v.split_whitespace().next())
            .and_then(|n| n.parse::<u32>().ok())
            .unwrap_or(1);
        let remote = invite.header("From").unwrap_or_default().to_string();
        let dialog = DialogPath::from_incoming(
            call_id,
            config.local_user.clone(),
            remote.clone(),
            remote,
            cseq,
        );
        let remote_offer = invite
            .body_str()
            .and_then(|body| SessionDescription::parse(body).ok());

        Arc::new(Self {
            id: SessionId::new(),
            contact,
            direction: Direction::Incoming,
            config,
            client,
            auth,
            events,
            state: Mutex::new(CallState::Invited),
            interrupted: AtomicBool::new(false),
            dialog: tokio::sync::Mutex::new(dialog),
            invite: Mutex::new(Some(invite)),
            remote_offer: Mutex::new(remote_offer),
            negotiated_audio: Mutex::new(None),
            negotiated_video: Mutex::new(None),
            decision_tx: Mutex::new(None),
            confirm_tx: Mutex::new(None),
            ack_tx: Mutex::new(None),
            on_closed: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn contact(&self) -> &ContactId {
        &self.contact
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> CallState {
        *self.state.lock().unwrap()
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub(crate) fn set_on_closed(&self, hook: ClosedHook) {
        *self.on_closed.lock().unwrap() = Some(hook);
    }

    pub(crate) fn transition(&self, next: CallState) {
        let mut state = self.state.lock().unwrap();
        debug!("session {} {:?} -> {:?}", self.id, *state, next);
        *state = next;
    }

    /// Mark the session interrupted; returns true when it already was.
    fn interrupt(&self) -> bool {
        self.interrupted.swap(true, Ordering::SeqCst)
    }

    fn close(&self, failed: bool) {
        if let Some(hook) = self.on_closed.lock().unwrap().take() {
            hook(&self.contact, failed);
        }
    }

    pub(crate) fn events(&self) -> &Arc<dyn SessionEventHandler> {
        &self.events
    }

    pub(crate) fn client(&self) -> &Arc<dyn SignalingClient> {
        &self.client
    }

    pub(crate) fn auth(&self) -> &Arc<dyn AuthenticationAgent> {
        &self.auth
    }

    pub(crate) fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Outbound path
    // ------------------------------------------------------------------

    /// Send the INVITE and drive the exchange to an established session
    /// or a terminal failure.
    pub async fn dial(self: &Arc<Self>) -> Result<()> {
        if self.state() != CallState::Created {
            return Err(SessionError::Terminated);
        }
        self.transition(CallState::Inviting);

        let offer = self.build_offer(false, MediaDirection::SendRecv);
        let offer_str = offer.render(&self.config.media_address);
        let feature_tags = call_feature_tags(false);

        let ctx = {
            let mut dialog = self.dialog.lock().await;
            send_with_auth_retry(
                self.client.as_ref(),
                self.auth.as_ref(),
                &mut dialog,
                |path, authorization| {
                    let mut request = MessageFactory::create_invite(path, &feature_tags, &offer_str);
                    if let Some(authorization) = authorization {
                        request.set_header("Proxy-Authorization", authorization);
                    }
                    request
                },
            )
            .await
        };

        if self.is_interrupted() {
            debug!("session {} interrupted during INVITE, dropping response", self.id);
            return Ok(());
        }

        let ctx = match ctx {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("INVITE to {} failed: {}", self.contact, e);
                self.handle_call_error(CallErrorReason::ProtocolError).await;
                return Err(e.into());
            }
        };

        if ctx.timeout {
            self.handle_call_error(CallErrorReason::NoResponse).await;
            return Err(SessionError::NoResponse);
        }

        match ctx.status_code {
            status::OK => self.complete_outbound(ctx.response.as_ref()).await,
            status::BUSY_HERE => {
                self.reject_terminal(CallErrorReason::Busy).await;
                Err(SessionError::Rejected(status::BUSY_HERE))
            }
            status::DECLINE => {
                self.reject_terminal(CallErrorReason::Declined).await;
                Err(SessionError::Rejected(status::DECLINE))
            }
            status::REQUEST_TERMINATED => {
                self.reject_terminal(CallErrorReason::Cancelled).await;
                Err(SessionError::Rejected(status::REQUEST_TERMINATED))
            }
            other => {
                self.handle_call_error(CallErrorReason::ProtocolError).await;
                Err(SessionError::Rejected(other))
            }
        }
    }

    async fn complete_outbound(self: &Arc<Self>, response: Option<&SipResponse>) -> Result<()> {
        let answer = response
            .and_then(|r| r.body_str())
            .and_then(|body| SessionDescription::parse(body).ok());

        {
            let dialog = self.dialog.lock().await;
            self.client.send_only(MessageFactory::create_ack(&dialog)).await?;
        }

        let audio = answer
            .as_ref()
            .and_then(|sdp| sdp.audio())
            .map(audio_codecs_from)
            .and_then(|proposed| negotiate_audio(&AudioCodec::default_list(), &proposed));

        let audio = match audio {
            Some(audio) => audio,
            None => {
                // Audio is mandatory; tear the dialog down again.
                {
                    let mut dialog = self.dialog.lock().await;
                    dialog.increment_cseq();
                    let _ = self.client.send_only(MessageFactory::create_bye(&dialog)).await;
                }
                self.handle_call_error(CallErrorReason::UnsupportedAudio).await;
                return Err(SessionError::UnsupportedAudio);
            }
        };

        let video = answer
            .as_ref()
            .and_then(|sdp| sdp.video())
            .map(video_codecs_from)
            .and_then(|proposed| negotiate_video(&VideoCodec::default_list(), &proposed));

        *self.negotiated_audio.lock().unwrap() = Some(audio);
        *self.negotiated_video.lock().unwrap() = video;
        if let Some(answer) = answer {
            *self.remote_offer.lock().unwrap() = Some(answer);
        }

        self.transition(CallState::Established);
        info!("session {} with {} established", self.id, self.contact);
        self.events.on_session_accepted(&self.contact).await;
        self.events.on_session_started(&self.contact).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Inbound path
    // ------------------------------------------------------------------

    /// Ring, await the local decision (or timeout, or remote cancel),
    /// then answer the invitation.
    pub async fn run_incoming(self: &Arc<Self>) -> Result<()> {
        let (decision_tx, decision_rx) = oneshot::channel();
        *self.decision_tx.lock().unwrap() = Some(decision_tx);

        self.respond(180, "Ringing", None).await?;
        self.transition(CallState::Ringing);
        self.events.on_session_invited(&self.contact, &self.id).await;

        let decision = tokio::time::timeout(self.config.ringing_period, decision_rx).await;

        if self.is_interrupted() {
            debug!("session {} interrupted while ringing", self.id);
            return Ok(());
        }

        match decision {
            Err(_) => {
                // Nobody answered within the ringing period.
                self.respond(status::TEMPORARILY_UNAVAILABLE, "Temporarily Unavailable", None)
                    .await?;
                self.reject_inbound(CallErrorReason::NotAnswered).await;
                Ok(())
            }
            Ok(Err(_)) | Ok(Ok(InviteDecision::RemoteCancelled)) => {
                self.respond(status::REQUEST_TERMINATED, "Request Terminated", None)
                    .await?;
                self.reject_inbound(CallErrorReason::Cancelled).await;
                Ok(())
            }
            Ok(Ok(InviteDecision::RejectBusy)) => {
                self.respond(status::BUSY_HERE, "Busy Here", None).await?;
                self.reject_inbound(CallErrorReason::Busy).await;
                Ok(())
            }
            Ok(Ok(InviteDecision::RejectDecline)) => {
                self.respond(status::DECLINE, "Decline", None).await?;
                self.reject_inbound(CallErrorReason::Declined).await;
                Ok(())
            }
            Ok(Ok(InviteDecision::Accept)) => self.complete_inbound().await,
        }
    }

    async fn complete_inbound(self: &Arc<Self>) -> Result<()> {
        let offer = self.remote_offer.lock().unwrap().clone();

        let audio = offer
            .as_ref()
            .and_then(|sdp| sdp.audio())
            .map(audio_codecs_from)
            .and_then(|proposed| negotiate_audio(&AudioCodec::default_list(), &proposed));

        // Audio is mandatory; video is omitted when nothing matches.
        let audio = match audio {
            Some(audio) => audio,
            None => {
                self.respond(488, "Not Acceptable Here", None).await?;
                self.handle_call_error(CallErrorReason::UnsupportedAudio).await;
                return Err(SessionError::UnsupportedAudio);
            }
        };
        let video = offer
            .as_ref()
            .and_then(|sdp| sdp.video())
            .map(video_codecs_from)
            .and_then(|proposed| negotiate_video(&VideoCodec::default_list(), &proposed));

        *self.negotiated_audio.lock().unwrap() = Some(audio);
        *self.negotiated_video.lock().unwrap() = video;

        let (ack_tx, ack_rx) = oneshot::channel();
        *self.ack_tx.lock().unwrap() = Some(ack_tx);

        let answer = self.build_answer();
        let answer_str = answer.render(&self.config.media_address);
        self.respond(200, "OK", Some(&answer_str)).await?;
        self.events.on_session_accepted(&self.contact).await;

        match tokio::time::timeout(self.config.ack_timeout, ack_rx).await {
            Ok(Ok(())) => {
                self.transition(CallState::Established);
                info!("session {} with {} established", self.id, self.contact);
                self.events.on_session_started(&self.contact).await;
                Ok(())
            }
            _ => {
                self.handle_call_error(CallErrorReason::AckTimeout).await;
                Err(SessionError::AckTimeout)
            }
        }
    }

    /// Accept the ringing invitation.
    pub fn accept(&self) {
        self.deliver_decision(InviteDecision::Accept);
    }

    /// Reject the ringing invitation as busy.
    pub fn reject_busy(&self) {
        self.deliver_decision(InviteDecision::RejectBusy);
    }

    /// Decline the ringing invitation.
    pub fn reject_decline(&self) {
        self.deliver_decision(InviteDecision::RejectDecline);
    }

    fn deliver_decision(&self, decision: InviteDecision) {
        if let Some(tx) = self.decision_tx.lock().unwrap().take() {
            let _ = tx.send(decision);
        } else {
            debug!("session {} has no pending decision, ignoring {:?}", self.id, decision);
        }
    }

    /// Remote CANCEL for a still-ringing invitation.
    pub fn on_cancel_received(&self) {
        self.deliver_decision(InviteDecision::RemoteCancelled);
    }

    /// ACK completing inbound session setup.
    pub fn on_ack_received(&self) {
        if let Some(tx) = self.ack_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
    }

    // ------------------------------------------------------------------
    // Termination
    // ------------------------------------------------------------------

    /// Locally end the session with a BYE.
    pub async fn terminate(&self) -> Result<()> {
        if self.interrupt() {
            debug!("session {} already terminated", self.id);
            return Ok(());
        }
        {
            let mut dialog = self.dialog.lock().await;
            dialog.increment_cseq();
            let _ = self.client.send_only(MessageFactory::create_bye(&dialog)).await;
        }
        self.transition(CallState::Terminated);
        self.events.on_session_terminated(&self.contact).await;
        self.close(false);
        Ok(())
    }

    /// Remote BYE ends the session.
    pub async fn on_bye_received(&self, request: &SipRequest) -> Result<()> {
        if self.interrupt() {
            debug!("session {} already terminated, ignoring BYE", self.id);
            return Ok(());
        }
        let response = MessageFactory::create_response(request, 200, "OK");
        self.client.send_response(response).await?;
        self.transition(CallState::Terminated);
        self.events.on_session_terminated(&self.contact).await;
        self.close(false);
        Ok(())
    }

    /// Terminal error handling. A no-op on already-terminated sessions:
    /// calling this twice notifies listeners exactly once.
    pub async fn handle_call_error(&self, reason: CallErrorReason) {
        if self.interrupt() {
            debug!("session {} already interrupted, error {:?} ignored", self.id, reason);
            return;
        }
        self.transition(CallState::Terminated);
        self.events.on_call_error(&self.contact, reason).await;
        // A failed call is evidence the peer's capabilities may have
        // changed; the closed hook triggers a refresh.
        self.close(true);
    }

    async fn reject_terminal(&self, reason: CallErrorReason) {
        if self.interrupt() {
            return;
        }
        self.transition(CallState::Terminated);
        self.events.on_session_rejected(&self.contact, reason).await;
        self.close(true);
    }

    async fn reject_inbound(&self, reason: CallErrorReason) {
        if self.interrupt() {
            return;
        }
        self.transition(CallState::Terminated);
        self.events.on_session_rejected(&self.contact, reason).await;
        self.close(false);
    }

    // ------------------------------------------------------------------
    // SDP construction
    // ------------------------------------------------------------------

    pub(crate) fn build_offer(
        &self,
        with_video: bool,
        direction: MediaDirection,
    ) -> SessionDescription {
        let mut sdp = SessionDescription::new();

        let mut audio = MediaDescription::new(MediaKind::Audio, AUDIO_PORT);
        let audio_codecs = match self.negotiated_audio.lock().unwrap().as_ref() {
            Some(codec) => vec![codec.clone()],
            None => AudioCodec::default_list(),
        };
        audio.formats = audio_codecs.iter().map(rtpmap_from_audio).collect();
        if direction != MediaDirection::SendRecv {
            audio.direction = Some(direction);
        }
        sdp.media.push(audio);

        if with_video {
            let mut video = MediaDescription::new(MediaKind::Video, VIDEO_PORT);
            let video_codecs = match self.negotiated_video.lock().unwrap().as_ref() {
                Some(codec) => vec![codec.clone()],
                None => VideoCodec::default_list(),
            };
            video.formats = video_codecs.iter().map(rtpmap_from_video).collect();
            if direction != MediaDirection::SendRecv {
                video.direction = Some(direction);
            }
            sdp.media.push(video);
        }

        sdp
    }

    fn build_answer(&self) -> SessionDescription {
        let mut sdp = SessionDescription::new();

        if let Some(audio) = self.negotiated_audio.lock().unwrap().as_ref() {
            let mut media = MediaDescription::new(MediaKind::Audio, AUDIO_PORT);
            media.formats = vec![rtpmap_from_audio(audio)];
            sdp.media.push(media);
        }
        if let Some(video) = self.negotiated_video.lock().unwrap().as_ref() {
            let mut media = MediaDescription::new(MediaKind::Video, VIDEO_PORT);
            media.formats = vec![rtpmap_from_video(video)];
            sdp.media.push(media);
        }

        sdp
    }

    pub(crate) async fn respond(
        &self,
        status_code: u16,
        reason: &str,
        sdp: Option<&str>,
    ) -> Result<()> {
        let request = self.invite.lock().unwrap().clone();
        let request = match request {
            Some(request) => request,
            None => return Err(SessionError::NotEstablished),
        };
        let mut response = MessageFactory::create_response(&request, status_code, reason);
        if let Some(sdp) = sdp {
            response.set_body("application/sdp", sdp.to_string());
        }
        self.client.send_response(response).await?;
        Ok(())
    }

    pub(crate) fn store_reinvite(&self, request: SipRequest) {
        *self.invite.lock().unwrap() = Some(request);
    }

    pub(crate) fn remote_offer(&self) -> Option<SessionDescription> {
        self.remote_offer.lock().unwrap().clone()
    }
}

/// Feature tags advertised on a call INVITE Contact header.
pub(crate) fn call_feature_tags(with_video: bool) -> Vec<String> {
    let mut out = vec![tags::TAG_RCS_IP_VOICE_CALL.to_string()];
    if with_video {
        out.push(tags::TAG_RCS_IP_VIDEO_CALL.to_string());
    }
    out
}

pub(crate) fn audio_codecs_from(media: &MediaDescription) -> Vec<AudioCodec> {
    media
        .formats
        .iter()
        .map(|f| AudioCodec::new(f.encoding.clone(), f.payload_type, f.clock_rate, f.params.clone()))
        .collect()
}

pub(crate) fn video_codecs_from(media: &MediaDescription) -> Vec<VideoCodec> {
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

pub(crate) fn rtpmap_from_audio(codec: &AudioCodec) -> RtpMap {
    let mut map = RtpMap::new(codec.payload_type, codec.encoding.clone(), codec.sample_rate);
    map.params = codec.params.clone();
    map
}

pub(crate) fn rtpmap_from_video(codec: &VideoCodec) -> RtpMap {
    let mut map = RtpMap::new(codec.payload_type, codec.encoding.clone(), codec.clock_rate);
    map.params = codec.params.clone();
    map.width = codec.width;
    map.height = codec.height;
    map
}
