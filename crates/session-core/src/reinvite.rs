//! Re-INVITE sub-negotiation
//!
//! In-dialog INVITEs renegotiate an established session. Inbound
//! re-INVITEs are classified by SDP attribute inspection; outbound
//! renegotiations are driven by the explicit control operations
//! (`set_on_hold`, `add_video`, `remove_video`). Resume is reachable only
//! through `set_on_hold(false)`, never through inbound sniffing. The 407
//! handling here is the same shared challenge-retry primitive used at the
//! INVITE level.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use rcsip_media_core::negotiate_video;
use rcsip_media_core::VideoCodec;
use rcsip_signaling_core::auth::send_with_auth_retry;
use rcsip_signaling_core::factory::MessageFactory;
use rcsip_signaling_core::message::{status, SipRequest};
use rcsip_signaling_core::sdp::{MediaDirection, SessionDescription};

use crate::call::{call_feature_tags, video_codecs_from, IpCallSession};
use crate::errors::{Result, SessionError};
use crate::types::{CallState, RenegotiationKind};

/// Classification of an inbound re-INVITE by its SDP body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReinviteClass {
    /// `a=sendonly`: the remote is placing us on hold.
    HoldRequested,
    /// `a=inactive`: both directions suspended.
    HoldInactive,
    /// `a=sendrecv` with a video m-line: the remote wants to add video.
    AddVideo,
    /// `a=sendrecv` without video: the remote drops video.
    RemoveVideo,
}

impl ReinviteClass {
    pub fn kind(&self) -> RenegotiationKind {
        match self {
            ReinviteClass::HoldRequested | ReinviteClass::HoldInactive => RenegotiationKind::Hold,
            ReinviteClass::AddVideo => RenegotiationKind::AddVideo,
            ReinviteClass::RemoveVideo => RenegotiationKind::RemoveVideo,
        }
    }
}

/// Classify a re-INVITE offer by attribute inspection.
pub fn classify_reinvite(sdp: &SessionDescription) -> ReinviteClass {
    match sdp.direction() {
        MediaDirection::SendOnly => ReinviteClass::HoldRequested,
        MediaDirection::Inactive => ReinviteClass::HoldInactive,
        _ => {
            if sdp.has_video() {
                ReinviteClass::AddVideo
            } else {
                ReinviteClass::RemoveVideo
            }
        }
    }
}

impl IpCallSession {
    /// Handle an inbound re-INVITE. No-op on terminated sessions.
    pub async fn on_reinvite_received(self: &Arc<Self>, request: SipRequest) -> Result<()> {
        if self.is_interrupted() {
            debug!("re-INVITE on terminated session, ignoring");
            return Ok(());
        }
        if self.state() != CallState::Established {
            self.store_reinvite(request);
            self.respond(491, "Request Pending", None).await?;
            return Ok(());
        }

        let offer = request
            .body_str()
            .and_then(|body| SessionDescription::parse(body).ok());
        self.store_reinvite(request);

        let offer = match offer {
            Some(offer) => offer,
            None => {
                self.respond(488, "Not Acceptable Here", None).await?;
                return Ok(());
            }
        };

        let class = classify_reinvite(&offer);
        let kind = class.kind();
        self.transition(CallState::Negotiating(kind));

        match class {
            ReinviteClass::HoldRequested | ReinviteClass::HoldInactive => {
                // Mirror the hold: we keep receiving nothing, so answer
                // with the complementary direction.
                let direction = match class {
                    ReinviteClass::HoldRequested => MediaDirection::RecvOnly,
                    _ => MediaDirection::Inactive,
                };
                let answer = self.build_offer(self.has_video(), direction);
                let answer_str = answer.render(&self.config().media_address);
                self.respond(200, "OK", Some(&answer_str)).await?;
                self.transition(CallState::Established);
                self.events().on_renegotiation_accepted(self.contact(), kind).await;
            }
            ReinviteClass::RemoveVideo => {
                *self.negotiated_video.lock().unwrap() = None;
                let answer = self.build_offer(false, MediaDirection::SendRecv);
                let answer_str = answer.render(&self.config().media_address);
                self.respond(200, "OK", Some(&answer_str)).await?;
                self.transition(CallState::Established);
                self.events().on_renegotiation_accepted(self.contact(), kind).await;
            }
            ReinviteClass::AddVideo => {
                self.handle_add_video_request(&offer).await?;
            }
        }

        Ok(())
    }

    /// Adding video needs local confirmation before it is answered.
    async fn handle_add_video_request(self: &Arc<Self>, offer: &SessionDescription) -> Result<()> {
        let kind = RenegotiationKind::AddVideo;
        let (confirm_tx, confirm_rx) = oneshot::channel();
        *self.confirm_tx.lock().unwrap() = Some(confirm_tx);

        self.events().on_renegotiation_requested(self.contact(), kind).await;

        let confirmed = tokio::time::timeout(self.config().renegotiation_timeout, confirm_rx)
            .await
            .ok()
            .and_then(|r| r.ok())
            .unwrap_or(false);

        if self.is_interrupted() {
            return Ok(());
        }

        if !confirmed {
            self.respond(status::DECLINE, "Decline", None).await?;
            self.transition(CallState::Established);
            self.events().on_renegotiation_aborted(self.contact(), kind).await;
            return Ok(());
        }

        let video = offer
            .video()
            .map(video_codecs_from)
            .and_then(|proposed| negotiate_video(&VideoCodec::default_list(), &proposed));

        match video {
            Some(video) => {
                *self.negotiated_video.lock().unwrap() = Some(video);
                let answer = self.build_offer(true, MediaDirection::SendRecv);
                let answer_str = answer.render(&self.config().media_address);
                self.respond(200, "OK", Some(&answer_str)).await?;
                self.transition(CallState::Established);
                self.events().on_renegotiation_accepted(self.contact(), kind).await;
            }
            None => {
                // No common video codec is not fatal to the call.
                self.respond(488, "Not Acceptable Here", None).await?;
                self.transition(CallState::Established);
                self.events().on_renegotiation_aborted(self.contact(), kind).await;
            }
        }

        Ok(())
    }

    /// Answer a pending add-video confirmation.
    pub fn confirm_renegotiation(&self, accept: bool) {
        if let Some(tx) = self.confirm_tx.lock().unwrap().take() {
            let _ = tx.send(accept);
        } else {
            debug!("no renegotiation awaiting confirmation");
        }
    }

    /// Place the call on hold, or resume it.
    pub async fn set_on_hold(self: &Arc<Self>, hold: bool) -> Result<()> {
        let kind = if hold {
            RenegotiationKind::Hold
        } else {
            RenegotiationKind::Resume
        };
        let direction = if hold {
            MediaDirection::SendOnly
        } else {
            MediaDirection::SendRecv
        };
        let sdp = self.build_offer(self.has_video(), direction);
        self.renegotiate(kind, sdp, self.has_video()).await
    }

    /// Add video to an established audio call.
    pub async fn add_video(self: &Arc<Self>) -> Result<()> {
        let sdp = self.build_offer(true, MediaDirection::SendRecv);
        self.renegotiate(RenegotiationKind::AddVideo, sdp, true).await
    }

    /// Drop video from the call.
    pub async fn remove_video(self: &Arc<Self>) -> Result<()> {
        *self.negotiated_video.lock().unwrap() = None;
        let sdp = self.build_offer(false, MediaDirection::SendRecv);
        self.renegotiate(RenegotiationKind::RemoveVideo, sdp, false).await
    }

    /// Drive one outbound re-INVITE sub-exchange. Failures abort the
    /// sub-negotiation only; the base call stays established.
    async fn renegotiate(
        self: &Arc<Self>,
        kind: RenegotiationKind,
        sdp: SessionDescription,
        with_video: bool,
    ) -> Result<()> {
        if self.state() != CallState::Established {
            return Err(SessionError::NotEstablished);
        }
        self.transition(CallState::Negotiating(kind));

        let sdp_str = sdp.render(&self.config().media_address);
        let feature_tags = call_feature_tags(with_video);

        let ctx = {
            let mut dialog = self.dialog.lock().await;
            dialog.increment_cseq();
            send_with_auth_retry(
                self.client().as_ref(),
                self.auth().as_ref(),
                &mut dialog,
                |path, authorization| {
                    let mut request = MessageFactory::create_invite(path, &feature_tags, &sdp_str);
                    if let Some(authorization) = authorization {
                        request.set_header("Proxy-Authorization", authorization);
                    }
                    request
                },
            )
            .await
        };

        if self.is_interrupted() {
            return Ok(());
        }

        let abort = |code: Option<u16>| {
            if let Some(code) = code {
                warn!("re-INVITE ({:?}) answered {}", kind, code);
            }
        };

        match ctx {
            Ok(ctx) if !ctx.timeout && ctx.status_code == status::OK => {
                {
                    let dialog = self.dialog.lock().await;
                    self.client().send_only(MessageFactory::create_ack(&dialog)).await?;
                }

                if kind == RenegotiationKind::AddVideo {
                    let video = ctx
                        .response
                        .as_ref()
                        .and_then(|r| r.body_str())
                        .and_then(|body| SessionDescription::parse(body).ok())
                        .as_ref()
                        .and_then(|sdp| sdp.video())
                        .map(video_codecs_from)
                        .and_then(|proposed| {
                            negotiate_video(&VideoCodec::default_list(), &proposed)
                        });
                    match video {
                        Some(video) => {
                            *self.negotiated_video.lock().unwrap() = Some(video);
                        }
                        None => {
                            self.transition(CallState::Established);
                            self.events()
                                .on_renegotiation_aborted(self.contact(), kind)
                                .await;
                            return Err(SessionError::UnsupportedVideo);
                        }
                    }
                }

                self.transition(CallState::Established);
                self.events().on_renegotiation_accepted(self.contact(), kind).await;
                Ok(())
            }
            Ok(ctx) => {
                abort(Some(ctx.status_code));
                self.transition(CallState::Established);
                self.events().on_renegotiation_aborted(self.contact(), kind).await;
                Err(SessionError::Rejected(ctx.status_code))
            }
            Err(e) => {
                abort(None);
                self.transition(CallState::Established);
                self.events().on_renegotiation_aborted(self.contact(), kind).await;
                Err(e.into())
            }
        }
    }

    fn has_video(&self) -> bool {
        self.negotiated_video.lock().unwrap().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(body: &str) -> SessionDescription {
        SessionDescription::parse(body).unwrap()
    }

    #[test]
    fn sendonly_classifies_as_hold_request() {
        let sdp = parse("m=audio 5004 RTP/AVP 0\r\na=rtpmap:0 PCMU/8000\r\na=sendonly\r\n");
        assert_eq!(classify_reinvite(&sdp), ReinviteClass::HoldRequested);
    }

    #[test]
    fn inactive_classifies_as_hold_inactive() {
        let sdp = parse("m=audio 5004 RTP/AVP 0\r\na=rtpmap:0 PCMU/8000\r\na=inactive\r\n");
        assert_eq!(classify_reinvite(&sdp), ReinviteClass::HoldInactive);
        assert_eq!(classify_reinvite(&sdp).kind(), RenegotiationKind::Hold);
    }

    #[test]
    fn sendrecv_with_video_is_add_video() {
        let sdp = parse(
            "m=audio 5004 RTP/AVP 0\r\na=rtpmap:0 PCMU/8000\r\n\
             m=video 5006 RTP/AVP 96\r\na=rtpmap:96 H264/90000\r\na=sendrecv\r\n",
        );
        assert_eq!(classify_reinvite(&sdp), ReinviteClass::AddVideo);
    }

    #[test]
    fn sendrecv_without_video_is_remove_video() {
        let sdp = parse("m=audio 5004 RTP/AVP 0\r\na=rtpmap:0 PCMU/8000\r\na=sendrecv\r\n");
        assert_eq!(classify_reinvite(&sdp), ReinviteClass::RemoveVideo);
    }

    #[test]
    fn implicit_sendrecv_still_classifies() {
        let sdp = parse("m=audio 5004 RTP/AVP 0\r\na=rtpmap:0 PCMU/8000\r\n");
        assert_eq!(classify_reinvite(&sdp), ReinviteClass::RemoveVideo);
    }
}
