//! Message construction
//!
//! Builds the OPTIONS/SUBSCRIBE/INVITE family of requests and their
//! responses from a [`DialogPath`]. Header production here is the
//! boundary contract only; the transport stack owns Via/Route plumbing.

use bytes::Bytes;

use crate::dialog::DialogPath;
use crate::message::{Header, Method, SipRequest, SipResponse};

/// Anonymous URI used as the local identity on anonymous-fetch SUBSCRIBEs.
pub const ANONYMOUS_URI: &str = "sip:anonymous@anonymous.invalid";

pub struct MessageFactory;

impl MessageFactory {
    fn base_request(method: Method, dialog: &DialogPath, from: &str) -> SipRequest {
        let mut request = SipRequest::new(method, dialog.target.clone());
        request.add_header("Call-ID", dialog.call_id.clone());
        request.add_header("From", from.to_string());
        request.add_header("To", dialog.remote_party.clone());
        request.add_header("CSeq", format!("{} {}", dialog.cseq(), method.as_str()));
        request
    }

    /// OPTIONS capability query carrying the local feature tags.
    pub fn create_options(dialog: &DialogPath, feature_tags: &[String]) -> SipRequest {
        let mut request = Self::base_request(Method::Options, dialog, &dialog.local_party);
        request.add_header("Accept", "application/sdp");
        request.add_header("Contact", contact_with_tags(&dialog.local_party, feature_tags));
        request
    }

    /// One-shot presence SUBSCRIBE (anonymous fetch): anonymous identity,
    /// zero expiry, PIDF accept, privacy requested.
    pub fn create_anonymous_subscribe(dialog: &DialogPath) -> SipRequest {
        let mut request = Self::base_request(Method::Subscribe, dialog, ANONYMOUS_URI);
        request.add_header("Event", "presence");
        request.add_header("Accept", "application/pidf+xml");
        request.add_header("Expires", "0");
        request.add_header("Privacy", "id");
        request
    }

    /// Session INVITE with an SDP offer.
    pub fn create_invite(dialog: &DialogPath, feature_tags: &[String], sdp: &str) -> SipRequest {
        let mut request = Self::base_request(Method::Invite, dialog, &dialog.local_party);
        request.add_header("Contact", contact_with_tags(&dialog.local_party, feature_tags));
        request.set_body("application/sdp", Bytes::from(sdp.to_string()));
        request
    }

    pub fn create_ack(dialog: &DialogPath) -> SipRequest {
        Self::base_request(Method::Ack, dialog, &dialog.local_party)
    }

    pub fn create_bye(dialog: &DialogPath) -> SipRequest {
        Self::base_request(Method::Bye, dialog, &dialog.local_party)
    }

    pub fn create_cancel(dialog: &DialogPath) -> SipRequest {
        Self::base_request(Method::Cancel, dialog, &dialog.local_party)
    }

    /// Response to an inbound request, correlated by its dialog headers.
    pub fn create_response(
        request: &SipRequest,
        status_code: u16,
        reason_phrase: &str,
    ) -> SipResponse {
        let mut response = SipResponse::new(status_code, reason_phrase);
        for name in ["Call-ID", "From", "To", "CSeq"] {
            if let Some(value) = request.header(name) {
                response.headers.push(Header::new(name, value));
            }
        }
        response
    }

    /// 200 OK to an OPTIONS query, advertising local tags and media.
    pub fn create_options_response(
        request: &SipRequest,
        local_party: &str,
        feature_tags: &[String],
        sdp: Option<&str>,
    ) -> SipResponse {
        let mut response = Self::create_response(request, 200, "OK");
        response.add_header("Contact", contact_with_tags(local_party, feature_tags));
        if let Some(sdp) = sdp {
            response.set_body("application/sdp", Bytes::from(sdp.to_string()));
        }
        response
    }
}

fn contact_with_tags(uri: &str, feature_tags: &[String]) -> String {
    let mut value = format!("<{}>", uri);
    for tag in feature_tags {
        value.push(';');
        value.push_str(tag);
    }
    value
}
