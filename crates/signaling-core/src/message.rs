//! Opaque SIP message values
//!
//! Requests and responses are carried as header lists plus an optional
//! body. The wire representation is the transport stack's concern; these
//! types only expose the accessors the service layer needs (feature tags,
//! asserted identity, status codes).

use bytes::Bytes;

/// SIP request methods used by the RCS service layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Options,
    Subscribe,
    Notify,
    Invite,
    Ack,
    Bye,
    Cancel,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Subscribe => "SUBSCRIBE",
            Method::Notify => "NOTIFY",
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single SIP header (name, value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An outbound or inbound SIP request.
#[derive(Debug, Clone)]
pub struct SipRequest {
    pub method: Method,
    pub request_uri: String,
    pub headers: Vec<Header>,
    pub body: Option<Bytes>,
}

impl SipRequest {
    pub fn new(method: Method, request_uri: impl Into<String>) -> Self {
        Self {
            method,
            request_uri: request_uri.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// All header values with the given name.
    pub fn headers_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push(Header::new(name, value));
    }

    /// Replace every header with the given name, or add one.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|h| !h.name.eq_ignore_ascii_case(name));
        self.headers.push(Header::new(name, value));
    }

    pub fn set_body(&mut self, content_type: impl Into<String>, body: impl Into<Bytes>) {
        self.set_header("Content-Type", content_type);
        self.body = Some(body.into());
    }

    pub fn body_str(&self) -> Option<&str> {
        self.body.as_deref().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Feature tags carried on Contact and Accept-Contact headers.
    pub fn feature_tags(&self) -> Vec<String> {
        let mut tags = Vec::new();
        for value in self
            .headers_named("Contact")
            .chain(self.headers_named("Accept-Contact"))
        {
            collect_feature_tags(value, &mut tags);
        }
        tags
    }

    /// Identity asserted by the network, falling back to From.
    pub fn asserted_identity(&self) -> Option<&str> {
        self.header("P-Asserted-Identity").or_else(|| self.header("From"))
    }
}

/// An inbound SIP response.
#[derive(Debug, Clone)]
pub struct SipResponse {
    pub status_code: u16,
    pub reason_phrase: String,
    pub headers: Vec<Header>,
    pub body: Option<Bytes>,
}

impl SipResponse {
    pub fn new(status_code: u16, reason_phrase: impl Into<String>) -> Self {
        Self {
            status_code,
            reason_phrase: reason_phrase.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn headers_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push(Header::new(name, value));
    }

    pub fn set_body(&mut self, content_type: impl Into<String>, body: impl Into<Bytes>) {
        self.headers
            .retain(|h| !h.name.eq_ignore_ascii_case("Content-Type"));
        self.headers.push(Header::new("Content-Type", content_type));
        self.body = Some(body.into());
    }

    pub fn body_str(&self) -> Option<&str> {
        self.body.as_deref().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Feature tags carried on the Contact header.
    pub fn feature_tags(&self) -> Vec<String> {
        let mut tags = Vec::new();
        for value in self.headers_named("Contact") {
            collect_feature_tags(value, &mut tags);
        }
        tags
    }
}

/// Pull `+g...` feature tags and the RFC 3840 `automata` marker out of a
/// Contact/Accept-Contact header value.
fn collect_feature_tags(header_value: &str, tags: &mut Vec<String>) {
    for part in header_value.split(';') {
        let part = part.trim();
        if part.starts_with('+') || part == "automata" {
            if !tags.iter().any(|t| t == part) {
                tags.push(part.to_string());
            }
        }
    }
}

/// Status codes the service layer dispatches on.
pub mod status {
    pub const OK: u16 = 200;
    pub const NOT_FOUND: u16 = 404;
    pub const PROXY_AUTHENTICATION_REQUIRED: u16 = 407;
    pub const REQUEST_TIMEOUT: u16 = 408;
    pub const TEMPORARILY_UNAVAILABLE: u16 = 480;
    pub const BUSY_HERE: u16 = 486;
    pub const REQUEST_TERMINATED: u16 = 487;
    pub const DECLINE: u16 = 603;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_tags_are_collected_and_deduplicated() {
        let mut request = SipRequest::new(Method::Options, "sip:+1234@example.com");
        request.add_header(
            "Contact",
            "<sip:alice@1.2.3.4>;+g.oma.sip-im;+g.3gpp.iari-ref=\"urn:x\"",
        );
        request.add_header("Accept-Contact", "*;+g.oma.sip-im");

        let tags = request.feature_tags();
        assert_eq!(
            tags,
            vec![
                "+g.oma.sip-im".to_string(),
                "+g.3gpp.iari-ref=\"urn:x\"".to_string()
            ]
        );
    }

    #[test]
    fn automata_tag_is_recognized() {
        let mut response = SipResponse::new(200, "OK");
        response.add_header("Contact", "<sip:bot@example.com>;automata");
        assert!(response.feature_tags().iter().any(|t| t == "automata"));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut request = SipRequest::new(Method::Invite, "sip:bob@example.com");
        request.add_header("content-type", "application/sdp");
        assert_eq!(request.header("Content-Type"), Some("application/sdp"));
    }
}
