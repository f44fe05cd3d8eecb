//! The capability snapshot and its builder
//!
//! A [`Capability`] is an immutable record of what a peer supports,
//! produced only through [`CapabilityBuilder`] and replaced wholesale on
//! every update. Equality deliberately excludes the two bookkeeping
//! timestamps: two snapshots describe the same capabilities no matter
//! when they were learned.

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Sentinel for "never": the timestamps default to this value.
pub const INVALID_TIMESTAMP: i64 = -1;

/// Current wall-clock time in epoch milliseconds.
pub fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Trust classification recorded together with a capability update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RcsStatus {
    NoInfo,
    NotRcs,
    RcsCapable,
}

/// Whether a capability response implies current SIP registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationState {
    Unknown,
    Online,
    Offline,
}

/// A peer identity in phone-number shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContactId(String);

impl ContactId {
    /// Parse a contact identity from a URI or raw number. Accepts
    /// `sip:`/`tel:` URIs and bare numbers; the result keeps only a
    /// leading `+` and digits.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        // Strip display name and angle brackets: `"Bob" <sip:+123@x>;tag=..`
        let input = match (input.find('<'), input.find('>')) {
            (Some(start), Some(end)) if start < end => &input[start + 1..end],
            _ => input,
        };
        let input = input
            .strip_prefix("sip:")
            .or_else(|| input.strip_prefix("tel:"))
            .unwrap_or(input);
        let user = input.split(['@', ';']).next().unwrap_or("");

        let mut number = String::new();
        for (i, c) in user.chars().enumerate() {
            match c {
                '+' if i == 0 => number.push(c),
                '0'..='9' => number.push(c),
                // Visual separators are tolerated.
                '-' | '.' | ' ' | '(' | ')' => {}
                _ => return None,
            }
        }

        let digits = number.chars().filter(|c| c.is_ascii_digit()).count();
        if digits < 3 {
            return None;
        }
        Some(Self(number))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The SIP URI form used as a request target.
    pub fn to_sip_uri(&self, domain: &str) -> String {
        format!("sip:{}@{}", self.0, domain)
    }
}

impl std::fmt::Display for ContactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable snapshot of a peer's supported features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub image_sharing: bool,
    pub video_sharing: bool,
    pub ip_voice_call: bool,
    pub ip_video_call: bool,
    pub im_session: bool,
    pub file_transfer_msrp: bool,
    pub file_transfer_http: bool,
    pub file_transfer_thumbnail: bool,
    pub file_transfer_store_forward: bool,
    pub group_chat_store_forward: bool,
    pub cs_video: bool,
    pub presence_discovery: bool,
    pub social_presence: bool,
    pub geolocation_push: bool,
    /// RFC 3840 automata marker: the peer is a bot or server.
    pub sip_automata: bool,
    /// Opaque extension service identifiers.
    pub extensions: BTreeSet<String>,
    pub timestamp_of_last_request: i64,
    pub timestamp_of_last_response: i64,
}

impl Default for Capability {
    /// The "no information" value: all flags false, no extensions.
    fn default() -> Self {
        Self {
            image_sharing: false,
            video_sharing: false,
            ip_voice_call: false,
            ip_video_call: false,
            im_session: false,
            file_transfer_msrp: false,
            file_transfer_http: false,
            file_transfer_thumbnail: false,
            file_transfer_store_forward: false,
            group_chat_store_forward: false,
            cs_video: false,
            presence_discovery: false,
            social_presence: false,
            geolocation_push: false,
            sip_automata: false,
            extensions: BTreeSet::new(),
            timestamp_of_last_request: INVALID_TIMESTAMP,
            timestamp_of_last_response: INVALID_TIMESTAMP,
        }
    }
}

impl PartialEq for Capability {
    /// Equality excludes both timestamps.
    fn eq(&self, other: &Self) -> bool {
        self.image_sharing == other.image_sharing
            && self.video_sharing == other.video_sharing
            && self.ip_voice_call == other.ip_voice_call
            && self.ip_video_call == other.ip_video_call
            && self.im_session == other.im_session
            && self.file_transfer_msrp == other.file_transfer_msrp
            && self.file_transfer_http == other.file_transfer_http
            && self.file_transfer_thumbnail == other.file_transfer_thumbnail
            && self.file_transfer_store_forward == other.file_transfer_store_forward
            && self.group_chat_store_forward == other.group_chat_store_forward
            && self.cs_video == other.cs_video
            && self.presence_discovery == other.presence_discovery
            && self.social_presence == other.social_presence
            && self.geolocation_push == other.geolocation_push
            && self.sip_automata == other.sip_automata
            && self.extensions == other.extensions
    }
}

impl Eq for Capability {}

impl Capability {
    pub fn builder() -> CapabilityBuilder {
        CapabilityBuilder::new()
    }
}

/// Builder for [`Capability`], supporting copy-then-mutate from an
/// existing snapshot.
#[derive(Debug, Clone, Default)]
pub struct CapabilityBuilder {
    inner: Capability,
}

impl CapabilityBuilder {
    pub fn new() -> Self {
        Self {
            inner: Capability::default(),
        }
    }

    /// Start from an existing snapshot to selectively override fields.
    pub fn from_capability(capability: &Capability) -> Self {
        Self {
            inner: capability.clone(),
        }
    }

    pub fn image_sharing(mut self, value: bool) -> Self {
        self.inner.image_sharing = value;
        self
    }

    pub fn video_sharing(mut self, value: bool) -> Self {
        self.inner.video_sharing = value;
        self
    }

    pub fn ip_voice_call(mut self, value: bool) -> Self {
        self.inner.ip_voice_call = value;
        self
    }

    pub fn ip_video_call(mut self, value: bool) -> Self {
        self.inner.ip_video_call = value;
        self
    }

    pub fn im_session(mut self, value: bool) -> Self {
        self.inner.im_session = value;
        self
    }

    pub fn file_transfer_msrp(mut self, value: bool) -> Self {
        self.inner.file_transfer_msrp = value;
        self
    }

    pub fn file_transfer_http(mut self, value: bool) -> Self {
        self.inner.file_transfer_http = value;
        self
    }

    pub fn file_transfer_thumbnail(mut self, value: bool) -> Self {
        self.inner.file_transfer_thumbnail = value;
        self
    }

    pub fn file_transfer_store_forward(mut self, value: bool) -> Self {
        self.inner.file_transfer_store_forward = value;
        self
    }

    pub fn group_chat_store_forward(mut self, value: bool) -> Self {
        self.inner.group_chat_store_forward = value;
        self
    }

    pub fn cs_video(mut self, value: bool) -> Self {
        self.inner.cs_video = value;
        self
    }

    pub fn presence_discovery(mut self, value: bool) -> Self {
        self.inner.presence_discovery = value;
        self
    }

    pub fn social_presence(mut self, value: bool) -> Self {
        self.inner.social_presence = value;
        self
    }

    pub fn geolocation_push(mut self, value: bool) -> Self {
        self.inner.geolocation_push = value;
        self
    }

    pub fn sip_automata(mut self, value: bool) -> Self {
        self.inner.sip_automata = value;
        self
    }

    pub fn extension(mut self, service_id: impl Into<String>) -> Self {
        self.inner.extensions.insert(service_id.into());
        self
    }

    pub fn extensions(mut self, service_ids: impl IntoIterator<Item = String>) -> Self {
        self.inner.extensions.extend(service_ids);
        self
    }

    pub fn timestamp_of_last_request(mut self, value: i64) -> Self {
        self.inner.timestamp_of_last_request = value;
        self
    }

    pub fn timestamp_of_last_response(mut self, value: i64) -> Self {
        self.inner.timestamp_of_last_response = value;
        self
    }

    pub fn build(self) -> Capability {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn equality_ignores_timestamps() {
        let a = Capability::builder()
            .im_session(true)
            .timestamp_of_last_request(1000)
            .timestamp_of_last_response(2000)
            .build();
        let b = Capability::builder()
            .im_session(true)
            .timestamp_of_last_request(9999)
            .build();

        assert_eq!(a, b);
    }

    #[test]
    fn equality_compares_flags_and_extensions() {
        let a = Capability::builder().extension("urn:x").build();
        let b = Capability::builder().extension("urn:y").build();
        assert_ne!(a, b);

        let c = Capability::builder().extension("urn:x").extension("urn:x").build();
        assert_eq!(a, c);
    }

    #[test]
    fn builder_copies_then_overrides() {
        let original = Capability::builder()
            .im_session(true)
            .file_transfer_msrp(true)
            .build();
        let updated = CapabilityBuilder::from_capability(&original)
            .file_transfer_msrp(false)
            .build();

        assert!(updated.im_session);
        assert!(!updated.file_transfer_msrp);
    }

    #[test]
    fn default_capability_has_sentinel_timestamps() {
        let capability = Capability::default();
        assert_eq!(capability.timestamp_of_last_request, INVALID_TIMESTAMP);
        assert_eq!(capability.timestamp_of_last_response, INVALID_TIMESTAMP);
    }

    #[test]
    fn contact_id_parses_uri_shapes() {
        assert_eq!(
            ContactId::parse("sip:+33612345678@ims.example.com").unwrap().as_str(),
            "+33612345678"
        );
        assert_eq!(ContactId::parse("tel:+1-555-867-5309").unwrap().as_str(), "+15558675309");
        assert_eq!(
            ContactId::parse("\"Bob\" <sip:0612345678@x>;tag=abc").unwrap().as_str(),
            "0612345678"
        );
        assert!(ContactId::parse("sip:conference-factory@x").is_none());
        assert!(ContactId::parse("").is_none());
    }
}
