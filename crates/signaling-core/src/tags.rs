//! RCS feature-tag constants and helpers
//!
//! Feature tags advertise capabilities on Contact/Accept-Contact headers.
//! IARI-scoped services share one tag name with a quoted URN value; the
//! helpers here build and match those composite tags.

/// OMA instant messaging session support.
pub const TAG_OMA_IM: &str = "+g.oma.sip-im";

/// Circuit-switched video share.
pub const TAG_3GPP_CS_VIDEO: &str = "+g.3gpp.cs-voice";

/// RCS IP voice call.
pub const TAG_RCS_IP_VOICE_CALL: &str = "+g.gsma.rcs.ipcall";

/// RCS IP video call (carried together with the voice-call tag).
pub const TAG_RCS_IP_VIDEO_CALL: &str = "+g.gsma.rcs.ipvideocall";

/// RFC 3840 marker for automated endpoints (bots, servers).
pub const TAG_SIP_AUTOMATA: &str = "automata";

/// Tag name carrying IARI service references.
pub const TAG_IARI_REF: &str = "+g.3gpp.iari-ref";

/// IARI URNs for the RCS services this stack understands.
pub mod iari {
    pub const IMAGE_SHARE: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.gsma-is";
    pub const VIDEO_SHARE: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.gsma-vs";
    pub const FILE_TRANSFER: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.ft";
    pub const FILE_TRANSFER_HTTP: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcs.fthttp";
    pub const FILE_TRANSFER_THUMBNAIL: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcs.ftthumb";
    pub const FILE_TRANSFER_SF: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcs.ftstandfw";
    pub const GROUP_CHAT_SF: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcs.fullsfgroupchat";
    pub const PRESENCE_DISCOVERY: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.dp";
    pub const SOCIAL_PRESENCE: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.sp";
    pub const GEOLOCATION_PUSH: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcs.geopush";
}

/// Render an IARI reference tag with its quoted URN value.
pub fn iari_tag(urn: &str) -> String {
    format!("{}=\"{}\"", TAG_IARI_REF, urn)
}

/// True when `tags` carries the plain tag `name`.
pub fn has_tag(tags: &[String], name: &str) -> bool {
    tags.iter().any(|t| t == name || t.starts_with(&format!("{}=", name)))
}

/// True when `tags` carries an IARI reference to `urn`.
pub fn has_iari(tags: &[String], urn: &str) -> bool {
    tags.iter().any(|t| {
        t.strip_prefix(TAG_IARI_REF)
            .and_then(|rest| rest.strip_prefix('='))
            .map(|value| value.trim_matches('"').split(',').any(|u| u == urn))
            .unwrap_or(false)
    })
}

/// IARI URNs present in `tags` that are not among the well-known set:
/// these are opaque service extensions.
pub fn extension_urns(tags: &[String]) -> Vec<String> {
    let known = [
        iari::IMAGE_SHARE,
        iari::VIDEO_SHARE,
        iari::FILE_TRANSFER,
        iari::FILE_TRANSFER_HTTP,
        iari::FILE_TRANSFER_THUMBNAIL,
        iari::FILE_TRANSFER_SF,
        iari::GROUP_CHAT_SF,
        iari::PRESENCE_DISCOVERY,
        iari::SOCIAL_PRESENCE,
        iari::GEOLOCATION_PUSH,
    ];
    let mut extensions = Vec::new();
    for tag in tags {
        if let Some(value) = tag
            .strip_prefix(TAG_IARI_REF)
            .and_then(|rest| rest.strip_prefix('='))
        {
            for urn in value.trim_matches('"').split(',') {
                if !known.contains(&urn) && !extensions.iter().any(|e| e == urn) {
                    extensions.push(urn.to_string());
                }
            }
        }
    }
    extensions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iari_tag_matching() {
        let tags = vec![
            TAG_OMA_IM.to_string(),
            iari_tag(iari::FILE_TRANSFER),
        ];
        assert!(has_tag(&tags, TAG_OMA_IM));
        assert!(has_iari(&tags, iari::FILE_TRANSFER));
        assert!(!has_iari(&tags, iari::IMAGE_SHARE));
    }

    #[test]
    fn multiple_urns_in_one_tag_value() {
        let tags = vec![format!(
            "{}=\"{},{}\"",
            TAG_IARI_REF,
            iari::FILE_TRANSFER,
            iari::IMAGE_SHARE
        )];
        assert!(has_iari(&tags, iari::FILE_TRANSFER));
        assert!(has_iari(&tags, iari::IMAGE_SHARE));
    }

    #[test]
    fn unknown_urns_surface_as_extensions() {
        let custom = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcs.mnc001.mcc208.custom";
        let tags = vec![iari_tag(iari::FILE_TRANSFER), iari_tag(custom)];
        assert_eq!(extension_urns(&tags), vec![custom.to_string()]);
    }
}
