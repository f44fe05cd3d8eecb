//! Session description model
//!
//! A deliberately small SDP representation: enough structure for codec
//! negotiation (rtpmap/fmtp/framesize per payload) and for re-INVITE
//! classification (direction attributes, presence of a video m-line).
//! Unknown lines are preserved out of scope and ignored on parse.

use crate::errors::{Result, SignalingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// Stream direction attribute (`a=sendrecv` etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaDirection {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl MediaDirection {
    pub fn as_attribute(&self) -> &'static str {
        match self {
            MediaDirection::SendRecv => "sendrecv",
            MediaDirection::SendOnly => "sendonly",
            MediaDirection::RecvOnly => "recvonly",
            MediaDirection::Inactive => "inactive",
        }
    }

    fn from_attribute(s: &str) -> Option<Self> {
        match s {
            "sendrecv" => Some(MediaDirection::SendRecv),
            "sendonly" => Some(MediaDirection::SendOnly),
            "recvonly" => Some(MediaDirection::RecvOnly),
            "inactive" => Some(MediaDirection::Inactive),
            _ => None,
        }
    }
}

/// One payload format within a media description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpMap {
    pub payload_type: u8,
    pub encoding: String,
    pub clock_rate: u32,
    /// fmtp parameter string, empty when absent.
    pub params: String,
    /// Video frame size; 0 means unspecified.
    pub width: u32,
    pub height: u32,
}

impl RtpMap {
    pub fn new(payload_type: u8, encoding: impl Into<String>, clock_rate: u32) -> Self {
        Self {
            payload_type,
            encoding: encoding.into(),
            clock_rate,
            params: String::new(),
            width: 0,
            height: 0,
        }
    }
}

/// One m-line and its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub kind: MediaKind,
    pub port: u16,
    pub formats: Vec<RtpMap>,
    pub direction: Option<MediaDirection>,
}

impl MediaDescription {
    pub fn new(kind: MediaKind, port: u16) -> Self {
        Self {
            kind,
            port,
            formats: Vec::new(),
            direction: None,
        }
    }
}

/// A parsed or constructed session description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDescription {
    pub media: Vec<MediaDescription>,
}

impl SessionDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn audio(&self) -> Option<&MediaDescription> {
        self.media.iter().find(|m| m.kind == MediaKind::Audio)
    }

    pub fn video(&self) -> Option<&MediaDescription> {
        self.media.iter().find(|m| m.kind == MediaKind::Video)
    }

    pub fn has_video(&self) -> bool {
        self.video().is_some()
    }

    /// Effective direction of the session: the first explicit direction
    /// attribute on any m-line, `sendrecv` when none is present.
    pub fn direction(&self) -> MediaDirection {
        self.media
            .iter()
            .find_map(|m| m.direction)
            .unwrap_or(MediaDirection::SendRecv)
    }

    /// Parse an SDP body. Lines that do not contribute to media/codec
    /// structure are skipped.
    pub fn parse(body: &str) -> Result<Self> {
        let mut session = SessionDescription::new();
        let mut current: Option<MediaDescription> = None;

        for line in body.lines() {
            let line = line.trim();
            if line.len() < 2 || line.as_bytes()[1] != b'=' {
                continue;
            }
            let (kind, value) = line.split_at(2);
            match kind {
                "m=" => {
                    if let Some(done) = current.take() {
                        session.media.push(done);
                    }
                    current = parse_media_line(value)?;
                }
                "a=" => {
                    if let Some(media) = current.as_mut() {
                        parse_attribute(value, media);
                    }
                }
                _ => {}
            }
        }
        if let Some(done) = current.take() {
            session.media.push(done);
        }

        Ok(session)
    }

    /// Render to SDP text with a fixed session-level preamble.
    pub fn render(&self, origin_address: &str) -> String {
        let mut out = String::new();
        out.push_str("v=0\r\n");
        out.push_str(&format!("o=- 0 0 IN IP4 {}\r\n", origin_address));
        out.push_str("s=-\r\n");
        out.push_str(&format!("c=IN IP4 {}\r\n", origin_address));
        out.push_str("t=0 0\r\n");

        for media in &self.media {
            let payloads: Vec<String> = media
                .formats
                .iter()
                .map(|f| f.payload_type.to_string())
                .collect();
            out.push_str(&format!(
                "m={} {} RTP/AVP {}\r\n",
                media.kind.as_str(),
                media.port,
                payloads.join(" ")
            ));
            for format in &media.formats {
                out.push_str(&format!(
                    "a=rtpmap:{} {}/{}\r\n",
                    format.payload_type, format.encoding, format.clock_rate
                ));
                if !format.params.is_empty() {
                    out.push_str(&format!(
                        "a=fmtp:{} {}\r\n",
                        format.payload_type, format.params
                    ));
                }
                if format.width != 0 && format.height != 0 {
                    out.push_str(&format!(
                        "a=framesize:{} {}-{}\r\n",
                        format.payload_type, format.width, format.height
                    ));
                }
            }
            if let Some(direction) = media.direction {
                out.push_str(&format!("a={}\r\n", direction.as_attribute()));
            }
        }

        out
    }
}

fn parse_media_line(value: &str) -> Result<Option<MediaDescription>> {
    let mut parts = value.split_whitespace();
    let kind = match parts.next() {
        Some("audio") => MediaKind::Audio,
        Some("video") => MediaKind::Video,
        // Media sections this stack does not negotiate are skipped.
        Some(_) => return Ok(None),
        None => return Err(SignalingError::MalformedSdp("empty m-line".into())),
    };
    let port = parts
        .next()
        .and_then(|p| p.parse::<u16>().ok())
        .ok_or_else(|| SignalingError::MalformedSdp(format!("bad m-line port: {}", value)))?;

    let mut media = MediaDescription::new(kind, port);
    // Skip the transport token, then collect the payload list so that
    // payloads without an rtpmap still appear as static formats.
    for payload in parts.skip(1) {
        if let Ok(pt) = payload.parse::<u8>() {
            media.formats.push(RtpMap::new(pt, "", 0));
        }
    }
    Ok(Some(media))
}

fn parse_attribute(value: &str, media: &mut MediaDescription) {
    if let Some(direction) = MediaDirection::from_attribute(value) {
        media.direction = Some(direction);
        return;
    }

    if let Some(rest) = value.strip_prefix("rtpmap:") {
        if let Some((pt, mapping)) = rest.split_once(' ') {
            if let Ok(pt) = pt.parse::<u8>() {
                let mut mapping_parts = mapping.split('/');
                let encoding = mapping_parts.next().unwrap_or("").to_string();
                let clock_rate = mapping_parts
                    .next()
                    .and_then(|c| c.parse::<u32>().ok())
                    .unwrap_or(0);
                if let Some(format) = media.formats.iter_mut().find(|f| f.payload_type == pt) {
                    format.encoding = encoding;
                    format.clock_rate = clock_rate;
                } else {
                    media.formats.push(RtpMap::new(pt, encoding, clock_rate));
                }
            }
        }
    } else if let Some(rest) = value.strip_prefix("fmtp:") {
        if let Some((pt, params)) = rest.split_once(' ') {
            if let Ok(pt) = pt.parse::<u8>() {
                if let Some(format) = media.formats.iter_mut().find(|f| f.payload_type == pt) {
                    format.params = params.to_string();
                }
            }
        }
    } else if let Some(rest) = value.strip_prefix("framesize:") {
        if let Some((pt, size)) = rest.split_once(' ') {
            if let (Ok(pt), Some((w, h))) = (pt.parse::<u8>(), size.split_once('-')) {
                if let Some(format) = media.formats.iter_mut().find(|f| f.payload_type == pt) {
                    format.width = w.parse().unwrap_or(0);
                    format.height = h.parse().unwrap_or(0);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const OFFER: &str = "v=0\r\n\
        o=- 123 123 IN IP4 10.0.0.1\r\n\
        s=-\r\n\
        c=IN IP4 10.0.0.1\r\n\
        t=0 0\r\n\
        m=audio 5004 RTP/AVP 0 97\r\n\
        a=rtpmap:0 PCMU/8000\r\n\
        a=rtpmap:97 AMR/8000\r\n\
        a=fmtp:97 octet-align=1\r\n\
        m=video 5006 RTP/AVP 96\r\n\
        a=rtpmap:96 H264/90000\r\n\
        a=fmtp:96 profile-level-id=42800d\r\n\
        a=framesize:96 176-144\r\n\
        a=sendrecv\r\n";

    #[test]
    fn parses_audio_and_video_sections() {
        let sdp = SessionDescription::parse(OFFER).unwrap();
        assert_eq!(sdp.media.len(), 2);

        let audio = sdp.audio().unwrap();
        assert_eq!(audio.port, 5004);
        assert_eq!(audio.formats.len(), 2);
        assert_eq!(audio.formats[1].encoding, "AMR");
        assert_eq!(audio.formats[1].params, "octet-align=1");

        let video = sdp.video().unwrap();
        assert_eq!(video.formats[0].width, 176);
        assert_eq!(video.formats[0].height, 144);
        assert_eq!(sdp.direction(), MediaDirection::SendRecv);
    }

    #[test]
    fn direction_defaults_to_sendrecv() {
        let sdp = SessionDescription::parse("m=audio 5004 RTP/AVP 0\r\na=rtpmap:0 PCMU/8000\r\n")
            .unwrap();
        assert_eq!(sdp.direction(), MediaDirection::SendRecv);
    }

    #[test]
    fn sendonly_attribute_is_detected() {
        let sdp = SessionDescription::parse(
            "m=audio 5004 RTP/AVP 0\r\na=rtpmap:0 PCMU/8000\r\na=sendonly\r\n",
        )
        .unwrap();
        assert_eq!(sdp.direction(), MediaDirection::SendOnly);
    }

    #[test]
    fn render_parse_is_stable() {
        let sdp = SessionDescription::parse(OFFER).unwrap();
        let rendered = sdp.render("10.0.0.1");
        let reparsed = SessionDescription::parse(&rendered).unwrap();
        assert_eq!(sdp, reparsed);
    }
}
