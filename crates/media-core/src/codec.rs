//! Audio and video codec value types

use serde::{Deserialize, Serialize};

/// An audio codec description as exchanged in SDP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioCodec {
    /// Encoding name as used in SDP (case preserved, compared
    /// case-insensitively).
    pub encoding: String,
    /// RTP payload type; 0 also doubles as "unspecified" in proposals.
    pub payload_type: u8,
    /// Sample rate in Hz; 0 means unspecified.
    pub sample_rate: u32,
    /// fmtp parameter string; empty means unspecified.
    pub params: String,
}

impl AudioCodec {
    pub fn new(
        encoding: impl Into<String>,
        payload_type: u8,
        sample_rate: u32,
        params: impl Into<String>,
    ) -> Self {
        Self {
            encoding: encoding.into(),
            payload_type,
            sample_rate,
            params: params.into(),
        }
    }

    /// G.711 μ-law, 8kHz.
    pub fn pcmu() -> Self {
        Self::new("PCMU", 0, 8000, "")
    }

    /// G.711 A-law, 8kHz.
    pub fn pcma() -> Self {
        Self::new("PCMA", 8, 8000, "")
    }

    /// AMR narrowband, 8kHz.
    pub fn amr() -> Self {
        Self::new("AMR", 97, 8000, "octet-align=1")
    }

    /// AMR wideband, 16kHz.
    pub fn amr_wb() -> Self {
        Self::new("AMR-WB", 98, 16000, "octet-align=1")
    }

    /// Default local audio codec list, most preferred last.
    pub fn default_list() -> Vec<AudioCodec> {
        vec![AudioCodec::pcmu(), AudioCodec::amr()]
    }
}

/// A video codec description as exchanged in SDP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoCodec {
    pub encoding: String,
    pub payload_type: u8,
    /// RTP clock rate in Hz; 0 means unspecified.
    pub clock_rate: u32,
    /// fmtp parameter string (carries profile-level-id for H264).
    pub params: String,
    /// Frame width; 0 means "don't care" (wildcard).
    pub width: u32,
    /// Frame height; 0 means "don't care" (wildcard).
    pub height: u32,
}

impl VideoCodec {
    pub fn new(
        encoding: impl Into<String>,
        payload_type: u8,
        clock_rate: u32,
        params: impl Into<String>,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            encoding: encoding.into(),
            payload_type,
            clock_rate,
            params: params.into(),
            width,
            height,
        }
    }

    /// H.263-2000, QCIF.
    pub fn h263() -> Self {
        Self::new("H263-2000", 96, 90000, "profile=0;level=45", 176, 144)
    }

    /// H.264 baseline, QCIF.
    pub fn h264() -> Self {
        Self::new("H264", 99, 90000, "profile-level-id=42900b", 176, 144)
    }

    /// Default local video codec list, most preferred last.
    pub fn default_list() -> Vec<VideoCodec> {
        vec![VideoCodec::h263(), VideoCodec::h264()]
    }

    /// The profile-level-id value from the fmtp parameters, if present.
    pub fn profile_level_id(&self) -> Option<&str> {
        self.params.split(';').find_map(|p| {
            let (key, value) = p.trim().split_once('=')?;
            if key.eq_ignore_ascii_case("profile-level-id") {
                Some(value)
            } else {
                None
            }
        })
    }
}
