//! Codec negotiation
//!
//! Pure selection of one codec from the locally supported list and the
//! remote proposal. The supported list is ordered with the most preferred
//! codec last: a match against a higher index wins over any match against
//! a lower index. Proposed fields holding the unset sentinel (0 or an
//! empty string) inherit the matching local codec's value in the result.

use tracing::debug;

use crate::codec::{AudioCodec, VideoCodec};

/// Select the audio codec to use, or `None` when nothing matches.
pub fn negotiate_audio(supported: &[AudioCodec], proposed: &[AudioCodec]) -> Option<AudioCodec> {
    let mut best: Option<(usize, &AudioCodec, &AudioCodec)> = None;

    for remote in proposed {
        for (rank, local) in supported.iter().enumerate() {
            if !audio_matches(local, remote) {
                continue;
            }
            if best.map(|(r, _, _)| rank > r).unwrap_or(true) {
                best = Some((rank, local, remote));
            }
        }
    }

    best.map(|(rank, local, remote)| {
        debug!(
            "selected audio codec {} (preference rank {})",
            remote.encoding, rank
        );
        AudioCodec {
            encoding: remote.encoding.clone(),
            payload_type: inherit_u8(remote.payload_type, local.payload_type),
            sample_rate: inherit_u32(remote.sample_rate, local.sample_rate),
            params: inherit_str(&remote.params, &local.params),
        }
    })
}

/// Select the video codec to use, or `None` when nothing matches.
pub fn negotiate_video(supported: &[VideoCodec], proposed: &[VideoCodec]) -> Option<VideoCodec> {
    let mut best: Option<(usize, &VideoCodec, &VideoCodec)> = None;

    for remote in proposed {
        for (rank, local) in supported.iter().enumerate() {
            if !video_matches(local, remote) {
                continue;
            }
            if best.map(|(r, _, _)| rank > r).unwrap_or(true) {
                best = Some((rank, local, remote));
            }
        }
    }

    best.map(|(rank, local, remote)| {
        debug!(
            "selected video codec {} (preference rank {})",
            remote.encoding, rank
        );
        VideoCodec {
            encoding: remote.encoding.clone(),
            payload_type: inherit_u8(remote.payload_type, local.payload_type),
            clock_rate: inherit_u32(remote.clock_rate, local.clock_rate),
            params: inherit_str(&remote.params, &local.params),
            width: inherit_u32(remote.width, local.width),
            height: inherit_u32(remote.height, local.height),
        }
    })
}

fn audio_matches(local: &AudioCodec, remote: &AudioCodec) -> bool {
    local.encoding.eq_ignore_ascii_case(&remote.encoding)
        && params_match(&local.params, &remote.params)
}

fn video_matches(local: &VideoCodec, remote: &VideoCodec) -> bool {
    if !local.encoding.eq_ignore_ascii_case(&remote.encoding) {
        return false;
    }
    // Width/height of 0 on either side is a wildcard.
    let resolution_ok = dimension_matches(local.width, remote.width)
        && dimension_matches(local.height, remote.height);
    if !resolution_ok {
        return false;
    }
    if local.encoding.eq_ignore_ascii_case("H264") {
        profile_level_matches(local, remote)
    } else {
        true
    }
}

fn dimension_matches(local: u32, remote: u32) -> bool {
    local == 0 || remote == 0 || local == remote
}

/// H264 interoperates across parameter orderings as long as the
/// profile-level-id agrees; an absent value on either side matches any.
fn profile_level_matches(local: &VideoCodec, remote: &VideoCodec) -> bool {
    match (local.profile_level_id(), remote.profile_level_id()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => true,
    }
}

fn params_match(local: &str, remote: &str) -> bool {
    local.is_empty() || remote.is_empty() || local == remote
}

fn inherit_u8(remote: u8, local: u8) -> u8 {
    if remote == 0 {
        local
    } else {
        remote
    }
}

fn inherit_u32(remote: u32, local: u32) -> u32 {
    if remote == 0 {
        local
    } else {
        remote
    }
}

fn inherit_str(remote: &str, local: &str) -> String {
    if remote.is_empty() {
        local.to_string()
    } else {
        remote.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn higher_index_in_supported_list_wins() {
        // Most preferred last: AMR outranks PCMU.
        let supported = vec![AudioCodec::pcmu(), AudioCodec::amr()];
        let proposed = vec![
            AudioCodec::new("PCMU", 0, 8000, ""),
            AudioCodec::new("AMR", 97, 8000, "octet-align=1"),
        ];

        let selected = negotiate_audio(&supported, &proposed).unwrap();
        assert_eq!(selected.encoding, "AMR");
    }

    #[test]
    fn unset_proposed_fields_inherit_local_values() {
        let supported = vec![AudioCodec::new("AMR", 98, 8000, "octet-align=1")];

        let proposed = vec![AudioCodec::new("amr", 0, 0, "")];
        let selected = negotiate_audio(&supported, &proposed).unwrap();
        assert_eq!(selected.payload_type, 98);
        assert_eq!(selected.sample_rate, 8000);
        assert_eq!(selected.params, "octet-align=1");

        let proposed = vec![AudioCodec::new("AMR", 97, 16000, "octet-align=1")];
        let selected = negotiate_audio(&supported, &proposed).unwrap();
        assert_eq!(selected.payload_type, 97);
        assert_eq!(selected.sample_rate, 16000);
    }

    #[test]
    fn no_common_codec_yields_none() {
        let supported = vec![VideoCodec::h264()];
        let proposed = vec![VideoCodec::new("VP8", 100, 90000, "", 640, 480)];
        assert!(negotiate_video(&supported, &proposed).is_none());
    }

    #[test]
    fn zero_resolution_is_a_wildcard() {
        let supported = vec![VideoCodec::h264()];
        let proposed = vec![VideoCodec::new(
            "H264",
            102,
            90000,
            "profile-level-id=42900b",
            0,
            0,
        )];

        let selected = negotiate_video(&supported, &proposed).unwrap();
        assert_eq!(selected.width, 176);
        assert_eq!(selected.height, 144);
    }

    #[test]
    fn h264_profile_level_must_agree_when_both_present() {
        let supported = vec![VideoCodec::new(
            "H264",
            99,
            90000,
            "profile-level-id=42900b",
            176,
            144,
        )];
        let incompatible = vec![VideoCodec::new(
            "H264",
            100,
            90000,
            "profile-level-id=640028",
            176,
            144,
        )];
        assert!(negotiate_video(&supported, &incompatible).is_none());

        let case_differs = vec![VideoCodec::new(
            "H264",
            100,
            90000,
            "profile-level-id=42900B",
            176,
            144,
        )];
        assert!(negotiate_video(&supported, &case_differs).is_some());
    }

    #[test]
    fn mismatched_resolution_fails_non_wildcard() {
        let supported = vec![VideoCodec::new("H263-2000", 96, 90000, "", 176, 144)];
        let proposed = vec![VideoCodec::new("H263-2000", 96, 90000, "", 352, 288)];
        assert!(negotiate_video(&supported, &proposed).is_none());
    }
}
