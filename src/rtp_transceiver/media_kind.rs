use std::fmt;

use serde::{Deserialize, Serialize};

/// MediaKind identifies one of the media flows a session negotiates.
///
/// Screen share travels on its own video m-line and is never merged with
/// the main video flow.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    #[serde(rename = "audio")]
    Audio,
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "screenShareVideo")]
    ScreenShareVideo,
}

const MEDIA_KIND_AUDIO_STR: &str = "audio";
const MEDIA_KIND_VIDEO_STR: &str = "video";
const MEDIA_KIND_SCREEN_SHARE_VIDEO_STR: &str = "screenShareVideo";

impl MediaKind {
    /// ALL lists the kinds in m-line order. The position of a kind in this
    /// array is the index of its transceiver.
    pub const ALL: [MediaKind; 3] = [
        MediaKind::Audio,
        MediaKind::Video,
        MediaKind::ScreenShareVideo,
    ];

    pub fn index(&self) -> usize {
        match *self {
            MediaKind::Audio => 0,
            MediaKind::Video => 1,
            MediaKind::ScreenShareVideo => 2,
        }
    }

    pub fn codec_kind(&self) -> RtpCodecKind {
        match *self {
            MediaKind::Audio => RtpCodecKind::Audio,
            MediaKind::Video | MediaKind::ScreenShareVideo => RtpCodecKind::Video,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            MediaKind::Audio => MEDIA_KIND_AUDIO_STR,
            MediaKind::Video => MEDIA_KIND_VIDEO_STR,
            MediaKind::ScreenShareVideo => MEDIA_KIND_SCREEN_SHARE_VIDEO_STR,
        };
        write!(f, "{s}")
    }
}

/// RtpCodecKind is the transport-level kind of a track or transceiver.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RtpCodecKind {
    #[default]
    Unspecified,
    Audio,
    Video,
}

impl From<&str> for RtpCodecKind {
    fn from(raw: &str) -> Self {
        match raw {
            MEDIA_KIND_AUDIO_STR => RtpCodecKind::Audio,
            MEDIA_KIND_VIDEO_STR => RtpCodecKind::Video,
            _ => RtpCodecKind::Unspecified,
        }
    }
}

impl fmt::Display for RtpCodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RtpCodecKind::Audio => write!(f, "{MEDIA_KIND_AUDIO_STR}"),
            RtpCodecKind::Video => write!(f, "{MEDIA_KIND_VIDEO_STR}"),
            RtpCodecKind::Unspecified => write!(f, "{}", crate::UNSPECIFIED_STR),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_media_kind_order() {
        for (i, kind) in MediaKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
        assert_eq!(MediaKind::ScreenShareVideo.codec_kind(), RtpCodecKind::Video);
        assert_eq!(MediaKind::Audio.codec_kind(), RtpCodecKind::Audio);
    }

    #[test]
    fn test_media_kind_json() {
        let tests = vec![
            (MediaKind::Audio, r#""audio""#),
            (MediaKind::Video, r#""video""#),
            (MediaKind::ScreenShareVideo, r#""screenShareVideo""#),
        ];

        for (kind, expected) in tests {
            assert_eq!(serde_json::to_string(&kind).unwrap(), expected);
            assert_eq!(kind.to_string(), expected.trim_matches('"'));
        }
    }
}
