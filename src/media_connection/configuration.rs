use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transport::ice_server::RTCIceServer;

/// BandwidthLimits caps the bitrate, in bits per second, advertised for each
/// media kind through `b=TIAS`.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandwidthLimits {
    pub audio: u32,
    pub video: u32,
}

/// SdpMungingConfig selects the rewrites applied to every local session
/// description before it is sent. Each one is independent of the others.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SdpMungingConfig {
    /// Rewrites the placeholder port 9 on audio and video m-lines to 0.
    #[serde(rename = "convertPort9to0")]
    pub convert_port9to0: bool,
    /// Marks the screen share video m-line with `a=content:slides`.
    pub add_content_slides: bool,
    /// Rewrites IPv6 connection lines to `c=IN IP4 0.0.0.0`.
    #[serde(rename = "convertCLineToIPv4")]
    pub convert_c_line_to_ipv4: bool,
    pub bandwidth_limits: Option<BandwidthLimits>,
    /// Start bitrate in kbps for video codecs.
    pub start_bitrate: Option<u32>,
    /// Keyframe interval in seconds.
    pub periodic_keyframes: Option<u32>,
    pub disable_extmap: bool,
    pub disable_rtx: bool,
    #[serde(rename = "h264MaxFs")]
    pub h264_max_fs: Option<u32>,
}

impl SdpMungingConfig {
    /// is_enabled reports whether any rewrite is selected.
    pub fn is_enabled(&self) -> bool {
        *self != SdpMungingConfig::default()
    }
}

/// MediaConnectionConfig configures a media session. It is treated as read
/// only once a session is created.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MediaConnectionConfig {
    /// Defines the STUN and TURN servers available to the transport.
    pub ice_servers: Vec<RTCIceServer>,

    /// When set, a transceiver whose direction would be inactive is not
    /// created at all. Its media kind can never be activated afterwards.
    pub skip_inactive_transceivers: bool,

    /// Fails offer and answer creation when the local SDP offers no H264.
    #[serde(rename = "requireH264")]
    pub require_h264: bool,

    pub sdp_munging: SdpMungingConfig,
}

impl MediaConnectionConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// validate checks every ICE server descriptor.
    pub fn validate(&self) -> Result<()> {
        for ice_server in &self.ice_servers {
            ice_server.validate()?;
        }
        if let Some(0) = self.sdp_munging.h264_max_fs {
            return Err(Error::ErrConfig("h264MaxFs must be positive".to_owned()));
        }
        Ok(())
    }

    /// get_ice_servers strips any query from "stun(s):" URLs before the
    /// servers are handed to the transport.
    pub(crate) fn get_ice_servers(&self) -> Vec<RTCIceServer> {
        let mut ice_servers = self.ice_servers.clone();

        for ice_server in &mut ice_servers {
            for raw_url in &mut ice_server.urls {
                if raw_url.starts_with("stun") {
                    if let Some((url, _)) = raw_url.split_once('?') {
                        *raw_url = url.to_owned();
                    }
                }
            }
        }

        ice_servers
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_media_connection_config_from_json() {
        let config = MediaConnectionConfig::from_json(
            r#"{
                "iceServers": [{"urls": ["stun:stun.example.org:3478?transport=udp"]}],
                "skipInactiveTransceivers": true,
                "requireH264": true,
                "sdpMunging": {
                    "convertPort9to0": true,
                    "addContentSlides": true,
                    "convertCLineToIPv4": true,
                    "bandwidthLimits": {"audio": 64000, "video": 2000000},
                    "startBitrate": 2000,
                    "periodicKeyframes": 20,
                    "disableExtmap": true,
                    "disableRtx": true,
                    "h264MaxFs": 8160
                }
            }"#,
        )
        .unwrap();

        assert!(config.skip_inactive_transceivers);
        assert!(config.require_h264);
        let munging = &config.sdp_munging;
        assert!(munging.convert_port9to0);
        assert!(munging.add_content_slides);
        assert!(munging.convert_c_line_to_ipv4);
        assert_eq!(
            munging.bandwidth_limits,
            Some(BandwidthLimits {
                audio: 64000,
                video: 2_000_000
            })
        );
        assert_eq!(munging.start_bitrate, Some(2000));
        assert_eq!(munging.periodic_keyframes, Some(20));
        assert!(munging.disable_extmap);
        assert!(munging.disable_rtx);
        assert_eq!(munging.h264_max_fs, Some(8160));

        assert!(config.validate().is_ok());
        assert_eq!(
            config.get_ice_servers()[0].urls,
            vec!["stun:stun.example.org:3478".to_owned()]
        );
    }

    #[test]
    fn test_media_connection_config_defaults() {
        let config = MediaConnectionConfig::from_json("{}").unwrap();
        assert_eq!(config, MediaConnectionConfig::default());
        assert!(!config.sdp_munging.convert_port9to0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_media_connection_config_validate() {
        let tests = vec![
            (
                RTCIceServer {
                    urls: vec!["turn:turn.example.org".to_owned()],
                    ..Default::default()
                },
                Error::ErrNoTurnCredentials,
            ),
            (
                RTCIceServer {
                    urls: vec!["turn:turn.example.org".to_owned()],
                    username: "user".to_owned(),
                    ..Default::default()
                },
                Error::ErrTurnCredentials,
            ),
            (
                RTCIceServer {
                    urls: vec!["http://example.org".to_owned()],
                    ..Default::default()
                },
                Error::ErrInvalidIceServerUrl("http://example.org".to_owned()),
            ),
        ];

        for (ice_server, expected) in tests {
            let config = MediaConnectionConfig {
                ice_servers: vec![ice_server],
                ..Default::default()
            };
            assert_eq!(config.validate(), Err(expected));
        }

        let config = MediaConnectionConfig {
            sdp_munging: SdpMungingConfig {
                h264_max_fs: Some(0),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::ErrConfig(_))));
    }
}
