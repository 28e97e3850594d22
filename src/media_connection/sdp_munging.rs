//! Rewrites applied to local session descriptions before they are sent.
//!
//! The description is parsed with the `sdp` crate, every enabled rewrite
//! edits the parsed form, and the result is marshaled back using the line
//! endings of the input. Rewrites are independent of each other and
//! idempotent: munging an already munged description with the same
//! configuration returns it unchanged.

use regex::Regex;
use sdp::description::common::{Address, Attribute, Bandwidth, ConnectionInformation};
use sdp::description::media::MediaDescription;
use sdp::description::session::{SessionDescription, ATTR_KEY_EXT_MAP, ATTR_KEY_MID};

use super::configuration::SdpMungingConfig;
use crate::error::Result;
use crate::transport::session_description::RTCSessionDescription;

lazy_static! {
    static ref MAX_FS_RE: Regex = Regex::new(r"max-fs=\d+").unwrap();
}

const MEDIA_AUDIO: &str = "audio";
const MEDIA_VIDEO: &str = "video";

const ATTR_KEY_RTPMAP: &str = "rtpmap";
const ATTR_KEY_FMTP: &str = "fmtp";
const ATTR_KEY_RTCP_FB: &str = "rtcp-fb";
const ATTR_KEY_CONTENT: &str = "content";
const ATTR_KEY_PERIODIC_KEYFRAMES: &str = "periodic-keyframes";

const CONTENT_SLIDES: &str = "slides";
const BANDWIDTH_TIAS: &str = "TIAS";
const START_BITRATE_PARAM: &str = "x-google-start-bitrate";

const CODEC_H264: &str = "H264";
const CODEC_RTX: &str = "rtx";

/// munge_local_sdp applies the enabled rewrites, in declaration order, to a
/// local session description. `screen_share_mid` is the mid of the screen
/// share transceiver, if it has one; it selects the section marked with
/// `a=content:slides`.
///
/// With no rewrite enabled the description is returned as is.
pub fn munge_local_sdp(
    config: &SdpMungingConfig,
    description: &RTCSessionDescription,
    screen_share_mid: Option<&str>,
) -> Result<String> {
    if !config.is_enabled() {
        return Ok(description.sdp.clone());
    }

    let mut parsed = description.unmarshal()?;

    if config.convert_port9to0 {
        convert_port9to0(&mut parsed);
    }
    if config.add_content_slides {
        if let Some(mid) = screen_share_mid {
            add_content_slides(&mut parsed, mid);
        }
    }
    if config.convert_c_line_to_ipv4 {
        convert_c_line_to_ipv4(&mut parsed);
    }
    if let Some(limits) = &config.bandwidth_limits {
        for media in &mut parsed.media_descriptions {
            let limit = match media.media_name.media.as_str() {
                MEDIA_AUDIO => limits.audio,
                MEDIA_VIDEO => limits.video,
                _ => 0,
            };
            if limit > 0 {
                set_tias(media, limit);
            }
        }
    }
    if let Some(start_bitrate) = config.start_bitrate {
        set_start_bitrate(&mut parsed, start_bitrate);
    }
    if let Some(interval) = config.periodic_keyframes {
        for media in parsed.media_descriptions.iter_mut().filter(|m| is_video(m)) {
            if !media.attribute(ATTR_KEY_PERIODIC_KEYFRAMES).is_some() {
                media.attributes.push(Attribute::new(
                    ATTR_KEY_PERIODIC_KEYFRAMES.to_owned(),
                    Some(interval.to_string()),
                ));
            }
        }
    }
    if config.disable_extmap {
        // also drops extmap-allow-mixed
        parsed
            .attributes
            .retain(|a| !a.key.starts_with(ATTR_KEY_EXT_MAP));
        for media in &mut parsed.media_descriptions {
            media
                .attributes
                .retain(|a| !a.key.starts_with(ATTR_KEY_EXT_MAP));
        }
    }
    if config.disable_rtx {
        remove_rtx(&mut parsed);
    }
    if let Some(max_fs) = config.h264_max_fs {
        set_h264_max_fs(&mut parsed, max_fs);
    }

    Ok(restore_line_endings(&description.sdp, parsed.marshal()))
}

/// has_h264 reports whether any media section offers an H264 payload type.
pub fn has_h264(parsed: &SessionDescription) -> bool {
    parsed
        .media_descriptions
        .iter()
        .any(|media| !payload_types(parsed, media, CODEC_H264).is_empty())
}

fn is_video(media: &MediaDescription) -> bool {
    media.media_name.media == MEDIA_VIDEO
}

/// payload_types returns the formats of the media section whose codec is
/// `codec`.
fn payload_types(parsed: &SessionDescription, media: &MediaDescription, codec: &str) -> Vec<String> {
    media
        .media_name
        .formats
        .iter()
        .filter(|format| {
            format
                .parse::<u8>()
                .ok()
                .and_then(|payload_type| parsed.get_codec_for_payload_type(payload_type).ok())
                .map(|c| c.name.eq_ignore_ascii_case(codec))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// attribute_payload_type returns the payload type an rtpmap, fmtp or
/// rtcp-fb attribute refers to.
fn attribute_payload_type(attribute: &Attribute) -> Option<&str> {
    attribute
        .value
        .as_deref()
        .and_then(|v| v.split_whitespace().next())
}

fn video_sections(parsed: &SessionDescription) -> Vec<usize> {
    parsed
        .media_descriptions
        .iter()
        .enumerate()
        .filter(|(_, m)| is_video(m))
        .map(|(i, _)| i)
        .collect()
}

fn convert_port9to0(parsed: &mut SessionDescription) {
    for media in &mut parsed.media_descriptions {
        let name = &mut media.media_name;
        if (name.media == MEDIA_AUDIO || name.media == MEDIA_VIDEO) && name.port.value == 9 {
            name.port.value = 0;
        }
    }
}

fn add_content_slides(parsed: &mut SessionDescription, screen_share_mid: &str) {
    for media in parsed.media_descriptions.iter_mut().filter(|m| is_video(m)) {
        if media.attribute(ATTR_KEY_MID) == Some(Some(screen_share_mid))
            && !media.attribute(ATTR_KEY_CONTENT).is_some()
        {
            media.attributes.push(Attribute::new(
                ATTR_KEY_CONTENT.to_owned(),
                Some(CONTENT_SLIDES.to_owned()),
            ));
        }
    }
}

fn convert_c_line_to_ipv4(parsed: &mut SessionDescription) {
    let connections = std::iter::once(&mut parsed.connection_information).chain(
        parsed
            .media_descriptions
            .iter_mut()
            .map(|m| &mut m.connection_information),
    );
    for connection in connections.flatten() {
        if connection.address_type == "IP6" {
            *connection = ConnectionInformation {
                network_type: "IN".to_owned(),
                address_type: "IP4".to_owned(),
                address: Some(Address {
                    address: "0.0.0.0".to_owned(),
                    ttl: None,
                    range: None,
                }),
            };
        }
    }
}

/// set_tias replaces any `b=TIAS` of the section with one carrying the
/// limit.
fn set_tias(media: &mut MediaDescription, limit: u32) {
    media
        .bandwidth
        .retain(|b| b.experimental || b.bandwidth_type != BANDWIDTH_TIAS);
    media.bandwidth.push(Bandwidth {
        experimental: false,
        bandwidth_type: BANDWIDTH_TIAS.to_owned(),
        bandwidth: u64::from(limit),
    });
}

fn set_start_bitrate(parsed: &mut SessionDescription, start_bitrate: u32) {
    for i in video_sections(parsed) {
        let rtx = payload_types(parsed, &parsed.media_descriptions[i], CODEC_RTX);
        for attribute in &mut parsed.media_descriptions[i].attributes {
            if attribute.key != ATTR_KEY_FMTP {
                continue;
            }
            let is_codec = attribute_payload_type(attribute)
                .map(|pt| !rtx.iter().any(|r| r == pt))
                .unwrap_or(false);
            if let Some(value) = attribute.value.as_mut() {
                if is_codec && !value.contains(START_BITRATE_PARAM) {
                    value.push_str(&format!(";{START_BITRATE_PARAM}={start_bitrate}"));
                }
            }
        }
    }
}

fn remove_rtx(parsed: &mut SessionDescription) {
    for i in video_sections(parsed) {
        let rtx = payload_types(parsed, &parsed.media_descriptions[i], CODEC_RTX);
        if rtx.is_empty() {
            continue;
        }

        let media = &mut parsed.media_descriptions[i];
        media.media_name.formats.retain(|f| !rtx.contains(f));
        media.attributes.retain(|a| {
            let keyed_by_payload_type = a.key == ATTR_KEY_RTPMAP
                || a.key == ATTR_KEY_FMTP
                || a.key == ATTR_KEY_RTCP_FB;
            !keyed_by_payload_type
                || !attribute_payload_type(a)
                    .map(|pt| rtx.iter().any(|r| r == pt))
                    .unwrap_or(false)
        });
    }
}

fn set_h264_max_fs(parsed: &mut SessionDescription, max_fs: u32) {
    for i in video_sections(parsed) {
        let h264 = payload_types(parsed, &parsed.media_descriptions[i], CODEC_H264);
        for attribute in &mut parsed.media_descriptions[i].attributes {
            let is_h264 = attribute.key == ATTR_KEY_FMTP
                && attribute_payload_type(attribute)
                    .map(|pt| h264.iter().any(|h| h == pt))
                    .unwrap_or(false);
            let Some(value) = attribute.value.as_mut().filter(|_| is_h264) else {
                continue;
            };
            if MAX_FS_RE.is_match(value) {
                *value = MAX_FS_RE
                    .replace(value, format!("max-fs={max_fs}").as_str())
                    .into_owned();
            } else {
                value.push_str(&format!(";max-fs={max_fs}"));
            }
        }
    }
}

/// restore_line_endings gives the marshaled description, which always ends
/// lines with CRLF, the line terminator and trailing newline of the input.
fn restore_line_endings(original: &str, marshaled: String) -> String {
    let mut munged = if original.contains("\r\n") {
        marshaled
    } else {
        marshaled.replace("\r\n", "\n")
    };
    if !original.ends_with('\n') {
        let len = munged.trim_end_matches(&['\r', '\n'][..]).len();
        munged.truncate(len);
    }
    munged
}
