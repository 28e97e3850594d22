//! Transceiver-side capabilities exposed by a transport.

pub mod media_kind;
pub mod rtp_transceiver_direction;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use media_kind::RtpCodecKind;
use rtp_transceiver_direction::RTCRtpTransceiverDirection;

use crate::error::Result;

/// Default tone duration used by insert_dtmf when the caller passes none.
pub const DEFAULT_DTMF_DURATION: Duration = Duration::from_millis(100);
/// Default gap between tones used by insert_dtmf when the caller passes none.
pub const DEFAULT_DTMF_INTER_TONE_GAP: Duration = Duration::from_millis(70);

/// MediaStreamTrack is an opaque handle to a locally captured or remotely
/// received track.
pub trait MediaStreamTrack: Send + Sync + 'static {
    fn id(&self) -> &str;
    fn kind(&self) -> RtpCodecKind;
}

impl fmt::Debug for dyn MediaStreamTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStreamTrack")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish()
    }
}

pub type TrackHandle = Arc<dyn MediaStreamTrack>;

/// TransceiverSource is what a new transceiver is bound to: an outgoing
/// track, or only a kind when there is nothing to send yet.
#[derive(Clone)]
pub enum TransceiverSource {
    Track(TrackHandle),
    Kind(RtpCodecKind),
}

impl TransceiverSource {
    pub fn kind(&self) -> RtpCodecKind {
        match self {
            TransceiverSource::Track(track) => track.kind(),
            TransceiverSource::Kind(kind) => *kind,
        }
    }

    pub fn track(&self) -> Option<&TrackHandle> {
        match self {
            TransceiverSource::Track(track) => Some(track),
            TransceiverSource::Kind(_) => None,
        }
    }
}

/// RTCRtpTransceiverInit describes a transceiver to be added to a transport.
#[derive(Clone)]
pub struct RTCRtpTransceiverInit {
    pub source: TransceiverSource,
    pub direction: RTCRtpTransceiverDirection,
}

#[async_trait::async_trait]
pub trait RtpTransceiver: Send + Sync + 'static {
    async fn mid(&self) -> Option<String>;
    async fn direction(&self) -> RTCRtpTransceiverDirection;
    async fn set_direction(&self, direction: RTCRtpTransceiverDirection) -> Result<()>;
    /// replace_track swaps the outgoing track without renegotiation.
    async fn replace_track(&self, track: Option<TrackHandle>) -> Result<()>;
    /// receiver_track_id is the id of the track bound to the receiver, once known.
    async fn receiver_track_id(&self) -> Option<String>;
    fn dtmf_sender(&self) -> Option<Arc<dyn DtmfSender>>;
}

#[async_trait::async_trait]
pub trait DtmfSender: Send + Sync + 'static {
    async fn can_insert_dtmf(&self) -> bool;
    async fn insert_dtmf(
        &self,
        tones: &str,
        duration: Duration,
        inter_tone_gap: Duration,
    ) -> Result<()>;
}
