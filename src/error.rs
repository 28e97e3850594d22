use thiserror::Error;

use crate::rtp_transceiver::media_kind::MediaKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// ErrAlreadyNegotiating indicates that an offer was initiated on a session
    /// whose transceivers have already been set up.
    #[error("SDP negotiation already started")]
    ErrAlreadyNegotiating,

    /// ErrConnectionClosed indicates an operation executed after the session
    /// has already been closed.
    #[error("connection closed")]
    ErrConnectionClosed,

    /// ErrRoapTerminal indicates that the negotiation engine has reached
    /// BrowserError or RemoteError and accepts no further work.
    #[error("roap negotiation is in a terminal state: {0}")]
    ErrRoapTerminal(String),

    /// ErrRoapStopped indicates that the negotiation engine task has ended.
    #[error("roap negotiation engine stopped")]
    ErrRoapStopped,

    /// ErrRoapMessageMissingSdp indicates an inbound OFFER, OFFER_RESPONSE or
    /// ANSWER that carries no session description.
    #[error("roap {0} message without sdp")]
    ErrRoapMessageMissingSdp(String),

    /// ErrLocalOfferFailed is handed to initiate_offer callers whose offer
    /// could not be produced.
    #[error("local offer failed: {0}")]
    ErrLocalOfferFailed(String),

    /// ErrNoLocalDescription indicates the transport did not expose a local
    /// description after it was set.
    #[error("local description is not set")]
    ErrNoLocalDescription,

    /// ErrMissingH264 indicates the local SDP carries no H264 codec while
    /// requireH264 is enabled.
    #[error("local SDP does not offer H264")]
    ErrMissingH264,

    /// ErrTransceiverSkipped indicates an attempt to activate a media kind
    /// whose inactive transceiver was never created.
    #[error("{0} transceiver was skipped while inactive and cannot be activated")]
    ErrTransceiverSkipped(MediaKind),

    /// ErrDtmfNoAudioTransceiver indicates insert_dtmf was called before an
    /// audio transceiver exists.
    #[error("cannot insert DTMF without an audio transceiver")]
    ErrDtmfNoAudioTransceiver,

    /// ErrDtmfNotSupported indicates the transport exposes no DTMF sender.
    #[error("DTMF is not supported by the transport")]
    ErrDtmfNotSupported,

    /// ErrNoTurnCredentials indicates that a TURN server URL was provided
    /// without required credentials.
    #[error("turn server credentials required")]
    ErrNoTurnCredentials,

    /// ErrTurnCredentials indicates that provided TURN credentials are partial
    /// or malformed.
    #[error("invalid turn server credentials")]
    ErrTurnCredentials,

    #[error("invalid ice server url: {0}")]
    ErrInvalidIceServerUrl(String),

    #[error("invalid configuration: {0}")]
    ErrConfig(String),

    /// ErrTransport wraps a failure reported by the underlying transport.
    #[error("transport error: {0}")]
    ErrTransport(String),

    #[error("UrlError: {0}")]
    ErrUrl(#[from] url::ParseError),
    #[error("JsonError: {0}")]
    ErrJson(#[from] serde_json::Error),
    #[error("SdpError: {0}")]
    ErrSdp(#[from] sdp::Error),

    #[error("Other errors: {0}")]
    ErrOthers(String),
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
