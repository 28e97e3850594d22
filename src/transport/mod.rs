//! The transport capability a media session negotiates over.
//!
//! A [`Transport`] is the peer connection itself: it creates and applies
//! session descriptions, gathers ICE candidates, owns transceivers and
//! reports connectivity. This crate never implements one; it only drives it.

pub mod ice_connection_state;
pub mod ice_gathering_state;
pub mod ice_server;
pub mod peer_connection_state;
pub mod sdp_type;
pub mod session_description;
pub mod stats;


use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::Result;
use crate::rtp_transceiver::{RTCRtpTransceiverInit, RtpTransceiver, TrackHandle};
use ice_connection_state::RTCIceConnectionState;
use ice_gathering_state::RTCIceGatheringState;
use ice_server::RTCIceServer;
use peer_connection_state::RTCPeerConnectionState;
use session_description::RTCSessionDescription;
use stats::StatsReport;

/// RTCTrackEvent is raised when a remote track arrives.
#[derive(Clone)]
pub struct RTCTrackEvent {
    pub track: TrackHandle,
    /// mid of the transceiver the track arrived on, when the transport knows it.
    pub mid: Option<String>,
}

/// Trait for handling transport events asynchronously.
///
/// All methods have default no-op implementations.
#[async_trait::async_trait]
pub trait TransportEventHandler: Send + Sync + 'static {
    /// Called when the ICE connection state changes
    async fn on_ice_connection_state_change(&self, _state: RTCIceConnectionState) {}

    /// Called when the transport connection state changes
    async fn on_connection_state_change(&self, _state: RTCPeerConnectionState) {}

    /// Called when a new remote track is received
    async fn on_track(&self, _event: RTCTrackEvent) {}

    /// Called when the DTMF sender starts playing a tone, or with an empty
    /// string once the tone buffer is drained
    async fn on_dtmf_tone_change(&self, _tone: String) {}
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn create_offer(&self) -> Result<RTCSessionDescription>;
    async fn create_answer(&self) -> Result<RTCSessionDescription>;
    async fn set_local_description(&self, desc: RTCSessionDescription) -> Result<()>;
    async fn set_remote_description(&self, desc: RTCSessionDescription) -> Result<()>;

    /// local_description returns the applied local description, including
    /// every candidate gathered so far.
    async fn local_description(&self) -> Option<RTCSessionDescription>;

    /// gathering_complete_promise returns a channel that is closed (or
    /// receives a value) once ICE gathering reaches a terminal state.
    ///
    /// Implementations must also resolve it when gathering already finished
    /// before the promise was requested, or when the end-of-candidates
    /// sentinel was seen instead of a state change.
    async fn gathering_complete_promise(&self) -> mpsc::Receiver<()>;

    fn ice_gathering_state(&self) -> RTCIceGatheringState;
    fn ice_connection_state(&self) -> RTCIceConnectionState;
    fn connection_state(&self) -> RTCPeerConnectionState;

    async fn add_transceiver(&self, init: RTCRtpTransceiverInit) -> Result<Arc<dyn RtpTransceiver>>;

    /// get_transceivers lists transceivers in m-line order.
    async fn get_transceivers(&self) -> Vec<Arc<dyn RtpTransceiver>>;

    async fn get_stats(&self) -> Result<StatsReport>;

    /// set_event_handler replaces the handler receiving transport events.
    /// Passing None detaches the current one.
    async fn set_event_handler(&self, handler: Option<Arc<dyn TransportEventHandler>>);

    async fn close(&self) -> Result<()>;
}

/// TransportFactory creates the transport a session owns.
pub trait TransportFactory: Send + Sync {
    fn create_transport(&self, ice_servers: &[RTCIceServer]) -> Result<Arc<dyn Transport>>;
}
