//! Media session controller.
//!
//! A [`MediaConnection`] owns the transport and one transceiver per
//! [`MediaKind`]. It turns the local wish to send or receive each kind into
//! transceiver directions and performs the transport work behind every
//! negotiation step, see its [`RoapCallbacks`] implementation.


pub mod configuration;
pub mod connection_state;
pub mod event_handler;
pub mod sdp_munging;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;

use configuration::MediaConnectionConfig;
use connection_state::ConnectionState;
pub use event_handler::MediaConnectionEventHandler;

use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::roap::RoapCallbacks;
use crate::rtp_transceiver::media_kind::MediaKind;
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::{
    RTCRtpTransceiverInit, RtpTransceiver, TrackHandle, TransceiverSource,
    DEFAULT_DTMF_DURATION, DEFAULT_DTMF_INTER_TONE_GAP,
};
use crate::transport::ice_connection_state::RTCIceConnectionState;
use crate::transport::peer_connection_state::RTCPeerConnectionState;
use crate::transport::session_description::RTCSessionDescription;
use crate::transport::stats::StatsReport;
use crate::transport::{RTCTrackEvent, Transport, TransportEventHandler, TransportFactory};

/// LocalTracks holds the track sent for each media kind. A kind without a
/// track is not sent.
#[derive(Default, Clone)]
pub struct LocalTracks {
    pub audio: Option<TrackHandle>,
    pub video: Option<TrackHandle>,
    pub screen_share_video: Option<TrackHandle>,
}

impl LocalTracks {
    pub fn get(&self, kind: MediaKind) -> Option<&TrackHandle> {
        match kind {
            MediaKind::Audio => self.audio.as_ref(),
            MediaKind::Video => self.video.as_ref(),
            MediaKind::ScreenShareVideo => self.screen_share_video.as_ref(),
        }
    }

    fn apply(&mut self, update: &LocalTrackUpdate) {
        for kind in MediaKind::ALL {
            if let Some(track) = update.get(kind) {
                let slot = match kind {
                    MediaKind::Audio => &mut self.audio,
                    MediaKind::Video => &mut self.video,
                    MediaKind::ScreenShareVideo => &mut self.screen_share_video,
                };
                *slot = track.clone();
            }
        }
    }
}

/// LocalTrackUpdate changes some of the local tracks.
///
/// For each kind, `None` leaves the current track untouched, `Some(None)`
/// stops sending and `Some(Some(track))` sends `track`.
#[derive(Default, Clone)]
pub struct LocalTrackUpdate {
    pub audio: Option<Option<TrackHandle>>,
    pub video: Option<Option<TrackHandle>>,
    pub screen_share_video: Option<Option<TrackHandle>>,
}

impl LocalTrackUpdate {
    pub fn get(&self, kind: MediaKind) -> Option<&Option<TrackHandle>> {
        match kind {
            MediaKind::Audio => self.audio.as_ref(),
            MediaKind::Video => self.video.as_ref(),
            MediaKind::ScreenShareVideo => self.screen_share_video.as_ref(),
        }
    }
}

/// ReceiveOptions tells which media kinds the local side wants to receive.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReceiveOptions {
    pub audio: bool,
    pub video: bool,
    pub screen_share_video: bool,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        ReceiveOptions {
            audio: true,
            video: true,
            screen_share_video: true,
        }
    }
}

impl ReceiveOptions {
    pub fn get(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => self.audio,
            MediaKind::Video => self.video,
            MediaKind::ScreenShareVideo => self.screen_share_video,
        }
    }
}

#[derive(Default)]
struct MediaConnectionInternal {
    local_tracks: LocalTracks,
    receive_options: ReceiveOptions,
    /// indexed by MediaKind::index
    transceivers: [Option<Arc<dyn RtpTransceiver>>; 3],
    /// set once transceivers are created locally, or the session was armed
    /// for an incoming offer
    armed: bool,
    incoming: bool,
    identified: bool,
    /// set once the transceivers carry the local directions and tracks
    intent_applied: bool,
}

impl MediaConnectionInternal {
    fn direction(&self, kind: MediaKind) -> RTCRtpTransceiverDirection {
        RTCRtpTransceiverDirection::from_send_recv(
            self.local_tracks.get(kind).is_some(),
            self.receive_options.get(kind),
        )
    }
}

pub struct MediaConnection {
    config: MediaConnectionConfig,
    transport: Arc<dyn Transport>,
    internal: Mutex<MediaConnectionInternal>,
    connection_state: AtomicU8,
    is_closed: AtomicBool,
    handler: Arc<dyn MediaConnectionEventHandler>,
    logger: Logger,
}

impl MediaConnection {
    /// new validates the configuration, creates the transport and subscribes
    /// to its events.
    pub async fn new(
        config: MediaConnectionConfig,
        transport_factory: &dyn TransportFactory,
        local_tracks: LocalTracks,
        receive_options: ReceiveOptions,
        handler: Arc<dyn MediaConnectionEventHandler>,
        logger: Logger,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let transport = transport_factory.create_transport(&config.get_ice_servers())?;

        let connection = Arc::new(MediaConnection {
            config,
            transport,
            internal: Mutex::new(MediaConnectionInternal {
                local_tracks,
                receive_options,
                ..Default::default()
            }),
            connection_state: AtomicU8::new(ConnectionState::New as u8),
            is_closed: AtomicBool::new(false),
            handler,
            logger,
        });

        let forwarder = Arc::new(TransportEventForwarder {
            connection: Arc::downgrade(&connection),
        });
        connection
            .transport
            .set_event_handler(Some(forwarder as Arc<dyn TransportEventHandler>))
            .await;

        Ok(connection)
    }

    pub fn config(&self) -> &MediaConnectionConfig {
        &self.config
    }

    fn check_closed(&self) -> Result<()> {
        if self.is_closed.load(Ordering::SeqCst) {
            Err(Error::ErrConnectionClosed)
        } else {
            Ok(())
        }
    }

    /// initiate_offer creates the transceivers of an outgoing session. The
    /// caller then starts the negotiation.
    ///
    /// It fails with ErrAlreadyNegotiating when the session is already armed
    /// or the transport already has transceivers.
    pub async fn initiate_offer(&self) -> Result<()> {
        self.check_closed()?;
        let mut internal = self.internal.lock().await;
        if internal.armed || !self.transport.get_transceivers().await.is_empty() {
            return Err(Error::ErrAlreadyNegotiating);
        }

        self.create_transceivers(&mut internal).await?;
        internal.armed = true;
        internal.identified = true;
        internal.intent_applied = true;
        Ok(())
    }

    /// initialize_incoming arms the session for an incoming offer. The
    /// transport creates the transceivers when the remote offer is applied.
    pub async fn initialize_incoming(&self) -> Result<()> {
        self.check_closed()?;
        let mut internal = self.internal.lock().await;
        if internal.armed || !self.transport.get_transceivers().await.is_empty() {
            return Err(Error::ErrAlreadyNegotiating);
        }

        internal.armed = true;
        internal.incoming = true;
        Ok(())
    }

    /// create_transceivers adds one transceiver per media kind, in m-line
    /// order.
    async fn create_transceivers(&self, internal: &mut MediaConnectionInternal) -> Result<()> {
        for kind in MediaKind::ALL {
            let direction = internal.direction(kind);
            if direction == RTCRtpTransceiverDirection::Inactive
                && self.config.skip_inactive_transceivers
            {
                log_debug!(self.logger, "skipping inactive {} transceiver", kind);
                continue;
            }

            let source = match internal.local_tracks.get(kind) {
                Some(track) => TransceiverSource::Track(Arc::clone(track)),
                None => TransceiverSource::Kind(kind.codec_kind()),
            };
            log_debug!(self.logger, "adding {} transceiver {}", kind, direction);
            let transceiver = self
                .transport
                .add_transceiver(RTCRtpTransceiverInit { source, direction })
                .await?;
            internal.transceivers[kind.index()] = Some(transceiver);
        }
        Ok(())
    }

    /// identify_transceivers assigns the transceivers the transport created
    /// for a remote offer to media kinds, by position. It runs once.
    async fn identify_transceivers(&self, internal: &mut MediaConnectionInternal) {
        if internal.identified {
            return;
        }

        let transceivers = self.transport.get_transceivers().await;
        for (kind, transceiver) in MediaKind::ALL.into_iter().zip(transceivers) {
            internal.transceivers[kind.index()] = Some(transceiver);
        }
        internal.identified = true;
        log_debug!(self.logger, "identified incoming transceivers");
    }

    /// apply_local_intent sets the direction and outgoing track of every
    /// transceiver from the local tracks and receive options.
    async fn apply_local_intent(&self, internal: &MediaConnectionInternal) -> Result<()> {
        for kind in MediaKind::ALL {
            if let Some(transceiver) = &internal.transceivers[kind.index()] {
                transceiver.set_direction(internal.direction(kind)).await?;
                if let Some(track) = internal.local_tracks.get(kind) {
                    transceiver.replace_track(Some(Arc::clone(track))).await?;
                }
            }
        }
        Ok(())
    }

    pub async fn update_send_options(&self, tracks: LocalTrackUpdate) -> Result<bool> {
        self.update_send_receive_options(tracks, None).await
    }

    pub async fn update_receive_options(&self, options: ReceiveOptions) -> Result<bool> {
        self.update_send_receive_options(LocalTrackUpdate::default(), Some(options))
            .await
    }

    /// update_send_receive_options changes the local tracks and receive
    /// options, then updates the transceivers. Returns whether a new
    /// negotiation is required.
    pub async fn update_send_receive_options(
        &self,
        tracks: LocalTrackUpdate,
        receive_options: Option<ReceiveOptions>,
    ) -> Result<bool> {
        self.check_closed()?;
        let mut internal = self.internal.lock().await;

        let mut local_tracks = internal.local_tracks.clone();
        local_tracks.apply(&tracks);
        let receive_options = receive_options.unwrap_or(internal.receive_options);

        if !internal.intent_applied {
            // applied when the transceivers appear
            internal.local_tracks = local_tracks;
            internal.receive_options = receive_options;
            return Ok(false);
        }

        let mut directions = [RTCRtpTransceiverDirection::Unspecified; 3];
        for kind in MediaKind::ALL {
            let direction = RTCRtpTransceiverDirection::from_send_recv(
                local_tracks.get(kind).is_some(),
                receive_options.get(kind),
            );
            if internal.transceivers[kind.index()].is_none()
                && direction != RTCRtpTransceiverDirection::Inactive
            {
                return Err(Error::ErrTransceiverSkipped(kind));
            }
            directions[kind.index()] = direction;
        }

        let mut renegotiate = false;
        for kind in MediaKind::ALL {
            let Some(transceiver) = &internal.transceivers[kind.index()] else {
                continue;
            };

            let direction = directions[kind.index()];
            if transceiver.direction().await != direction {
                log_debug!(self.logger, "{} transceiver direction now {}", kind, direction);
                transceiver.set_direction(direction).await?;
                renegotiate = true;
            }
            if let Some(track) = tracks.get(kind) {
                transceiver.replace_track(track.clone()).await?;
            }
        }

        internal.local_tracks = local_tracks;
        internal.receive_options = receive_options;
        Ok(renegotiate)
    }

    pub async fn transceiver(&self, kind: MediaKind) -> Option<Arc<dyn RtpTransceiver>> {
        let internal = self.internal.lock().await;
        internal.transceivers[kind.index()].clone()
    }

    /// on_track resolves the media kind of a remote track and emits it.
    /// Tracks that match no transceiver are dropped.
    pub(crate) async fn on_track(&self, event: RTCTrackEvent) {
        let kind = {
            let mut internal = self.internal.lock().await;
            if internal.incoming {
                self.identify_transceivers(&mut internal).await;
            }
            Self::resolve_track_kind(&internal, &event).await
        };

        match kind {
            Some(kind) => {
                log_debug!(self.logger, "remote {} track {}", kind, event.track.id());
                self.handler.on_remote_track(kind, event.track).await;
            }
            None => {
                log_warn!(
                    self.logger,
                    "cannot match remote track {} (mid={:?}) to a transceiver",
                    event.track.id(),
                    event.mid
                );
            }
        }
    }

    async fn resolve_track_kind(
        internal: &MediaConnectionInternal,
        event: &RTCTrackEvent,
    ) -> Option<MediaKind> {
        if let Some(mid) = &event.mid {
            for kind in MediaKind::ALL {
                if let Some(transceiver) = &internal.transceivers[kind.index()] {
                    if transceiver.mid().await.as_ref() == Some(mid) {
                        return Some(kind);
                    }
                }
            }
        }

        let track_id = event.track.id();
        for kind in MediaKind::ALL {
            if let Some(transceiver) = &internal.transceivers[kind.index()] {
                if transceiver.receiver_track_id().await.as_deref() == Some(track_id) {
                    return Some(kind);
                }
            }
        }
        None
    }

    /// update_connection_state recomputes the connection state from the
    /// transport and emits it when it changed.
    pub(crate) async fn update_connection_state(&self) {
        let state = ConnectionState::from_transport_states(
            self.transport.ice_connection_state(),
            self.transport.connection_state(),
        );
        self.set_connection_state(state).await;
    }

    async fn set_connection_state(&self, state: ConnectionState) {
        let previous = self.connection_state.swap(state as u8, Ordering::SeqCst);
        if previous == state as u8 {
            return;
        }

        log_info!(
            self.logger,
            "connection state changed from {} to {}",
            ConnectionState::from(previous),
            state
        );
        self.handler.on_connection_state_change(state).await;
    }

    pub fn get_connection_state(&self) -> ConnectionState {
        ConnectionState::from(self.connection_state.load(Ordering::SeqCst))
    }

    pub async fn get_stats(&self) -> Result<StatsReport> {
        self.check_closed()?;
        self.transport.get_stats().await
    }

    /// insert_dtmf plays tones on the audio transceiver. Missing durations
    /// fall back to 100ms tones with 70ms gaps.
    pub async fn insert_dtmf(
        &self,
        tones: &str,
        duration: Option<Duration>,
        inter_tone_gap: Option<Duration>,
    ) -> Result<()> {
        self.check_closed()?;
        let transceiver = self
            .transceiver(MediaKind::Audio)
            .await
            .ok_or(Error::ErrDtmfNoAudioTransceiver)?;
        let sender = transceiver
            .dtmf_sender()
            .ok_or(Error::ErrDtmfNotSupported)?;
        if !sender.can_insert_dtmf().await {
            return Err(Error::ErrDtmfNotSupported);
        }

        sender
            .insert_dtmf(
                tones,
                duration.unwrap_or(DEFAULT_DTMF_DURATION),
                inter_tone_gap.unwrap_or(DEFAULT_DTMF_INTER_TONE_GAP),
            )
            .await
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::SeqCst)
    }

    /// close detaches from the transport and closes it. Closing twice is a
    /// no-op.
    pub async fn close(&self) -> Result<()> {
        if self.is_closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        log_info!(self.logger, "closing media connection");
        self.transport.set_event_handler(None).await;
        let result = self.transport.close().await;
        self.set_connection_state(ConnectionState::Closed).await;
        result
    }

    /// finalize_local_sdp reads the applied local description and munges it.
    /// The screen share section is found by its transceiver's mid.
    async fn finalize_local_sdp(&self) -> Result<String> {
        let description = self
            .transport
            .local_description()
            .await
            .ok_or(Error::ErrNoLocalDescription)?;
        let screen_share_mid = match self.transceiver(MediaKind::ScreenShareVideo).await {
            Some(transceiver) => transceiver.mid().await,
            None => None,
        };

        let sdp = sdp_munging::munge_local_sdp(
            &self.config.sdp_munging,
            &description,
            screen_share_mid.as_deref(),
        )?;
        let munged = RTCSessionDescription { sdp, ..description };
        if self.config.require_h264 && !sdp_munging::has_h264(&munged.unmarshal()?) {
            return Err(Error::ErrMissingH264);
        }
        Ok(munged.sdp)
    }

    /// set_local_and_gather applies a local description and waits for ICE
    /// gathering to finish.
    async fn set_local_and_gather(&self, description: RTCSessionDescription) -> Result<()> {
        let mut gathering_complete = self.transport.gathering_complete_promise().await;
        log_debug!(
            self.logger,
            "setting local {}, ICE gathering {}",
            description.sdp_type,
            self.transport.ice_gathering_state()
        );
        self.transport.set_local_description(description).await?;
        let _ = gathering_complete.recv().await;
        let gathering = self.transport.ice_gathering_state();
        if gathering.is_complete() {
            log_debug!(self.logger, "ICE gathering complete");
        } else {
            log_warn!(self.logger, "ICE gathering stopped in state {}", gathering);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RoapCallbacks for MediaConnection {
    async fn create_local_offer(&self) -> Result<String> {
        self.check_closed()?;
        let offer = self.transport.create_offer().await?;
        self.set_local_and_gather(offer).await?;
        self.finalize_local_sdp().await
    }

    async fn handle_remote_offer(&self, sdp: String) -> Result<String> {
        self.check_closed()?;
        log_debug!(self.logger, "setting remote offer");
        self.transport
            .set_remote_description(RTCSessionDescription::offer(sdp))
            .await?;

        {
            let mut internal = self.internal.lock().await;
            if internal.incoming && !internal.intent_applied {
                self.identify_transceivers(&mut internal).await;
                self.apply_local_intent(&internal).await?;
                internal.intent_applied = true;
            }
        }

        let answer = self.transport.create_answer().await?;
        self.set_local_and_gather(answer).await?;
        self.finalize_local_sdp().await
    }

    async fn handle_remote_answer(&self, sdp: String) -> Result<()> {
        self.check_closed()?;
        log_debug!(self.logger, "setting remote answer");
        self.transport
            .set_remote_description(RTCSessionDescription::answer(sdp))
            .await
    }
}

struct TransportEventForwarder {
    connection: Weak<MediaConnection>,
}

#[async_trait::async_trait]
impl TransportEventHandler for TransportEventForwarder {
    async fn on_ice_connection_state_change(&self, _state: RTCIceConnectionState) {
        if let Some(connection) = self.connection.upgrade() {
            connection.update_connection_state().await;
        }
    }

    async fn on_connection_state_change(&self, _state: RTCPeerConnectionState) {
        if let Some(connection) = self.connection.upgrade() {
            connection.update_connection_state().await;
        }
    }

    async fn on_track(&self, event: RTCTrackEvent) {
        if let Some(connection) = self.connection.upgrade() {
            connection.on_track(event).await;
        }
    }

    async fn on_dtmf_tone_change(&self, tone: String) {
        if let Some(connection) = self.connection.upgrade() {
            connection.handler.on_dtmf_tone_change(tone).await;
        }
    }
}
