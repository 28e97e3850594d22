use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::media_connection::connection_state::ConnectionState;
use crate::media_connection::MediaConnectionEventHandler;
use crate::roap::roap_message::RoapMessage;
use crate::roap::RoapEventHandler;
use crate::rtp_transceiver::media_kind::MediaKind;
use crate::rtp_transceiver::TrackHandle;

/// Trait for handling the events of a [`super::RoapMediaConnection`]
///
/// All methods are async and have default no-op implementations.
#[async_trait::async_trait]
pub trait RoapMediaConnectionEventHandler: Send + Sync + 'static {
    /// Called when the reduced connection state changes
    async fn on_connection_state_changed(&self, _state: ConnectionState) {}

    /// Called when a remote track was matched to a media kind
    async fn on_remote_track_added(&self, _kind: MediaKind, _track: TrackHandle) {}

    /// Called with every ROAP message that must be relayed to the remote peer
    async fn on_roap_message_to_send(&self, _message: RoapMessage) {}

    /// Called once when the negotiation fails for good. The session is dead
    /// afterwards.
    async fn on_roap_failure(&self, _reason: String) {}

    async fn on_dtmf_tone_changed(&self, _tone: String) {}
}

pub(crate) struct NoopEventHandler;

impl RoapMediaConnectionEventHandler for NoopEventHandler {}

/// EventForwarder merges the negotiation engine and media connection events
/// into the single application handler until it is detached.
pub(crate) struct EventForwarder {
    handler: Arc<dyn RoapMediaConnectionEventHandler>,
    detached: AtomicBool,
}

impl EventForwarder {
    pub(crate) fn new(handler: Arc<dyn RoapMediaConnectionEventHandler>) -> Self {
        EventForwarder {
            handler,
            detached: AtomicBool::new(false),
        }
    }

    pub(crate) fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    fn is_attached(&self) -> bool {
        !self.detached.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RoapEventHandler for EventForwarder {
    async fn on_roap_message_to_send(&self, message: RoapMessage) {
        if self.is_attached() {
            self.handler.on_roap_message_to_send(message).await;
        }
    }

    async fn on_roap_failure(&self, reason: String) {
        if self.is_attached() {
            self.handler.on_roap_failure(reason).await;
        }
    }
}

#[async_trait::async_trait]
impl MediaConnectionEventHandler for EventForwarder {
    async fn on_remote_track(&self, kind: MediaKind, track: TrackHandle) {
        if self.is_attached() {
            self.handler.on_remote_track_added(kind, track).await;
        }
    }

    async fn on_connection_state_change(&self, state: ConnectionState) {
        if self.is_attached() {
            self.handler.on_connection_state_changed(state).await;
        }
    }

    async fn on_dtmf_tone_change(&self, tone: String) {
        if self.is_attached() {
            self.handler.on_dtmf_tone_changed(tone).await;
        }
    }
}
