//! Event handler trait for media connection events

use super::*;

/// Trait for handling media connection events asynchronously
///
/// All methods are async and have default no-op implementations.
#[async_trait::async_trait]
pub trait MediaConnectionEventHandler: Send + Sync + 'static {
    /// Called when a remote track was matched to one of the media kinds
    async fn on_remote_track(&self, _kind: MediaKind, _track: TrackHandle) {}

    /// Called when the reduced connection state changes
    async fn on_connection_state_change(&self, _state: ConnectionState) {}

    /// Called when the DTMF tone being played changes
    async fn on_dtmf_tone_change(&self, _tone: String) {}
}
