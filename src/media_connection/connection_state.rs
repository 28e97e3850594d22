use std::fmt;

use crate::transport::ice_connection_state::RTCIceConnectionState;
use crate::transport::peer_connection_state::RTCPeerConnectionState;

/// ConnectionState is the simplified connectivity of a media session.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Unspecified,
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

const CONNECTION_STATE_NEW_STR: &str = "New";
const CONNECTION_STATE_CONNECTING_STR: &str = "Connecting";
const CONNECTION_STATE_CONNECTED_STR: &str = "Connected";
const CONNECTION_STATE_DISCONNECTED_STR: &str = "Disconnected";
const CONNECTION_STATE_FAILED_STR: &str = "Failed";
const CONNECTION_STATE_CLOSED_STR: &str = "Closed";

impl From<u8> for ConnectionState {
    fn from(v: u8) -> Self {
        match v {
            1 => ConnectionState::New,
            2 => ConnectionState::Connecting,
            3 => ConnectionState::Connected,
            4 => ConnectionState::Disconnected,
            5 => ConnectionState::Failed,
            6 => ConnectionState::Closed,
            _ => ConnectionState::Unspecified,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            ConnectionState::New => CONNECTION_STATE_NEW_STR,
            ConnectionState::Connecting => CONNECTION_STATE_CONNECTING_STR,
            ConnectionState::Connected => CONNECTION_STATE_CONNECTED_STR,
            ConnectionState::Disconnected => CONNECTION_STATE_DISCONNECTED_STR,
            ConnectionState::Failed => CONNECTION_STATE_FAILED_STR,
            ConnectionState::Closed => CONNECTION_STATE_CLOSED_STR,
            ConnectionState::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

impl ConnectionState {
    /// from_transport_states reduces the transport's ICE connection state and
    /// its overall connection state into one value.
    pub fn from_transport_states(
        ice: RTCIceConnectionState,
        connection: RTCPeerConnectionState,
    ) -> ConnectionState {
        if ice.is_new() && connection.is_new() {
            ConnectionState::New
        } else if ice == RTCIceConnectionState::Closed
            || connection == RTCPeerConnectionState::Closed
        {
            ConnectionState::Closed
        } else if ice == RTCIceConnectionState::Failed
            || connection == RTCPeerConnectionState::Failed
        {
            ConnectionState::Failed
        } else if ice == RTCIceConnectionState::Disconnected
            || connection == RTCPeerConnectionState::Disconnected
        {
            ConnectionState::Disconnected
        } else if ice.is_established() && connection == RTCPeerConnectionState::Connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Connecting
        }
    }
}
