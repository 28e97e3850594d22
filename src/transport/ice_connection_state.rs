use std::fmt;

/// RTCIceConnectionState indicates the state of the transport's ICE agent.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCIceConnectionState {
    #[default]
    Unspecified,

    /// New indicates the ICE agent is gathering addresses or is waiting
    /// to be given remote candidates.
    New,

    /// Checking indicates the ICE agent has been given at least one remote
    /// candidate and is checking pairs but has not yet found a connection.
    Checking,

    /// Connected indicates a usable connection was found for all components
    /// while checks may still be running.
    Connected,

    /// Completed indicates the ICE agent has finished gathering and checking
    /// and found a connection for all components.
    Completed,

    /// Disconnected indicates connectivity was lost for at least one component.
    Disconnected,

    /// Failed indicates the ICE agent gave up looking for a connection.
    Failed,

    /// Closed indicates the ICE agent has shut down.
    Closed,
}

const ICE_CONNECTION_STATE_NEW_STR: &str = "new";
const ICE_CONNECTION_STATE_CHECKING_STR: &str = "checking";
const ICE_CONNECTION_STATE_CONNECTED_STR: &str = "connected";
const ICE_CONNECTION_STATE_COMPLETED_STR: &str = "completed";
const ICE_CONNECTION_STATE_DISCONNECTED_STR: &str = "disconnected";
const ICE_CONNECTION_STATE_FAILED_STR: &str = "failed";
const ICE_CONNECTION_STATE_CLOSED_STR: &str = "closed";

impl RTCIceConnectionState {
    /// is_new reports whether the agent has not started checking yet.
    pub fn is_new(&self) -> bool {
        matches!(
            self,
            RTCIceConnectionState::New | RTCIceConnectionState::Unspecified
        )
    }

    /// is_established reports whether a usable candidate pair was found.
    pub fn is_established(&self) -> bool {
        matches!(
            self,
            RTCIceConnectionState::Connected | RTCIceConnectionState::Completed
        )
    }
}

/// takes a string and converts it to RTCIceConnectionState
impl From<&str> for RTCIceConnectionState {
    fn from(raw: &str) -> Self {
        match raw {
            ICE_CONNECTION_STATE_NEW_STR => RTCIceConnectionState::New,
            ICE_CONNECTION_STATE_CHECKING_STR => RTCIceConnectionState::Checking,
            ICE_CONNECTION_STATE_CONNECTED_STR => RTCIceConnectionState::Connected,
            ICE_CONNECTION_STATE_COMPLETED_STR => RTCIceConnectionState::Completed,
            ICE_CONNECTION_STATE_DISCONNECTED_STR => RTCIceConnectionState::Disconnected,
            ICE_CONNECTION_STATE_FAILED_STR => RTCIceConnectionState::Failed,
            ICE_CONNECTION_STATE_CLOSED_STR => RTCIceConnectionState::Closed,
            _ => RTCIceConnectionState::Unspecified,
        }
    }
}

impl fmt::Display for RTCIceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTCIceConnectionState::New => ICE_CONNECTION_STATE_NEW_STR,
            RTCIceConnectionState::Checking => ICE_CONNECTION_STATE_CHECKING_STR,
            RTCIceConnectionState::Connected => ICE_CONNECTION_STATE_CONNECTED_STR,
            RTCIceConnectionState::Completed => ICE_CONNECTION_STATE_COMPLETED_STR,
            RTCIceConnectionState::Disconnected => ICE_CONNECTION_STATE_DISCONNECTED_STR,
            RTCIceConnectionState::Failed => ICE_CONNECTION_STATE_FAILED_STR,
            RTCIceConnectionState::Closed => ICE_CONNECTION_STATE_CLOSED_STR,
            RTCIceConnectionState::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}
