use std::fmt;

/// NegotiationState is the state of the ROAP offer/answer engine.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum NegotiationState {
    #[default]
    Unspecified,

    /// Idle indicates no exchange is in progress.
    Idle,

    /// CreatingLocalOffer indicates the transport is producing our offer.
    CreatingLocalOffer,

    /// WaitingForAnswer indicates our offer was sent.
    WaitingForAnswer,

    /// SettingRemoteAnswer indicates the peer's answer is being applied.
    SettingRemoteAnswer,

    /// SettingRemoteOffer indicates the peer's offer is being applied and
    /// answered.
    SettingRemoteOffer,

    /// WaitingForOk indicates our answer was sent.
    WaitingForOk,

    /// BrowserError indicates a local transport failure. Terminal.
    BrowserError,

    /// RemoteError indicates the peer failed the exchange. Terminal.
    RemoteError,
}

const NEGOTIATION_STATE_IDLE_STR: &str = "idle";
const NEGOTIATION_STATE_CREATING_LOCAL_OFFER_STR: &str = "creatingLocalOffer";
const NEGOTIATION_STATE_WAITING_FOR_ANSWER_STR: &str = "waitingForAnswer";
const NEGOTIATION_STATE_SETTING_REMOTE_ANSWER_STR: &str = "settingRemoteAnswer";
const NEGOTIATION_STATE_SETTING_REMOTE_OFFER_STR: &str = "settingRemoteOffer";
const NEGOTIATION_STATE_WAITING_FOR_OK_STR: &str = "waitingForOk";
const NEGOTIATION_STATE_BROWSER_ERROR_STR: &str = "browserError";
const NEGOTIATION_STATE_REMOTE_ERROR_STR: &str = "remoteError";

impl From<&str> for NegotiationState {
    fn from(raw: &str) -> Self {
        match raw {
            NEGOTIATION_STATE_IDLE_STR => NegotiationState::Idle,
            NEGOTIATION_STATE_CREATING_LOCAL_OFFER_STR => NegotiationState::CreatingLocalOffer,
            NEGOTIATION_STATE_WAITING_FOR_ANSWER_STR => NegotiationState::WaitingForAnswer,
            NEGOTIATION_STATE_SETTING_REMOTE_ANSWER_STR => NegotiationState::SettingRemoteAnswer,
            NEGOTIATION_STATE_SETTING_REMOTE_OFFER_STR => NegotiationState::SettingRemoteOffer,
            NEGOTIATION_STATE_WAITING_FOR_OK_STR => NegotiationState::WaitingForOk,
            NEGOTIATION_STATE_BROWSER_ERROR_STR => NegotiationState::BrowserError,
            NEGOTIATION_STATE_REMOTE_ERROR_STR => NegotiationState::RemoteError,
            _ => NegotiationState::Unspecified,
        }
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            NegotiationState::Idle => NEGOTIATION_STATE_IDLE_STR,
            NegotiationState::CreatingLocalOffer => NEGOTIATION_STATE_CREATING_LOCAL_OFFER_STR,
            NegotiationState::WaitingForAnswer => NEGOTIATION_STATE_WAITING_FOR_ANSWER_STR,
            NegotiationState::SettingRemoteAnswer => NEGOTIATION_STATE_SETTING_REMOTE_ANSWER_STR,
            NegotiationState::SettingRemoteOffer => NEGOTIATION_STATE_SETTING_REMOTE_OFFER_STR,
            NegotiationState::WaitingForOk => NEGOTIATION_STATE_WAITING_FOR_OK_STR,
            NegotiationState::BrowserError => NEGOTIATION_STATE_BROWSER_ERROR_STR,
            NegotiationState::RemoteError => NEGOTIATION_STATE_REMOTE_ERROR_STR,
            NegotiationState::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

impl NegotiationState {
    /// is_terminal reports whether no further transition can leave this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NegotiationState::BrowserError | NegotiationState::RemoteError
        )
    }
}
