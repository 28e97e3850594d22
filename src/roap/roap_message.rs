use std::fmt;

use serde::{Deserialize, Serialize};

/// The tie-breaker this implementation puts on every OFFER it sends.
pub const LOCAL_TIE_BREAKER: u32 = 0xFFFF_FFFE;

/// RoapMessageType names the kind of a ROAP message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoapMessageType {
    #[serde(rename = "OFFER")]
    Offer,
    #[serde(rename = "OFFER_REQUEST")]
    OfferRequest,
    #[serde(rename = "OFFER_RESPONSE")]
    OfferResponse,
    #[serde(rename = "ANSWER")]
    Answer,
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

impl fmt::Display for RoapMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RoapMessageType::Offer => "OFFER",
            RoapMessageType::OfferRequest => "OFFER_REQUEST",
            RoapMessageType::OfferResponse => "OFFER_RESPONSE",
            RoapMessageType::Answer => "ANSWER",
            RoapMessageType::Ok => "OK",
            RoapMessageType::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

/// RoapErrorType is carried by ERROR messages.
///
/// Values this implementation does not know deserialize to `Unknown`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoapErrorType {
    #[serde(rename = "DOUBLECONFLICT")]
    DoubleConflict,
    #[serde(rename = "CONFLICT")]
    Conflict,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "INVALID_STATE")]
    InvalidState,
    #[serde(rename = "OUT_OF_ORDER")]
    OutOfOrder,
    #[serde(rename = "RETRY")]
    Retry,
    #[serde(other)]
    Unknown,
}

impl RoapErrorType {
    /// is_retryable reports whether a peer's error of this type lets the
    /// offerer try again with a new seq.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RoapErrorType::DoubleConflict
                | RoapErrorType::InvalidState
                | RoapErrorType::OutOfOrder
                | RoapErrorType::Retry
        )
    }
}

impl fmt::Display for RoapErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RoapErrorType::DoubleConflict => "DOUBLECONFLICT",
            RoapErrorType::Conflict => "CONFLICT",
            RoapErrorType::Failed => "FAILED",
            RoapErrorType::InvalidState => "INVALID_STATE",
            RoapErrorType::OutOfOrder => "OUT_OF_ORDER",
            RoapErrorType::Retry => "RETRY",
            RoapErrorType::Unknown => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

/// RoapMessage is one signaling message exchanged with the remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoapMessage {
    pub seq: u32,
    pub message_type: RoapMessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tie_breaker: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<RoapErrorType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u32>,
}

impl RoapMessage {
    fn new(seq: u32, message_type: RoapMessageType) -> Self {
        RoapMessage {
            seq,
            message_type,
            sdp: None,
            tie_breaker: None,
            error_type: None,
            retry_after: None,
        }
    }

    pub fn offer(seq: u32, sdp: String) -> Self {
        RoapMessage {
            sdp: Some(sdp),
            tie_breaker: Some(LOCAL_TIE_BREAKER),
            ..RoapMessage::new(seq, RoapMessageType::Offer)
        }
    }

    pub fn offer_request(seq: u32, tie_breaker: u32) -> Self {
        RoapMessage {
            tie_breaker: Some(tie_breaker),
            ..RoapMessage::new(seq, RoapMessageType::OfferRequest)
        }
    }

    pub fn offer_response(seq: u32, sdp: String) -> Self {
        RoapMessage {
            sdp: Some(sdp),
            ..RoapMessage::new(seq, RoapMessageType::OfferResponse)
        }
    }

    pub fn answer(seq: u32, sdp: String) -> Self {
        RoapMessage {
            sdp: Some(sdp),
            ..RoapMessage::new(seq, RoapMessageType::Answer)
        }
    }

    pub fn ok(seq: u32) -> Self {
        RoapMessage::new(seq, RoapMessageType::Ok)
    }

    pub fn error(seq: u32, error_type: RoapErrorType) -> Self {
        RoapMessage {
            error_type: Some(error_type),
            ..RoapMessage::new(seq, RoapMessageType::Error)
        }
    }

    /// error_with_retry_after builds a FAILED-style error advising the peer
    /// to back off for the given number of seconds.
    pub fn error_with_retry_after(seq: u32, error_type: RoapErrorType, retry_after: u32) -> Self {
        RoapMessage {
            retry_after: Some(retry_after),
            ..RoapMessage::error(seq, error_type)
        }
    }

    /// from_json parses a message received from the relay channel.
    pub fn from_json(raw: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl fmt::Display for RoapMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(seq={}", self.message_type, self.seq)?;
        if let Some(error_type) = &self.error_type {
            write!(f, ", errorType={error_type}")?;
        }
        if let Some(tie_breaker) = self.tie_breaker {
            write!(f, ", tieBreaker={tie_breaker:#x}")?;
        }
        write!(f, ")")
    }
}
