#![warn(rust_2018_idioms)]
#![allow(dead_code)]

#[macro_use]
pub mod logger;

pub mod error;
pub mod media_connection;
pub mod roap;
pub mod roap_media_connection;
pub mod rtp_transceiver;
pub mod transport;

pub use error::{Error, Result};
pub use logger::Logger;
pub use media_connection::configuration::{BandwidthLimits, MediaConnectionConfig, SdpMungingConfig};
pub use media_connection::connection_state::ConnectionState;
pub use media_connection::{LocalTrackUpdate, LocalTracks, MediaConnection, ReceiveOptions};
pub use roap::roap_message::{RoapErrorType, RoapMessage, RoapMessageType};
pub use roap::{NegotiationState, Roap};
pub use roap_media_connection::{
    RoapMediaConnection, RoapMediaConnectionBuilder, RoapMediaConnectionEventHandler,
};
pub use rtp_transceiver::media_kind::MediaKind;
pub use rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;

#[macro_use]
extern crate lazy_static;

pub(crate) const UNSPECIFIED_STR: &str = "Unspecified";
