//! ROAP-negotiated media session.
//!
//! [`RoapMediaConnection`] ties a [`MediaConnection`] to the [`Roap`] engine
//! that negotiates it, and reports the events of both through one
//! [`RoapMediaConnectionEventHandler`].

#[cfg(test)]
mod roap_media_connection_test;

pub mod event_handler;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use event_handler::RoapMediaConnectionEventHandler;
use event_handler::{EventForwarder, NoopEventHandler};

use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::media_connection::configuration::MediaConnectionConfig;
use crate::media_connection::connection_state::ConnectionState;
use crate::media_connection::{
    LocalTrackUpdate, LocalTracks, MediaConnection, MediaConnectionEventHandler, ReceiveOptions,
};
use crate::roap::roap_message::{RoapMessage, RoapMessageType};
use crate::roap::{NegotiationState, Roap, RoapCallbacks, RoapEventHandler};
use crate::transport::stats::StatsReport;
use crate::transport::TransportFactory;

/// RoapMediaConnectionBuilder creates a [`RoapMediaConnection`]. Only the
/// transport factory is required.
#[derive(Default)]
pub struct RoapMediaConnectionBuilder {
    config: Option<MediaConnectionConfig>,
    transport_factory: Option<Arc<dyn TransportFactory>>,
    local_tracks: Option<LocalTracks>,
    receive_options: Option<ReceiveOptions>,
    event_handler: Option<Arc<dyn RoapMediaConnectionEventHandler>>,
    logger: Option<Logger>,
    initial_seq: Option<u32>,
}

impl RoapMediaConnectionBuilder {
    pub fn new() -> Self {
        RoapMediaConnectionBuilder::default()
    }

    pub fn with_config(mut self, config: MediaConnectionConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_transport_factory(mut self, transport_factory: Arc<dyn TransportFactory>) -> Self {
        self.transport_factory = Some(transport_factory);
        self
    }

    pub fn with_local_tracks(mut self, local_tracks: LocalTracks) -> Self {
        self.local_tracks = Some(local_tracks);
        self
    }

    pub fn with_receive_options(mut self, receive_options: ReceiveOptions) -> Self {
        self.receive_options = Some(receive_options);
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn RoapMediaConnectionEventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// with_initial_seq sets the seq the negotiation starts from, e.g. to
    /// continue numbering after a session was recreated.
    pub fn with_initial_seq(mut self, seq: u32) -> Self {
        self.initial_seq = Some(seq);
        self
    }

    /// build validates the configuration, creates the transport and starts
    /// the negotiation engine in Idle.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn build(mut self) -> Result<RoapMediaConnection> {
        let transport_factory = self
            .transport_factory
            .take()
            .ok_or_else(|| Error::ErrConfig("transport factory is required".to_owned()))?;
        let logger = self.logger.take().unwrap_or_default();
        let handler = if let Some(handler) = self.event_handler.take() {
            handler
        } else {
            Arc::new(NoopEventHandler)
        };
        let forwarder = Arc::new(EventForwarder::new(handler));

        let media_connection = MediaConnection::new(
            self.config.take().unwrap_or_default(),
            transport_factory.as_ref(),
            self.local_tracks.take().unwrap_or_default(),
            self.receive_options.take().unwrap_or_default(),
            Arc::clone(&forwarder) as Arc<dyn MediaConnectionEventHandler>,
            logger.with_target("media_connection"),
        )
        .await?;

        let roap = Roap::new(
            Arc::clone(&media_connection) as Arc<dyn RoapCallbacks>,
            Arc::clone(&forwarder) as Arc<dyn RoapEventHandler>,
            self.initial_seq,
            logger.with_target("roap"),
        );

        Ok(RoapMediaConnection {
            media_connection,
            roap,
            forwarder,
            message_received: AtomicBool::new(false),
            is_closed: AtomicBool::new(false),
            logger,
        })
    }
}

/// RoapMediaConnection is a media session negotiated over ROAP.
///
/// Outgoing ROAP messages are handed to the event handler. The application
/// relays them to the remote peer and feeds the replies back through
/// [`RoapMediaConnection::roap_message_received`].
pub struct RoapMediaConnection {
    media_connection: Arc<MediaConnection>,
    roap: Roap,
    forwarder: Arc<EventForwarder>,
    message_received: AtomicBool,
    is_closed: AtomicBool,
    logger: Logger,
}

impl RoapMediaConnection {
    fn check_closed(&self) -> Result<()> {
        if self.is_closed.load(Ordering::SeqCst) {
            Err(Error::ErrConnectionClosed)
        } else {
            Ok(())
        }
    }

    /// initiate_offer creates the transceivers and sends the first offer.
    /// It resolves once the offer was handed to the event handler.
    ///
    /// A second call fails with ErrAlreadyNegotiating and does nothing.
    pub async fn initiate_offer(&self) -> Result<()> {
        self.check_closed()?;
        self.media_connection.initiate_offer().await?;
        log_info!(self.logger, "initiating offer");
        self.roap.initiate_offer().await
    }

    /// roap_message_received passes a message from the remote peer to the
    /// negotiation engine. An OFFER arriving as the very first message
    /// prepares the session to answer it.
    pub async fn roap_message_received(&self, message: RoapMessage) -> Result<()> {
        self.check_closed()?;
        let first = !self.message_received.swap(true, Ordering::SeqCst);
        if first && message.message_type == RoapMessageType::Offer {
            match self.media_connection.initialize_incoming().await {
                Ok(()) => log_info!(self.logger, "answering incoming offer seq={}", message.seq),
                Err(Error::ErrAlreadyNegotiating) => {
                    log_debug!(self.logger, "first offer arrived after local offer");
                }
                Err(err) => return Err(err),
            }
        }
        self.roap.roap_message_received(message)
    }

    pub async fn update_send_options(&self, tracks: LocalTrackUpdate) -> Result<()> {
        self.update_send_receive_options(tracks, None).await
    }

    pub async fn update_receive_options(&self, receive_options: ReceiveOptions) -> Result<()> {
        self.update_send_receive_options(LocalTrackUpdate::default(), Some(receive_options))
            .await
    }

    /// update_send_receive_options applies new local tracks and receive
    /// options and starts a new offer when a transceiver direction changed.
    pub async fn update_send_receive_options(
        &self,
        tracks: LocalTrackUpdate,
        receive_options: Option<ReceiveOptions>,
    ) -> Result<()> {
        self.check_closed()?;
        let renegotiate = self
            .media_connection
            .update_send_receive_options(tracks, receive_options)
            .await?;
        if renegotiate {
            log_info!(self.logger, "transceiver directions changed, renegotiating");
            self.roap.initiate_offer().await?;
        }
        Ok(())
    }

    pub async fn insert_dtmf(
        &self,
        tones: &str,
        duration: Option<Duration>,
        inter_tone_gap: Option<Duration>,
    ) -> Result<()> {
        self.check_closed()?;
        self.media_connection
            .insert_dtmf(tones, duration, inter_tone_gap)
            .await
    }

    pub async fn get_stats(&self) -> Result<StatsReport> {
        self.check_closed()?;
        self.media_connection.get_stats().await
    }

    pub fn get_connection_state(&self) -> ConnectionState {
        self.media_connection.get_connection_state()
    }

    pub fn get_negotiation_state(&self) -> NegotiationState {
        self.roap.state()
    }

    /// media_connection exposes the underlying session, e.g. to reach a
    /// transceiver.
    pub fn media_connection(&self) -> &Arc<MediaConnection> {
        &self.media_connection
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::SeqCst)
    }

    /// close stops the negotiation, closes the transport and detaches the
    /// event handler. The handler still sees the Closed connection state.
    /// Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.is_closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        log_info!(self.logger, "closing roap media connection");
        self.roap.stop();
        let result = self.media_connection.close().await;
        self.forwarder.detach();
        result
    }
}
