//! ROAP offer/answer negotiation.
//!
//! [`Roap`] runs a [`state_machine::RoapStateMachine`] on its own task. Every
//! input, whether a local request, an inbound message or the completion of
//! a transport operation, goes through one queue, so events are processed
//! one at a time and in arrival order. The engine never sees a transport: it
//! drives one only through the [`RoapCallbacks`] it is given.


pub mod negotiation_state;
pub mod roap_message;
pub mod state_machine;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

pub use negotiation_state::NegotiationState;
use roap_message::{RoapErrorType, RoapMessage, RoapMessageType};
use state_machine::{RoapAction, RoapEvent, RoapStateMachine};

use crate::error::{Error, Result};
use crate::logger::Logger;

/// RoapCallbacks performs the transport work the engine asks for.
#[async_trait::async_trait]
pub trait RoapCallbacks: Send + Sync + 'static {
    /// create_local_offer returns the final local offer SDP, after ICE
    /// gathering has finished.
    async fn create_local_offer(&self) -> Result<String>;

    /// handle_remote_offer applies a remote offer and returns the final
    /// local answer SDP.
    async fn handle_remote_offer(&self, sdp: String) -> Result<String>;

    async fn handle_remote_answer(&self, sdp: String) -> Result<()>;
}

/// Trait for handling engine output asynchronously.
///
/// All methods have default no-op implementations. They run on the engine
/// task: an implementation must not wait on the engine it belongs to.
#[async_trait::async_trait]
pub trait RoapEventHandler: Send + Sync + 'static {
    /// Called with every message that must be relayed to the remote peer
    async fn on_roap_message_to_send(&self, _message: RoapMessage) {}

    /// Called once when the engine enters BrowserError or RemoteError
    async fn on_roap_failure(&self, _reason: String) {}
}

/// RoapSnapshot is the engine state published after every event.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RoapSnapshot {
    pub state: NegotiationState,
    pub seq: u32,
}

enum RoapCommand {
    Event(RoapEvent),
    InitiateOffer(oneshot::Sender<Result<()>>),
    Stop,
}

/// Roap is a handle to a running negotiation engine.
///
/// Dropping the handle, or calling [`Roap::stop`], ends the engine task.
pub struct Roap {
    tx: mpsc::UnboundedSender<RoapCommand>,
    snapshot: watch::Receiver<RoapSnapshot>,
    logger: Logger,
}

impl Roap {
    /// new starts an engine in Idle with the given initial seq.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        callbacks: Arc<dyn RoapCallbacks>,
        handler: Arc<dyn RoapEventHandler>,
        initial_seq: Option<u32>,
        logger: Logger,
    ) -> Self {
        let machine = RoapStateMachine::new(initial_seq.unwrap_or(0), logger.clone());
        let (snapshot_tx, snapshot) = watch::channel(RoapSnapshot {
            state: machine.state(),
            seq: machine.seq(),
        });
        let (tx, rx) = mpsc::unbounded_channel();

        let driver = RoapDriver {
            machine,
            callbacks,
            handler,
            pending_offers: vec![],
            snapshot_tx,
            tx: tx.downgrade(),
            logger: logger.clone(),
        };
        tokio::spawn(driver.run(rx));

        Roap {
            tx,
            snapshot,
            logger,
        }
    }

    /// initiate_offer starts (or queues) a local offer. It resolves once the
    /// offer carrying this request has been handed to the event handler, and
    /// fails if the engine enters a terminal state first.
    pub async fn initiate_offer(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(RoapCommand::InitiateOffer(done_tx))
            .map_err(|_| Error::ErrRoapStopped)?;
        done_rx.await.map_err(|_| Error::ErrRoapStopped)?
    }

    /// roap_message_received queues an inbound message for the engine.
    pub fn roap_message_received(&self, message: RoapMessage) -> Result<()> {
        log_debug!(self.logger, "received {}", message);
        let event = event_from_message(message)?;
        self.tx
            .send(RoapCommand::Event(event))
            .map_err(|_| Error::ErrRoapStopped)
    }

    pub fn state(&self) -> NegotiationState {
        self.snapshot.borrow().state
    }

    pub fn seq(&self) -> u32 {
        self.snapshot.borrow().seq
    }

    /// subscribe returns a receiver observing every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<RoapSnapshot> {
        self.snapshot.clone()
    }

    /// stop ends the engine task. Waiting initiate_offer calls fail with
    /// ErrRoapStopped.
    pub fn stop(&self) {
        let _ = self.tx.send(RoapCommand::Stop);
    }
}

fn event_from_message(message: RoapMessage) -> Result<RoapEvent> {
    let RoapMessage {
        seq,
        message_type,
        sdp,
        tie_breaker,
        error_type,
        retry_after,
    } = message;
    let require_sdp =
        |sdp: Option<String>| sdp.ok_or_else(|| Error::ErrRoapMessageMissingSdp(message_type.to_string()));

    let event = match message_type {
        RoapMessageType::Offer => RoapEvent::RemoteOffer {
            seq,
            sdp: require_sdp(sdp)?,
            tie_breaker,
        },
        RoapMessageType::OfferResponse => RoapEvent::RemoteOffer {
            seq,
            sdp: require_sdp(sdp)?,
            tie_breaker: None,
        },
        RoapMessageType::OfferRequest => RoapEvent::RemoteOfferRequest { seq, tie_breaker },
        RoapMessageType::Answer => RoapEvent::RemoteAnswer {
            seq,
            sdp: require_sdp(sdp)?,
        },
        RoapMessageType::Ok => RoapEvent::RemoteOk { seq },
        RoapMessageType::Error => RoapEvent::RemoteError {
            seq,
            error_type: error_type.unwrap_or(RoapErrorType::Unknown),
            retry_after,
        },
    };
    Ok(event)
}

struct RoapDriver {
    machine: RoapStateMachine,
    callbacks: Arc<dyn RoapCallbacks>,
    handler: Arc<dyn RoapEventHandler>,
    pending_offers: Vec<oneshot::Sender<Result<()>>>,
    snapshot_tx: watch::Sender<RoapSnapshot>,
    tx: mpsc::WeakUnboundedSender<RoapCommand>,
    logger: Logger,
}

impl RoapDriver {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RoapCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                RoapCommand::Event(event) => self.process(event).await,
                RoapCommand::InitiateOffer(done) => {
                    let state = self.machine.state();
                    if state.is_terminal() {
                        let _ = done.send(Err(Error::ErrRoapTerminal(state.to_string())));
                        continue;
                    }
                    self.pending_offers.push(done);
                    self.process(RoapEvent::InitiateOffer).await;
                }
                RoapCommand::Stop => break,
            }
        }
        drop(rx);

        log_debug!(self.logger, "negotiation engine stopped");
        for done in self.pending_offers.drain(..) {
            let _ = done.send(Err(Error::ErrRoapStopped));
        }
    }

    async fn process(&mut self, event: RoapEvent) {
        let actions = self.machine.handle(event);
        self.snapshot_tx.send_replace(RoapSnapshot {
            state: self.machine.state(),
            seq: self.machine.seq(),
        });

        for action in actions {
            self.perform(action).await;
        }
    }

    async fn perform(&mut self, action: RoapAction) {
        match action {
            RoapAction::Send(message) => {
                log_debug!(self.logger, "sending {}", message);
                self.handler.on_roap_message_to_send(message).await;
            }
            RoapAction::CreateLocalOffer { op } => {
                let callbacks = Arc::clone(&self.callbacks);
                self.spawn_op(async move {
                    match callbacks.create_local_offer().await {
                        Ok(sdp) => RoapEvent::LocalOfferCreated { op, sdp },
                        Err(err) => RoapEvent::LocalOfferFailed {
                            op,
                            error: err.to_string(),
                        },
                    }
                });
            }
            RoapAction::HandleRemoteOffer { op, sdp } => {
                let callbacks = Arc::clone(&self.callbacks);
                self.spawn_op(async move {
                    match callbacks.handle_remote_offer(sdp).await {
                        Ok(sdp) => RoapEvent::RemoteOfferHandled { op, sdp },
                        Err(err) => RoapEvent::RemoteOfferFailed {
                            op,
                            error: err.to_string(),
                        },
                    }
                });
            }
            RoapAction::HandleRemoteAnswer { op, sdp } => {
                let callbacks = Arc::clone(&self.callbacks);
                self.spawn_op(async move {
                    match callbacks.handle_remote_answer(sdp).await {
                        Ok(()) => RoapEvent::RemoteAnswerHandled { op },
                        Err(err) => RoapEvent::RemoteAnswerFailed {
                            op,
                            error: err.to_string(),
                        },
                    }
                });
            }
            RoapAction::ResolvePendingOffers => {
                for done in self.pending_offers.drain(..) {
                    let _ = done.send(Ok(()));
                }
            }
            RoapAction::RejectPendingOffers(reason) => {
                for done in self.pending_offers.drain(..) {
                    let _ = done.send(Err(Error::ErrLocalOfferFailed(reason.clone())));
                }
            }
            RoapAction::NotifyFailure(reason) => {
                self.handler.on_roap_failure(reason).await;
            }
        }
    }

    /// spawn_op runs an async operation off the engine task and queues its
    /// completion event.
    fn spawn_op<F>(&self, op: F)
    where
        F: std::future::Future<Output = RoapEvent> + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = op.await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(RoapCommand::Event(event));
            }
        });
    }
}
