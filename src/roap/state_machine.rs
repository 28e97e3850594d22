//! The ROAP offer/answer state machine.
//!
//! [`RoapStateMachine::handle`] consumes one [`RoapEvent`] at a time and
//! returns the [`RoapAction`]s the caller must carry out, in order. It never
//! awaits and never touches a transport: asynchronous work is requested with
//! an action tagged by an operation id, and its outcome is fed back as a
//! completion event carrying the same id. Completions for an id that is no
//! longer current are dropped.

use rand::Rng;

use super::negotiation_state::NegotiationState;
use super::roap_message::{RoapErrorType, RoapMessage, LOCAL_TIE_BREAKER};
use crate::logger::Logger;

/// Additional offer attempts allowed per logical exchange.
pub const MAX_RETRIES: u32 = 2;

/// Upper bound, in seconds, of the back-off advised when a second offer
/// arrives while one is being answered.
pub const MAX_RETRY_AFTER: u32 = 10;

pub type OpId = u64;

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct NegotiationContext {
    pub seq: u32,
    pub pending_local_offer: bool,
    pub is_handling_offer_request: bool,
    pub retry_counter: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoapEvent {
    InitiateOffer,
    RemoteOffer {
        seq: u32,
        sdp: String,
        tie_breaker: Option<u32>,
    },
    RemoteOfferRequest {
        seq: u32,
        tie_breaker: Option<u32>,
    },
    RemoteAnswer {
        seq: u32,
        sdp: String,
    },
    RemoteOk {
        seq: u32,
    },
    RemoteError {
        seq: u32,
        error_type: RoapErrorType,
        retry_after: Option<u32>,
    },
    LocalOfferCreated {
        op: OpId,
        sdp: String,
    },
    LocalOfferFailed {
        op: OpId,
        error: String,
    },
    RemoteOfferHandled {
        op: OpId,
        sdp: String,
    },
    RemoteOfferFailed {
        op: OpId,
        error: String,
    },
    RemoteAnswerHandled {
        op: OpId,
    },
    RemoteAnswerFailed {
        op: OpId,
        error: String,
    },
}

impl RoapEvent {
    fn name(&self) -> &'static str {
        match self {
            RoapEvent::InitiateOffer => "InitiateOffer",
            RoapEvent::RemoteOffer { .. } => "RemoteOffer",
            RoapEvent::RemoteOfferRequest { .. } => "RemoteOfferRequest",
            RoapEvent::RemoteAnswer { .. } => "RemoteAnswer",
            RoapEvent::RemoteOk { .. } => "RemoteOk",
            RoapEvent::RemoteError { .. } => "RemoteError",
            RoapEvent::LocalOfferCreated { .. } => "LocalOfferCreated",
            RoapEvent::LocalOfferFailed { .. } => "LocalOfferFailed",
            RoapEvent::RemoteOfferHandled { .. } => "RemoteOfferHandled",
            RoapEvent::RemoteOfferFailed { .. } => "RemoteOfferFailed",
            RoapEvent::RemoteAnswerHandled { .. } => "RemoteAnswerHandled",
            RoapEvent::RemoteAnswerFailed { .. } => "RemoteAnswerFailed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoapAction {
    /// Send a message to the remote peer.
    Send(RoapMessage),
    /// Produce the final local offer SDP and report it as LocalOfferCreated.
    CreateLocalOffer { op: OpId },
    /// Apply a remote offer and report the final answer SDP.
    HandleRemoteOffer { op: OpId, sdp: String },
    /// Apply a remote answer.
    HandleRemoteAnswer { op: OpId, sdp: String },
    /// Complete every initiate_offer call waiting for an offer to go out.
    ResolvePendingOffers,
    /// Fail every initiate_offer call still waiting.
    RejectPendingOffers(String),
    /// The engine entered a terminal state.
    NotifyFailure(String),
}

pub struct RoapStateMachine {
    state: NegotiationState,
    ctx: NegotiationContext,
    current_op: Option<OpId>,
    next_op_id: OpId,
    logger: Logger,
}

impl RoapStateMachine {
    pub fn new(initial_seq: u32, logger: Logger) -> Self {
        RoapStateMachine {
            state: NegotiationState::Idle,
            ctx: NegotiationContext {
                seq: initial_seq,
                ..Default::default()
            },
            current_op: None,
            next_op_id: 1,
            logger,
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn context(&self) -> &NegotiationContext {
        &self.ctx
    }

    pub fn seq(&self) -> u32 {
        self.ctx.seq
    }

    /// handle processes one event to completion and returns the actions it
    /// produced.
    pub fn handle(&mut self, event: RoapEvent) -> Vec<RoapAction> {
        let mut actions = vec![];

        if self.state.is_terminal() {
            log_debug!(
                self.logger,
                "ignoring {} in terminal state {}",
                event.name(),
                self.state
            );
            return actions;
        }

        match self.state {
            NegotiationState::Idle => self.handle_idle(event, &mut actions),
            NegotiationState::CreatingLocalOffer => {
                self.handle_creating_local_offer(event, &mut actions)
            }
            NegotiationState::WaitingForAnswer => {
                self.handle_waiting_for_answer(event, &mut actions)
            }
            NegotiationState::SettingRemoteAnswer => {
                self.handle_setting_remote_answer(event, &mut actions)
            }
            NegotiationState::SettingRemoteOffer => {
                self.handle_setting_remote_offer(event, &mut actions)
            }
            NegotiationState::WaitingForOk => self.handle_waiting_for_ok(event, &mut actions),
            _ => {
                log_warn!(
                    self.logger,
                    "ignoring {} in state {}",
                    event.name(),
                    self.state
                );
            }
        }

        actions
    }

    fn handle_idle(&mut self, event: RoapEvent, actions: &mut Vec<RoapAction>) {
        match event {
            RoapEvent::InitiateOffer => {
                if self.advance_seq(actions) {
                    self.enter_creating_local_offer(actions);
                }
            }
            RoapEvent::RemoteOffer { seq, sdp, .. } => {
                if seq <= self.ctx.seq {
                    self.reply_error(actions, seq, RoapErrorType::OutOfOrder);
                } else {
                    self.ctx.seq = seq;
                    self.enter_setting_remote_offer(actions, sdp);
                }
            }
            RoapEvent::RemoteOfferRequest { seq, .. } => {
                if seq <= self.ctx.seq {
                    self.reply_error(actions, seq, RoapErrorType::OutOfOrder);
                } else {
                    self.ctx.seq = seq;
                    self.ctx.is_handling_offer_request = true;
                    self.enter_creating_local_offer(actions);
                }
            }
            RoapEvent::RemoteAnswer { seq, .. } | RoapEvent::RemoteOk { seq } => {
                let name = if matches!(event, RoapEvent::RemoteOk { .. }) {
                    "OK"
                } else {
                    "ANSWER"
                };
                if seq == self.ctx.seq {
                    log_warn!(self.logger, "ignoring duplicate {} seq={}", name, seq);
                } else if seq < self.ctx.seq {
                    self.reply_error(actions, seq, RoapErrorType::OutOfOrder);
                } else {
                    self.reply_error(actions, seq, RoapErrorType::InvalidState);
                }
            }
            event => self.ignore(event),
        }
    }

    fn handle_creating_local_offer(&mut self, event: RoapEvent, actions: &mut Vec<RoapAction>) {
        match event {
            RoapEvent::LocalOfferCreated { op, sdp } if self.is_current(op) => {
                if self.ctx.pending_local_offer {
                    log_info!(
                        self.logger,
                        "another local offer was requested, creating it again"
                    );
                    self.ctx.pending_local_offer = false;
                    self.enter_creating_local_offer(actions);
                    return;
                }

                let message = if self.ctx.is_handling_offer_request {
                    RoapMessage::offer_response(self.ctx.seq, sdp)
                } else {
                    RoapMessage::offer(self.ctx.seq, sdp)
                };
                actions.push(RoapAction::Send(message));
                actions.push(RoapAction::ResolvePendingOffers);
                self.current_op = None;
                self.set_state(NegotiationState::WaitingForAnswer);
            }
            RoapEvent::LocalOfferFailed { op, error } if self.is_current(op) => {
                self.enter_terminal(
                    actions,
                    NegotiationState::BrowserError,
                    format!("failed to create local offer: {error}"),
                );
            }
            RoapEvent::InitiateOffer => self.queue_local_offer(),
            RoapEvent::RemoteOffer {
                seq, tie_breaker, ..
            } => self.handle_glare(actions, seq, tie_breaker, false),
            RoapEvent::RemoteOfferRequest { seq, tie_breaker } => {
                self.handle_glare(actions, seq, tie_breaker, true)
            }
            RoapEvent::RemoteAnswer { seq, .. } | RoapEvent::RemoteOk { seq } => {
                self.reply_error(actions, seq, RoapErrorType::InvalidState);
            }
            event => self.ignore(event),
        }
    }

    fn handle_waiting_for_answer(&mut self, event: RoapEvent, actions: &mut Vec<RoapAction>) {
        match event {
            RoapEvent::RemoteAnswer { seq, sdp } => {
                if seq < self.ctx.seq {
                    self.reply_error(actions, seq, RoapErrorType::OutOfOrder);
                } else {
                    self.ctx.retry_counter = 0;
                    self.ctx.seq = seq;
                    let op = self.next_op();
                    self.set_state(NegotiationState::SettingRemoteAnswer);
                    actions.push(RoapAction::HandleRemoteAnswer { op, sdp });
                }
            }
            RoapEvent::RemoteOffer {
                seq, tie_breaker, ..
            } => self.handle_glare(actions, seq, tie_breaker, false),
            RoapEvent::RemoteOfferRequest { seq, tie_breaker } => {
                self.handle_glare(actions, seq, tie_breaker, true)
            }
            RoapEvent::RemoteError {
                seq, error_type, ..
            } => {
                if seq != self.ctx.seq {
                    log_warn!(
                        self.logger,
                        "ignoring {} error with seq={}, expected seq={}",
                        error_type,
                        seq,
                        self.ctx.seq
                    );
                } else if error_type.is_retryable() && self.ctx.retry_counter < MAX_RETRIES {
                    if !self.advance_seq(actions) {
                        return;
                    }
                    self.ctx.retry_counter += 1;
                    log_info!(
                        self.logger,
                        "remote reported {}, retrying offer (attempt {} of {})",
                        error_type,
                        self.ctx.retry_counter,
                        MAX_RETRIES
                    );
                    self.enter_creating_local_offer(actions);
                } else {
                    self.enter_terminal(
                        actions,
                        NegotiationState::RemoteError,
                        format!("remote rejected offer seq={seq} with {error_type}"),
                    );
                }
            }
            RoapEvent::InitiateOffer => self.queue_local_offer(),
            RoapEvent::RemoteOk { seq } => {
                self.reply_error(actions, seq, RoapErrorType::InvalidState);
            }
            event => self.ignore(event),
        }
    }

    fn handle_setting_remote_answer(&mut self, event: RoapEvent, actions: &mut Vec<RoapAction>) {
        match event {
            RoapEvent::RemoteAnswerHandled { op } if self.is_current(op) => {
                actions.push(RoapAction::Send(RoapMessage::ok(self.ctx.seq)));
                self.ctx.is_handling_offer_request = false;
                self.enter_idle(actions);
            }
            RoapEvent::RemoteAnswerFailed { op, error } if self.is_current(op) => {
                actions.push(RoapAction::Send(RoapMessage::error(
                    self.ctx.seq,
                    RoapErrorType::Failed,
                )));
                self.enter_terminal(
                    actions,
                    NegotiationState::BrowserError,
                    format!("failed to apply remote answer: {error}"),
                );
            }
            RoapEvent::InitiateOffer => self.queue_local_offer(),
            RoapEvent::RemoteOffer { seq, .. } | RoapEvent::RemoteOfferRequest { seq, .. } => {
                self.reply_unexpected_offer(actions, seq);
            }
            RoapEvent::RemoteAnswer { seq, .. } | RoapEvent::RemoteOk { seq } => {
                self.reply_error(actions, seq, RoapErrorType::InvalidState);
            }
            event => self.ignore(event),
        }
    }

    fn handle_setting_remote_offer(&mut self, event: RoapEvent, actions: &mut Vec<RoapAction>) {
        match event {
            RoapEvent::RemoteOfferHandled { op, sdp } if self.is_current(op) => {
                actions.push(RoapAction::Send(RoapMessage::answer(self.ctx.seq, sdp)));
                self.current_op = None;
                self.set_state(NegotiationState::WaitingForOk);
            }
            RoapEvent::RemoteOfferFailed { op, error } if self.is_current(op) => {
                actions.push(RoapAction::Send(RoapMessage::error(
                    self.ctx.seq,
                    RoapErrorType::Failed,
                )));
                self.enter_terminal(
                    actions,
                    NegotiationState::BrowserError,
                    format!("failed to answer remote offer: {error}"),
                );
            }
            RoapEvent::InitiateOffer => self.queue_local_offer(),
            RoapEvent::RemoteOffer { seq, .. } | RoapEvent::RemoteOfferRequest { seq, .. } => {
                if seq == self.ctx.seq {
                    log_warn!(self.logger, "ignoring duplicate offer seq={}", seq);
                } else {
                    let retry_after = rand::rng().random_range(0..=MAX_RETRY_AFTER);
                    log_info!(
                        self.logger,
                        "offer seq={} arrived while answering seq={}, asking to retry after {}s",
                        seq,
                        self.ctx.seq,
                        retry_after
                    );
                    actions.push(RoapAction::Send(RoapMessage::error_with_retry_after(
                        seq,
                        RoapErrorType::Failed,
                        retry_after,
                    )));
                }
            }
            RoapEvent::RemoteAnswer { seq, .. } | RoapEvent::RemoteOk { seq } => {
                self.reply_error(actions, seq, RoapErrorType::InvalidState);
            }
            event => self.ignore(event),
        }
    }

    fn handle_waiting_for_ok(&mut self, event: RoapEvent, actions: &mut Vec<RoapAction>) {
        match event {
            RoapEvent::RemoteOk { seq } => {
                if seq < self.ctx.seq {
                    self.reply_error(actions, seq, RoapErrorType::OutOfOrder);
                } else {
                    self.ctx.seq = seq;
                    self.enter_idle(actions);
                }
            }
            RoapEvent::RemoteOffer { seq, .. } | RoapEvent::RemoteOfferRequest { seq, .. } => {
                self.reply_unexpected_offer(actions, seq);
            }
            RoapEvent::RemoteError {
                seq, error_type, ..
            } => {
                if seq == self.ctx.seq {
                    self.enter_terminal(
                        actions,
                        NegotiationState::RemoteError,
                        format!("remote rejected answer seq={seq} with {error_type}"),
                    );
                } else {
                    log_warn!(
                        self.logger,
                        "ignoring {} error with seq={}, expected seq={}",
                        error_type,
                        seq,
                        self.ctx.seq
                    );
                }
            }
            RoapEvent::InitiateOffer => self.queue_local_offer(),
            RoapEvent::RemoteAnswer { seq, .. } => {
                self.reply_error(actions, seq, RoapErrorType::InvalidState);
            }
            event => self.ignore(event),
        }
    }

    /// handle_glare answers a remote offer or offer request that collides
    /// with our own offer. The local offer always proceeds.
    fn handle_glare(
        &mut self,
        actions: &mut Vec<RoapAction>,
        seq: u32,
        tie_breaker: Option<u32>,
        is_offer_request: bool,
    ) {
        if is_offer_request && self.ctx.is_handling_offer_request && seq == self.ctx.seq {
            log_warn!(
                self.logger,
                "ignoring duplicate offer request seq={} already being handled",
                seq
            );
            return;
        }

        let error_type = if tie_breaker == Some(LOCAL_TIE_BREAKER) {
            RoapErrorType::DoubleConflict
        } else {
            RoapErrorType::Conflict
        };
        log_info!(
            self.logger,
            "glare in {}: remote seq={} tieBreaker={:?}, replying {}",
            self.state,
            seq,
            tie_breaker,
            error_type
        );
        self.reply_error(actions, seq, error_type);
    }

    fn reply_unexpected_offer(&mut self, actions: &mut Vec<RoapAction>, seq: u32) {
        if seq == self.ctx.seq {
            log_warn!(self.logger, "ignoring duplicate offer seq={}", seq);
        } else {
            self.reply_error(actions, seq, RoapErrorType::InvalidState);
        }
    }

    fn reply_error(&self, actions: &mut Vec<RoapAction>, seq: u32, error_type: RoapErrorType) {
        log_warn!(
            self.logger,
            "replying {} to seq={} in state {} (current seq={})",
            error_type,
            seq,
            self.state,
            self.ctx.seq
        );
        actions.push(RoapAction::Send(RoapMessage::error(seq, error_type)));
    }

    fn queue_local_offer(&mut self) {
        log_debug!(self.logger, "queueing local offer in state {}", self.state);
        self.ctx.pending_local_offer = true;
    }

    fn ignore(&self, event: RoapEvent) {
        match event {
            RoapEvent::RemoteError {
                seq, error_type, ..
            } => log_warn!(
                self.logger,
                "ignoring {} error seq={} in state {}",
                error_type,
                seq,
                self.state
            ),
            event => log_debug!(
                self.logger,
                "ignoring stale {} in state {}",
                event.name(),
                self.state
            ),
        }
    }

    fn is_current(&self, op: OpId) -> bool {
        self.current_op == Some(op)
    }

    fn next_op(&mut self) -> OpId {
        let op = self.next_op_id;
        self.next_op_id += 1;
        self.current_op = Some(op);
        op
    }

    fn set_state(&mut self, state: NegotiationState) {
        log_info!(
            self.logger,
            "state changed from {} to {} (seq={})",
            self.state,
            state,
            self.ctx.seq
        );
        self.state = state;
    }

    fn enter_creating_local_offer(&mut self, actions: &mut Vec<RoapAction>) {
        let op = self.next_op();
        self.set_state(NegotiationState::CreatingLocalOffer);
        actions.push(RoapAction::CreateLocalOffer { op });
    }

    fn enter_setting_remote_offer(&mut self, actions: &mut Vec<RoapAction>, sdp: String) {
        let op = self.next_op();
        self.set_state(NegotiationState::SettingRemoteOffer);
        actions.push(RoapAction::HandleRemoteOffer { op, sdp });
    }

    fn enter_idle(&mut self, actions: &mut Vec<RoapAction>) {
        self.current_op = None;
        self.set_state(NegotiationState::Idle);
        if self.ctx.pending_local_offer {
            self.ctx.pending_local_offer = false;
            if self.advance_seq(actions) {
                self.enter_creating_local_offer(actions);
            }
        }
    }

    /// advance_seq takes the next seq for a local offer. When the seq space
    /// is exhausted the negotiation ends in BrowserError instead.
    fn advance_seq(&mut self, actions: &mut Vec<RoapAction>) -> bool {
        match self.ctx.seq.checked_add(1) {
            Some(seq) => {
                self.ctx.seq = seq;
                true
            }
            None => {
                self.enter_terminal(
                    actions,
                    NegotiationState::BrowserError,
                    format!("no seq left for a local offer after seq={}", self.ctx.seq),
                );
                false
            }
        }
    }

    fn enter_terminal(
        &mut self,
        actions: &mut Vec<RoapAction>,
        state: NegotiationState,
        reason: String,
    ) {
        self.current_op = None;
        self.set_state(state);
        log_error!(self.logger, "{}", reason);
        actions.push(RoapAction::RejectPendingOffers(reason.clone()));
        actions.push(RoapAction::NotifyFailure(reason));
    }
}
