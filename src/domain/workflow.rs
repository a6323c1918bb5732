//! The kiosk workflow as a pure state machine.
//!
//! [`Workflow::dispatch`] applies one event, runs the entry and exit actions of
//! every state it passes through, and settles eventless transitions before
//! returning. It performs no I/O: anything that has to happen outside the
//! machine is returned as an [`Effect`] for the engine to execute.

use super::card::parse_card_number;
use super::context::{PrinterSession, WorkflowContext};
use super::ticket::{TicketTemplate, format_ticket};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error};

/// Children of the printer-connection composite state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrinterPhase {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowState {
    ConnectingPrinter(PrinterPhase),
    AwaitingCard,
    ProcessingTransaction,
    TransactionProcessed,
}

impl WorkflowState {
    pub const INITIAL: Self = Self::ConnectingPrinter(PrinterPhase::Disconnected);

    /// Dotted path of the active state, e.g. `ConnectingPrinter.Connecting`.
    pub fn path(&self) -> &'static str {
        match self {
            Self::ConnectingPrinter(PrinterPhase::Disconnected) => "ConnectingPrinter.Disconnected",
            Self::ConnectingPrinter(PrinterPhase::Connecting) => "ConnectingPrinter.Connecting",
            Self::ConnectingPrinter(PrinterPhase::Connected) => "ConnectingPrinter.Connected",
            Self::AwaitingCard => "AwaitingCard",
            Self::ProcessingTransaction => "ProcessingTransaction",
            Self::TransactionProcessed => "TransactionProcessed",
        }
    }

    /// True while an adapter call is outstanding.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::ConnectingPrinter(PrinterPhase::Connecting) | Self::ProcessingTransaction
        )
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Inputs accepted from outside the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KioskInput {
    RequestConnect,
    CardDataReceived(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    RequestConnect,
    CardDataReceived(String),
    ConnectSucceeded(PrinterSession),
    ConnectFailed,
    ChargeSucceeded,
    ChargeFailed,
    CoolDownElapsed { timer: u64 },
}

impl From<KioskInput> for Event {
    fn from(input: KioskInput) -> Self {
        match input {
            KioskInput::RequestConnect => Event::RequestConnect,
            KioskInput::CardDataReceived(payload) => Event::CardDataReceived(payload),
        }
    }
}

/// Work the machine needs done outside itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Connect,
    Charge { card_payload: String },
    Print { session: PrinterSession, ticket: Vec<String> },
    ArmCoolDown { timer: u64 },
    CancelCoolDown { timer: u64 },
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    pub effects: Vec<Effect>,
    /// Whether the state or the context changed.
    pub changed: bool,
}

/// Guard for the automatic `AwaitingCard -> ProcessingTransaction` transition.
pub fn card_number_received(context: &WorkflowContext) -> bool {
    parse_card_number(context.raw_card_data.as_deref()).is_some()
}

pub struct Workflow {
    state: WorkflowState,
    context: WorkflowContext,
    template: TicketTemplate,
    next_timer: u64,
    armed_timer: Option<u64>,
}

impl Workflow {
    pub fn new(template: TicketTemplate) -> Self {
        Self {
            state: WorkflowState::INITIAL,
            context: WorkflowContext::new(),
            template,
            next_timer: 0,
            armed_timer: None,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn context(&self) -> &WorkflowContext {
        &self.context
    }

    /// Applies one event and settles the machine.
    ///
    /// Events that have no transition from the current state are ignored and
    /// reported with `changed == false`.
    pub fn dispatch(&mut self, event: Event) -> Outcome {
        let mut outcome = Outcome::default();

        match (self.state, event) {
            (WorkflowState::ConnectingPrinter(PrinterPhase::Disconnected), Event::RequestConnect) => {
                self.transition(
                    WorkflowState::ConnectingPrinter(PrinterPhase::Connecting),
                    &mut outcome,
                );
            }
            (
                WorkflowState::ConnectingPrinter(PrinterPhase::Connecting),
                Event::ConnectSucceeded(session),
            ) => {
                self.context.printer_session = Some(session);
                self.transition(
                    WorkflowState::ConnectingPrinter(PrinterPhase::Connected),
                    &mut outcome,
                );
            }
            (WorkflowState::ConnectingPrinter(PrinterPhase::Connecting), Event::ConnectFailed) => {
                self.transition(
                    WorkflowState::ConnectingPrinter(PrinterPhase::Disconnected),
                    &mut outcome,
                );
            }
            (WorkflowState::AwaitingCard, Event::CardDataReceived(payload)) => {
                self.context.raw_card_data = Some(payload);
                outcome.changed = true;
            }
            (WorkflowState::ProcessingTransaction, Event::ChargeSucceeded) => {
                self.transition(WorkflowState::TransactionProcessed, &mut outcome);
            }
            (WorkflowState::ProcessingTransaction, Event::ChargeFailed) => {
                self.transition(WorkflowState::AwaitingCard, &mut outcome);
            }
            (WorkflowState::TransactionProcessed, Event::CoolDownElapsed { timer })
                if self.armed_timer == Some(timer) =>
            {
                self.transition(WorkflowState::AwaitingCard, &mut outcome);
            }
            (state, event) => {
                debug!(state = %state, event = event_name(&event), "event ignored");
                return outcome;
            }
        }

        self.settle(&mut outcome);
        outcome
    }

    /// Takes eventless transitions until the state is stable.
    fn settle(&mut self, outcome: &mut Outcome) {
        loop {
            let next = match self.state {
                // Final child: the composite is done.
                WorkflowState::ConnectingPrinter(PrinterPhase::Connected) => {
                    WorkflowState::AwaitingCard
                }
                WorkflowState::AwaitingCard if card_number_received(&self.context) => {
                    WorkflowState::ProcessingTransaction
                }
                _ => return,
            };
            self.transition(next, outcome);
        }
    }

    fn transition(&mut self, target: WorkflowState, outcome: &mut Outcome) {
        self.exit(outcome);
        debug!(from = %self.state, to = %target, "transition");
        self.state = target;
        self.enter(outcome);
        outcome.changed = true;
    }

    fn exit(&mut self, outcome: &mut Outcome) {
        if self.state == WorkflowState::TransactionProcessed
            && let Some(timer) = self.armed_timer.take()
        {
            outcome.effects.push(Effect::CancelCoolDown { timer });
        }
    }

    fn enter(&mut self, outcome: &mut Outcome) {
        match self.state {
            WorkflowState::ConnectingPrinter(PrinterPhase::Connecting) => {
                outcome.effects.push(Effect::Connect);
            }
            WorkflowState::AwaitingCard => {
                self.context.raw_card_data = None;
            }
            WorkflowState::ProcessingTransaction => {
                if let Some(card_payload) = self.context.raw_card_data.clone() {
                    outcome.effects.push(Effect::Charge { card_payload });
                }
            }
            WorkflowState::TransactionProcessed => {
                self.context.ticket_sequence += 1;
                self.print_ticket(outcome);

                let timer = self.next_timer;
                self.next_timer += 1;
                self.armed_timer = Some(timer);
                outcome.effects.push(Effect::ArmCoolDown { timer });
            }
            WorkflowState::ConnectingPrinter(_) => {}
        }
    }

    fn print_ticket(&self, outcome: &mut Outcome) {
        let Some(session) = self.context.printer_session.clone() else {
            error!(
                ticket = self.context.ticket_sequence,
                "no printer session, ticket not printed"
            );
            return;
        };

        match format_ticket(&self.context, &self.template) {
            Ok(ticket) => outcome.effects.push(Effect::Print { session, ticket }),
            Err(e) => error!(ticket = self.context.ticket_sequence, error = %e, "ticket not printed"),
        }
    }
}

fn event_name(event: &Event) -> &'static str {
    match event {
        Event::RequestConnect => "RequestConnect",
        Event::CardDataReceived(_) => "CardDataReceived",
        Event::ConnectSucceeded(_) => "ConnectSucceeded",
        Event::ConnectFailed => "ConnectFailed",
        Event::ChargeSucceeded => "ChargeSucceeded",
        Event::ChargeFailed => "ChargeFailed",
        Event::CoolDownElapsed { .. } => "CoolDownElapsed",
    }
}
