use crate::application::engine::TransitionNotice;
use crate::domain::card::parse_card_number;
use crate::domain::context::PrinterSession;
use crate::domain::ticket::TicketTemplate;
use crate::domain::workflow::{PrinterPhase, WorkflowState};
use crate::error::Result;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScreenFormat {
    #[default]
    Text,
    /// One JSON notice per line.
    Json,
}

/// What `--json` prints for a notice. The swipe itself never leaves the
/// kiosk, only its masked card number.
#[derive(Serialize)]
struct NoticeView<'a> {
    state: WorkflowState,
    context: ContextView<'a>,
}

#[derive(Serialize)]
struct ContextView<'a> {
    card_number: Option<String>,
    printer_session: Option<&'a PrinterSession>,
    ticket_sequence: u64,
}

impl<'a> From<&'a TransitionNotice> for NoticeView<'a> {
    fn from(notice: &'a TransitionNotice) -> Self {
        Self {
            state: notice.state,
            context: ContextView {
                card_number: masked_card(notice),
                printer_session: notice.context.printer_session.as_ref(),
                ticket_sequence: notice.context.ticket_sequence,
            },
        }
    }
}

fn masked_card(notice: &TransitionNotice) -> Option<String> {
    parse_card_number(notice.context.raw_card_data.as_deref()).map(|number| number.masked())
}

/// Turns transition notices into what the customer sees.
///
/// Read-only: it never feeds anything back into the engine.
pub struct Screen {
    template: TicketTemplate,
    format: ScreenFormat,
}

impl Screen {
    pub fn new(template: TicketTemplate, format: ScreenFormat) -> Self {
        Self { template, format }
    }

    pub fn render(&self, notice: &TransitionNotice) -> Result<String> {
        match self.format {
            ScreenFormat::Text => Ok(self.render_text(notice)),
            ScreenFormat::Json => Ok(serde_json::to_string(&NoticeView::from(notice))?),
        }
    }

    fn render_text(&self, notice: &TransitionNotice) -> String {
        let price = format!("{:.2}", self.template.price);
        let header = format!(
            "{}\n{} - ${}\n",
            self.template.venue, self.template.section, price
        );

        let body = match notice.state {
            WorkflowState::ConnectingPrinter(phase) => {
                let status = match phase {
                    PrinterPhase::Disconnected => "Connect",
                    PrinterPhase::Connecting => "Connecting...",
                    // Transient: settles into AwaitingCard before any notice goes out.
                    PrinterPhase::Connected => "Connected",
                };
                format!("Thermal Printer [{}]", status)
            }
            WorkflowState::AwaitingCard => "Swipe Card to Purchase".to_string(),
            WorkflowState::ProcessingTransaction => {
                let card = masked_card(notice).unwrap_or_default();
                format!("Charging ${} to {}...", price, card)
            }
            WorkflowState::TransactionProcessed => {
                "Your ticket is being printed, please present it at the gate.\nEnjoy the show."
                    .to_string()
            }
        };

        format!("{}\n{}\n", header, body)
    }
}
