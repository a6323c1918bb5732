use super::card::parse_card_number;
use super::context::WorkflowContext;
use crate::error::{KioskError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// ESC @ resets an ESC/POS printer before each ticket.
pub const PRINTER_RESET: &str = "\x1b@\n";

/// Blank lines fed after the ticket so it clears the tear-off bar.
pub const TEAR_OFF_SPACING: &str = "\n\n\n";

/// The fixed text printed on every ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketTemplate {
    pub venue: String,
    pub admission: String,
    pub section: String,
    pub price: Decimal,
}

impl Default for TicketTemplate {
    fn default() -> Self {
        Self {
            venue: "Live Band".to_string(),
            admission: "Admit One".to_string(),
            section: "General Admission".to_string(),
            price: dec!(10),
        }
    }
}

impl TicketTemplate {
    /// `General Admission - $10`
    pub fn price_line(&self) -> String {
        format!("{} - ${}", self.section, display_price(self.price))
    }
}

/// Whole amounts print without cents, anything else with two decimals.
pub fn display_price(price: Decimal) -> String {
    if price.fract().is_zero() {
        price.trunc().to_string()
    } else {
        format!("{:.2}", price)
    }
}

/// Builds the printable lines for the ticket numbered by the context's
/// current `ticket_sequence`.
///
/// Fails with [`KioskError::MissingCardNumber`] when the context holds no
/// parsable card number; the workflow never asks for a ticket in that case.
pub fn format_ticket(context: &WorkflowContext, template: &TicketTemplate) -> Result<Vec<String>> {
    let card = parse_card_number(context.raw_card_data.as_deref())
        .ok_or(KioskError::MissingCardNumber)?;

    Ok(vec![
        PRINTER_RESET.to_string(),
        template.venue.clone(),
        template.admission.clone(),
        template.price_line(),
        format!("Paid - {}", card.masked()),
        format!("Ticket No. {}", context.ticket_sequence),
        TEAR_OFF_SPACING.to_string(),
    ])
}

/// The raw bytes sent to the printer for a formatted ticket.
pub fn encode_ticket(lines: &[String]) -> Vec<u8> {
    lines.join("\n").into_bytes()
}
