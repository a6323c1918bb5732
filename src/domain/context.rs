use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to an open receipt-printer connection.
///
/// Issued by a [`DeviceSession`](super::ports::DeviceSession) adapter, which maps
/// it back to its own transport when asked to write or close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterSession {
    id: u64,
    device: String,
}

impl PrinterSession {
    pub fn new(id: u64, device: impl Into<String>) -> Self {
        Self {
            id,
            device: device.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

impl fmt::Display for PrinterSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.device, self.id)
    }
}

/// The kiosk's mutable record, owned by the workflow machine.
///
/// Only transition actions write to it. Observers receive clones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowContext {
    /// Last swipe payload received while awaiting a card.
    pub raw_card_data: Option<String>,
    /// Set once the printer is connected, kept for the rest of the run.
    pub printer_session: Option<PrinterSession>,
    /// Number of the most recently printed ticket.
    pub ticket_sequence: u64,
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self::default()
    }
}
