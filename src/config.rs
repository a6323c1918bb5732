use crate::domain::ticket::TicketTemplate;
use std::time::Duration;

/// How long the kiosk shows the "ticket printed" screen before taking the
/// next customer.
pub const DEFAULT_COOL_DOWN: Duration = Duration::from_secs(7);

pub const DEFAULT_NOTICE_CAPACITY: usize = 64;

/// Settings for a [`KioskEngine`](crate::application::engine::KioskEngine).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Delay between printing a ticket and returning to card-await.
    pub cool_down: Duration,
    /// Upper bound on a printer connect attempt. `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,
    /// Upper bound on a charge. `None` waits indefinitely.
    pub charge_timeout: Option<Duration>,
    /// Buffer size of the transition notice channel.
    pub notice_capacity: usize,
    pub ticket: TicketTemplate,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cool_down: DEFAULT_COOL_DOWN,
            connect_timeout: None,
            charge_timeout: None,
            notice_capacity: DEFAULT_NOTICE_CAPACITY,
            ticket: TicketTemplate::default(),
        }
    }
}
