use super::context::PrinterSession;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Opens and drives the receipt printer.
#[async_trait]
pub trait DeviceSession: Send + Sync {
    /// Opens and configures a printer session. Must be safe to call again
    /// after a failed attempt.
    async fn connect(&self) -> Result<PrinterSession>;
    async fn write(&self, session: &PrinterSession, bytes: &[u8]) -> Result<()>;
    async fn close(&self, session: &PrinterSession) -> Result<()>;
}

/// Authorizes a card charge.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charges the card described by the raw swipe payload.
    async fn charge(&self, card_payload: &str) -> Result<()>;
}

pub type DeviceSessionRef = Arc<dyn DeviceSession>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
