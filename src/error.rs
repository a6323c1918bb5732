use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KioskError {
    #[error("Printer connection failed: {0}")]
    ConnectFailure(String),
    #[error("Charge failed: {0}")]
    ChargeFailure(String),
    #[error("Printer write failed: {0}")]
    PrintFailure(String),
    #[error("{operation} timed out after {limit:?}")]
    TimedOut {
        operation: &'static str,
        limit: Duration,
    },
    #[error("Ticket requires a parsed card number")]
    MissingCardNumber,
    #[error("Engine is not running")]
    NotRunning,
    #[error("Engine is already running")]
    AlreadyRunning,
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KioskError>;
