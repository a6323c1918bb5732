use crate::domain::context::PrinterSession;
use crate::domain::ports::DeviceSession;
use crate::error::{KioskError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::Mutex;
use tracing::debug;

pub const CONSOLE_DEVICE: &str = "console";

/// ESC @ as it arrives from the ticket formatter.
const RESET_SEQUENCE: &[u8] = b"\x1b@";

/// Prints tickets as plain text to a terminal or any other writer.
///
/// Printer control sequences are dropped so the output stays readable.
pub struct ConsolePrinter<W> {
    out: Mutex<W>,
    sessions: AtomicU64,
}

impl ConsolePrinter<Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> ConsolePrinter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            sessions: AtomicU64::new(0),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W> DeviceSession for ConsolePrinter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn connect(&self) -> Result<PrinterSession> {
        let id = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PrinterSession::new(id, CONSOLE_DEVICE))
    }

    async fn write(&self, session: &PrinterSession, bytes: &[u8]) -> Result<()> {
        let text = bytes.strip_prefix(RESET_SEQUENCE).unwrap_or(bytes);
        let mut out = self.out.lock().await;
        out.write_all(text)
            .await
            .map_err(|e| KioskError::PrintFailure(format!("{}: {}", session, e)))?;
        out.flush().await?;
        Ok(())
    }

    async fn close(&self, session: &PrinterSession) -> Result<()> {
        debug!(session = %session, "console printer closed");
        self.out.lock().await.flush().await?;
        Ok(())
    }
}
