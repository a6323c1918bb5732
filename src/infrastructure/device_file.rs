use crate::domain::context::PrinterSession;
use crate::domain::ports::DeviceSession;
use crate::error::{KioskError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// A receipt printer exposed as a character device (e.g. `/dev/usb/lp0`).
///
/// Each session owns its own handle on the device; raw ticket bytes are
/// written unchanged so the printer sees its control sequences.
pub struct DeviceFilePrinter {
    path: PathBuf,
    next_session: AtomicU64,
    sessions: Mutex<HashMap<u64, File>>,
}

impl DeviceFilePrinter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            next_session: AtomicU64::new(0),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DeviceSession for DeviceFilePrinter {
    async fn connect(&self) -> Result<PrinterSession> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| KioskError::ConnectFailure(format!("{}: {}", self.path.display(), e)))?;

        let id = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        self.sessions.lock().await.insert(id, file);
        debug!(path = %self.path.display(), session = id, "device opened");
        Ok(PrinterSession::new(id, self.path.display().to_string()))
    }

    async fn write(&self, session: &PrinterSession, bytes: &[u8]) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let file = sessions
            .get_mut(&session.id())
            .ok_or_else(|| KioskError::PrintFailure(format!("session {} is not open", session)))?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(())
    }

    async fn close(&self, session: &PrinterSession) -> Result<()> {
        let file = self.sessions.lock().await.remove(&session.id());
        if let Some(mut file) = file {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }
}
