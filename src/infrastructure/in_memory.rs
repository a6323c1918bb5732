use crate::domain::context::PrinterSession;
use crate::domain::ports::{DeviceSession, PaymentGateway};
use crate::error::{KioskError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

pub const IN_MEMORY_DEVICE: &str = "in-memory";

/// How long the simulated gateway takes to approve a charge by default.
pub const DEFAULT_CHARGE_DELAY: Duration = Duration::from_secs(5);

#[derive(Default)]
struct PrinterState {
    failures_remaining: usize,
    connect_attempts: usize,
    next_session: u64,
    open: HashSet<u64>,
    closed: Vec<u64>,
    output: Vec<Vec<u8>>,
}

/// A printer that keeps everything written to it in memory.
///
/// Uses `Arc<RwLock<..>>` so clones share one device; tests keep a clone to
/// inspect what the engine printed.
#[derive(Default, Clone)]
pub struct InMemoryPrinter {
    state: Arc<RwLock<PrinterState>>,
}

impl InMemoryPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A printer whose first `times` connect attempts fail.
    pub fn failing(times: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(PrinterState {
                failures_remaining: times,
                ..PrinterState::default()
            })),
        }
    }

    pub async fn connect_attempts(&self) -> usize {
        self.state.read().await.connect_attempts
    }

    pub async fn open_sessions(&self) -> usize {
        self.state.read().await.open.len()
    }

    pub async fn closed_sessions(&self) -> Vec<u64> {
        self.state.read().await.closed.clone()
    }

    /// Every write so far, decoded as text.
    pub async fn printed(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .output
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }
}

#[async_trait]
impl DeviceSession for InMemoryPrinter {
    async fn connect(&self) -> Result<PrinterSession> {
        let mut state = self.state.write().await;
        state.connect_attempts += 1;
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(KioskError::ConnectFailure(
                "printer did not respond".to_string(),
            ));
        }

        state.next_session += 1;
        let id = state.next_session;
        state.open.insert(id);
        Ok(PrinterSession::new(id, IN_MEMORY_DEVICE))
    }

    async fn write(&self, session: &PrinterSession, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.open.contains(&session.id()) {
            return Err(KioskError::PrintFailure(format!(
                "session {} is not open",
                session
            )));
        }
        state.output.push(bytes.to_vec());
        Ok(())
    }

    async fn close(&self, session: &PrinterSession) -> Result<()> {
        let mut state = self.state.write().await;
        if state.open.remove(&session.id()) {
            state.closed.push(session.id());
        }
        Ok(())
    }
}

#[derive(Default)]
struct GatewayState {
    declines_remaining: usize,
    charges: Vec<String>,
}

/// A payment gateway that approves every charge after a fixed delay.
///
/// It can be told to decline the first few charges, and it tracks how many
/// charges were outstanding at once.
#[derive(Clone)]
pub struct SimulatedGateway {
    delay: Duration,
    state: Arc<RwLock<GatewayState>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(DEFAULT_CHARGE_DELAY)
    }
}

impl SimulatedGateway {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: Arc::new(RwLock::new(GatewayState::default())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }

    /// A gateway that declines its first `times` charges.
    pub fn declining(delay: Duration, times: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(GatewayState {
                declines_remaining: times,
                charges: Vec::new(),
            })),
            ..Self::new(delay)
        }
    }

    /// Payloads of every charge attempted so far.
    pub async fn charges(&self) -> Vec<String> {
        self.state.read().await.charges.clone()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// Counts one charge as outstanding until dropped, including when the caller
/// abandons the charge future.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> (Self, usize) {
        let outstanding = counter.fetch_add(1, Ordering::SeqCst) + 1;
        (Self(Arc::clone(counter)), outstanding)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, card_payload: &str) -> Result<()> {
        let (in_flight, outstanding) = InFlight::enter(&self.in_flight);
        self.peak_in_flight.fetch_max(outstanding, Ordering::SeqCst);
        self.state
            .write()
            .await
            .charges
            .push(card_payload.to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        drop(in_flight);

        let mut state = self.state.write().await;
        if state.declines_remaining > 0 {
            state.declines_remaining -= 1;
            return Err(KioskError::ChargeFailure("card declined".to_string()));
        }
        Ok(())
    }
}
