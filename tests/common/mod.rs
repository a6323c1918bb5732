#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use ticket_kiosk::application::engine::{KioskEngine, TransitionNotice};
use ticket_kiosk::config::EngineConfig;
use ticket_kiosk::domain::workflow::{KioskInput, WorkflowState};
use ticket_kiosk::infrastructure::in_memory::{InMemoryPrinter, SimulatedGateway};
use tokio::sync::broadcast;

pub const SWIPE: &str = "%B4111111111111111^DOE/JOHN^25121010000000000000";

pub fn engine(
    printer: &InMemoryPrinter,
    gateway: &SimulatedGateway,
    config: EngineConfig,
) -> KioskEngine {
    KioskEngine::new(Arc::new(printer.clone()), Arc::new(gateway.clone()), config)
}

pub fn swipe() -> KioskInput {
    KioskInput::CardDataReceived(SWIPE.to_string())
}

/// Waits for the next notice in `state`, skipping everything before it.
pub async fn wait_for_state(
    notices: &mut broadcast::Receiver<TransitionNotice>,
    state: WorkflowState,
) -> TransitionNotice {
    let next = async {
        loop {
            match notices.recv().await {
                Ok(notice) if notice.state == state => return notice,
                Ok(_) => continue,
                Err(e) => panic!("notice stream failed: {}", e),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(3600), next)
        .await
        .unwrap_or_else(|_| panic!("never reached {}", state))
}

/// Starts the engine and connects the printer.
pub async fn start_connected(engine: &mut KioskEngine) -> broadcast::Receiver<TransitionNotice> {
    let mut notices = engine.subscribe();
    engine.start().unwrap();
    engine.send(KioskInput::RequestConnect).await.unwrap();
    wait_for_state(&mut notices, WorkflowState::AwaitingCard).await;
    notices
}
