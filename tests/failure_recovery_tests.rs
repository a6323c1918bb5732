mod common;

use async_trait::async_trait;
use common::{engine, start_connected, swipe, wait_for_state};
use std::sync::Arc;
use std::time::Duration;
use ticket_kiosk::application::engine::KioskEngine;
use ticket_kiosk::config::EngineConfig;
use ticket_kiosk::domain::context::{PrinterSession, WorkflowContext};
use ticket_kiosk::domain::ports::DeviceSession;
use ticket_kiosk::domain::workflow::{KioskInput, PrinterPhase, WorkflowState};
use ticket_kiosk::error::Result;
use ticket_kiosk::infrastructure::in_memory::{InMemoryPrinter, SimulatedGateway};
use tokio::time::Instant;

const DISCONNECTED: WorkflowState = WorkflowState::ConnectingPrinter(PrinterPhase::Disconnected);
const CONNECTING: WorkflowState = WorkflowState::ConnectingPrinter(PrinterPhase::Connecting);

/// A printer whose connect never completes.
struct UnresponsivePrinter;

#[async_trait]
impl DeviceSession for UnresponsivePrinter {
    async fn connect(&self) -> Result<PrinterSession> {
        std::future::pending().await
    }

    async fn write(&self, _session: &PrinterSession, _bytes: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn close(&self, _session: &PrinterSession) -> Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_connect_can_be_retried() {
    let printer = InMemoryPrinter::failing(1);
    let mut engine = engine(&printer, &SimulatedGateway::default(), EngineConfig::default());
    let mut notices = engine.subscribe();
    engine.start().unwrap();

    engine.send(KioskInput::RequestConnect).await.unwrap();
    wait_for_state(&mut notices, CONNECTING).await;
    let failed = wait_for_state(&mut notices, DISCONNECTED).await;
    assert_eq!(failed.context, WorkflowContext::default());

    engine.send(KioskInput::RequestConnect).await.unwrap();
    let ready = wait_for_state(&mut notices, WorkflowState::AwaitingCard).await;
    assert!(ready.context.printer_session.is_some());
    assert_eq!(ready.context.ticket_sequence, 0);
    assert_eq!(printer.connect_attempts().await, 2);
    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_declined_charge_returns_to_awaiting_card() {
    let printer = InMemoryPrinter::new();
    let gateway = SimulatedGateway::declining(Duration::from_secs(5), 1);
    let mut engine = engine(&printer, &gateway, EngineConfig::default());
    let mut notices = start_connected(&mut engine).await;

    engine.send(swipe()).await.unwrap();
    wait_for_state(&mut notices, WorkflowState::ProcessingTransaction).await;
    let declined = wait_for_state(&mut notices, WorkflowState::AwaitingCard).await;
    assert!(declined.context.raw_card_data.is_none());
    assert_eq!(declined.context.ticket_sequence, 0);

    engine.send(swipe()).await.unwrap();
    let processed = wait_for_state(&mut notices, WorkflowState::TransactionProcessed).await;
    assert_eq!(processed.context.ticket_sequence, 1);

    engine.stop().await.unwrap();
    assert_eq!(printer.printed().await.len(), 1);
    assert_eq!(gateway.charges().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_charge_times_out() {
    let gateway = SimulatedGateway::new(Duration::from_secs(3600));
    let config = EngineConfig {
        charge_timeout: Some(Duration::from_secs(30)),
        ..EngineConfig::default()
    };
    let mut engine = engine(&InMemoryPrinter::new(), &gateway, config);
    let mut notices = start_connected(&mut engine).await;

    engine.send(swipe()).await.unwrap();
    wait_for_state(&mut notices, WorkflowState::ProcessingTransaction).await;
    let started = Instant::now();

    let reset = wait_for_state(&mut notices, WorkflowState::AwaitingCard).await;
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(30));
    assert!(waited < Duration::from_secs(31));
    assert_eq!(reset.context.ticket_sequence, 0);
    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_charge_is_not_counted_as_in_flight() {
    let gateway = SimulatedGateway::new(Duration::from_secs(60));
    let config = EngineConfig {
        charge_timeout: Some(Duration::from_secs(1)),
        ..EngineConfig::default()
    };
    let mut engine = engine(&InMemoryPrinter::new(), &gateway, config);
    let mut notices = start_connected(&mut engine).await;

    for _ in 0..2 {
        engine.send(swipe()).await.unwrap();
        wait_for_state(&mut notices, WorkflowState::ProcessingTransaction).await;
        wait_for_state(&mut notices, WorkflowState::AwaitingCard).await;
    }

    assert_eq!(gateway.charges().await.len(), 2);
    assert_eq!(gateway.in_flight(), 0);
    assert_eq!(gateway.peak_in_flight(), 1);
    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_hanging_connect_times_out() {
    let config = EngineConfig {
        connect_timeout: Some(Duration::from_secs(10)),
        ..EngineConfig::default()
    };
    let mut engine = KioskEngine::new(
        Arc::new(UnresponsivePrinter),
        Arc::new(SimulatedGateway::default()),
        config,
    );
    let mut notices = engine.subscribe();
    engine.start().unwrap();

    engine.send(KioskInput::RequestConnect).await.unwrap();
    wait_for_state(&mut notices, CONNECTING).await;
    let failed = wait_for_state(&mut notices, DISCONNECTED).await;
    assert!(failed.context.printer_session.is_none());
    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_outstanding_connect() {
    let mut engine = KioskEngine::new(
        Arc::new(UnresponsivePrinter),
        Arc::new(SimulatedGateway::default()),
        EngineConfig::default(),
    );
    let mut notices = engine.subscribe();
    engine.start().unwrap();

    engine.send(KioskInput::RequestConnect).await.unwrap();
    wait_for_state(&mut notices, CONNECTING).await;
    engine.stop().await.unwrap();
    assert!(!engine.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_repeated_swipes_start_one_charge() {
    let gateway = SimulatedGateway::default();
    let mut engine = engine(&InMemoryPrinter::new(), &gateway, EngineConfig::default());
    let mut notices = start_connected(&mut engine).await;

    engine.send(swipe()).await.unwrap();
    wait_for_state(&mut notices, WorkflowState::ProcessingTransaction).await;
    for _ in 0..5 {
        engine.send(swipe()).await.unwrap();
    }
    let processed = wait_for_state(&mut notices, WorkflowState::TransactionProcessed).await;

    assert_eq!(processed.context.ticket_sequence, 1);
    assert_eq!(gateway.charges().await.len(), 1);
    assert_eq!(gateway.peak_in_flight(), 1);
    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_connect_request_ignored_once_connected() {
    let printer = InMemoryPrinter::new();
    let mut engine = engine(&printer, &SimulatedGateway::default(), EngineConfig::default());
    let _notices = start_connected(&mut engine).await;

    engine.send(KioskInput::RequestConnect).await.unwrap();
    let snapshot = engine.snapshot().await.unwrap();
    assert_eq!(snapshot.state, WorkflowState::AwaitingCard);
    assert_eq!(printer.connect_attempts().await, 1);
    engine.stop().await.unwrap();
}
