use crate::config::EngineConfig;
use crate::domain::card::parse_card_number;
use crate::domain::context::{PrinterSession, WorkflowContext};
use crate::domain::ports::{DeviceSessionRef, PaymentGatewayRef};
use crate::domain::ticket::encode_ticket;
use crate::domain::workflow::{Effect, Event, KioskInput, Workflow, WorkflowState};
use crate::error::{KioskError, Result};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

const MAILBOX_CAPACITY: usize = 32;

/// Published to observers after every change of state or context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionNotice {
    pub state: WorkflowState,
    pub context: WorkflowContext,
}

enum Message {
    Input(KioskInput),
    Snapshot(oneshot::Sender<TransitionNotice>),
    Stop(oneshot::Sender<Result<()>>),
}

/// A ticket waiting for its turn on the printer.
struct PrintJob {
    session: PrinterSession,
    bytes: Vec<u8>,
    number: u64,
}

struct Running {
    mailbox: mpsc::Sender<Message>,
    task: JoinHandle<()>,
}

/// Runs the kiosk workflow against a printer and a payment gateway.
///
/// The workflow lives inside a single actor task. Inputs, adapter results and
/// timer expiries are all funnelled into that task and handled one at a time,
/// so no two transitions ever overlap.
pub struct KioskEngine {
    device: DeviceSessionRef,
    gateway: PaymentGatewayRef,
    config: EngineConfig,
    notices: broadcast::Sender<TransitionNotice>,
    running: Option<Running>,
}

impl KioskEngine {
    /// Creates a stopped engine.
    ///
    /// # Arguments
    ///
    /// * `device` - Opens and writes to the receipt printer.
    /// * `gateway` - Authorizes card charges.
    /// * `config` - Timers, timeouts and ticket text.
    pub fn new(device: DeviceSessionRef, gateway: PaymentGatewayRef, config: EngineConfig) -> Self {
        let (notices, _) = broadcast::channel(config.notice_capacity.max(1));
        Self {
            device,
            gateway,
            config,
            notices,
            running: None,
        }
    }

    /// Subscribes to transition notices.
    ///
    /// Subscribe before [`start`](Self::start) to also receive the initial state.
    pub fn subscribe(&self) -> broadcast::Receiver<TransitionNotice> {
        self.notices.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Spawns the workflow task in `ConnectingPrinter.Disconnected`.
    pub fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(KioskError::AlreadyRunning);
        }

        let (mailbox, inbox) = mpsc::channel(MAILBOX_CAPACITY);
        let (completions, completed) = mpsc::unbounded_channel();
        let (print_queue, jobs) = mpsc::unbounded_channel();
        let printer = tokio::spawn(print_tickets(Arc::clone(&self.device), jobs));
        let driver = Driver {
            workflow: Workflow::new(self.config.ticket.clone()),
            device: Arc::clone(&self.device),
            gateway: Arc::clone(&self.gateway),
            config: self.config.clone(),
            notices: self.notices.clone(),
            completions,
            invocations: JoinSet::new(),
            print_queue: Some(print_queue),
            printer: Some(printer),
            cool_down: None,
        };
        let task = tokio::spawn(driver.run(inbox, completed));

        self.running = Some(Running { mailbox, task });
        info!(cool_down = ?self.config.cool_down, "kiosk engine started");
        Ok(())
    }

    /// Queues an operator or card-reader input.
    pub async fn send(&self, input: KioskInput) -> Result<()> {
        self.mailbox()?
            .send(Message::Input(input))
            .await
            .map_err(|_| KioskError::NotRunning)
    }

    /// Current state and context.
    pub async fn snapshot(&self) -> Result<TransitionNotice> {
        let (reply, response) = oneshot::channel();
        self.mailbox()?
            .send(Message::Snapshot(reply))
            .await
            .map_err(|_| KioskError::NotRunning)?;
        response.await.map_err(|_| KioskError::NotRunning)
    }

    /// Resolves once no printer connect or charge is outstanding.
    pub async fn wait_until_idle(&self) -> Result<TransitionNotice> {
        let mut notices = self.subscribe();
        loop {
            let current = self.snapshot().await?;
            if !current.state.is_busy() {
                return Ok(current);
            }
            match notices.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(KioskError::NotRunning),
            }
        }
    }

    /// Stops the workflow task and releases the printer session.
    ///
    /// The cool-down timer and any outstanding connect or charge call are
    /// cancelled; tickets already queued for the printer are allowed to finish.
    pub async fn stop(&mut self) -> Result<()> {
        let running = self.running.take().ok_or(KioskError::NotRunning)?;

        let (reply, response) = oneshot::channel();
        let result = if running.mailbox.send(Message::Stop(reply)).await.is_ok() {
            response.await.unwrap_or(Ok(()))
        } else {
            Ok(())
        };

        if let Err(e) = running.task.await {
            error!(error = %e, "engine task ended abnormally");
        }
        info!("kiosk engine stopped");
        result
    }

    fn mailbox(&self) -> Result<&mpsc::Sender<Message>> {
        self.running
            .as_ref()
            .map(|running| &running.mailbox)
            .ok_or(KioskError::NotRunning)
    }
}

/// Owns the workflow inside the engine task and executes its effects.
struct Driver {
    workflow: Workflow,
    device: DeviceSessionRef,
    gateway: PaymentGatewayRef,
    config: EngineConfig,
    notices: broadcast::Sender<TransitionNotice>,
    completions: mpsc::UnboundedSender<Event>,
    invocations: JoinSet<()>,
    print_queue: Option<mpsc::UnboundedSender<PrintJob>>,
    printer: Option<JoinHandle<()>>,
    cool_down: Option<(u64, JoinHandle<()>)>,
}

impl Driver {
    async fn run(
        mut self,
        mut inbox: mpsc::Receiver<Message>,
        mut completed: mpsc::UnboundedReceiver<Event>,
    ) {
        self.publish();

        loop {
            tokio::select! {
                message = inbox.recv() => match message {
                    Some(Message::Input(input)) => self.handle(input.into()),
                    Some(Message::Snapshot(reply)) => {
                        let _ = reply.send(self.notice());
                    }
                    Some(Message::Stop(reply)) => {
                        let _ = reply.send(self.shutdown().await);
                        return;
                    }
                    None => {
                        // Engine dropped without stop().
                        if let Err(e) = self.shutdown().await {
                            warn!(error = %e, "shutdown after engine drop failed");
                        }
                        return;
                    }
                },
                Some(event) = completed.recv() => self.handle(event),
            }
            self.reap();
        }
    }

    fn handle(&mut self, event: Event) {
        let before = self.workflow.state();
        let outcome = self.workflow.dispatch(event);
        if !outcome.changed {
            return;
        }

        let after = self.workflow.state();
        if before != after {
            info!(
                from = %before,
                to = %after,
                ticket = self.workflow.context().ticket_sequence,
                "workflow transition"
            );
        }

        for effect in outcome.effects {
            self.execute(effect);
        }
        self.publish();
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Connect => {
                let device = Arc::clone(&self.device);
                let completions = self.completions.clone();
                let limit = self.config.connect_timeout;
                self.invocations.spawn(async move {
                    let event = match with_deadline("printer connect", limit, device.connect()).await {
                        Ok(session) => {
                            info!(session = %session, "printer connected");
                            Event::ConnectSucceeded(session)
                        }
                        Err(e) => {
                            warn!(error = %e, "printer connection failed");
                            Event::ConnectFailed
                        }
                    };
                    let _ = completions.send(event);
                });
            }
            Effect::Charge { card_payload } => {
                let gateway = Arc::clone(&self.gateway);
                let completions = self.completions.clone();
                let limit = self.config.charge_timeout;
                let card = parse_card_number(Some(&card_payload))
                    .map(|number| number.masked())
                    .unwrap_or_default();
                info!(card = %card, "charging card");
                self.invocations.spawn(async move {
                    let event = match with_deadline("charge", limit, gateway.charge(&card_payload)).await {
                        Ok(()) => {
                            info!(card = %card, "charge approved");
                            Event::ChargeSucceeded
                        }
                        Err(e) => {
                            warn!(card = %card, error = %e, "charge failed");
                            Event::ChargeFailed
                        }
                    };
                    let _ = completions.send(event);
                });
            }
            Effect::Print { session, ticket } => {
                let job = PrintJob {
                    session,
                    bytes: encode_ticket(&ticket),
                    number: self.workflow.context().ticket_sequence,
                };
                let queued = self
                    .print_queue
                    .as_ref()
                    .is_some_and(|queue| queue.send(job).is_ok());
                if !queued {
                    error!(
                        ticket = self.workflow.context().ticket_sequence,
                        "printer queue closed, ticket dropped"
                    );
                }
            }
            Effect::ArmCoolDown { timer } => {
                let completions = self.completions.clone();
                let delay = self.config.cool_down;
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = completions.send(Event::CoolDownElapsed { timer });
                });
                if let Some((_, previous)) = self.cool_down.replace((timer, handle)) {
                    previous.abort();
                }
            }
            Effect::CancelCoolDown { timer } => {
                if let Some((armed, handle)) = self.cool_down.take() {
                    if armed == timer {
                        handle.abort();
                    } else {
                        self.cool_down = Some((armed, handle));
                    }
                }
            }
        }
    }

    fn notice(&self) -> TransitionNotice {
        TransitionNotice {
            state: self.workflow.state(),
            context: self.workflow.context().clone(),
        }
    }

    fn publish(&self) {
        // No subscribers is fine.
        let _ = self.notices.send(self.notice());
    }

    fn reap(&mut self) {
        while let Some(result) = self.invocations.try_join_next() {
            if let Err(e) = result
                && e.is_panic()
            {
                error!(error = %e, "adapter call panicked");
            }
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        if let Some((_, handle)) = self.cool_down.take() {
            handle.abort();
        }
        self.invocations.shutdown().await;

        // Closing the queue lets the printer finish what is already queued.
        self.print_queue.take();
        if let Some(printer) = self.printer.take()
            && let Err(e) = printer.await
        {
            error!(error = %e, "printer task ended abnormally");
        }

        if let Some(session) = self.workflow.context().printer_session.clone() {
            self.device.close(&session).await?;
            info!(session = %session, "printer session closed");
        } else {
            debug!("no printer session to close");
        }
        Ok(())
    }
}

/// Writes queued tickets one at a time, in the order they were sold.
async fn print_tickets(device: DeviceSessionRef, mut jobs: mpsc::UnboundedReceiver<PrintJob>) {
    while let Some(job) = jobs.recv().await {
        match device.write(&job.session, &job.bytes).await {
            Ok(()) => info!(ticket = job.number, "ticket printed"),
            Err(e) => error!(ticket = job.number, error = %e, "ticket print failed"),
        }
    }
}

/// Runs an adapter call, failing it with [`KioskError::TimedOut`] once
/// `limit` passes.
async fn with_deadline<T>(
    operation: &'static str,
    limit: Option<Duration>,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| KioskError::TimedOut { operation, limit })?,
        None => call.await,
    }
}
