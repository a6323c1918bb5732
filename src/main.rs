use clap::Parser;
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use ticket_kiosk::application::engine::KioskEngine;
use ticket_kiosk::config::EngineConfig;
use ticket_kiosk::domain::ports::{DeviceSessionRef, PaymentGatewayRef};
use ticket_kiosk::domain::ticket::TicketTemplate;
use ticket_kiosk::infrastructure::console::ConsolePrinter;
use ticket_kiosk::infrastructure::device_file::DeviceFilePrinter;
use ticket_kiosk::infrastructure::in_memory::SimulatedGateway;
use ticket_kiosk::interfaces::console::input_reader::InputReader;
use ticket_kiosk::interfaces::console::screen::{Screen, ScreenFormat};
use tokio::io::BufReader;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Printer device to write tickets to (e.g. /dev/usb/lp0). Tickets go to stdout when omitted.
    #[arg(long)]
    printer_device: Option<PathBuf>,

    /// Time the simulated gateway takes to approve a charge.
    #[arg(long, default_value_t = 5000)]
    charge_delay_ms: u64,

    /// Number of charges the simulated gateway declines before approving.
    #[arg(long, default_value_t = 0)]
    decline_first: usize,

    /// Seconds the "ticket printed" screen stays up.
    #[arg(long, default_value_t = 7)]
    cool_down_secs: u64,

    /// Give up on a printer connect attempt after this long.
    #[arg(long)]
    connect_timeout_ms: Option<u64>,

    /// Give up on a charge after this long.
    #[arg(long)]
    charge_timeout_ms: Option<u64>,

    #[arg(long, default_value = "Live Band")]
    venue: String,

    #[arg(long, default_value = "Admit One")]
    admission: String,

    #[arg(long, default_value = "General Admission")]
    section: String,

    #[arg(long, default_value = "10")]
    price: Decimal,

    /// Emit one JSON notice per line instead of text screens.
    #[arg(long)]
    json: bool,

    /// Debug logging (overridden by RUST_LOG).
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            cool_down: Duration::from_secs(self.cool_down_secs),
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
            charge_timeout: self.charge_timeout_ms.map(Duration::from_millis),
            ticket: TicketTemplate {
                venue: self.venue.clone(),
                admission: self.admission.clone(),
                section: self.section.clone(),
                price: self.price,
            },
            ..EngineConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr, stdout belongs to the screen and console printer.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = cli.engine_config();

    let device: DeviceSessionRef = match &cli.printer_device {
        Some(path) => Arc::new(DeviceFilePrinter::new(path)),
        None => Arc::new(ConsolePrinter::stdout()),
    };
    let gateway: PaymentGatewayRef = Arc::new(SimulatedGateway::declining(
        Duration::from_millis(cli.charge_delay_ms),
        cli.decline_first,
    ));

    let format = if cli.json {
        ScreenFormat::Json
    } else {
        ScreenFormat::Text
    };
    let screen = Screen::new(config.ticket.clone(), format);

    let mut engine = KioskEngine::new(device, gateway, config);
    let mut notices = engine.subscribe();
    let view = tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => match screen.render(&notice) {
                    Ok(frame) => println!("{}", frame),
                    Err(e) => eprintln!("Error rendering screen: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "screen fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    engine.start().into_diagnostic()?;

    // Each input is applied once the previous one has settled, so scripted
    // input behaves like a customer waiting for the screen.
    let mut reader = InputReader::new(BufReader::new(tokio::io::stdin()));
    while let Some(input) = reader.next_input().await.into_diagnostic()? {
        engine.send(input).await.into_diagnostic()?;
        engine.wait_until_idle().await.into_diagnostic()?;
    }

    engine.stop().await.into_diagnostic()?;
    drop(engine);
    view.await.into_diagnostic()?;

    Ok(())
}
