//! terminal-kiosk
//!
//! Runs one card-present charge against a running backend using the
//! simulated reader. Ctrl-C during collection cancels the reader action.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use terminal_reader::{
    HttpBackend, LogAlerts, PaymentWorkflow, ReaderSession, SimulatedReader, TapBehavior,
    WorkflowConfig, operator_cancel,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Payments backend base URL
    #[arg(long, env = "BACKEND_URL", default_value = "http://localhost:4242")]
    backend_url: String,

    /// Amount in minor currency units (1500 = 15.00)
    #[arg(long)]
    amount: i64,

    /// Seconds the customer has to present a card
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Currency code
    #[arg(long, env = "DEFAULT_CURRENCY", default_value = "eur")]
    currency: String,

    /// Seconds before the simulated customer taps; omit to tap immediately
    #[arg(long)]
    tap_after_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let backend = Arc::new(HttpBackend::new(&args.backend_url));
    let tap = args
        .tap_after_secs
        .map_or(TapBehavior::Immediate, |secs| TapBehavior::After(Duration::from_secs(secs)));
    let sdk = Arc::new(SimulatedReader::new().with_tap(tap));
    let config = WorkflowConfig {
        collect_timeout: Duration::from_secs(args.timeout_secs),
        currency: args.currency.to_lowercase(),
    };
    let workflow = PaymentWorkflow::new(sdk, backend, Arc::new(LogAlerts), config);

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("terminal-kiosk → {}", args.backend_url);
    tracing::info!("══════════════════════════════════════════════════");

    let (button, mut listener) = operator_cancel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Cancel pressed");
            button.press();
        }
    });

    let mut session = ReaderSession::new();
    let receipt = workflow
        .charge(&mut session, args.amount, &mut listener)
        .await
        .context("charge did not complete")?;

    tracing::info!(
        intent_id = %receipt.intent.id,
        reader_id = %receipt.reader_id,
        attempt_id = %receipt.attempt.id,
        "Charge complete"
    );

    if let Err(err) = workflow.controller().disconnect(&mut session).await {
        tracing::warn!(error = %err, "Reader disconnect failed");
    }
    Ok(())
}
