//! Payment-confirmation relay
//!
//! Sends a form-encoded payment-confirmation payload, survives transport
//! failures and transient statuses, and reports what the processor said.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌───────────────────────────────────────────────────────┐
//!                 │                    PAYMENT RELAY                      │
//!                 │                                                       │
//!   payload ──────┼─▶ orchestrator ──▶ retry runs ──▶ dispatcher          │
//!                 │   (mode, fan-out)  (state machine)  │                 │
//!                 │                                     ├─▶ primary POST ─┼──▶ same origin
//!                 │                                     └─▶ fallback POST ┼──▶ cross origin
//!                 │                                            │          │
//!                 │                         classifier ◀───────┘          │
//!                 │                         follow-up GET ────────────────┼──▶ confirmation page
//!                 │                                                       │
//!                 │  ┌─────────────────────────────────────────────────┐  │
//!                 │  │ registry (in-flight, handles, global stop)      │  │
//!                 │  │ delays · settings · journal · status · metrics  │  │
//!                 │  └─────────────────────────────────────────────────┘  │
//!                 └───────────────────────────────────────────────────────┘
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use payment_relay::config::loader::load_config;
use payment_relay::config::validation::validate_config;
use payment_relay::engine::{EngineContext, Orchestrator, RunMode};
use payment_relay::observability::{logging, metrics, LogStatusSink};
use payment_relay::resilience::delays::format_delay_list;
use payment_relay::settings::SettingsStore;
use payment_relay::transport::Dispatcher;
use payment_relay::EngineConfig;

#[derive(Parser)]
#[command(name = "payment-relay")]
#[command(about = "Resilient payment-confirmation relay", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Settings file (overrides the configured path)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a payload in the selected mode
    Run(RunArgs),
    /// Show or edit retry delay candidates
    Delays {
        #[command(subcommand)]
        action: DelayAction,
    },
    /// Show counters, toggles and the last verified transaction
    Status,
    /// Clear the attempt log and zero the counters
    Reset,
}

#[derive(Args)]
struct RunArgs {
    /// Payload text; read from --payload-file or stdin when absent
    #[arg(short, long)]
    payload: Option<String>,

    #[arg(long, conflicts_with = "payload")]
    payload_file: Option<PathBuf>,

    /// Fan out concurrent runs
    #[arg(long, overrides_with = "no_multi")]
    multi: bool,
    #[arg(long)]
    no_multi: bool,

    /// Retry until success or the cap
    #[arg(long, overrides_with = "no_retrymax")]
    retrymax: bool,
    #[arg(long)]
    no_retrymax: bool,

    /// Allow the cross-origin fallback transport
    #[arg(long, overrides_with = "no_fallback")]
    fallback: bool,
    #[arg(long)]
    no_fallback: bool,

    /// Write the attempt log as JSON when done
    #[arg(long)]
    export_log: Option<PathBuf>,
}

#[derive(Subcommand)]
enum DelayAction {
    Show,
    /// Replace candidates, e.g. "10, 12, 9.5"
    Set { list: String },
}

fn toggle(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let config = EngineConfig::default();
            if let Err(errors) = validate_config(&config) {
                return Err(format!("invalid default configuration: {} error(s)", errors.len()).into());
            }
            config
        }
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!("payment-relay v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let settings_path = cli
        .settings
        .clone()
        .or_else(|| config.settings.path.as_ref().map(PathBuf::from));
    let settings = match settings_path {
        Some(path) => SettingsStore::load(path),
        None => SettingsStore::in_memory(),
    };

    let ctx = EngineContext::new(config, settings, Arc::new(LogStatusSink))?;

    match cli.command {
        Commands::Run(args) => run(ctx, args).await?,
        Commands::Delays { action } => match action {
            DelayAction::Show => println!("{}", format_delay_list(&ctx.delays.current())),
            DelayAction::Set { list } => {
                let delays = ctx.edit_delays(&list)?;
                println!("{}", format_delay_list(&delays));
            }
        },
        Commands::Status => print_status(&ctx),
        Commands::Reset => ctx.reset_totals(),
    }

    Ok(())
}

async fn run(ctx: Arc<EngineContext>, args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let payload = match (&args.payload, &args.payload_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path).await?,
        (None, None) => {
            let mut text = String::new();
            tokio::io::stdin().read_to_string(&mut text).await?;
            text
        }
    };

    if let Some(on) = toggle(args.multi, args.no_multi) {
        ctx.settings.update(|s| s.multi_on = on);
    }
    if let Some(on) = toggle(args.retrymax, args.no_retrymax) {
        ctx.settings.update(|s| s.retrymax_on = on);
    }
    if let Some(on) = toggle(args.fallback, args.no_fallback) {
        ctx.set_fallback_allowed(on);
    }

    let dispatcher = Arc::new(Dispatcher::from_config(ctx.clone())?);
    let orchestrator = Orchestrator::new(dispatcher);
    let signals = payment_relay::lifecycle::spawn_stop_on_ctrl_c(ctx.clone());

    let mode: RunMode = orchestrator.current_mode();
    tracing::info!(
        mode = mode.label(),
        transport = ctx.fallback_mode_label(),
        "Configuration loaded"
    );
    let report = orchestrator.launch(mode, &payload).await;
    signals.abort();
    let report = report?;

    for run in &report.runs {
        println!(
            "{:<10} {:<16} dispatches={} last_status={} tran_id={}",
            run.label,
            run.terminal.as_str(),
            run.dispatches,
            run.last_status,
            run.classification
                .as_ref()
                .and_then(|c| c.tran_id.as_deref())
                .unwrap_or("-")
        );
    }

    if let Some(path) = &args.export_log {
        tokio::fs::write(path, ctx.journal.export_json()?).await?;
        tracing::info!(path = %path.display(), entries = ctx.journal.len(), "Attempt log exported");
    }

    if let Err(e) = ctx.settings.save() {
        tracing::warn!(error = %e, "Failed to save settings");
    }
    Ok(())
}

fn print_status(ctx: &EngineContext) {
    let settings = ctx.settings.snapshot();
    println!(
        "mode:       {}",
        RunMode::from_toggles(settings.multi_on, settings.retrymax_on).label()
    );
    println!("transport:  {}", ctx.fallback_mode_label());
    println!("delays:     {}", format_delay_list(&ctx.delays.current()));
    println!("redirects:  {}", settings.redirect_count);
    println!("http 200:   {}", settings.ok_count);
    match settings.last_verified() {
        Some((tran_id, at_ms)) => println!("last valid: {} (at {} ms)", tran_id, at_ms),
        None => println!("last valid: -"),
    }
}
