//! helios-console - command-line operator console
//!
//! Thin presentation layer over the console core: every command maps onto an
//! InventoryStore, LifecycleController or DetailSession operation and prints
//! the resulting state.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use helios_console::config::ConsoleConfig;
use helios_console::inventory::{Confirm, FetchOutcome, InventoryStore, RemoveOutcome};
use helios_console::lifecycle::{LifecycleController, OperationHandle};
use helios_console::models::{InverterConfig, InverterId, InverterRecord, InverterType, Region};
use helios_console::session::DetailSession;
use helios_console::{ApiError, ConsoleError, FleetApi, HttpFleetApi};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "helios-console", version, about = "Operator console for solar-inverter collection workers")]
struct Cli {
    /// Console configuration file (YAML)
    #[arg(long, global = true, env = "HELIOS_CONSOLE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List registered inverters with a fleet summary
    List,
    /// Show one inverter: registry record, live status and recent logs
    Show { id: String },
    /// Register a new inverter
    Add {
        #[arg(long)]
        name: String,
        /// Portal username
        #[arg(long)]
        username: String,
        /// Portal password
        #[arg(long, env = "HELIOS_PORTAL_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long = "type", default_value = "goodwe")]
        inverter_type: InverterType,
        #[arg(long, default_value = "au")]
        region: Region,
        #[arg(long, default_value = "UTC")]
        timezone: String,
        /// Worker polling interval in seconds
        #[arg(long, default_value_t = 300)]
        interval: u32,
    },
    /// Delete an inverter
    Remove {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Start the inverter's worker and wait for reconciliation
    Start { id: String },
    /// Stop the inverter's worker and wait for reconciliation
    Stop { id: String },
    /// Stop then start the worker, then reconcile
    Restart { id: String },
    /// Print the worker's recent logs
    Logs { id: String },
    /// Print the worker's live status
    Status { id: String },
    /// List the worker templates known to the registry
    Templates,
}

/// y/N prompt on the terminal
struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        print!("{prompt} [y/N]: ");
        if io::stdout().flush().is_err() {
            return false;
        }

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            return false;
        }
        matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = ConsoleConfig::load(cli.config.as_deref())
        .await
        .context("Failed to load console configuration")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let api = HttpFleetApi::new(&config.api.base_url, config.api.request_timeout())
        .context("Failed to build HTTP client")?;
    debug!(base_url = api.base_url(), "fleet API client ready");
    let api: Arc<dyn FleetApi> = Arc::new(api);
    let inventory = InventoryStore::new(api.clone());

    match cli.command {
        Command::List => list(&inventory).await,
        Command::Show { id } => show(&inventory, &config, &InverterId::from(id)).await,
        Command::Add { name, username, password, inverter_type, region, timezone, interval } => {
            let mut cfg = InverterConfig::new(name, username, password);
            cfg.inverter_type = inverter_type;
            cfg.region = region;
            cfg.timezone = timezone;
            cfg.interval_seconds = interval;

            let record = inventory.create(cfg).await.context("Failed to add inverter")?;
            println!("Added inverter {} ({})", record.id, record.name);
            Ok(())
        }
        Command::Remove { id, yes } => {
            let id = InverterId::from(id);
            let outcome = if yes {
                inventory.remove(&id, &|_: &str| true).await
            } else {
                inventory.remove(&id, &TerminalConfirm).await
            };
            match outcome {
                RemoveOutcome::Declined => println!("Cancelled"),
                RemoveOutcome::Removed => println!("Deleted inverter {id}"),
                RemoveOutcome::Failed(reason) => anyhow::bail!("Failed to delete inverter {id}: {reason}"),
            }
            Ok(())
        }
        Command::Start { id } => {
            let controller = LifecycleController::from_config(inventory.clone(), &config);
            let handle = controller.start(&InverterId::from(id));
            report_operation(&inventory, handle).await
        }
        Command::Stop { id } => {
            let controller = LifecycleController::from_config(inventory.clone(), &config);
            let handle = controller.stop(&InverterId::from(id));
            report_operation(&inventory, handle).await
        }
        Command::Restart { id } => {
            let record = resolve(&inventory, &InverterId::from(id)).await?;
            let session = DetailSession::open(record, inventory.clone(), &config).await;

            println!("Restarting {}...", session.id());
            let report = session.restart().await.context("Restart task failed")?;
            if let Some(err) = &report.stop_error {
                println!("  stop command failed: {err}");
            }
            if let Some(err) = &report.start_error {
                println!("  start command failed: {err}");
            }
            print_record_line(session.record().as_ref());
            println!("  live status: {}", report.live_status.as_deref().unwrap_or("unknown"));
            println!("  outcome: {:?} after {:.1}s", report.outcome, report.elapsed.as_secs_f64());
            session.close();
            Ok(())
        }
        Command::Logs { id } => {
            let logs = api.worker_logs(&InverterId::from(id)).await.context("Failed to fetch logs")?;
            println!("{logs}");
            Ok(())
        }
        Command::Status { id } => {
            let status = api.worker_status(&InverterId::from(id)).await.context("Failed to fetch status")?;
            println!("{status}");
            Ok(())
        }
        Command::Templates => {
            for template in api.list_templates().await.context("Failed to fetch templates")? {
                println!("{template}");
            }
            Ok(())
        }
    }
}

async fn list(inventory: &InventoryStore) -> Result<()> {
    if let FetchOutcome::Stale { error } = inventory.load().await {
        anyhow::bail!("Could not fetch inverters: {error}");
    }

    let records = inventory.snapshot();
    if records.is_empty() {
        println!("No inverters registered");
        return Ok(());
    }

    println!("{:<6} {:<24} {:<8} {:<6} {:<14} {:<10}", "ID", "NAME", "TYPE", "REGION", "CONTAINER", "STATUS");
    for r in &records {
        println!(
            "{:<6} {:<24} {:<8} {:<6} {:<14} {:<10}",
            r.id.as_str(),
            r.name,
            r.inverter_type.as_str(),
            r.region.as_str(),
            r.short_container_id().unwrap_or("-"),
            r.status.label(),
        );
    }

    let summary = inventory.summary();
    println!();
    println!(
        "{} total, {} running, {} stopped, {} error, {} pending",
        summary.total, summary.active, summary.inactive, summary.error, summary.pending
    );
    Ok(())
}

async fn show(inventory: &InventoryStore, config: &ConsoleConfig, id: &InverterId) -> Result<()> {
    let record = resolve(inventory, id).await?;
    let session = DetailSession::open(record, inventory.clone(), config).await;

    if let Some(r) = session.record() {
        println!("{} ({})", r.name, r.id);
        println!("  type:        {}", r.inverter_type.as_str());
        println!("  region:      {}", r.region.as_str());
        println!("  timezone:    {}", r.timezone);
        println!("  interval:    {}s", r.interval_seconds);
        println!("  container:   {}", r.short_container_id().unwrap_or("-"));
        println!("  created:     {}", r.created_display());
        println!("  last update: {}", r.last_update_display());
        println!("  registry:    {}", r.status.label());
    }
    println!("  live status: {}", session.live_status().as_deref().unwrap_or("unknown"));
    println!();
    println!("{}", session.logs_text().as_deref().unwrap_or("(logs unavailable)"));

    session.close();
    Ok(())
}

async fn report_operation(inventory: &InventoryStore, handle: OperationHandle) -> Result<()> {
    let id = handle.inverter.clone();
    println!("Processing…");
    let outcome = handle.outcome().await;
    info!(inverter = %id, ?outcome, "operation finished");

    print_record_line(inventory.get(&id).as_ref());
    println!("  outcome: {outcome:?}");
    Ok(())
}

fn print_record_line(record: Option<&InverterRecord>) {
    match record {
        Some(r) => println!("  {} ({}): {}", r.name, r.id, r.status.label()),
        None => println!("  status unknown"),
    }
}

/// Finds the record in the inventory, falling back to the single-record endpoint
async fn resolve(inventory: &InventoryStore, id: &InverterId) -> Result<InverterRecord> {
    inventory.load().await;
    if let Some(record) = inventory.get(id) {
        return Ok(record);
    }

    match inventory.api().get_inverter(id).await {
        Ok(record) => Ok(record),
        Err(ApiError::NotFound(_)) => Err(ConsoleError::UnknownInverter(id.to_string()).into()),
        Err(e) => Err(anyhow::Error::new(e).context(format!("Failed to fetch inverter {id}"))),
    }
}
