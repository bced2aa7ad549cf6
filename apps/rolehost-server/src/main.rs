mod registered_services;
mod services;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use rolekit::bootstrap::{LaunchArgs, LaunchFlags, init_logging, load_config};
use rolekit::runtime::{RunOptions, ShutdownOptions, run};
use rolekit::telemetry::init_tracing;
use rolekit::{ConfigStore, InterceptorChain, ServiceRegistry};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// RoleHost Server - runs the selected service roles in one process
#[derive(Parser)]
#[command(name = "rolehost-server")]
#[command(about = "RoleHost Server - runs the selected service roles in one process")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    launch: LaunchArgs,

    /// Print effective configuration (JSON) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the selected services
    Run,
    /// Validate configuration, provision resources and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let store = load_config(&cli.launch)
        .with_context(|| format!("cannot load config '{}'", cli.launch.config_path().display()))?;
    let global = store.global();

    if cli.print_config {
        println!("{}", global.to_json_pretty()?);
        return Ok(());
    }

    // Build OpenTelemetry layer before logging
    let (otel_layer, process_tracer) = match init_tracing(&global.tracing, env!("CARGO_PKG_NAME")) {
        Some((layer, closer)) => (Some(layer), Some(closer)),
        None => (None, None),
    };
    init_logging(&global.logging, cli.verbose, otel_layer)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "RoleHost Server starting");
    store.log_summary();

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(store, &cli.launch).await,
        Commands::Check => check_config(store).await,
    };

    // Flush any remaining process-level spans
    if let Some(closer) = process_tracer {
        closer.close();
    }
    result
}

async fn build_registry(store: ConfigStore) -> Result<ServiceRegistry> {
    let mut registry = ServiceRegistry::from_store(store);
    registered_services::register_declared(&mut registry)
        .await
        .context("service registration failed")?;
    Ok(registry)
}

async fn check_config(store: ConfigStore) -> Result<()> {
    tracing::info!("Checking configuration...");
    let registry = build_registry(store).await?;

    println!("Configuration is valid");
    for name in registry.names() {
        let db = registry
            .get(name)
            .and_then(|s| s.db())
            .map_or_else(|| "none".to_owned(), rolekit::DbHandle::redacted_dsn);
        println!("  {name}: database={db}");
    }

    registry.shutdown().await;
    Ok(())
}

async fn run_server(store: ConfigStore, flags: &LaunchArgs) -> Result<()> {
    tracing::info!("Registering services...");
    let registry = build_registry(store).await?;

    let run_options = RunOptions {
        registry,
        roles: flags.roles(),
        interceptors: InterceptorChain::with_defaults(),
        shutdown: ShutdownOptions::Signals,
    };

    run(run_options).await
}
