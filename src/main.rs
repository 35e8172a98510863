// modelquota - Main Entry Point
//
// Command-line front end:
// - serve: run the usage tracking HTTP service
// - models: print the model catalog
// - check-config: validate and print the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use modelquota::config::Config;
use modelquota::quota::{Catalog, ResourceDefinition};
use modelquota::server::{self, AppState};
use modelquota::logging;
use std::path::{Path, PathBuf};
use tracing::info;

/// modelquota: usage tracking and remaining quota for rate-limited models
#[derive(Parser, Debug)]
#[command(name = "modelquota")]
#[command(author = "modelquota Contributors")]
#[command(version)]
#[command(about = "Per-owner usage tracking and quota selection for rate-limited models", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (default: ~/.config/modelquota/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Port to listen on (overrides configuration)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the model catalog
    Models {
        /// Catalog file (overrides configuration)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Validate the configuration and print the effective values
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    logging::init(&config.logging, args.verbose)?;

    match args.command {
        Some(Commands::Serve { port }) => serve(config, port).await?,
        Some(Commands::Models { catalog }) => {
            let path = catalog.unwrap_or_else(|| config.catalog.path.clone());
            print_models(&path)?;
        }
        Some(Commands::CheckConfig) => {
            print!("{}", config.redacted().to_toml()?);
        }
        None => {
            info!("No command specified. Use \"modelquota --help\" for usage.");
        }
    }

    Ok(())
}

/// Build the application state and run the HTTP service
async fn serve(mut config: Config, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
        config.validate()?;
    }

    info!(
        "modelquota v{} starting (store: {})",
        env!("CARGO_PKG_VERSION"),
        config.store.backend
    );

    let state = AppState::from_config(&config)?;
    server::start_server(&config, state).await
}

fn print_models(path: &Path) -> Result<()> {
    let catalog = Catalog::load_from_path(path)
        .with_context(|| format!("Failed to load model catalog from {:?}", path))?;

    print!("{}", render_table(catalog.list()));
    Ok(())
}

/// Fixed-width table of the catalog, `-` for untracked dimensions
fn render_table(models: &[ResourceDefinition]) -> String {
    let cell = |value: Option<u64>| value.map_or_else(|| "-".to_string(), |v| v.to_string());

    let header = ["NAME", "RPM", "RPD", "TPM", "TPD", "ASH", "ASD"].map(str::to_string);
    let rows: Vec<[String; 7]> = models
        .iter()
        .map(|model| {
            [
                model.name.clone(),
                model.requests_per_minute.to_string(),
                model.requests_per_day.to_string(),
                cell(model.tokens_per_minute),
                cell(model.tokens_per_day),
                cell(model.aux_per_minute),
                cell(model.aux_per_day),
            ]
        })
        .collect();

    let mut widths = header.clone().map(|h| h.len());
    for row in &rows {
        for (width, value) in widths.iter_mut().zip(row) {
            *width = (*width).max(value.len());
        }
    }

    let mut out = String::new();
    for row in std::iter::once(&header).chain(rows.iter()) {
        let line: Vec<String> = row
            .iter()
            .zip(widths)
            .map(|(value, width)| format!("{:<width$}", value, width = width))
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    }
    out
}
