use anyhow::{Context, Result};
use clap::Parser;
use egress_logs_to_config::collect_destinations;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Generate an allowlist from a discovery-mode event log
#[derive(Parser, Debug)]
#[command(name = "logs-to-config")]
#[command(about = "Generate an allowlist YAML file from proxy discovery logs", long_about = None)]
struct Cli {
    /// Input log file (JSON lines)
    #[arg(long)]
    input: PathBuf,

    /// Output YAML allowlist file
    #[arg(long, default_value = "allowlist.yaml")]
    output: PathBuf,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let input = cli.input.display();
    let file =
        File::open(&cli.input).with_context(|| format!("Failed to open input file {}", input))?;
    let collected = collect_destinations(BufReader::new(file))
        .with_context(|| format!("Failed to read log file {}", input))?;
    info!(
        "Scanned {} lines ({} skipped)",
        collected.lines, collected.skipped
    );

    let document = collected.into_document();
    document
        .save(&cli.output)
        .with_context(|| format!("Failed to write {}", cli.output.display()))?;

    println!(
        "Generated {} with {} unique destinations",
        cli.output.display(),
        document.allowlist.len()
    );
    for destination in &document.allowlist {
        println!("  - {}", destination);
    }

    Ok(())
}
