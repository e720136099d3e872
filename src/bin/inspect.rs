use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use policy_export::checkpoint::Checkpoint;
use policy_export::config::AppConfig;
use policy_export::logging;
use policy_export::policy::LayerWidths;

/// Print what a policy checkpoint contains without exporting it.
#[derive(Parser)]
#[command(name = "inspect", about = "Inspect a policy checkpoint")]
struct Cli {
    /// Checkpoint file written by torch.save
    checkpoint: PathBuf,

    /// Path to TOML configuration file
    #[arg(long, default_value = "export.toml")]
    config: PathBuf,

    /// Name prefix of the policy tensors
    #[arg(long)]
    prefix: Option<String>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose).map_err(|e| anyhow!("initializing logging: {e}"))?;

    let app_config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    let prefix = cli.prefix.unwrap_or(app_config.export.policy_prefix);

    let checkpoint = Checkpoint::open(&cli.checkpoint)?;
    let metadata = checkpoint.metadata();
    println!("Checkpoint: {}", checkpoint.path().display());
    println!("  layout:    {}", checkpoint.kind());
    match metadata.iteration {
        Some(iteration) => println!("  iteration: {iteration}"),
        None => println!("  iteration: unknown"),
    }
    if let Some(infos) = &metadata.infos {
        println!("  infos:     {infos}");
    }

    let state_dict = checkpoint.state_dict()?;
    println!();
    println!("Tensors ({}):", state_dict.len());
    let width = state_dict.keys().map(str::len).max().unwrap_or(0);
    for (name, tensor) in state_dict.iter() {
        println!("  {name:<width$}  {:?}", tensor.shape);
    }

    let widths = LayerWidths::infer(&state_dict, &prefix)?;
    println!();
    println!("Policy under '{prefix}': {widths}");
    Ok(())
}
