use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use policy_export::config::AppConfig;
use policy_export::diagnose::diagnose;
use policy_export::logging;

/// Compare Isaac Lab training constants with the MuJoCo deployment settings.
#[derive(Parser)]
#[command(name = "diagnose", about = "Diagnose training vs deployment configuration")]
struct Cli {
    /// Path to TOML configuration file (its [deploy] section is compared)
    #[arg(long, default_value = "export.toml")]
    config: PathBuf,
}

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("Error: {err:#}");
            std::process::exit(1);
        }
    }
}

/// Returns whether every check passed.
fn run() -> Result<bool> {
    let cli = Cli::parse();
    logging::init(false).map_err(|e| anyhow!("initializing logging: {e}"))?;

    let app_config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    let report = diagnose(&app_config.deploy)?;
    print!("{report}");
    Ok(report.is_clean())
}
