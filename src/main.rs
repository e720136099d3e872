use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use policy_export::config::AppConfig;
use policy_export::export::{ExportReport, ExportRequest, Exporter};
use policy_export::logging;
use policy_export::policy::ArchitectureOverrides;

/// Export an RL policy checkpoint to a portable ONNX inference graph.
#[derive(Parser)]
#[command(name = "policy_export", about = "Export a policy checkpoint to ONNX")]
struct Cli {
    /// Checkpoint file written by torch.save
    checkpoint: PathBuf,

    /// Output graph path [default: <checkpoint dir>/policy.onnx]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override the detected observation count
    #[arg(long)]
    num_obs: Option<usize>,

    /// Override the detected action count
    #[arg(long)]
    num_actions: Option<usize>,

    /// Override the detected hidden widths, e.g. `512 256 128` or `512,256,128`
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    hidden_dims: Option<Vec<usize>>,

    /// Path to TOML configuration file
    #[arg(long, default_value = "export.toml")]
    config: PathBuf,

    /// Seed for the synthetic example input
    #[arg(long)]
    seed: Option<u64>,

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

    let mut app_config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    // Apply CLI overrides
    if let Some(seed) = cli.seed {
        app_config.export.seed = Some(seed);
    }
    if let Some(prefix) = cli.prefix {
        app_config.export.policy_prefix = prefix;
    }
    app_config.validate().context("validating configuration")?;

    let request = ExportRequest {
        checkpoint: cli.checkpoint,
        output: cli.output,
        overrides: ArchitectureOverrides {
            num_obs: cli.num_obs,
            num_actions: cli.num_actions,
            hidden_dims: cli.hidden_dims,
        },
    };

    let exporter = Exporter::new(app_config.export);
    let report = exporter
        .export(&request)
        .with_context(|| format!("exporting {}", request.checkpoint.display()))?;
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &ExportReport) {
    let iteration = report
        .metadata
        .iteration
        .map_or_else(|| "unknown".to_string(), |i| i.to_string());
    let v = &report.verification;

    println!("Export complete");
    println!("  checkpoint:    {}", report.checkpoint.display());
    println!("  layout:        {}", report.checkpoint_kind);
    println!("  iteration:     {iteration}");
    if let Some(infos) = &report.metadata.infos {
        println!("  infos:         {infos}");
    }
    if report.detected != report.architecture {
        println!("  detected:      {}", report.detected);
    }
    println!("  architecture:  {} ({:?})", report.architecture, report.activation);
    println!("  input:         {} {:?}", report.input.name, report.input.shape);
    println!("  output:        {} {:?}", report.output.name, report.output.shape);
    println!(
        "  parameters:    {} loaded, {} unexpected, {} missing",
        report.transfer.loaded.len(),
        report.transfer.unexpected.len(),
        report.transfer.missing.len()
    );
    println!(
        "  max abs diff:  {:e} (atol {:e}, rtol {:e})",
        v.max_abs_diff, v.tolerance.atol, v.tolerance.rtol
    );
    if let Some(sidecar) = &report.sidecar_path {
        println!("  sidecar:       {}", sidecar.display());
    }
    println!("  graph:         {}", report.graph_path.display());
    println!("  file size:     {:.2} MB", report.file_size_mb());
}
