use std::fs;
use std::path::{Path, PathBuf};

use burn::backend::NdArray;
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::checkpoint::{Checkpoint, TrainingMetadata};
use crate::error::ExportError;
use crate::export::onnx::{save, to_model_proto, PortableModel, DEFAULT_OPSET};
use crate::export::trace::{tensor_values, trace, GraphValue};
use crate::export::verify::{compare, Tolerance, Verification};
use crate::policy::{
    select_policy_parameters, Activation, ActorNetworkConfig, ArchitectureOverrides, LayerWidths,
    TransferReport,
};

/// CPU backend used for reconstruction and tracing.
pub type ExportBackend = NdArray<f32>;

/// Export settings (`[export]` section).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Name prefix of the policy sub-network's tensors.
    pub policy_prefix: String,
    /// Top-level key of the exploration-noise vector.
    pub noise_key: String,
    pub activation: Activation,
    /// Rows in the synthetic example input; the graph is specialized to it.
    pub batch_size: usize,
    /// Seed for the example input. `None` draws from OS entropy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub atol: f32,
    pub rtol: f32,
    /// Graph file name used when no output path is given.
    pub output_file_name: String,
    pub opset_version: i64,
    /// Write `<graph stem>.json` next to the graph.
    pub write_sidecar: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            policy_prefix: "actor.".to_string(),
            noise_key: "std".to_string(),
            activation: Activation::Elu,
            batch_size: 1,
            seed: None,
            atol: 1e-6,
            rtol: 1e-5,
            output_file_name: "policy.onnx".to_string(),
            opset_version: DEFAULT_OPSET,
            write_sidecar: true,
        }
    }
}

impl ExportConfig {
    pub fn tolerance(&self) -> Tolerance {
        Tolerance {
            atol: self.atol,
            rtol: self.rtol,
        }
    }
}

/// One export job.
#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    pub checkpoint: PathBuf,
    /// Graph path; defaults to `output_file_name` beside the checkpoint.
    pub output: Option<PathBuf>,
    pub overrides: ArchitectureOverrides,
}

impl ExportRequest {
    pub fn new(checkpoint: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint: checkpoint.into(),
            ..Default::default()
        }
    }
}

/// Everything known about a finished export. Also the sidecar's contents.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub checkpoint: PathBuf,
    pub checkpoint_kind: String,
    pub metadata: TrainingMetadata,
    pub graph_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidecar_path: Option<PathBuf>,
    pub detected: LayerWidths,
    pub architecture: LayerWidths,
    pub activation: Activation,
    pub input: GraphValue,
    pub output: GraphValue,
    pub opset_version: i64,
    pub transfer: TransferReport,
    pub verification: Verification,
    pub file_size_bytes: u64,
}

impl ExportReport {
    pub fn file_size_mb(&self) -> f64 {
        self.file_size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Runs checkpoint -> portable graph exports.
pub struct Exporter {
    config: ExportConfig,
    device: <ExportBackend as Backend>::Device,
}

impl Exporter {
    pub fn new(config: ExportConfig) -> Self {
        Self {
            config,
            device: Default::default(),
        }
    }

    pub fn default_output_path(&self, checkpoint: &Path) -> PathBuf {
        checkpoint
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(&self.config.output_file_name)
    }

    /// Load, reconstruct, trace, save, reload and verify.
    ///
    /// The graph file is written before verification; on
    /// [`ExportError::OutputMismatch`] it is left on disk for inspection.
    pub fn export(&self, request: &ExportRequest) -> Result<ExportReport, ExportError> {
        let cfg = &self.config;
        let prefix = cfg.policy_prefix.as_str();

        let checkpoint = Checkpoint::open(&request.checkpoint)?;
        info!(path = %request.checkpoint.display(), kind = %checkpoint.kind(), "loaded checkpoint");
        let state_dict = checkpoint.state_dict()?;
        debug!(tensors = state_dict.len(), "read state dict");

        let detected = LayerWidths::infer(&state_dict, prefix)?;
        info!(architecture = %detected, "detected architecture");
        let architecture = detected.clone().with_overrides(&request.overrides)?;

        let network = ActorNetworkConfig::from_widths(&architecture, cfg.activation)
            .init::<ExportBackend>(&self.device);
        let params = select_policy_parameters(&state_dict, prefix, &cfg.noise_key);
        let (network, transfer) = network.load_parameters(&params, &self.device)?;
        if transfer.is_exact() {
            info!(loaded = transfer.loaded.len(), "transferred parameters");
        } else {
            warn!(
                loaded = transfer.loaded.len(),
                unexpected = ?transfer.unexpected,
                missing = ?transfer.missing,
                "non-strict parameter transfer"
            );
        }

        let shape = [cfg.batch_size, architecture.num_obs()];
        let observations = sample_observations(cfg.batch_size, architecture.num_obs(), cfg.seed);
        let input = Tensor::<ExportBackend, 2>::from_data(
            TensorData::new(observations.clone(), shape),
            &self.device,
        );
        let reference = tensor_values(network.forward(input.clone()))?;

        let (graph, _) = trace(&network, input, prefix)?;
        info!(
            nodes = graph.nodes.len(),
            initializers = graph.initializers.len(),
            "traced forward pass"
        );

        let graph_path = request
            .output
            .clone()
            .unwrap_or_else(|| self.default_output_path(&request.checkpoint));
        if let Some(parent) = graph_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file_size_bytes = save(&to_model_proto(&graph, cfg.opset_version), &graph_path)?;
        info!(path = %graph_path.display(), bytes = file_size_bytes, "saved portable graph");

        let portable = PortableModel::load(&graph_path)?;
        let (output_shape, output) = portable.run(&shape, &observations)?;
        if output_shape != graph.output.shape {
            return Err(ExportError::Runtime(format!(
                "reloaded graph produced shape {output_shape:?}, expected {:?}",
                graph.output.shape
            )));
        }
        let verification = compare(&output, &reference, cfg.tolerance()).ensure()?;
        info!(max_abs_diff = verification.max_abs_diff, "verified reloaded graph");

        let mut report = ExportReport {
            checkpoint: request.checkpoint.clone(),
            checkpoint_kind: checkpoint.kind().to_string(),
            metadata: checkpoint.metadata().clone(),
            graph_path,
            sidecar_path: None,
            detected,
            architecture,
            activation: cfg.activation,
            input: graph.input,
            output: graph.output,
            opset_version: cfg.opset_version,
            transfer,
            verification,
            file_size_bytes,
        };
        if cfg.write_sidecar {
            let sidecar = report.graph_path.with_extension("json");
            report.sidecar_path = Some(sidecar.clone());
            fs::write(&sidecar, serde_json::to_string_pretty(&report)?)?;
            debug!(path = %sidecar.display(), "wrote sidecar");
        }
        Ok(report)
    }
}

/// Draw `batch * num_obs` standard-normal values, row-major.
pub fn sample_observations(batch: usize, num_obs: usize, seed: Option<u64>) -> Vec<f32> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    (0..batch * num_obs).map(|_| rng.sample(StandardNormal)).collect()
}
