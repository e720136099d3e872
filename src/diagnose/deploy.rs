use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One observation term as the deployment controller assembles it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationTermConfig {
    pub name: String,
    pub dims: usize,
    pub scale: f64,
}

impl ObservationTermConfig {
    pub fn new(name: &str, dims: usize, scale: f64) -> Self {
        Self {
            name: name.to_string(),
            dims,
            scale,
        }
    }
}

/// MuJoCo deployment settings (`[deploy]` section).
///
/// Per-joint lists follow `joint_names` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub joint_names: Vec<String>,
    pub default_joint_pos: Vec<f64>,
    pub action_scale: Vec<f64>,
    pub kp: Vec<f64>,
    pub kd: Vec<f64>,
    pub observations: Vec<ObservationTermConfig>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        let joint_names = ["FR", "FL", "RR", "RL"]
            .iter()
            .flat_map(|leg| ["hip", "thigh", "calf"].map(|part| format!("{leg}_{part}")))
            .collect();
        DeployConfig {
            joint_names,
            default_joint_pos: [0.0, 0.8, -1.5].repeat(4),
            action_scale: [0.125, 0.25, 0.25].repeat(4),
            kp: vec![25.0; 12],
            kd: vec![0.5; 12],
            observations: vec![
                ObservationTermConfig::new("ang_vel", 3, 0.25),
                ObservationTermConfig::new("gravity_vec", 3, 1.0),
                ObservationTermConfig::new("commands", 3, 1.0),
                ObservationTermConfig::new("dof_pos", 12, 1.0),
                ObservationTermConfig::new("dof_vel", 12, 0.05),
                ObservationTermConfig::new("actions", 12, 1.0),
            ],
        }
    }
}

impl DeployConfig {
    pub fn num_joints(&self) -> usize {
        self.joint_names.len()
    }

    /// Length of the concatenated observation vector.
    pub fn observation_dims(&self) -> usize {
        self.observations.iter().map(|t| t.dims).sum()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.joint_names.is_empty() {
            return Err(ConfigError::Validation(
                "deploy.joint_names must not be empty".into(),
            ));
        }
        let n = self.num_joints();
        for (field, len) in [
            ("default_joint_pos", self.default_joint_pos.len()),
            ("action_scale", self.action_scale.len()),
            ("kp", self.kp.len()),
            ("kd", self.kd.len()),
        ] {
            if len != n {
                return Err(ConfigError::Validation(format!(
                    "deploy.{field} has {len} entries but there are {n} joints"
                )));
            }
        }
        if self.kp.iter().chain(&self.kd).any(|g| !g.is_finite() || *g < 0.0) {
            return Err(ConfigError::Validation(
                "deploy.kp and deploy.kd must be finite and >= 0".into(),
            ));
        }

        let mut seen = BTreeSet::new();
        for term in &self.observations {
            if term.dims == 0 {
                return Err(ConfigError::Validation(format!(
                    "deploy observation '{}' must have dims > 0",
                    term.name
                )));
            }
            if !seen.insert(term.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "deploy observation '{}' appears more than once",
                    term.name
                )));
            }
        }
        Ok(())
    }
}
