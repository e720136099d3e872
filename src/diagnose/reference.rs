//! Isaac Lab training-side constants for the quadruped locomotion task.

use regex::Regex;

use crate::error::DiagnoseError;

/// Articulation joint order, as the training environment enumerates it.
pub const JOINT_NAMES: [&str; 12] = [
    "FR_hip_joint",
    "FR_thigh_joint",
    "FR_calf_joint",
    "FL_hip_joint",
    "FL_thigh_joint",
    "FL_calf_joint",
    "RR_hip_joint",
    "RR_thigh_joint",
    "RR_calf_joint",
    "RL_hip_joint",
    "RL_thigh_joint",
    "RL_calf_joint",
];

/// Suffix the training side appends to every joint name.
pub const JOINT_SUFFIX: &str = "_joint";

/// Default `[hip, thigh, calf]` position of each leg, in radians.
pub const DEFAULT_LEG_POS: [f64; 3] = [0.0, 0.8, -1.5];

/// Action scale rules; the first pattern that matches the whole joint name wins.
pub const ACTION_SCALE_RULES: [(&str, f64); 2] = [(".*_hip_joint", 0.125), (".*", 0.25)];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationTerm {
    pub name: &'static str,
    pub dims: usize,
    pub scale: f64,
}

/// Policy observation layout, concatenated in this order.
pub const OBSERVATION_TERMS: [ObservationTerm; 6] = [
    ObservationTerm { name: "base_ang_vel", dims: 3, scale: 0.25 },
    ObservationTerm { name: "projected_gravity", dims: 3, scale: 1.0 },
    ObservationTerm { name: "velocity_commands", dims: 3, scale: 1.0 },
    ObservationTerm { name: "joint_pos", dims: 12, scale: 1.0 },
    ObservationTerm { name: "joint_vel", dims: 12, scale: 0.05 },
    ObservationTerm { name: "last_action", dims: 12, scale: 1.0 },
];

/// Deployment-side term name -> training-side term name.
pub const OBSERVATION_ALIASES: [(&str, &str); 8] = [
    ("ang_vel", "base_ang_vel"),
    ("gravity_vec", "projected_gravity"),
    ("commands", "velocity_commands"),
    ("dof_pos", "joint_pos"),
    ("dof_vel", "joint_vel"),
    ("actions", "last_action"),
    ("lin_vel", "base_lin_vel"),
    ("heights", "height_scan"),
];

/// Terms switched off in the training observation group.
pub const DISABLED_TERMS: [&str; 2] = ["base_lin_vel", "height_scan"];

pub const KP: f64 = 25.0;
pub const KD: f64 = 0.5;

pub fn default_joint_pos() -> Vec<f64> {
    DEFAULT_LEG_POS.repeat(JOINT_NAMES.len() / DEFAULT_LEG_POS.len())
}

pub fn observation_dims() -> usize {
    OBSERVATION_TERMS.iter().map(|t| t.dims).sum()
}

/// Training-side name for a deployment term; unknown names map to themselves.
pub fn canonical_term(name: &str) -> &str {
    OBSERVATION_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map_or(name, |(_, canonical)| canonical)
}

/// Joint name with the training-side suffix removed.
pub fn strip_joint_suffix(name: &str) -> &str {
    name.strip_suffix(JOINT_SUFFIX).unwrap_or(name)
}

/// Ordered pattern -> scale table.
#[derive(Debug, Clone)]
pub struct ActionScaleRules {
    rules: Vec<(Regex, f64)>,
}

impl ActionScaleRules {
    pub fn compile(rules: &[(&str, f64)]) -> Result<Self, DiagnoseError> {
        let rules = rules
            .iter()
            .map(|&(pattern, scale)| {
                Regex::new(&format!("^(?:{pattern})$"))
                    .map(|re| (re, scale))
                    .map_err(|source| DiagnoseError::Pattern {
                        pattern: pattern.to_string(),
                        source,
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { rules })
    }

    pub fn reference() -> Result<Self, DiagnoseError> {
        Self::compile(&ACTION_SCALE_RULES)
    }

    pub fn scale_for(&self, joint: &str) -> Option<f64> {
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(joint))
            .map(|(_, scale)| *scale)
    }
}
