use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::checkpoint::StateDict;
use crate::error::ExportError;

/// Layer width sequence of a feed-forward actor: `[num_obs, hidden.., num_actions]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "Vec<usize>")]
pub struct LayerWidths(Vec<usize>);

impl LayerWidths {
    pub fn new(
        num_obs: usize,
        hidden_dims: &[usize],
        num_actions: usize,
    ) -> Result<Self, ExportError> {
        let mut widths = Vec::with_capacity(hidden_dims.len() + 2);
        widths.push(num_obs);
        widths.extend_from_slice(hidden_dims);
        widths.push(num_actions);
        Self::from_widths(widths)
    }

    pub fn from_widths(widths: Vec<usize>) -> Result<Self, ExportError> {
        if widths.len() < 2 {
            return Err(ExportError::InvalidArchitecture(format!(
                "need at least input and output widths, got {widths:?}"
            )));
        }
        if widths.contains(&0) {
            return Err(ExportError::InvalidArchitecture(format!(
                "layer widths must be > 0, got {widths:?}"
            )));
        }
        Ok(LayerWidths(widths))
    }

    /// Recover the widths from the weight tensors under `prefix`.
    ///
    /// Keys are visited in lexicographic order and taken to be layer order.
    /// The first weight contributes its input width, every weight its output
    /// width. Each weight must consume what the previous one produced.
    pub fn infer(state_dict: &StateDict, prefix: &str) -> Result<Self, ExportError> {
        let mut widths = Vec::new();
        let mut previous: Option<(&str, usize)> = None;

        for (name, tensor) in state_dict.with_prefix(prefix) {
            if !is_weight(name) {
                continue;
            }
            let (d_out, d_in) = match tensor.shape.as_slice() {
                [d_out, d_in] => (*d_out, *d_in),
                _ => {
                    return Err(ExportError::NonMatrixWeight {
                        name: name.to_string(),
                        shape: tensor.shape.clone(),
                    })
                }
            };
            debug!(name, shape = ?tensor.shape, "layer weight");

            match previous {
                None => widths.push(d_in),
                Some((previous_name, produced)) if produced != d_in => {
                    return Err(ExportError::InconsistentLayerChain {
                        previous: previous_name.to_string(),
                        produced,
                        next: name.to_string(),
                        expected: d_in,
                    });
                }
                Some(_) => {}
            }
            widths.push(d_out);
            previous = Some((name, d_out));
        }

        if widths.is_empty() {
            return Err(ExportError::NoModelFound {
                prefix: prefix.to_string(),
            });
        }
        Self::from_widths(widths)
    }

    /// Replace individual fields with user-declared values.
    pub fn with_overrides(self, overrides: &ArchitectureOverrides) -> Result<Self, ExportError> {
        if overrides.is_empty() {
            return Ok(self);
        }
        let mut num_obs = self.num_obs();
        let mut num_actions = self.num_actions();
        let mut hidden_dims = self.hidden_dims().to_vec();

        if let Some(n) = overrides.num_obs.filter(|&n| n != num_obs) {
            warn!(detected = num_obs, declared = n, "overriding observation count");
            num_obs = n;
        }
        if let Some(n) = overrides.num_actions.filter(|&n| n != num_actions) {
            warn!(detected = num_actions, declared = n, "overriding action count");
            num_actions = n;
        }
        if let Some(dims) = overrides.hidden_dims.as_ref().filter(|d| **d != hidden_dims) {
            warn!(detected = ?hidden_dims, declared = ?dims, "overriding hidden dims");
            hidden_dims = dims.clone();
        }
        Self::new(num_obs, &hidden_dims, num_actions)
    }

    pub fn num_obs(&self) -> usize {
        self.0[0]
    }

    pub fn num_actions(&self) -> usize {
        self.0[self.0.len() - 1]
    }

    pub fn hidden_dims(&self) -> &[usize] {
        &self.0[1..self.0.len() - 1]
    }

    pub fn widths(&self) -> &[usize] {
        &self.0
    }

    /// Number of affine layers.
    pub fn num_layers(&self) -> usize {
        self.0.len() - 1
    }
}

impl From<LayerWidths> for Vec<usize> {
    fn from(widths: LayerWidths) -> Self {
        widths.0
    }
}

impl fmt::Display for LayerWidths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {:?} -> {}",
            self.num_obs(),
            self.hidden_dims(),
            self.num_actions()
        )
    }
}

/// Architecture values declared on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchitectureOverrides {
    pub num_obs: Option<usize>,
    pub num_actions: Option<usize>,
    pub hidden_dims: Option<Vec<usize>>,
}

impl ArchitectureOverrides {
    pub fn is_empty(&self) -> bool {
        self.num_obs.is_none() && self.num_actions.is_none() && self.hidden_dims.is_none()
    }
}

fn is_weight(name: &str) -> bool {
    name.rsplit('.').next() == Some("weight")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::NamedTensor;
    use crate::testing::mlp_state_dict;

    fn zeros(shape: Vec<usize>) -> NamedTensor {
        let n = shape.iter().product();
        NamedTensor::new(shape, vec![0.0; n])
    }

    #[test]
    fn test_infer_recovers_generating_widths() {
        for widths in [vec![45, 512, 256, 128, 12], vec![3, 1], vec![8, 16, 4]] {
            let dict = mlp_state_dict("actor.", &widths);
            let inferred = LayerWidths::infer(&dict, "actor.").unwrap();
            assert_eq!(inferred.widths(), widths.as_slice());
        }
    }

    #[test]
    fn test_infer_ignores_other_prefixes_and_biases() {
        let mut dict = mlp_state_dict("actor.", &[6, 10, 2]);
        for (name, tensor) in mlp_state_dict("critic.", &[9, 10, 1]).iter() {
            dict.insert(name, tensor.clone());
        }
        dict.insert("std", zeros(vec![2]));

        let inferred = LayerWidths::infer(&dict, "actor.").unwrap();
        assert_eq!(inferred.num_obs(), 6);
        assert_eq!(inferred.hidden_dims(), &[10]);
        assert_eq!(inferred.num_actions(), 2);
        assert_eq!(inferred.num_layers(), 2);
    }

    #[test]
    fn test_no_model_found() {
        let dict = mlp_state_dict("policy_net.", &[4, 4]);
        let err = LayerWidths::infer(&dict, "actor.").unwrap_err();
        assert!(matches!(err, ExportError::NoModelFound { ref prefix } if prefix == "actor."));
    }

    #[test]
    fn test_inconsistent_chain_fails_fast() {
        let mut dict = StateDict::new();
        dict.insert("actor.0.weight", zeros(vec![16, 4]));
        dict.insert("actor.2.weight", zeros(vec![2, 8]));

        let err = LayerWidths::infer(&dict, "actor.").unwrap_err();
        match err {
            ExportError::InconsistentLayerChain {
                previous,
                produced,
                next,
                expected,
            } => {
                assert_eq!(previous, "actor.0.weight");
                assert_eq!(produced, 16);
                assert_eq!(next, "actor.2.weight");
                assert_eq!(expected, 8);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_double_digit_indices_break_sort_order() {
        // Lexicographic order puts actor.10 before actor.2; the chain check
        // turns that into an error instead of a scrambled network.
        let dict = mlp_state_dict("actor.", &[4, 5, 6, 7, 8, 9, 3]);
        let err = LayerWidths::infer(&dict, "actor.").unwrap_err();
        assert!(matches!(err, ExportError::InconsistentLayerChain { .. }));
    }

    #[test]
    fn test_vector_weight_is_rejected() {
        let mut dict = StateDict::new();
        dict.insert("actor.norm.weight", zeros(vec![4]));
        let err = LayerWidths::infer(&dict, "actor.").unwrap_err();
        assert!(matches!(err, ExportError::NonMatrixWeight { .. }));
    }

    #[test]
    fn test_overrides_replace_fields() {
        let detected = LayerWidths::new(45, &[512, 256, 128], 12).unwrap();
        let overrides = ArchitectureOverrides {
            hidden_dims: Some(vec![256, 128]),
            ..Default::default()
        };
        let widths = detected.with_overrides(&overrides).unwrap();
        assert_eq!(widths.widths(), &[45, 256, 128, 12]);
    }

    #[test]
    fn test_display() {
        let widths = LayerWidths::new(45, &[512, 256, 128], 12).unwrap();
        assert_eq!(widths.to_string(), "45 -> [512, 256, 128] -> 12");
    }

    #[test]
    fn test_zero_width_is_invalid() {
        assert!(LayerWidths::new(0, &[8], 2).is_err());
        assert!(LayerWidths::from_widths(vec![4]).is_err());
    }
}
