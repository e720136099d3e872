use std::collections::BTreeSet;

use burn::module::Param;
use burn::nn::Linear;
use burn::prelude::*;
use burn::tensor::TensorData;
use serde::Serialize;

use crate::checkpoint::{NamedTensor, StateDict};
use crate::error::ExportError;
use crate::policy::network::{ActorNetwork, NOISE_PARAM};

/// Outcome of a non-strict parameter copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    /// Parameters copied into the network.
    pub loaded: Vec<String>,
    /// Checkpoint entries with no matching network parameter (dropped).
    pub unexpected: Vec<String>,
    /// Network parameters absent from the checkpoint (left at init values).
    pub missing: Vec<String>,
}

impl TransferReport {
    pub fn is_exact(&self) -> bool {
        self.unexpected.is_empty() && self.missing.is_empty()
    }
}

/// Collect the policy's parameters: every entry under `prefix` with the
/// prefix stripped, plus the top-level noise vector stored as `noise_key`.
pub fn select_policy_parameters(
    state_dict: &StateDict,
    prefix: &str,
    noise_key: &str,
) -> StateDict {
    let mut selected: StateDict = state_dict
        .with_prefix(prefix)
        .map(|(name, tensor)| (name[prefix.len()..].to_string(), tensor.clone()))
        .collect();
    if let Some(noise) = state_dict.get(noise_key) {
        selected.insert(NOISE_PARAM, noise.clone());
    }
    selected
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Weight(usize),
    Bias(usize),
    Noise,
}

impl Slot {
    /// Map `"{2k}.weight"`, `"{2k}.bias"` or `"std"` onto a network parameter.
    fn parse(key: &str, num_layers: usize) -> Option<Self> {
        if key == NOISE_PARAM {
            return Some(Slot::Noise);
        }
        let (index, field) = key.split_once('.')?;
        let index: usize = index.parse().ok()?;
        if index % 2 != 0 || index / 2 >= num_layers {
            return None;
        }
        match field {
            "weight" => Some(Slot::Weight(index / 2)),
            "bias" => Some(Slot::Bias(index / 2)),
            _ => None,
        }
    }
}

impl<B: Backend> ActorNetwork<B> {
    /// Copy parameters into the network without requiring an exact key match.
    ///
    /// Entries that fit no parameter are reported as unexpected and skipped;
    /// parameters nothing was copied into are reported as missing. A tensor
    /// whose shape disagrees with its target is an error.
    pub fn load_parameters(
        mut self,
        params: &StateDict,
        device: &B::Device,
    ) -> Result<(Self, TransferReport), ExportError> {
        let mut report = TransferReport::default();
        let mut assigned = BTreeSet::new();

        for (key, tensor) in params.iter() {
            match Slot::parse(key, self.layers.len()) {
                Some(Slot::Weight(k)) => assign_weight(&mut self.layers[k], key, tensor, device)?,
                Some(Slot::Bias(k)) => assign_bias(&mut self.layers[k], key, tensor, device)?,
                Some(Slot::Noise) => {
                    let expected = vec![self.num_actions()];
                    check_shape(key, &expected, tensor)?;
                    self.std = Param::from_tensor(Tensor::from_data(
                        TensorData::new(tensor.values.clone(), expected),
                        device,
                    ));
                }
                None => {
                    report.unexpected.push(key.to_string());
                    continue;
                }
            }
            assigned.insert(key.to_string());
            report.loaded.push(key.to_string());
        }

        report.missing = self
            .parameter_names()
            .into_iter()
            .filter(|name| !assigned.contains(name))
            .collect();
        Ok((self, report))
    }
}

fn assign_weight<B: Backend>(
    layer: &mut Linear<B>,
    key: &str,
    tensor: &NamedTensor,
    device: &B::Device,
) -> Result<(), ExportError> {
    // burn stores [d_input, d_output]; checkpoints store [d_output, d_input]
    let [d_input, d_output] = layer.weight.dims();
    check_shape(key, &[d_output, d_input], tensor)?;
    let weight = Tensor::<B, 2>::from_data(
        TensorData::new(tensor.values.clone(), [d_output, d_input]),
        device,
    )
    .transpose();
    layer.weight = Param::from_tensor(weight);
    Ok(())
}

fn assign_bias<B: Backend>(
    layer: &mut Linear<B>,
    key: &str,
    tensor: &NamedTensor,
    device: &B::Device,
) -> Result<(), ExportError> {
    let [_, d_output] = layer.weight.dims();
    check_shape(key, &[d_output], tensor)?;
    let bias =
        Tensor::<B, 1>::from_data(TensorData::new(tensor.values.clone(), [d_output]), device);
    layer.bias = Some(Param::from_tensor(bias));
    Ok(())
}

fn check_shape(key: &str, expected: &[usize], tensor: &NamedTensor) -> Result<(), ExportError> {
    if tensor.shape != expected {
        return Err(ExportError::ShapeMismatch {
            key: key.to_string(),
            expected: expected.to_vec(),
            found: tensor.shape.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::network::{Activation, ActorNetworkConfig};
    use crate::testing::mlp_state_dict;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn network(
        num_obs: usize,
        hidden: Vec<usize>,
        num_actions: usize,
    ) -> ActorNetwork<TestBackend> {
        ActorNetworkConfig::new(num_obs, num_actions, hidden, Activation::Elu)
            .init(&Default::default())
    }

    #[test]
    fn test_select_strips_prefix_and_adds_noise() {
        let mut dict = mlp_state_dict("actor.", &[3, 4, 2]);
        dict.insert("std", NamedTensor::new(vec![2], vec![0.5, 0.5]));
        dict.insert("critic.0.weight", NamedTensor::new(vec![1, 3], vec![0.0; 3]));

        let selected = select_policy_parameters(&dict, "actor.", "std");
        let keys: Vec<&str> = selected.keys().collect();
        assert_eq!(keys, ["0.bias", "0.weight", "2.bias", "2.weight", "std"]);
    }

    #[test]
    fn test_exact_transfer_reproduces_weights() {
        let dict = mlp_state_dict("", &[3, 2]);
        let device = Default::default();
        let (net, report) = network(3, vec![], 2).load_parameters(&dict, &device).unwrap();

        assert_eq!(report.loaded, ["0.bias", "0.weight"]);
        assert_eq!(report.missing, ["std"]);
        assert!(report.unexpected.is_empty());

        // y = x W^T + b with x = e_0 picks column 0 of W, i.e. W[:, 0]
        let w = dict.get("0.weight").unwrap();
        let b = dict.get("0.bias").unwrap();
        let x = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![1.0f32, 0.0, 0.0], [1, 3]),
            &device,
        );
        let y: Vec<f32> = net.forward(x).into_data().to_vec().unwrap();
        for j in 0..2 {
            let expected = w.values[j * 3] + b.values[j];
            assert!((y[j] - expected).abs() < 1e-6, "output {j}: {} vs {}", y[j], expected);
        }
    }

    #[test]
    fn test_unmatched_keys_are_dropped_and_counted() {
        // Checkpoint carries a third layer the declared architecture lacks.
        let mut dict = mlp_state_dict("", &[4, 6, 6, 6]);
        dict.insert("std", NamedTensor::new(vec![6], vec![1.0; 6]));
        dict.insert("1.running_mean", NamedTensor::new(vec![6], vec![0.0; 6]));

        let device = Default::default();
        let (net, report) = network(4, vec![6], 6).load_parameters(&dict, &device).unwrap();

        assert_eq!(report.unexpected, ["1.running_mean", "4.bias", "4.weight"]);
        assert!(report.missing.is_empty());
        assert!(!report.is_exact());
        let std: Vec<f32> = net.noise_std().into_data().to_vec().unwrap();
        assert_eq!(std, vec![1.0; 6]);
    }

    #[test]
    fn test_shape_mismatch_is_an_error() {
        let dict = mlp_state_dict("", &[4, 8, 2]);
        let device = Default::default();
        let err = network(4, vec![5], 2).load_parameters(&dict, &device).unwrap_err();
        match err {
            ExportError::ShapeMismatch { key, expected, found } => {
                assert_eq!(key, "0.bias");
                assert_eq!(expected, vec![5]);
                assert_eq!(found, vec![8]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_slot_parse() {
        assert_eq!(Slot::parse("0.weight", 2), Some(Slot::Weight(0)));
        assert_eq!(Slot::parse("2.bias", 2), Some(Slot::Bias(1)));
        assert_eq!(Slot::parse("std", 2), Some(Slot::Noise));
        assert_eq!(Slot::parse("1.weight", 2), None);
        assert_eq!(Slot::parse("4.weight", 2), None);
        assert_eq!(Slot::parse("layer.weight", 2), None);
    }
}
