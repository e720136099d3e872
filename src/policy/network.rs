use burn::module::{Ignored, Param};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::policy::architecture::LayerWidths;

/// Name of the exploration-noise parameter inside the network.
pub const NOISE_PARAM: &str = "std";

/// Pointwise nonlinearity between hidden layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Elu,
    Relu,
    Tanh,
}

impl Activation {
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            // alpha = 1: x for x >= 0, exp(x) - 1 otherwise
            Activation::Elu => {
                let negative = x.clone().lower_elem(0.0);
                let expm1 = x.clone().exp().sub_scalar(1.0);
                x.mask_where(negative, expm1)
            }
            Activation::Relu => burn::tensor::activation::relu(x),
            Activation::Tanh => burn::tensor::activation::tanh(x),
        }
    }

    /// ONNX operator implementing this activation.
    pub fn onnx_op(&self) -> &'static str {
        match self {
            Activation::Elu => "Elu",
            Activation::Relu => "Relu",
            Activation::Tanh => "Tanh",
        }
    }
}

/// Feed-forward actor rebuilt from a checkpoint.
///
/// ```text
/// Input:  [batch, num_obs]
/// Linear: num_obs -> hidden[0], activation
/// ...
/// Linear: hidden[n-1] -> num_actions   (no activation)
/// std:    [num_actions]                (noise scale, not used by forward)
/// ```
#[derive(Module, Debug)]
pub struct ActorNetwork<B: Backend> {
    pub(crate) layers: Vec<Linear<B>>,
    activation: Ignored<Activation>,
    pub(crate) std: Param<Tensor<B, 1>>,
}

#[derive(Config, Debug)]
pub struct ActorNetworkConfig {
    pub num_obs: usize,
    pub num_actions: usize,
    pub hidden_dims: Vec<usize>,
    pub activation: Activation,
}

impl ActorNetworkConfig {
    pub fn from_widths(widths: &LayerWidths, activation: Activation) -> Self {
        ActorNetworkConfig::new(
            widths.num_obs(),
            widths.num_actions(),
            widths.hidden_dims().to_vec(),
            activation,
        )
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ActorNetwork<B> {
        let mut layers = Vec::with_capacity(self.hidden_dims.len() + 1);
        let mut input_dim = self.num_obs;
        for &hidden_dim in &self.hidden_dims {
            layers.push(LinearConfig::new(input_dim, hidden_dim).init(device));
            input_dim = hidden_dim;
        }
        layers.push(LinearConfig::new(input_dim, self.num_actions).init(device));

        ActorNetwork {
            layers,
            activation: Ignored(self.activation),
            std: Param::from_tensor(Tensor::zeros([self.num_actions], device)),
        }
    }
}

impl<B: Backend> ActorNetwork<B> {
    /// Forward pass: observations [batch, num_obs] -> mean actions [batch, num_actions].
    pub fn forward(&self, observations: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.layers.len() - 1;
        let mut x = observations;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if i < last {
                x = self.activation.0.forward(x);
            }
        }
        x
    }

    pub fn layers(&self) -> &[Linear<B>] {
        &self.layers
    }

    pub fn activation(&self) -> Activation {
        self.activation.0
    }

    pub fn noise_std(&self) -> Tensor<B, 1> {
        self.std.val()
    }

    pub fn num_obs(&self) -> usize {
        self.layers[0].weight.dims()[0]
    }

    pub fn num_actions(&self) -> usize {
        self.layers[self.layers.len() - 1].weight.dims()[1]
    }

    /// Parameter names in the checkpoint's sequential layout: affine layer
    /// `k` sits at index `2k`, activations occupy the odd indices.
    pub fn parameter_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.layers.len() * 2 + 1);
        for (k, layer) in self.layers.iter().enumerate() {
            names.push(format!("{}.weight", 2 * k));
            if layer.bias.is_some() {
                names.push(format!("{}.bias", 2 * k));
            }
        }
        names.push(NOISE_PARAM.to_string());
        names
    }
}
