use burn::prelude::*;
use serde::Serialize;

use crate::error::ExportError;
use crate::policy::{Activation, ActorNetwork};

pub const INPUT_NAME: &str = "obs";
pub const OUTPUT_NAME: &str = "actions";

/// Name and concrete shape of a graph value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphValue {
    pub name: String,
    pub shape: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TracedOp {
    /// `y = x * W^T + b`, weight stored `[out, in]`.
    Gemm { weight: String, bias: Option<String> },
    Activation(Activation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TracedNode {
    pub name: String,
    pub op: TracedOp,
    pub input: String,
    pub output: String,
    pub output_shape: Vec<usize>,
}

/// Constant tensor captured during tracing.
#[derive(Debug, Clone, PartialEq)]
pub struct Initializer {
    pub name: String,
    pub dims: Vec<usize>,
    pub values: Vec<f32>,
}

/// Forward computation recorded from one execution on an example input.
///
/// Every shape in the graph is the one observed during that execution, so
/// the graph is specialized to the example's batch size.
#[derive(Debug, Clone)]
pub struct TracedGraph {
    pub name: String,
    pub input: GraphValue,
    pub output: GraphValue,
    pub nodes: Vec<TracedNode>,
    pub initializers: Vec<Initializer>,
}

/// Execute `network` on `example`, recording each operation as it runs.
///
/// Initializers are named `{param_prefix}{index}.{weight|bias}` so the graph
/// keeps the checkpoint's parameter names. Returns the graph together with
/// the output of the traced execution.
pub fn trace<B: Backend>(
    network: &ActorNetwork<B>,
    example: Tensor<B, 2>,
    param_prefix: &str,
) -> Result<(TracedGraph, Tensor<B, 2>), ExportError> {
    let scope = param_prefix.trim_end_matches('.');
    let input = GraphValue {
        name: INPUT_NAME.to_string(),
        shape: example.dims().to_vec(),
    };

    let mut nodes = Vec::new();
    let mut initializers = Vec::new();
    let mut current = INPUT_NAME.to_string();
    let mut x = example;

    let last = network.layers().len() - 1;
    for (k, layer) in network.layers().iter().enumerate() {
        let index = 2 * k;

        let weight_name = format!("{param_prefix}{index}.weight");
        let weight = layer.weight.val().transpose();
        initializers.push(Initializer {
            name: weight_name.clone(),
            dims: weight.dims().to_vec(),
            values: tensor_values(weight)?,
        });
        let bias_name = match &layer.bias {
            Some(bias) => {
                let name = format!("{param_prefix}{index}.bias");
                let bias = bias.val();
                initializers.push(Initializer {
                    name: name.clone(),
                    dims: bias.dims().to_vec(),
                    values: tensor_values(bias)?,
                });
                Some(name)
            }
            None => None,
        };

        x = layer.forward(x);
        let output = if k == last {
            OUTPUT_NAME.to_string()
        } else {
            format!("/{scope}/{index}/Gemm_output_0")
        };
        nodes.push(TracedNode {
            name: format!("/{scope}/{index}/Gemm"),
            op: TracedOp::Gemm {
                weight: weight_name,
                bias: bias_name,
            },
            input: current,
            output: output.clone(),
            output_shape: x.dims().to_vec(),
        });
        current = output;

        if k < last {
            let activation = network.activation();
            x = activation.forward(x);
            let op = activation.onnx_op();
            let output = format!("/{scope}/{}/{op}_output_0", index + 1);
            nodes.push(TracedNode {
                name: format!("/{scope}/{}/{op}", index + 1),
                op: TracedOp::Activation(activation),
                input: current,
                output: output.clone(),
                output_shape: x.dims().to_vec(),
            });
            current = output;
        }
    }

    let graph = TracedGraph {
        name: if scope.is_empty() { "policy".to_string() } else { scope.to_string() },
        input,
        output: GraphValue {
            name: OUTPUT_NAME.to_string(),
            shape: x.dims().to_vec(),
        },
        nodes,
        initializers,
    };
    Ok((graph, x))
}

/// Copy a tensor's elements out row-major.
pub fn tensor_values<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
) -> Result<Vec<f32>, ExportError> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| ExportError::Tensor(format!("{e:?}")))
}
