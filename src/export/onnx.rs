use std::fs;
use std::path::Path;

use prost_tract_compat::Message;
use tract_onnx::pb::{
    attribute_proto, tensor_proto, tensor_shape_proto, type_proto, AttributeProto, GraphProto,
    ModelProto, NodeProto, OperatorSetIdProto, TensorProto, TensorShapeProto, TypeProto,
    ValueInfoProto,
};
use tract_onnx::prelude::{tvec, Framework, InferenceModelExt, Tensor as TractTensor, TypedModel};
use tracing::debug;

use crate::error::ExportError;
use crate::export::trace::{GraphValue, Initializer, TracedGraph, TracedNode, TracedOp};
use crate::policy::Activation;

pub const IR_VERSION: i64 = 7;
pub const DEFAULT_OPSET: i64 = 13;
const PRODUCER_NAME: &str = env!("CARGO_PKG_NAME");
const PRODUCER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Encode a traced graph as an ONNX model.
pub fn to_model_proto(graph: &TracedGraph, opset_version: i64) -> ModelProto {
    let graph_proto = GraphProto {
        name: graph.name.clone(),
        node: graph.nodes.iter().map(node_proto).collect(),
        initializer: graph.initializers.iter().map(initializer_proto).collect(),
        input: vec![value_info(&graph.input)],
        output: vec![value_info(&graph.output)],
        ..Default::default()
    };

    ModelProto {
        ir_version: IR_VERSION,
        producer_name: PRODUCER_NAME.to_string(),
        producer_version: PRODUCER_VERSION.to_string(),
        opset_import: vec![OperatorSetIdProto {
            domain: String::new(),
            version: opset_version,
            ..Default::default()
        }],
        graph: Some(graph_proto),
        ..Default::default()
    }
}

/// Write the model to `path`, returning the number of bytes written.
pub fn save(model: &ModelProto, path: &Path) -> Result<u64, ExportError> {
    let bytes = model.encode_to_vec();
    fs::write(path, &bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "wrote portable graph");
    Ok(bytes.len() as u64)
}

fn node_proto(node: &TracedNode) -> NodeProto {
    let (op_type, inputs, attribute) = match &node.op {
        TracedOp::Gemm { weight, bias } => {
            let mut inputs = vec![node.input.clone(), weight.clone()];
            inputs.extend(bias.iter().cloned());
            let attributes = vec![
                float_attribute("alpha", 1.0),
                float_attribute("beta", 1.0),
                int_attribute("transB", 1),
            ];
            ("Gemm", inputs, attributes)
        }
        TracedOp::Activation(activation) => {
            let attributes = match activation {
                Activation::Elu => vec![float_attribute("alpha", 1.0)],
                Activation::Relu | Activation::Tanh => Vec::new(),
            };
            (activation.onnx_op(), vec![node.input.clone()], attributes)
        }
    };

    NodeProto {
        name: node.name.clone(),
        op_type: op_type.to_string(),
        input: inputs,
        output: vec![node.output.clone()],
        attribute,
        ..Default::default()
    }
}

fn initializer_proto(initializer: &Initializer) -> TensorProto {
    TensorProto {
        name: initializer.name.clone(),
        dims: initializer.dims.iter().map(|&d| d as i64).collect(),
        data_type: tensor_proto::DataType::Float as i32,
        float_data: initializer.values.clone(),
        ..Default::default()
    }
}

fn value_info(value: &GraphValue) -> ValueInfoProto {
    let dim = value
        .shape
        .iter()
        .map(|&d| tensor_shape_proto::Dimension {
            value: Some(tensor_shape_proto::dimension::Value::DimValue(d as i64)),
            ..Default::default()
        })
        .collect();

    ValueInfoProto {
        name: value.name.clone(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type: tensor_proto::DataType::Float as i32,
                shape: Some(TensorShapeProto { dim }),
                ..Default::default()
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn float_attribute(name: &str, value: f32) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        r#type: attribute_proto::AttributeType::Float as i32,
        f: value,
        ..Default::default()
    }
}

fn int_attribute(name: &str, value: i64) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        r#type: attribute_proto::AttributeType::Int as i32,
        i: value,
        ..Default::default()
    }
}

fn runtime_error(err: impl std::fmt::Display) -> ExportError {
    ExportError::Runtime(format!("{err:#}"))
}

/// Portable graph reloaded from disk and optimized by the ONNX runtime.
#[derive(Debug, Clone)]
pub struct PortableModel {
    model: TypedModel,
}

impl PortableModel {
    pub fn load(path: &Path) -> Result<Self, ExportError> {
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(runtime_error)?
            .into_optimized()
            .map_err(runtime_error)?;
        Ok(Self { model })
    }

    /// Run the graph on one row-major f32 input, returning the first output's
    /// shape and values.
    pub fn run(
        &self,
        shape: &[usize],
        values: &[f32],
    ) -> Result<(Vec<usize>, Vec<f32>), ExportError> {
        let input = TractTensor::from_shape::<f32>(shape, values).map_err(runtime_error)?;
        let plan = self.model.clone().into_runnable().map_err(runtime_error)?;
        let outputs = plan.run(tvec!(input.into())).map_err(runtime_error)?;
        let output = outputs
            .first()
            .ok_or_else(|| ExportError::Runtime("graph produced no outputs".to_string()))?;
        let values = output.as_slice::<f32>().map_err(runtime_error)?.to_vec();
        Ok((output.shape().to_vec(), values))
    }
}
