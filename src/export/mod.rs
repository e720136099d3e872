mod onnx;
mod pipeline;
mod trace;
mod verify;

pub use onnx::{save, to_model_proto, PortableModel, DEFAULT_OPSET, IR_VERSION};
pub use pipeline::{
    sample_observations, ExportBackend, ExportConfig, ExportReport, ExportRequest, Exporter,
};
pub use trace::{
    tensor_values, trace, GraphValue, Initializer, TracedGraph, TracedNode, TracedOp, INPUT_NAME,
    OUTPUT_NAME,
};
pub use verify::{compare, Tolerance, Verification};
