//! Synthetic ONNX models for tests.
//!
//! The generated model carries an opset import, one node and one initializer
//! besides the requested inputs and outputs, so rewriting can be checked for
//! collateral changes.

use crate::graph::{
    DIM_VALUE, GRAPH_INPUT, GRAPH_NAME, GRAPH_OUTPUT, MODEL_GRAPH, MODEL_IR_VERSION,
    SHAPE_DIM, TENSOR_ELEM_TYPE, TENSOR_SHAPE, TYPE_TENSOR, VALUE_INFO_NAME, VALUE_INFO_TYPE,
};
use crate::wire::Message;

pub const MODEL_PRODUCER_NAME: u32 = 2;
pub const MODEL_OPSET_IMPORT: u32 = 8;
pub const GRAPH_NODE: u32 = 1;
pub const GRAPH_INITIALIZER: u32 = 5;

const ELEM_FLOAT: u64 = 1;

fn value_info(name: &str, dims: &[i64]) -> Message {
    let mut shape = Message::new();
    for &size in dims {
        let mut dim = Message::new();
        dim.push_varint(DIM_VALUE, size as u64);
        shape.push_message(SHAPE_DIM, &dim);
    }

    let mut tensor = Message::new();
    tensor
        .push_varint(TENSOR_ELEM_TYPE, ELEM_FLOAT)
        .push_message(TENSOR_SHAPE, &shape);

    let mut ty = Message::new();
    ty.push_message(TYPE_TENSOR, &tensor);

    let mut info = Message::new();
    info.push_string(VALUE_INFO_NAME, name)
        .push_message(VALUE_INFO_TYPE, &ty);
    info
}

/// Encodes a float32 model with the given inputs and outputs, all dimensions fixed.
pub fn model_bytes(inputs: &[(&str, &[i64])], outputs: &[(&str, &[i64])]) -> Vec<u8> {
    let mut node = Message::new();
    node.push_string(1, inputs.first().map(|(n, _)| *n).unwrap_or("in"))
        .push_string(2, outputs.first().map(|(n, _)| *n).unwrap_or("out"))
        .push_string(4, "Identity");

    let mut initializer = Message::new();
    initializer
        .push_varint(1, 2)
        .push_varint(2, ELEM_FLOAT)
        .push_string(8, "w")
        .push_bytes(9, vec![0u8; 8]);

    let mut graph = Message::new();
    graph
        .push_message(GRAPH_NODE, &node)
        .push_string(GRAPH_NAME, "fixture")
        .push_message(GRAPH_INITIALIZER, &initializer);
    for (name, dims) in inputs {
        graph.push_message(GRAPH_INPUT, &value_info(name, dims));
    }
    for (name, dims) in outputs {
        graph.push_message(GRAPH_OUTPUT, &value_info(name, dims));
    }

    let mut opset = Message::new();
    opset.push_string(1, "").push_varint(2, 17);

    let mut model = Message::new();
    model
        .push_varint(MODEL_IR_VERSION, 8)
        .push_string(MODEL_PRODUCER_NAME, "trsp-fixture")
        .push_message(MODEL_GRAPH, &graph)
        .push_message(MODEL_OPSET_IMPORT, &opset);
    model.to_bytes().to_vec()
}
