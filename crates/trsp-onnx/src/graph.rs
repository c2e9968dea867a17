use crate::error::{OnnxError, Result};
use crate::wire::Message;
use bytes::Bytes;
use tracing::trace;
use trsp_core::{DType, Dim, GraphArtifact, GraphTensor, TensorRole};

// Field numbers from onnx.proto.
pub(crate) const MODEL_IR_VERSION: u32 = 1;
pub(crate) const MODEL_GRAPH: u32 = 7;
pub(crate) const GRAPH_NAME: u32 = 2;
pub(crate) const GRAPH_INPUT: u32 = 11;
pub(crate) const GRAPH_OUTPUT: u32 = 12;
pub(crate) const VALUE_INFO_NAME: u32 = 1;
pub(crate) const VALUE_INFO_TYPE: u32 = 2;
pub(crate) const TYPE_TENSOR: u32 = 1;
pub(crate) const TENSOR_ELEM_TYPE: u32 = 1;
pub(crate) const TENSOR_SHAPE: u32 = 2;
pub(crate) const SHAPE_DIM: u32 = 1;
pub(crate) const DIM_VALUE: u32 = 1;
pub(crate) const DIM_PARAM: u32 = 2;

/// An ONNX `ModelProto` held at the field level.
///
/// Only the graph's `input` and `output` value infos are interpreted; nodes,
/// initializers, metadata and any fields unknown to this crate are written
/// back byte for byte.
#[derive(Debug, Clone)]
pub struct OnnxGraph {
    model: Message,
    graph: Message,
}

impl OnnxGraph {
    pub fn from_bytes(bytes: Bytes) -> Result<Self> {
        let model = Message::decode(bytes)?;
        let graph = model.message(MODEL_GRAPH)?.ok_or(OnnxError::MissingGraph)?;
        Ok(Self { model, graph })
    }

    pub fn ir_version(&self) -> Option<u64> {
        self.model.varint(MODEL_IR_VERSION)
    }

    pub fn graph_name(&self) -> Result<Option<String>> {
        self.graph.string(GRAPH_NAME)
    }

    fn role_field(role: TensorRole) -> u32 {
        match role {
            TensorRole::Input => GRAPH_INPUT,
            TensorRole::Output => GRAPH_OUTPUT,
        }
    }
}

fn read_value_info(bytes: &Bytes) -> Result<GraphTensor> {
    let info = Message::decode(bytes.clone())?;
    let name = info.string(VALUE_INFO_NAME)?.unwrap_or_default();

    let tensor = match info.message(VALUE_INFO_TYPE)? {
        Some(ty) => ty.message(TYPE_TENSOR)?,
        None => None,
    };
    let Some(tensor) = tensor else {
        return Ok(GraphTensor {
            name,
            dims: Vec::new(),
            elem_type: None,
        });
    };

    let elem_type = tensor
        .varint(TENSOR_ELEM_TYPE)
        .and_then(|code| i32::try_from(code).ok())
        .and_then(DType::from_onnx_elem_type);

    let dims = match tensor.message(TENSOR_SHAPE)? {
        Some(shape) => shape
            .repeated(SHAPE_DIM)
            .map(read_dim)
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    Ok(GraphTensor {
        name,
        dims,
        elem_type,
    })
}

fn read_dim(bytes: &Bytes) -> Result<Dim> {
    let dim = Message::decode(bytes.clone())?;
    Ok(match dim.last_of(&[DIM_VALUE, DIM_PARAM]) {
        Some(DIM_PARAM) => Dim::Symbolic(dim.string(DIM_PARAM)?.unwrap_or_default()),
        Some(_) => Dim::Fixed(dim.varint(DIM_VALUE).unwrap_or_default() as i64),
        None => Dim::Unknown,
    })
}

impl GraphArtifact for OnnxGraph {
    type Error = OnnxError;

    const EXTENSION: &'static str = "onnx";

    fn format_name(&self) -> &str {
        "onnx"
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes(Bytes::copy_from_slice(bytes))
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.model
            .encode_replacing(MODEL_GRAPH, &self.graph, &mut out);
        out
    }

    fn tensors(&self, role: TensorRole) -> Result<Vec<GraphTensor>> {
        self.graph
            .repeated(Self::role_field(role))
            .map(read_value_info)
            .collect()
    }

    fn mark_batch_dim(&mut self, role: TensorRole, index: usize, symbol: &str) -> Result<()> {
        let edited = self
            .graph
            .edit_repeated(Self::role_field(role), index, |info| {
                let name = info.string(VALUE_INFO_NAME)?.unwrap_or_default();
                let has_tensor_type = info
                    .message(VALUE_INFO_TYPE)?
                    .is_some_and(|ty| ty.count(TYPE_TENSOR) > 0);
                if !has_tensor_type {
                    return Err(OnnxError::NotATensor { name });
                }

                info.edit_message(VALUE_INFO_TYPE, |ty| {
                    ty.edit_message(TYPE_TENSOR, |tensor| {
                        let rank = tensor
                            .message(TENSOR_SHAPE)?
                            .map(|shape| shape.count(SHAPE_DIM))
                            .unwrap_or(0);
                        if rank == 0 {
                            return Err(OnnxError::NoBatchDimension { name });
                        }
                        tensor.edit_message(TENSOR_SHAPE, |shape| {
                            shape.edit_repeated(SHAPE_DIM, 0, |dim| {
                                dim.remove(DIM_VALUE);
                                dim.remove(DIM_PARAM);
                                dim.push_string(DIM_PARAM, symbol);
                                Ok(())
                            })
                        })
                    })
                })
            })?;

        match edited {
            Some(_) => {
                trace!(%role, index, symbol, "marked batch dimension");
                Ok(())
            }
            None => Err(OnnxError::NoSuchTensor { role, index }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture;

    fn graph() -> OnnxGraph {
        let bytes = fixture::model_bytes(&[("x", &[1, 3, 224, 224])], &[("y", &[1, 1000])]);
        OnnxGraph::decode(&bytes).unwrap()
    }

    #[test]
    fn test_reads_inputs_and_outputs() {
        let graph = graph();
        let inputs = graph.inputs().unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].name, "x");
        assert_eq!(inputs[0].sizes(), vec![1, 3, 224, 224]);
        assert_eq!(inputs[0].elem_type, Some(DType::F32));

        let outputs = graph.outputs().unwrap();
        assert_eq!(outputs[0].name, "y");
        assert_eq!(outputs[0].sizes(), vec![1, 1000]);
        assert_eq!(graph.ir_version(), Some(8));
        assert_eq!(graph.graph_name().unwrap().as_deref(), Some("fixture"));
    }

    #[test]
    fn test_unmodified_encode_is_identical() {
        let bytes = fixture::model_bytes(&[("x", &[1, 3])], &[("y", &[1])]);
        let graph = OnnxGraph::decode(&bytes).unwrap();
        assert_eq!(graph.encode(), bytes);
    }

    #[test]
    fn test_mark_batch_dim() {
        let mut graph = graph();
        graph
            .mark_batch_dim(TensorRole::Input, 0, "x_dynamic_axes_1")
            .unwrap();
        graph
            .mark_batch_dim(TensorRole::Output, 0, "y_dynamic_axes_1")
            .unwrap();

        let reloaded = OnnxGraph::decode(&graph.encode()).unwrap();
        let input = &reloaded.inputs().unwrap()[0];
        assert_eq!(input.dims[0], Dim::Symbolic("x_dynamic_axes_1".to_string()));
        assert_eq!(input.dims[1..], [Dim::Fixed(3), Dim::Fixed(224), Dim::Fixed(224)]);
        assert_eq!(input.sizes(), vec![0, 3, 224, 224]);

        let output = &reloaded.outputs().unwrap()[0];
        assert_eq!(output.dims[0], Dim::Symbolic("y_dynamic_axes_1".to_string()));
    }

    #[test]
    fn test_mark_batch_dim_preserves_rest_of_model() {
        let mut graph = graph();
        graph
            .mark_batch_dim(TensorRole::Input, 0, "x_dynamic_axes_1")
            .unwrap();
        let reloaded = OnnxGraph::decode(&graph.encode()).unwrap();
        assert_eq!(reloaded.model.count(MODEL_GRAPH), 1);
        assert_eq!(reloaded.graph.count(fixture::GRAPH_NODE), 1);
        assert_eq!(reloaded.graph.count(fixture::GRAPH_INITIALIZER), 1);
        assert_eq!(reloaded.model.count(fixture::MODEL_OPSET_IMPORT), 1);
    }

    #[test]
    fn test_mark_missing_tensor() {
        let mut graph = graph();
        let err = graph
            .mark_batch_dim(TensorRole::Input, 3, "s")
            .unwrap_err();
        assert!(matches!(err, OnnxError::NoSuchTensor { index: 3, .. }));
    }

    #[test]
    fn test_mark_scalar_tensor() {
        let bytes = fixture::model_bytes(&[("s", &[])], &[("y", &[1])]);
        let mut graph = OnnxGraph::decode(&bytes).unwrap();
        let err = graph
            .mark_batch_dim(TensorRole::Input, 0, "s_dynamic_axes_1")
            .unwrap_err();
        assert!(matches!(err, OnnxError::NoBatchDimension { ref name } if name == "s"));
    }

    #[test]
    fn test_missing_graph() {
        let err = OnnxGraph::decode(&[]).unwrap_err();
        assert!(matches!(err, OnnxError::MissingGraph));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(OnnxGraph::decode(b"not an onnx model at all").is_err());
    }
}
