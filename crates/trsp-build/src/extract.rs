use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use trsp_core::{DType, Error, GraphArtifact, GraphTensor, Result, TensorRole, TensorSet, TensorSpec};

/// Symbolic name given to the leading dimension of the `ordinal`-th (1-based)
/// tensor of a role.
pub fn batch_symbol(tensor_name: &str, ordinal: usize) -> String {
    format!("{tensor_name}_dynamic_axes_{ordinal}")
}

/// Reads the graph at `source`, optionally marks every input and output batch
/// dimension as symbolic, and writes it to `model.<ext>` inside `version_dir`.
///
/// Returns the declared tensors with the model's dtype. With dynamic batching
/// the leading dimension is left out, as the runtime adds it back.
pub(crate) fn extract<G: GraphArtifact>(
    source: &Path,
    version_dir: &Path,
    dtype: DType,
    dynamic_batching: bool,
) -> Result<(TensorSet, PathBuf)> {
    let bytes = std::fs::read(source).map_err(|e| Error::artifact(source, e))?;
    let mut graph = G::decode(&bytes).map_err(|e| Error::artifact(source, e))?;
    let inputs = graph.inputs().map_err(|e| Error::artifact(source, e))?;
    let outputs = graph.outputs().map_err(|e| Error::artifact(source, e))?;
    debug!(
        path = %source.display(),
        format = graph.format_name(),
        inputs = inputs.len(),
        outputs = outputs.len(),
        "decoded graph"
    );

    if dynamic_batching {
        for (role, tensors) in [(TensorRole::Input, &inputs), (TensorRole::Output, &outputs)] {
            for (i, tensor) in tensors.iter().enumerate() {
                graph
                    .mark_batch_dim(role, i, &batch_symbol(&tensor.name, i + 1))
                    .map_err(|e| Error::artifact(source, e))?;
            }
        }
    }

    let tensors = TensorSet::new(
        declared(source, &inputs, dtype, dynamic_batching),
        declared(source, &outputs, dtype, dynamic_batching),
    );

    let target = version_dir.join(format!("model.{}", G::EXTENSION));
    std::fs::write(&target, graph.encode()).map_err(|e| Error::fs(&target, e))?;
    debug!(path = %target.display(), "wrote graph");
    Ok((tensors, target))
}

fn declared(
    source: &Path,
    tensors: &[GraphTensor],
    dtype: DType,
    dynamic_batching: bool,
) -> Vec<TensorSpec> {
    tensors
        .iter()
        .map(|tensor| {
            if let Some(elem_type) = tensor.elem_type.filter(|&t| t != dtype) {
                warn!(
                    path = %source.display(),
                    tensor = %tensor.name,
                    graph = %elem_type,
                    declared = %dtype,
                    "graph element type differs from the configured dtype"
                );
            }
            let mut dims = tensor.sizes();
            if dynamic_batching && !dims.is_empty() {
                dims.remove(0);
            }
            TensorSpec::new(tensor.name.clone(), dtype, dims)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use trsp_onnx::{fixture, OnnxGraph};

    fn write_model(dir: &Path, inputs: &[(&str, &[i64])], outputs: &[(&str, &[i64])]) -> PathBuf {
        let path = dir.join("source.onnx");
        std::fs::write(&path, fixture::model_bytes(inputs, outputs)).unwrap();
        path
    }

    #[test]
    fn test_batch_symbol() {
        assert_eq!(batch_symbol("images", 2), "images_dynamic_axes_2");
    }

    #[test]
    fn test_extract_dynamic() {
        let dir = tempdir().unwrap();
        let source = write_model(dir.path(), &[("x", &[1, 3, 224, 224])], &[("y", &[1, 1000])]);

        let (tensors, target) =
            extract::<OnnxGraph>(&source, dir.path(), DType::F32, true).unwrap();
        assert_eq!(target, dir.path().join("model.onnx"));
        assert_eq!(tensors.input, vec![TensorSpec::new("x", DType::F32, vec![3, 224, 224])]);
        assert_eq!(tensors.output, vec![TensorSpec::new("y", DType::F32, vec![1000])]);

        let written = OnnxGraph::decode(&std::fs::read(&target).unwrap()).unwrap();
        let input = &written.inputs().unwrap()[0];
        assert_eq!(input.dims[0], trsp_core::Dim::Symbolic("x_dynamic_axes_1".into()));
    }

    #[test]
    fn test_extract_static_copies_graph_unchanged() {
        let dir = tempdir().unwrap();
        let source = write_model(dir.path(), &[("x", &[2, 3])], &[("y", &[2])]);

        let (tensors, target) =
            extract::<OnnxGraph>(&source, dir.path(), DType::I64, false).unwrap();
        assert_eq!(tensors.input, vec![TensorSpec::new("x", DType::I64, vec![2, 3])]);
        assert_eq!(std::fs::read(target).unwrap(), std::fs::read(source).unwrap());
    }

    #[test]
    fn test_extract_missing_source() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("absent.onnx");
        let err = extract::<OnnxGraph>(&source, dir.path(), DType::F32, false).unwrap_err();
        assert!(matches!(err, Error::ArtifactLoad { ref path, .. } if *path == source));
    }

    #[test]
    fn test_extract_malformed_source() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("broken.onnx");
        std::fs::write(&source, b"definitely not protobuf").unwrap();
        let err = extract::<OnnxGraph>(&source, dir.path(), DType::F32, false).unwrap_err();
        assert!(matches!(err, Error::ArtifactLoad { .. }));
    }

    #[test]
    fn test_extract_scalar_input_under_dynamic_batching() {
        let dir = tempdir().unwrap();
        let source = write_model(dir.path(), &[("s", &[])], &[("y", &[1])]);
        let err = extract::<OnnxGraph>(&source, dir.path(), DType::F32, true).unwrap_err();
        assert!(matches!(err, Error::ArtifactLoad { .. }));
        assert!(!dir.path().join("model.onnx").exists());
    }
}
