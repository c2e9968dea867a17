use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use trsp_core::{Error, ModuleSpec, Result, TensorSet};

/// File name the python backend loads from a version directory.
pub const WRAPPER_FILE_NAME: &str = "model.py";

/// Copies the module entry point into `version_dir` and, when `wrapper` is set,
/// generates the `model.py` that adapts it to the python backend.
///
/// Returns the paths written.
pub(crate) fn materialize(
    module: &ModuleSpec,
    source: &Path,
    tensors: &TensorSet,
    version_dir: &Path,
    wrapper: bool,
) -> Result<Vec<PathBuf>> {
    let file_name = source
        .file_name()
        .ok_or_else(|| Error::artifact(source, "module path has no file name"))?;
    let code = std::fs::read(source).map_err(|e| Error::artifact(source, e))?;

    let copied = version_dir.join(file_name);
    std::fs::write(&copied, code).map_err(|e| Error::fs(&copied, e))?;
    debug!(path = %copied.display(), "copied python module");

    if !wrapper {
        return Ok(vec![copied]);
    }
    if file_name == WRAPPER_FILE_NAME {
        warn!(
            path = %source.display(),
            "module is already named {WRAPPER_FILE_NAME}; not generating a wrapper"
        );
        return Ok(vec![copied]);
    }

    let target = version_dir.join(WRAPPER_FILE_NAME);
    let text = wrapper_source(module, &file_name.to_string_lossy(), tensors);
    std::fs::write(&target, text).map_err(|e| Error::fs(&target, e))?;
    debug!(path = %target.display(), "wrote python wrapper");
    Ok(vec![copied, target])
}

struct PyStr<'a>(&'a str);

impl std::fmt::Display for PyStr<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_char('"')?;
        for c in self.0.chars() {
            match c {
                '"' => f.write_str("\\\"")?,
                '\\' => f.write_str("\\\\")?,
                '\n' => f.write_str("\\n")?,
                _ => f.write_char(c)?,
            }
        }
        f.write_char('"')
    }
}

fn py_list<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let items: Vec<String> = names.map(|name| PyStr(name).to_string()).collect();
    format!("[{}]", items.join(", "))
}

fn py_optional(name: Option<&str>) -> String {
    name.map(|n| PyStr(n).to_string())
        .unwrap_or_else(|| "None".to_string())
}

pub(crate) fn wrapper_source(module: &ModuleSpec, module_file: &str, tensors: &TensorSet) -> String {
    format!(
        r#"# Generated by trsp; manual edits are overwritten on the next build.
import importlib.util
import os

import numpy as np
import triton_python_backend_utils as pb_utils

MODULE_FILE = {module_file}
INPUTS = {inputs}
OUTPUTS = {outputs}
INITIALIZE = {initialize}
EXECUTE = {execute}
FINALIZE = {finalize}


def _load_module():
    path = os.path.join(os.path.dirname(os.path.abspath(__file__)), MODULE_FILE)
    spec = importlib.util.spec_from_file_location("trsp_module", path)
    module = importlib.util.module_from_spec(spec)
    spec.loader.exec_module(module)
    return module


class TritonPythonModel:
    def initialize(self, args):
        self._module = _load_module()
        self._execute = getattr(self._module, EXECUTE)
        if INITIALIZE is None:
            self._state = args
        else:
            self._state = getattr(self._module, INITIALIZE)(args)

    def execute(self, requests):
        responses = []
        for request in requests:
            inputs = [
                pb_utils.get_input_tensor_by_name(request, name).as_numpy()
                for name in INPUTS
            ]
            outputs = self._execute(self._state, inputs)
            if not isinstance(outputs, (list, tuple)):
                outputs = [outputs]
            tensors = [
                pb_utils.Tensor(name, np.asarray(value))
                for name, value in zip(OUTPUTS, outputs)
            ]
            responses.append(pb_utils.InferenceResponse(output_tensors=tensors))
        return responses

    def finalize(self):
        if FINALIZE is not None:
            getattr(self._module, FINALIZE)(self._state)
"#,
        module_file = PyStr(module_file),
        inputs = py_list(tensors.input.iter().map(|t| t.name.as_str())),
        outputs = py_list(tensors.output.iter().map(|t| t.name.as_str())),
        initialize = py_optional(module.initialize.as_deref()),
        execute = PyStr(&module.execute),
        finalize = py_optional(module.finalize.as_deref()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use trsp_core::{DType, TensorSpec};

    fn module(path: &str) -> ModuleSpec {
        ModuleSpec {
            path: PathBuf::from(path),
            execute: "run".to_string(),
            initialize: Some("setup".to_string()),
            finalize: None,
        }
    }

    fn tensors() -> TensorSet {
        TensorSet::new(
            vec![
                TensorSpec::new("pre_input_1", DType::U8, vec![-1, 3]),
                TensorSpec::new("mask", DType::Bool, vec![-1]),
            ],
            vec![TensorSpec::new("features", DType::F32, vec![512])],
        )
    }

    #[test]
    fn test_wrapper_source() {
        let text = wrapper_source(&module("pre.py"), "pre.py", &tensors());
        assert!(text.contains("MODULE_FILE = \"pre.py\"\n"));
        assert!(text.contains("INPUTS = [\"pre_input_1\", \"mask\"]\n"));
        assert!(text.contains("OUTPUTS = [\"features\"]\n"));
        assert!(text.contains("INITIALIZE = \"setup\"\n"));
        assert!(text.contains("EXECUTE = \"run\"\n"));
        assert!(text.contains("FINALIZE = None\n"));
        assert!(text.contains("class TritonPythonModel:"));
    }

    #[test]
    fn test_py_str_escapes() {
        assert_eq!(PyStr("a\"b\\c").to_string(), r#""a\"b\\c""#);
    }

    #[test]
    fn test_materialize() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("pre.py");
        std::fs::write(&source, "def run(state, inputs):\n    return inputs\n").unwrap();
        let version_dir = dir.path().join("1");
        std::fs::create_dir(&version_dir).unwrap();

        let written = materialize(&module("pre.py"), &source, &tensors(), &version_dir, true).unwrap();
        assert_eq!(written, vec![version_dir.join("pre.py"), version_dir.join("model.py")]);
        assert_eq!(
            std::fs::read_to_string(version_dir.join("pre.py")).unwrap(),
            std::fs::read_to_string(&source).unwrap()
        );
    }

    #[test]
    fn test_materialize_without_wrapper() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("model.py");
        std::fs::write(&source, "class TritonPythonModel:\n    pass\n").unwrap();
        let version_dir = dir.path().join("1");
        std::fs::create_dir(&version_dir).unwrap();

        let written = materialize(&module("model.py"), &source, &tensors(), &version_dir, true).unwrap();
        assert_eq!(written, vec![version_dir.join("model.py")]);
        assert_eq!(
            std::fs::read_to_string(version_dir.join("model.py")).unwrap(),
            "class TritonPythonModel:\n    pass\n"
        );
    }

    #[test]
    fn test_materialize_missing_module() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("absent.py");
        let err = materialize(&module("absent.py"), &source, &tensors(), dir.path(), true).unwrap_err();
        assert!(matches!(err, Error::ArtifactLoad { .. }));
    }
}
