//! Validation tests for trsp-config

use std::path::PathBuf;
use tempfile::tempdir;
use trsp_config::{from_yaml_str, load, to_yaml_string};
use trsp_core::{
    DType, Engine, EngineKind, Error, InstanceKind, TensorSpec, VersionSelector,
};

fn validation_field(err: Error) -> (String, String) {
    match err {
        Error::Validation { model, field, .. } => (model, field),
        other => panic!("expected a validation error, got {other:?}"),
    }
}

const ONNX: &str = r#"
model_repository: /tmp/repo
models:
  m1:
    engine: onnx
    max_batch_size: 4
    dynamic_batching: true
    versions:
      - version: 1
        path: model.onnx
"#;

#[test]
fn test_minimal_onnx_model() {
    let config = from_yaml_str(ONNX).unwrap();
    assert_eq!(config.model_repository, PathBuf::from("/tmp/repo"));

    let model = config.model("m1").unwrap();
    assert_eq!(model.name, "m1");
    assert_eq!(model.kind(), EngineKind::Onnx);
    assert_eq!(model.max_batch_size, 4);
    assert!(model.dynamic_batching);
    assert_eq!(model.max_queue_delay_microseconds, None);
    assert_eq!(model.instance_group, None);
    assert_eq!(model.versions(), vec![1]);

    let Engine::Onnx(onnx) = &model.engine else {
        panic!("expected onnx engine");
    };
    assert_eq!(onnx.dtype, DType::F32);
    assert_eq!(onnx.versions[0].path, PathBuf::from("model.onnx"));
}

#[test]
fn test_models_keep_declaration_order() {
    let config = from_yaml_str(
        r#"
model_repository: repo
models:
  zeta: {engine: onnx, max_batch_size: 0, versions: [{version: 1, path: z.onnx}]}
  alpha: {engine: onnx, max_batch_size: 0, versions: [{version: 1, path: a.onnx}]}
"#,
    )
    .unwrap();
    let names: Vec<&str> = config.models.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["zeta", "alpha"]);
}

#[test]
fn test_model_names_must_be_single_directories() {
    for name in ["../../escaped", "/abs", ".", "..", "a/b", "a\\\\b"] {
        let document = format!(
            "model_repository: repo\nmodels:\n  \"{name}\": {{engine: onnx, max_batch_size: 0, versions: [{{version: 1, path: m.onnx}}]}}\n"
        );
        let err = from_yaml_str(&document).unwrap_err();
        assert_eq!(validation_field(err).1, "models", "name {name:?}");
    }
}

#[test]
fn test_numeric_model_name_collides_with_string() {
    let err = from_yaml_str(
        r#"
model_repository: repo
models:
  1: {engine: onnx, max_batch_size: 0, versions: [{version: 1, path: a.onnx}]}
  "1": {engine: onnx, max_batch_size: 0, versions: [{version: 1, path: b.onnx}]}
"#,
    )
    .unwrap_err();
    assert_eq!(validation_field(err), ("1".into(), "models".into()));
}

#[test]
fn test_missing_top_level_keys() {
    let err = from_yaml_str("models: {}").unwrap_err();
    assert!(matches!(err, Error::MissingKey("model_repository")));

    let err = from_yaml_str("model_repository: repo").unwrap_err();
    assert!(matches!(err, Error::MissingKey("models")));
}

#[test]
fn test_missing_engine_names_model() {
    let err = from_yaml_str(
        "model_repository: repo\nmodels:\n  m1:\n    max_batch_size: 1\n",
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "Invalid configuration for model `m1`: `engine` is missing");
}

#[test]
fn test_missing_max_batch_size() {
    let err = from_yaml_str(
        "model_repository: repo\nmodels:\n  m1:\n    engine: onnx\n",
    )
    .unwrap_err();
    assert_eq!(validation_field(err), ("m1".into(), "max_batch_size".into()));
}

#[test]
fn test_negative_max_batch_size() {
    let err = from_yaml_str(
        "model_repository: repo\nmodels:\n  m1: {engine: onnx, max_batch_size: -2}\n",
    )
    .unwrap_err();
    assert_eq!(validation_field(err).1, "max_batch_size");
}

#[test]
fn test_unknown_engine() {
    let err = from_yaml_str(
        "model_repository: repo\nmodels:\n  m1: {engine: tensorrt, max_batch_size: 1}\n",
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnsupportedType { kind: "engine", ref value } if value == "tensorrt"));
}

#[test]
fn test_versions_required_and_non_empty() {
    let err = from_yaml_str(
        "model_repository: repo\nmodels:\n  m1: {engine: onnx, max_batch_size: 1}\n",
    )
    .unwrap_err();
    assert_eq!(validation_field(err).1, "versions");

    let err = from_yaml_str(
        "model_repository: repo\nmodels:\n  m1: {engine: onnx, max_batch_size: 1, versions: []}\n",
    )
    .unwrap_err();
    assert_eq!(validation_field(err).1, "versions");
}

#[test]
fn test_version_entry_without_version() {
    let err = from_yaml_str(
        r#"
model_repository: repo
models:
  m1:
    engine: onnx
    max_batch_size: 1
    versions:
      - path: model.onnx
"#,
    )
    .unwrap_err();
    assert_eq!(validation_field(err).1, "versions[0].version");
}

#[test]
fn test_onnx_version_without_path() {
    let err = from_yaml_str(
        r#"
model_repository: repo
models:
  m1:
    engine: onnx
    max_batch_size: 1
    versions:
      - version: 1
"#,
    )
    .unwrap_err();
    assert_eq!(validation_field(err), ("m1".into(), "versions[0].path".into()));
}

#[test]
fn test_duplicate_versions() {
    let err = from_yaml_str(
        r#"
model_repository: repo
models:
  m1:
    engine: onnx
    max_batch_size: 1
    versions:
      - {version: 2, path: a.onnx}
      - {version: 2, path: b.onnx}
"#,
    )
    .unwrap_err();
    assert_eq!(validation_field(err).1, "versions[1].version");
}

#[test]
fn test_unknown_dtype() {
    let err = from_yaml_str(
        r#"
model_repository: repo
models:
  m1:
    engine: onnx
    max_batch_size: 1
    dtype: float16
    versions: [{version: 1, path: a.onnx}]
"#,
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnsupportedType { kind: "dtype", .. }));
}

const PYTHON: &str = r#"
model_repository: repo
models:
  pre:
    engine: python
    max_batch_size: 0
    versions:
      - version: 1
        module:
          path: pre.py
          execute: run
          initialize: setup
    tensor:
      input:
        - {dims: [-1, 3], dtype: uint8}
      output:
        - {name: features, dims: [512], dtype: float32}
"#;

#[test]
fn test_python_model() {
    let config = from_yaml_str(PYTHON).unwrap();
    let model = config.model("pre").unwrap();
    let Engine::Python(python) = &model.engine else {
        panic!("expected python engine");
    };

    let module = &python.versions[0].module;
    assert_eq!(module.path, PathBuf::from("pre.py"));
    assert_eq!(module.execute, "run");
    assert_eq!(module.initialize.as_deref(), Some("setup"));
    assert_eq!(module.finalize, None);

    assert_eq!(
        python.tensor.input,
        vec![TensorSpec::new("pre_input_1", DType::U8, vec![-1, 3])]
    );
    assert_eq!(
        python.tensor.output,
        vec![TensorSpec::new("features", DType::F32, vec![512])]
    );
}

#[test]
fn test_python_requires_execute() {
    let document = PYTHON.replace("          execute: run\n", "");
    let err = from_yaml_str(&document).unwrap_err();
    assert_eq!(validation_field(err).1, "versions[0].module.execute");
}

#[test]
fn test_python_requires_tensor_block() {
    let document = PYTHON.split("    tensor:").next().unwrap().to_string();
    let err = from_yaml_str(&document).unwrap_err();
    assert_eq!(validation_field(err), ("pre".into(), "tensor".into()));
}

#[test]
fn test_python_tensor_entries_need_dims_and_dtype() {
    let document = PYTHON.replace("{dims: [-1, 3], dtype: uint8}", "{dtype: uint8}");
    let err = from_yaml_str(&document).unwrap_err();
    assert_eq!(validation_field(err).1, "tensor.input[0].dims");

    let document = PYTHON.replace("{dims: [-1, 3], dtype: uint8}", "{dims: [3]}");
    let err = from_yaml_str(&document).unwrap_err();
    assert_eq!(validation_field(err).1, "tensor.input[0].dtype");

    let document = PYTHON.replace("{dims: [-1, 3], dtype: uint8}", "{dims: [3], dtype: str}");
    let err = from_yaml_str(&document).unwrap_err();
    assert!(matches!(err, Error::UnsupportedType { kind: "dtype", .. }));
}

#[test]
fn test_python_empty_output_list() {
    let document = PYTHON.replace(
        "      output:\n        - {name: features, dims: [512], dtype: float32}\n",
        "      output: []\n",
    );
    let err = from_yaml_str(&document).unwrap_err();
    assert_eq!(validation_field(err).1, "tensor.output");
}

const ENSEMBLE: &str = r#"
model_repository: repo
models:
  pipe:
    engine: ensemble
    max_batch_size: 0
    steps:
      - model: pre
        version: latest
        input_map: {raw: pipe_input_1}
        output_map: {features: feats}
      - model: m1
        version: 2
"#;

#[test]
fn test_ensemble_model() {
    let config = from_yaml_str(ENSEMBLE).unwrap();
    let model = config.model("pipe").unwrap();
    assert_eq!(model.versions(), vec![1]);

    let Engine::Ensemble(ensemble) = &model.engine else {
        panic!("expected ensemble engine");
    };
    assert_eq!(ensemble.steps.len(), 2);
    assert_eq!(ensemble.steps[0].version, VersionSelector::Latest);
    assert_eq!(ensemble.steps[0].input_map["raw"], "pipe_input_1");
    assert_eq!(ensemble.steps[0].output_map["features"], "feats");
    assert_eq!(ensemble.steps[1].version, VersionSelector::Exact(2));
    assert!(ensemble.steps[1].input_map.is_empty());
    assert!(ensemble.tensor.is_none());
}

#[test]
fn test_ensemble_needs_steps() {
    let err = from_yaml_str(
        "model_repository: repo\nmodels:\n  pipe: {engine: ensemble, max_batch_size: 0}\n",
    )
    .unwrap_err();
    assert_eq!(validation_field(err), ("pipe".into(), "steps".into()));

    let err = from_yaml_str(
        "model_repository: repo\nmodels:\n  pipe: {engine: ensemble, max_batch_size: 0, steps: []}\n",
    )
    .unwrap_err();
    assert_eq!(validation_field(err).1, "steps");
}

#[test]
fn test_ensemble_step_needs_version() {
    let document = ENSEMBLE.replace("        version: 2\n", "");
    let err = from_yaml_str(&document).unwrap_err();
    assert_eq!(validation_field(err).1, "steps[1].version");

    let document = ENSEMBLE.replace("version: latest", "version: newest");
    let err = from_yaml_str(&document).unwrap_err();
    assert_eq!(validation_field(err).1, "steps[0].version");
}

fn with_instance_group(group: &str) -> String {
    format!("{ONNX}    instance_group:\n{group}")
}

#[test]
fn test_instance_group() {
    let config = from_yaml_str(&with_instance_group(
        "      - {kind: gpu, count: 2, gpus: [0, 1]}\n      - {kind: cpu}\n",
    ))
    .unwrap();
    let group = config.model("m1").unwrap().instance_group.clone().unwrap();
    assert_eq!(group[0].kind, InstanceKind::Gpu);
    assert_eq!(group[0].count, Some(2));
    assert_eq!(group[0].gpus, Some(vec![0, 1]));
    assert_eq!(group[1].kind, InstanceKind::Cpu);
    assert_eq!(group[1].count, None);
}

#[test]
fn test_instance_group_needs_kind() {
    let err = from_yaml_str(&with_instance_group("      - {count: 1}\n")).unwrap_err();
    assert_eq!(validation_field(err).1, "instance_group[0].kind");
}

#[test]
fn test_instance_group_count_rules() {
    let err = from_yaml_str(&with_instance_group("      - {kind: cpu, count: 2}\n")).unwrap_err();
    assert_eq!(validation_field(err).1, "instance_group[0].count");

    let err = from_yaml_str(&with_instance_group("      - {kind: gpu, count: two}\n")).unwrap_err();
    assert_eq!(validation_field(err).1, "instance_group[0].count");
}

#[test]
fn test_instance_group_gpus_must_be_sequence() {
    let err = from_yaml_str(&with_instance_group("      - {kind: gpu, gpus: 0}\n")).unwrap_err();
    assert_eq!(validation_field(err).1, "instance_group[0].gpus");
}

#[test]
fn test_unknown_instance_kind() {
    let err = from_yaml_str(&with_instance_group("      - {kind: tpu}\n")).unwrap_err();
    assert!(matches!(err, Error::UnsupportedType { kind: "instance kind", .. }));
}

#[test]
fn test_instance_kind_is_case_sensitive() {
    let err = from_yaml_str(&with_instance_group("      - {kind: GPU}\n")).unwrap_err();
    assert!(matches!(err, Error::UnsupportedType { kind: "instance kind", .. }));
}

#[test]
fn test_python_instance_group_checked_before_tensor() {
    let document = PYTHON
        .split("    tensor:")
        .next()
        .unwrap()
        .to_string()
        + "    instance_group:\n      - {count: 1}\n";
    let err = from_yaml_str(&document).unwrap_err();
    assert_eq!(validation_field(err), ("pre".into(), "instance_group[0].kind".into()));
}

#[test]
fn test_first_violation_wins() {
    let err = from_yaml_str(
        r#"
model_repository: repo
models:
  first: {engine: onnx, max_batch_size: 1}
  second: {max_batch_size: 1}
"#,
    )
    .unwrap_err();
    assert_eq!(validation_field(err), ("first".into(), "versions".into()));
}

#[test]
fn test_load_from_each_format() {
    let dir = tempdir().unwrap();

    let yaml = dir.path().join("config.yaml");
    std::fs::write(&yaml, ONNX).unwrap();

    let json = dir.path().join("config.json");
    std::fs::write(
        &json,
        r#"{"model_repository": "/tmp/repo", "models": {"m1": {
            "engine": "onnx", "max_batch_size": 4, "dynamic_batching": true,
            "versions": [{"version": 1, "path": "model.onnx"}]}}}"#,
    )
    .unwrap();

    let toml = dir.path().join("config.toml");
    std::fs::write(
        &toml,
        r#"model_repository = "/tmp/repo"

[models.m1]
engine = "onnx"
max_batch_size = 4
dynamic_batching = true
versions = [{ version = 1, path = "model.onnx" }]
"#,
    )
    .unwrap();

    let expected = load(&yaml).unwrap();
    assert_eq!(load(&json).unwrap(), expected);
    assert_eq!(load(&toml).unwrap(), expected);
}

#[test]
fn test_export_reloads_to_equal_config() {
    let document = format!(
        "{ONNX}    max_queue_delay_microseconds: 100\n    instance_group:\n      - {{kind: gpu, count: 1, gpus: [0]}}\n{}{}",
        PYTHON.split_once("models:\n").unwrap().1,
        ENSEMBLE.split_once("models:\n").unwrap().1,
    );
    let config = from_yaml_str(&document).unwrap();
    assert_eq!(config.models.len(), 3);

    let exported = to_yaml_string(&config).unwrap();
    let reloaded = from_yaml_str(&exported).unwrap();
    assert_eq!(reloaded, config);
}
