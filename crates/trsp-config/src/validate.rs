use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use trsp_core::{
    DType, EnsembleEngine, EnsembleStep, Engine, EngineKind, Error, GraphVersion,
    InstanceKind, InstancePlacement, ModelConfig, ModuleSpec, ModuleVersion, OnnxEngine,
    PythonEngine, RepositoryConfig, Result, TensorRole, TensorSet, TensorSpec, VersionSelector,
};

const MODEL_KEYS: &[&str] = &[
    "engine",
    "max_batch_size",
    "versions",
    "dtype",
    "dynamic_batching",
    "max_queue_delay_microseconds",
    "instance_group",
    "tensor",
    "steps",
    "requirements",
];

/// Engine fields checked before `instance_group`; the tensor block follows it.
enum Stage {
    Onnx(OnnxEngine),
    Python(Vec<ModuleVersion>),
    Ensemble(Vec<EnsembleStep>),
}

pub(crate) fn validate(document: &Value) -> Result<RepositoryConfig> {
    let root = document
        .as_mapping()
        .ok_or_else(|| Error::Parse("the document must be a mapping at the top level".into()))?;

    let repository = root
        .get("model_repository")
        .ok_or(Error::MissingKey("model_repository"))?;
    let models = root.get("models").ok_or(Error::MissingKey("models"))?;

    let repository = repository
        .as_str()
        .ok_or_else(|| Error::Parse("`model_repository` must be a string".into()))?;
    let models = models
        .as_mapping()
        .ok_or_else(|| Error::Parse("`models` must be a mapping of model names".into()))?;

    let mut config = RepositoryConfig::new(repository);
    for (key, value) in models {
        let name = model_name(key)?;
        if config.models.contains_key(&name) {
            return Err(Error::validation(name, "models", "is declared more than once"));
        }
        let model = ModelScope { name: &name }.validate(value)?;
        debug!(model = %name, engine = %model.kind(), "validated model");
        config.models.insert(name, model);
    }

    check_ensemble_references(&config);
    Ok(config)
}

/// Model names become directories directly under the repository root, so
/// each must be exactly one normal path component.
fn model_name(key: &Value) -> Result<String> {
    let name = match key {
        Value::String(name) if !name.is_empty() => name.clone(),
        Value::Number(number) => number.to_string(),
        other => {
            return Err(Error::Parse(format!(
                "model names must be non-empty strings, found {other:?}"
            )))
        }
    };

    let mut components = Path::new(&name).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single || name.contains(['/', '\\']) {
        return Err(Error::validation(
            name,
            "models",
            "must be a single directory name",
        ));
    }
    Ok(name)
}

fn check_ensemble_references(config: &RepositoryConfig) {
    for model in config.models.values() {
        let Engine::Ensemble(ensemble) = &model.engine else {
            continue;
        };
        for step in &ensemble.steps {
            if !config.models.contains_key(&step.model) {
                warn!(
                    model = %model.name,
                    step = %step.model,
                    "ensemble step refers to a model that is not part of this repository"
                );
            }
        }
    }
}

/// Validation context for one entry of `models`; every error it raises names
/// the model.
struct ModelScope<'a> {
    name: &'a str,
}

impl ModelScope<'_> {
    fn missing(&self, field: impl Into<String>) -> Error {
        Error::missing(self.name, field)
    }

    fn invalid(&self, field: impl Into<String>, reason: impl Into<String>) -> Error {
        Error::validation(self.name, field, reason)
    }

    fn mapping<'v>(&self, value: &'v Value, field: &str) -> Result<&'v Mapping> {
        value
            .as_mapping()
            .ok_or_else(|| self.invalid(field, "must be a mapping"))
    }

    fn sequence<'v>(&self, value: &'v Value, field: &str) -> Result<&'v [Value]> {
        value
            .as_sequence()
            .map(Vec::as_slice)
            .ok_or_else(|| self.invalid(field, "must be a sequence"))
    }

    fn required<'v>(&self, map: &'v Mapping, key: &str, field: &str) -> Result<&'v Value> {
        map.get(key).ok_or_else(|| self.missing(field))
    }

    fn string(&self, value: &Value, field: &str) -> Result<String> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.invalid(field, "must be a string"))
    }

    fn optional_string(&self, map: &Mapping, key: &str, field: &str) -> Result<Option<String>> {
        map.get(key).map(|v| self.string(v, field)).transpose()
    }

    fn count(&self, value: &Value, field: &str) -> Result<u64> {
        value
            .as_u64()
            .ok_or_else(|| self.invalid(field, "must be a non-negative integer"))
    }

    fn count_u32(&self, value: &Value, field: &str) -> Result<u32> {
        u32::try_from(self.count(value, field)?)
            .map_err(|_| self.invalid(field, "is out of range"))
    }

    fn flag(&self, value: &Value, field: &str) -> Result<bool> {
        value
            .as_bool()
            .ok_or_else(|| self.invalid(field, "must be true or false"))
    }

    fn validate(&self, value: &Value) -> Result<ModelConfig> {
        let map = self.mapping(value, "model")?;

        let engine = self.required(map, "engine", "engine")?;
        let max_batch_size = self.required(map, "max_batch_size", "max_batch_size")?;
        let engine = self.string(engine, "engine")?;
        let max_batch_size = self.count_u32(max_batch_size, "max_batch_size")?;
        let kind: EngineKind = engine.parse()?;

        for key in map.keys() {
            match key.as_str() {
                Some(key) if MODEL_KEYS.contains(&key) => {}
                _ => warn!(model = self.name, key = ?key, "ignoring unknown model key"),
            }
        }

        let versions = match kind {
            EngineKind::Ensemble => map
                .get("versions")
                .map(|v| self.version_entries(v))
                .transpose()?
                .unwrap_or_default(),
            EngineKind::Onnx | EngineKind::Python => {
                let versions = self.required(map, "versions", "versions")?;
                let entries = self.version_entries(versions)?;
                if entries.is_empty() {
                    return Err(self.invalid("versions", "must not be empty"));
                }
                entries
            }
        };

        let engine = match kind {
            EngineKind::Onnx => Stage::Onnx(self.onnx(map, &versions)?),
            EngineKind::Python => Stage::Python(self.python(&versions)?),
            EngineKind::Ensemble => Stage::Ensemble(self.ensemble(map)?),
        };

        let instance_group = map
            .get("instance_group")
            .map(|v| self.instance_group(v))
            .transpose()?;

        // The tensor block is checked after instance_group.
        let engine = match engine {
            Stage::Onnx(onnx) => Engine::Onnx(onnx),
            Stage::Python(modules) => {
                let tensor = self.required(map, "tensor", "tensor")?;
                Engine::Python(PythonEngine {
                    versions: modules,
                    tensor: self.tensor_set(tensor)?,
                })
            }
            Stage::Ensemble(steps) => Engine::Ensemble(EnsembleEngine {
                steps,
                tensor: map.get("tensor").map(|v| self.tensor_set(v)).transpose()?,
                versions: versions.iter().map(|(version, _)| *version).collect(),
            }),
        };

        if kind != EngineKind::Onnx && map.contains_key("dtype") {
            warn!(model = self.name, engine = %kind, "`dtype` only applies to onnx models");
        }

        let dynamic_batching = map
            .get("dynamic_batching")
            .map(|v| self.flag(v, "dynamic_batching"))
            .transpose()?
            .unwrap_or(false);
        let queue_delay = map
            .get("max_queue_delay_microseconds")
            .map(|v| self.count(v, "max_queue_delay_microseconds"))
            .transpose()?;

        let mut model = ModelConfig::new(self.name, engine, max_batch_size);
        if dynamic_batching {
            if max_batch_size == 0 {
                warn!(
                    model = self.name,
                    "dynamic batching requested with `max_batch_size: 0`; the runtime will reject it"
                );
            }
            model = model.with_dynamic_batching(queue_delay);
        } else if queue_delay.is_some() {
            warn!(
                model = self.name,
                "`max_queue_delay_microseconds` has no effect without dynamic batching"
            );
        }
        if let Some(group) = instance_group {
            model = model.with_instance_group(group);
        }
        Ok(model)
    }

    /// Entries of `versions` as `(version, entry mapping)`, rejecting duplicates.
    fn version_entries<'v>(&self, value: &'v Value) -> Result<Vec<(u32, &'v Mapping)>> {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for (i, entry) in self.sequence(value, "versions")?.iter().enumerate() {
            let field = format!("versions[{i}]");
            let entry = self.mapping(entry, &field)?;
            let version_field = format!("{field}.version");
            let version = self.required(entry, "version", &version_field)?;
            let version = self.count_u32(version, &version_field)?;
            if version == 0 {
                return Err(self.invalid(version_field, "must be at least 1"));
            }
            if !seen.insert(version) {
                return Err(self.invalid(version_field, format!("duplicates version {version}")));
            }
            entries.push((version, entry));
        }
        Ok(entries)
    }

    fn onnx(&self, map: &Mapping, versions: &[(u32, &Mapping)]) -> Result<OnnxEngine> {
        let mut graphs = Vec::with_capacity(versions.len());
        for (i, (version, entry)) in versions.iter().enumerate() {
            let field = format!("versions[{i}].path");
            let path = self.required(entry, "path", &field)?;
            graphs.push(GraphVersion {
                version: *version,
                path: PathBuf::from(self.string(path, &field)?),
            });
        }

        let dtype = match map.get("dtype") {
            Some(value) => self.string(value, "dtype")?.parse::<DType>()?,
            None => DType::default(),
        };
        Ok(OnnxEngine {
            dtype,
            versions: graphs,
        })
    }

    fn python(&self, versions: &[(u32, &Mapping)]) -> Result<Vec<ModuleVersion>> {
        let mut modules = Vec::with_capacity(versions.len());
        for (i, (version, entry)) in versions.iter().enumerate() {
            let field = format!("versions[{i}].module");
            let module = self.required(entry, "module", &field)?;
            let module = self.mapping(module, &field)?;

            let path_field = format!("{field}.path");
            let path = self.required(module, "path", &path_field)?;
            let path = self.string(path, &path_field)?;
            let execute_field = format!("{field}.execute");
            let execute = self.required(module, "execute", &execute_field)?;
            let execute = self.string(execute, &execute_field)?;

            modules.push(ModuleVersion {
                version: *version,
                module: ModuleSpec {
                    path: PathBuf::from(path),
                    execute,
                    initialize: self.optional_string(
                        module,
                        "initialize",
                        &format!("{field}.initialize"),
                    )?,
                    finalize: self.optional_string(
                        module,
                        "finalize",
                        &format!("{field}.finalize"),
                    )?,
                },
            });
        }
        Ok(modules)
    }

    fn ensemble(&self, map: &Mapping) -> Result<Vec<EnsembleStep>> {
        let steps = self.required(map, "steps", "steps")?;
        let steps = self.sequence(steps, "steps")?;
        if steps.is_empty() {
            return Err(self.invalid("steps", "must not be empty"));
        }
        steps
            .iter()
            .enumerate()
            .map(|(i, step)| self.step(step, &format!("steps[{i}]")))
            .collect()
    }

    fn step(&self, value: &Value, field: &str) -> Result<EnsembleStep> {
        let step = self.mapping(value, field)?;

        let model_field = format!("{field}.model");
        let model = self.required(step, "model", &model_field)?;
        let model = self.string(model, &model_field)?;

        let version_field = format!("{field}.version");
        let version = self.required(step, "version", &version_field)?;
        let version = match version {
            Value::String(s) if s == "latest" => VersionSelector::Latest,
            Value::Number(_) => match self.count_u32(version, &version_field)? {
                0 => return Err(self.invalid(version_field, "must be at least 1")),
                n => VersionSelector::Exact(n),
            },
            _ => {
                return Err(self.invalid(version_field, "must be a version number or `latest`"));
            }
        };

        Ok(EnsembleStep {
            model,
            version,
            input_map: self.tensor_map(step, "input_map", field)?,
            output_map: self.tensor_map(step, "output_map", field)?,
        })
    }

    fn tensor_map(&self, step: &Mapping, key: &str, field: &str) -> Result<IndexMap<String, String>> {
        let field = format!("{field}.{key}");
        let Some(value) = step.get(key) else {
            return Ok(IndexMap::new());
        };
        self.mapping(value, &field)?
            .iter()
            .map(|(k, v)| {
                let k = self.string(k, &field)?;
                let v = self.string(v, &format!("{field}.{k}"))?;
                Ok::<_, Error>((k, v))
            })
            .collect()
    }

    fn tensor_set(&self, value: &Value) -> Result<TensorSet> {
        let block = self.mapping(value, "tensor")?;
        let input = self.tensor_list(block, TensorRole::Input)?;
        let output = self.tensor_list(block, TensorRole::Output)?;
        Ok(TensorSet::new(input, output))
    }

    fn tensor_list(&self, block: &Mapping, role: TensorRole) -> Result<Vec<TensorSpec>> {
        let field = format!("tensor.{role}");
        let list = self.required(block, role.as_str(), &field)?;
        let list = self.sequence(list, &field)?;
        if list.is_empty() {
            return Err(self.invalid(field, "must not be empty"));
        }

        list.iter()
            .enumerate()
            .map(|(i, entry)| {
                let field = format!("{field}[{i}]");
                let entry = self.mapping(entry, &field)?;

                let dims_field = format!("{field}.dims");
                let dims = self.required(entry, "dims", &dims_field)?;
                let dims = self.dims(dims, &dims_field)?;
                let dtype_field = format!("{field}.dtype");
                let dtype = self.required(entry, "dtype", &dtype_field)?;
                let dtype: DType = self.string(dtype, &dtype_field)?.parse()?;

                let name = match self.optional_string(entry, "name", &format!("{field}.name"))? {
                    Some(name) => name,
                    None => format!("{}_{}_{}", self.name, role, i + 1),
                };
                Ok::<_, Error>(TensorSpec::new(name, dtype, dims))
            })
            .collect()
    }

    fn dims(&self, value: &Value, field: &str) -> Result<Vec<i64>> {
        self.sequence(value, field)?
            .iter()
            .map(|dim| match dim.as_i64() {
                Some(size) if size >= -1 => Ok(size),
                _ => Err(self.invalid(field, "entries must be integers of at least -1")),
            })
            .collect()
    }

    fn instance_group(&self, value: &Value) -> Result<Vec<InstancePlacement>> {
        self.sequence(value, "instance_group")?
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let field = format!("instance_group[{i}]");
                let entry = self.mapping(entry, &field)?;

                let kind_field = format!("{field}.kind");
                let kind = self.required(entry, "kind", &kind_field)?;
                let kind: InstanceKind = self.string(kind, &kind_field)?.parse()?;

                let count = match entry.get("count") {
                    None => None,
                    Some(_) if kind != InstanceKind::Gpu => {
                        return Err(self.invalid(
                            format!("{field}.count"),
                            "is only allowed for gpu instances",
                        ));
                    }
                    Some(count) => Some(self.count_u32(count, &format!("{field}.count"))?),
                };

                let gpus_field = format!("{field}.gpus");
                let gpus = entry
                    .get("gpus")
                    .map(|gpus| {
                        self.sequence(gpus, &gpus_field)?
                            .iter()
                            .map(|gpu| self.count_u32(gpu, &gpus_field))
                            .collect::<Result<Vec<_>>>()
                    })
                    .transpose()?;

                Ok::<_, Error>(InstancePlacement { kind, count, gpus })
            })
            .collect()
    }
}
