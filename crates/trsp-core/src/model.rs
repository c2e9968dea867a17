use crate::{DType, Error, InstancePlacement, TensorSet};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A validated repository configuration: where to build and what to build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepositoryConfig {
    pub model_repository: PathBuf,
    /// Models in declaration order.
    pub models: IndexMap<String, ModelConfig>,
}

impl RepositoryConfig {
    pub fn new(model_repository: impl Into<PathBuf>) -> Self {
        Self {
            model_repository: model_repository.into(),
            models: IndexMap::new(),
        }
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.models.insert(model.name.clone(), model);
        self
    }

    pub fn model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelConfig {
    #[serde(skip)]
    pub name: String,
    #[serde(flatten)]
    pub engine: Engine,
    pub max_batch_size: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dynamic_batching: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_queue_delay_microseconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_group: Option<Vec<InstancePlacement>>,
}

impl ModelConfig {
    pub fn new(name: impl Into<String>, engine: Engine, max_batch_size: u32) -> Self {
        Self {
            name: name.into(),
            engine,
            max_batch_size,
            dynamic_batching: false,
            max_queue_delay_microseconds: None,
            instance_group: None,
        }
    }

    pub fn with_dynamic_batching(mut self, max_queue_delay_microseconds: Option<u64>) -> Self {
        self.dynamic_batching = true;
        self.max_queue_delay_microseconds = max_queue_delay_microseconds;
        self
    }

    pub fn with_instance_group(mut self, group: Vec<InstancePlacement>) -> Self {
        self.instance_group = Some(group);
        self
    }

    pub fn kind(&self) -> EngineKind {
        self.engine.kind()
    }

    /// Version numbers that get a directory in the repository.
    pub fn versions(&self) -> Vec<u32> {
        match &self.engine {
            Engine::Onnx(onnx) => onnx.versions.iter().map(|v| v.version).collect(),
            Engine::Python(python) => python.versions.iter().map(|v| v.version).collect(),
            Engine::Ensemble(ensemble) if ensemble.versions.is_empty() => vec![1],
            Engine::Ensemble(ensemble) => ensemble.versions.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "engine", rename_all = "lowercase")]
pub enum Engine {
    Onnx(OnnxEngine),
    Python(PythonEngine),
    Ensemble(EnsembleEngine),
}

impl Engine {
    pub fn kind(&self) -> EngineKind {
        match self {
            Engine::Onnx(_) => EngineKind::Onnx,
            Engine::Python(_) => EngineKind::Python,
            Engine::Ensemble(_) => EngineKind::Ensemble,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnnxEngine {
    pub dtype: DType,
    pub versions: Vec<GraphVersion>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphVersion {
    pub version: u32,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PythonEngine {
    pub versions: Vec<ModuleVersion>,
    pub tensor: TensorSet,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleVersion {
    pub version: u32,
    pub module: ModuleSpec,
}

/// Entry point of a python model: the file and the routines it exposes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleSpec {
    pub path: PathBuf,
    pub execute: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initialize: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalize: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleEngine {
    pub steps: Vec<EnsembleStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tensor: Option<TensorSet>,
    #[serde(
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "serialize_version_entries"
    )]
    pub versions: Vec<u32>,
}

fn serialize_version_entries<S: Serializer>(
    versions: &[u32],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    struct Entry {
        version: u32,
    }
    serializer.collect_seq(versions.iter().map(|&version| Entry { version }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleStep {
    pub model: String,
    pub version: VersionSelector,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub input_map: IndexMap<String, String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub output_map: IndexMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSelector {
    Latest,
    Exact(u32),
}

impl VersionSelector {
    /// Value written to `model_version`; `-1` selects the latest version.
    pub fn model_version(&self) -> i64 {
        match self {
            VersionSelector::Latest => -1,
            VersionSelector::Exact(version) => i64::from(*version),
        }
    }
}

impl Serialize for VersionSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            VersionSelector::Latest => serializer.serialize_str("latest"),
            VersionSelector::Exact(version) => serializer.serialize_u32(*version),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Onnx,
    Python,
    Ensemble,
}

impl EngineKind {
    pub fn name(&self) -> &'static str {
        match self {
            EngineKind::Onnx => "onnx",
            EngineKind::Python => "python",
            EngineKind::Ensemble => "ensemble",
        }
    }

    /// Backend identifier written to the model configuration. Empty for engines
    /// the runtime resolves from the model directory itself.
    pub fn backend(&self) -> &'static str {
        match self {
            EngineKind::Onnx => "onnxruntime",
            EngineKind::Python | EngineKind::Ensemble => "",
        }
    }
}

impl FromStr for EngineKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "onnx" => Ok(EngineKind::Onnx),
            "python" => Ok(EngineKind::Python),
            "ensemble" => Ok(EngineKind::Ensemble),
            _ => Err(Error::unsupported("engine", s)),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
