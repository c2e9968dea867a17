use crate::descriptor::model_descriptor;
use crate::extract::extract;
use crate::module::materialize;
use crate::options::BuildOptions;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use trsp_core::{
    Engine, Error, GraphArtifact, ModelConfig, OnnxEngine, RepositoryConfig, Result, TensorSet,
};
use trsp_onnx::OnnxGraph;

/// What was written for one model.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltModel {
    pub name: String,
    pub descriptor_path: PathBuf,
    pub versions: Vec<u32>,
    /// Tensors as declared in the descriptor.
    pub tensors: TensorSet,
    /// Artifacts placed in the version directories.
    pub artifacts: Vec<PathBuf>,
}

/// Materializes repositories, reading graph-format models as `G`.
pub struct RepositoryBuilder<G: GraphArtifact = OnnxGraph> {
    options: BuildOptions,
    _graph: PhantomData<G>,
}

impl<G: GraphArtifact> RepositoryBuilder<G> {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            _graph: PhantomData,
        }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Repository root after path resolution.
    pub fn root(&self, config: &RepositoryConfig) -> PathBuf {
        self.options.resolve(&config.model_repository)
    }

    /// Builds every model in declaration order, stopping at the first failure.
    /// Models built before the failure stay on disk.
    pub fn build(&self, config: &RepositoryConfig) -> Result<Vec<BuiltModel>> {
        let root = self.root(config);
        if self.options.clean && root.exists() {
            std::fs::remove_dir_all(&root).map_err(|e| Error::fs(&root, e))?;
            info!(root = %root.display(), "removed existing repository");
        }
        create_dir(&root)?;
        info!(
            root = %root.display(),
            models = config.models.len(),
            "building model repository"
        );

        config
            .models
            .values()
            .map(|model| self.build_model(&root, model))
            .collect()
    }

    pub fn build_model(&self, root: &Path, model: &ModelConfig) -> Result<BuiltModel> {
        let model_dir = root.join(&model.name);
        create_dir(&model_dir)?;

        let mut artifacts = Vec::new();
        let tensors = match &model.engine {
            Engine::Onnx(onnx) => self.build_graphs(model, onnx, &model_dir, &mut artifacts)?,
            Engine::Python(python) => {
                let dirs = python
                    .versions
                    .iter()
                    .map(|entry| version_dir(&model_dir, entry.version))
                    .collect::<Result<Vec<_>>>()?;
                for (entry, dir) in python.versions.iter().zip(&dirs) {
                    let source = self.options.resolve(&entry.module.path);
                    artifacts.extend(materialize(
                        &entry.module,
                        &source,
                        &python.tensor,
                        dir,
                        self.options.python_wrapper,
                    )?);
                }
                python.tensor.clone()
            }
            Engine::Ensemble(ensemble) => {
                for version in model.versions() {
                    version_dir(&model_dir, version)?;
                }
                ensemble.tensor.clone().unwrap_or_default()
            }
        };

        let descriptor = model_descriptor(model, &tensors);
        let descriptor_path = model_dir.join(&self.options.descriptor_file_name);
        std::fs::write(&descriptor_path, descriptor.to_document())
            .map_err(|e| Error::fs(&descriptor_path, e))?;
        info!(
            model = %model.name,
            engine = %model.kind(),
            path = %descriptor_path.display(),
            "wrote model configuration"
        );

        Ok(BuiltModel {
            name: model.name.clone(),
            descriptor_path,
            versions: model.versions(),
            tensors,
            artifacts,
        })
    }

    /// Rewrites each version's graph. The descriptor describes the highest
    /// version, so disagreeing versions are reported.
    fn build_graphs(
        &self,
        model: &ModelConfig,
        onnx: &OnnxEngine,
        model_dir: &Path,
        artifacts: &mut Vec<PathBuf>,
    ) -> Result<TensorSet> {
        let dirs = onnx
            .versions
            .iter()
            .map(|entry| version_dir(model_dir, entry.version))
            .collect::<Result<Vec<_>>>()?;

        let mut latest: Option<(u32, TensorSet)> = None;
        for (entry, dir) in onnx.versions.iter().zip(&dirs) {
            let source = self.options.resolve(&entry.path);
            let (tensors, target) =
                extract::<G>(&source, dir, onnx.dtype, model.dynamic_batching)?;
            debug!(model = %model.name, version = entry.version, "extracted tensors");
            artifacts.push(target);

            match &latest {
                Some((_, seen)) if *seen != tensors => warn!(
                    model = %model.name,
                    version = entry.version,
                    "graph tensors differ between versions; the configuration follows the highest version"
                ),
                _ => {}
            }
            if latest.as_ref().map_or(true, |(v, _)| entry.version > *v) {
                latest = Some((entry.version, tensors));
            }
        }
        Ok(latest.map(|(_, tensors)| tensors).unwrap_or_default())
    }
}

impl Default for RepositoryBuilder<OnnxGraph> {
    fn default() -> Self {
        Self::new(BuildOptions::default())
    }
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::fs(path, e))
}

fn version_dir(model_dir: &Path, version: u32) -> Result<PathBuf> {
    let dir = model_dir.join(version.to_string());
    create_dir(&dir)?;
    Ok(dir)
}
