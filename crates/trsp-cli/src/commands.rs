use anyhow::{bail, Context, Result};
use clap::Args;
use serde_yaml::{Mapping, Value};
use std::path::PathBuf;
use tracing::{info, warn};
use trsp_build::{BuildOptions, OnnxRepositoryBuilder};
use trsp_core::RepositoryConfig;

#[derive(Args)]
pub struct BuildArgs {
    /// Configuration document (YAML, JSON or TOML)
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,

    /// Remove the repository directory before building
    #[arg(long)]
    pub rebuild: bool,

    /// Directory relative paths are resolved against (default: current directory)
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Do not generate model.py wrappers for python models
    #[arg(long)]
    pub no_python_wrapper: bool,

    #[command(flatten)]
    pub model: ModelArgs,
}

/// A single onnx model described on the command line instead of a document.
#[derive(Args)]
pub struct ModelArgs {
    #[arg(long)]
    pub model_repository: Option<PathBuf>,

    #[arg(long)]
    pub model_path: Option<PathBuf>,

    #[arg(long)]
    pub model_name: Option<String>,

    #[arg(long, default_value_t = 1)]
    pub model_version: u32,

    #[arg(long, default_value_t = 0)]
    pub max_batch_size: u32,

    #[arg(long)]
    pub dynamic_batching: bool,

    #[arg(long, default_value = "float32")]
    pub dtype: String,
}

impl ModelArgs {
    fn any_given(&self) -> bool {
        self.model_repository.is_some()
            || self.model_path.is_some()
            || self.model_name.is_some()
            || self.dynamic_batching
    }

    /// The flags as a configuration document, so they go through the same
    /// validation as a file.
    fn to_document(&self) -> Result<Value> {
        let (Some(repository), Some(path), Some(name)) =
            (&self.model_repository, &self.model_path, &self.model_name)
        else {
            bail!("either -f or all of --model-repository, --model-path and --model-name are required");
        };

        let mut version = Mapping::new();
        version.insert("version".into(), self.model_version.into());
        version.insert("path".into(), path.to_string_lossy().into_owned().into());

        let mut model = Mapping::new();
        model.insert("engine".into(), "onnx".into());
        model.insert("max_batch_size".into(), self.max_batch_size.into());
        model.insert("dtype".into(), self.dtype.as_str().into());
        model.insert("dynamic_batching".into(), self.dynamic_batching.into());
        model.insert("versions".into(), Value::Sequence(vec![Value::Mapping(version)]));

        let mut models = Mapping::new();
        models.insert(name.as_str().into(), Value::Mapping(model));

        let mut root = Mapping::new();
        root.insert(
            "model_repository".into(),
            repository.to_string_lossy().into_owned().into(),
        );
        root.insert("models".into(), Value::Mapping(models));
        Ok(Value::Mapping(root))
    }
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Configuration document (YAML, JSON or TOML)
    #[arg(short = 'f', long = "file")]
    pub file: PathBuf,

    /// Write the validated configuration back out as YAML
    #[arg(long)]
    pub export: Option<PathBuf>,
}

fn load(args: &BuildArgs) -> Result<RepositoryConfig> {
    match &args.file {
        Some(file) => {
            if args.model.any_given() {
                warn!("a configuration file was given; ignoring the single model flags");
            }
            trsp_config::load(file)
                .with_context(|| format!("invalid configuration {}", file.display()))
        }
        None => trsp_config::from_value(&args.model.to_document()?)
            .context("invalid model arguments"),
    }
}

pub fn build(args: BuildArgs) -> Result<()> {
    let config = load(&args)?;

    let mut options = BuildOptions::new()
        .with_clean(args.rebuild)
        .with_python_wrapper(!args.no_python_wrapper);
    if let Some(dir) = &args.base_dir {
        options = options.with_base_dir(dir);
    }

    let builder = OnnxRepositoryBuilder::new(options);
    let root = builder.root(&config);
    let built = builder
        .build(&config)
        .with_context(|| format!("failed to build repository {}", root.display()))?;

    for model in &built {
        println!(
            "{}  versions {:?}  {}",
            model.name,
            model.versions,
            model.descriptor_path.display()
        );
    }
    info!(root = %root.display(), models = built.len(), "repository ready");
    Ok(())
}

pub fn validate(args: ValidateArgs) -> Result<()> {
    let config = trsp_config::load(&args.file)
        .with_context(|| format!("invalid configuration {}", args.file.display()))?;

    for model in config.models.values() {
        println!("{}  {}  versions {:?}", model.name, model.kind(), model.versions());
    }

    if let Some(path) = &args.export {
        trsp_config::export(&config, path)
            .with_context(|| format!("failed to export configuration to {}", path.display()))?;
    }
    Ok(())
}
