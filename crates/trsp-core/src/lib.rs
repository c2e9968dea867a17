//! Core types for building Triton model repositories.
//!
//! This crate holds the validated configuration model, the error taxonomy,
//! the [`GraphArtifact`] seam implemented by graph formats, and the
//! protobuf-text [`Descriptor`] serializer.

pub mod descriptor;
pub mod dtype;
pub mod error;
pub mod graph;
pub mod instance;
pub mod model;
pub mod tensor;

pub use descriptor::{Descriptor, FormattedValue, Substitutions, Value};
pub use dtype::DType;
pub use error::{Error, Result};
pub use graph::GraphArtifact;
pub use instance::{InstanceKind, InstancePlacement};
pub use model::{
    Engine, EngineKind, EnsembleEngine, EnsembleStep, GraphVersion, ModelConfig, ModuleSpec,
    ModuleVersion, OnnxEngine, PythonEngine, RepositoryConfig, VersionSelector,
};
pub use tensor::{Dim, GraphTensor, TensorRole, TensorSet, TensorSpec};
