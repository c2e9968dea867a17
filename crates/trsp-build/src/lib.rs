//! Materializes a Triton model repository from a validated
//! [`RepositoryConfig`](trsp_core::RepositoryConfig).
//!
//! For each model the builder lays out `<root>/<model>/<version>/`, places
//! the graph or module artifacts there and writes the model configuration
//! next to the version directories.

mod builder;
mod descriptor;
mod extract;
mod module;
mod options;

pub use builder::{BuiltModel, RepositoryBuilder};
pub use descriptor::model_descriptor;
pub use extract::batch_symbol;
pub use module::WRAPPER_FILE_NAME;
pub use options::BuildOptions;

/// Builder for repositories whose graph-format models are ONNX files.
pub type OnnxRepositoryBuilder = RepositoryBuilder<trsp_onnx::OnnxGraph>;
