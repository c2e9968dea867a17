//! ONNX support for trsp.
//!
//! [`OnnxGraph`] implements [`trsp_core::GraphArtifact`]: it lists the graph's
//! declared inputs and outputs and can rename their leading dimension to a
//! symbolic batch axis, re-encoding everything else untouched.

mod error;
mod graph;
mod wire;

#[cfg(any(test, feature = "testing"))]
pub mod fixture;

pub use error::{OnnxError, Result};
pub use graph::OnnxGraph;
