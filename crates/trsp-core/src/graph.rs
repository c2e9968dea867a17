use crate::{GraphTensor, TensorRole};

/// A serialized computation graph whose declared tensor shapes can be read and
/// whose batch dimension can be made symbolic.
pub trait GraphArtifact: Sized {
    type Error: std::error::Error + Send + Sync + 'static;

    /// File extension of the artifact inside a version directory (`model.<ext>`).
    const EXTENSION: &'static str;

    fn format_name(&self) -> &str;

    fn decode(bytes: &[u8]) -> Result<Self, Self::Error>;

    fn encode(&self) -> Vec<u8>;

    fn tensors(&self, role: TensorRole) -> Result<Vec<GraphTensor>, Self::Error>;

    /// Replaces the leading dimension of the `index`-th tensor of `role` with
    /// the symbolic name `symbol`.
    fn mark_batch_dim(
        &mut self,
        role: TensorRole,
        index: usize,
        symbol: &str,
    ) -> Result<(), Self::Error>;

    fn inputs(&self) -> Result<Vec<GraphTensor>, Self::Error> {
        self.tensors(TensorRole::Input)
    }

    fn outputs(&self) -> Result<Vec<GraphTensor>, Self::Error> {
        self.tensors(TensorRole::Output)
    }
}
