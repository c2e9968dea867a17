use crate::DType;
use serde::Serialize;
use std::fmt;

/// A tensor as it appears in the `input`/`output` lists of a model configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TensorSpec {
    pub name: String,
    pub dtype: DType,
    pub dims: Vec<i64>,
}

impl TensorSpec {
    pub fn new(name: impl Into<String>, dtype: DType, dims: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            dtype,
            dims,
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TensorSet {
    pub input: Vec<TensorSpec>,
    pub output: Vec<TensorSpec>,
}

impl TensorSet {
    pub fn new(input: Vec<TensorSpec>, output: Vec<TensorSpec>) -> Self {
        Self { input, output }
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty() && self.output.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorRole {
    Input,
    Output,
}

impl TensorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TensorRole::Input => "input",
            TensorRole::Output => "output",
        }
    }
}

impl fmt::Display for TensorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dimension of a tensor declared inside a graph artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dim {
    Fixed(i64),
    Symbolic(String),
    Unknown,
}

impl Dim {
    /// Numeric size reported to the descriptor; symbolic and unset sizes read as `0`.
    pub fn size(&self) -> i64 {
        match self {
            Dim::Fixed(size) => *size,
            Dim::Symbolic(_) | Dim::Unknown => 0,
        }
    }
}

/// A tensor declared by a graph artifact, before dtype assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphTensor {
    pub name: String,
    pub dims: Vec<Dim>,
    pub elem_type: Option<DType>,
}

impl GraphTensor {
    pub fn sizes(&self) -> Vec<i64> {
        self.dims.iter().map(Dim::size).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dim_sizes() {
        let tensor = GraphTensor {
            name: "x".to_string(),
            dims: vec![
                Dim::Symbolic("batch".to_string()),
                Dim::Fixed(3),
                Dim::Unknown,
            ],
            elem_type: Some(DType::F32),
        };
        assert_eq!(tensor.sizes(), vec![0, 3, 0]);
    }

    #[test]
    fn test_tensor_set_empty() {
        assert!(TensorSet::default().is_empty());
        let set = TensorSet::new(vec![TensorSpec::new("x", DType::U8, vec![-1, 3])], vec![]);
        assert!(!set.is_empty());
        assert_eq!(set.input[0].rank(), 2);
    }
}
