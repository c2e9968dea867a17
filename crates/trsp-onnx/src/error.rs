use trsp_core::TensorRole;

#[derive(Debug, thiserror::Error)]
pub enum OnnxError {
    #[error("Malformed protobuf: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Field {number} is truncated")]
    Truncated { number: u32 },

    #[error("Field {number} uses group encoding, which is not supported")]
    UnsupportedWireType { number: u32 },

    #[error("Field {number} is not valid UTF-8")]
    InvalidUtf8 { number: u32 },

    #[error("Model does not contain a graph")]
    MissingGraph,

    #[error("Graph has no {role} at index {index}")]
    NoSuchTensor { role: TensorRole, index: usize },

    #[error("Tensor `{name}` is not a dense tensor")]
    NotATensor { name: String },

    #[error("Tensor `{name}` declares no dimensions")]
    NoBatchDimension { name: String },
}

pub type Result<T> = std::result::Result<T, OnnxError>;
