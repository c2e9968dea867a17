use crate::Error;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Element data type of a tensor as written in the configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    #[default]
    F32,
    F64,
}

impl DType {
    pub const ALL: [DType; 11] = [
        DType::F32,
        DType::F64,
        DType::I8,
        DType::I16,
        DType::I32,
        DType::I64,
        DType::U8,
        DType::U16,
        DType::U32,
        DType::U64,
        DType::Bool,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::I8 => "int8",
            DType::I16 => "int16",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::U8 => "uint8",
            DType::U16 => "uint16",
            DType::U32 => "uint32",
            DType::U64 => "uint64",
            DType::F32 => "float32",
            DType::F64 => "float64",
        }
    }

    /// Token used for `data_type` in a model configuration.
    pub fn triton_token(&self) -> &'static str {
        match self {
            DType::Bool => "TYPE_BOOL",
            DType::I8 => "TYPE_INT8",
            DType::I16 => "TYPE_INT16",
            DType::I32 => "TYPE_INT32",
            DType::I64 => "TYPE_INT64",
            DType::U8 => "TYPE_UINT8",
            DType::U16 => "TYPE_UINT16",
            DType::U32 => "TYPE_UINT32",
            DType::U64 => "TYPE_UINT64",
            DType::F32 => "TYPE_FP32",
            DType::F64 => "TYPE_FP64",
        }
    }

    /// Maps an ONNX `TensorProto.DataType` code. Codes without a counterpart
    /// (strings, half precision, complex) yield `None`.
    pub fn from_onnx_elem_type(code: i32) -> Option<Self> {
        match code {
            1 => Some(DType::F32),
            2 => Some(DType::U8),
            3 => Some(DType::I8),
            4 => Some(DType::U16),
            5 => Some(DType::I16),
            6 => Some(DType::I32),
            7 => Some(DType::I64),
            9 => Some(DType::Bool),
            11 => Some(DType::F64),
            12 => Some(DType::U32),
            13 => Some(DType::U64),
            _ => None,
        }
    }
}

impl FromStr for DType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DType::ALL
            .into_iter()
            .find(|dtype| dtype.name() == s)
            .ok_or_else(|| Error::unsupported("dtype", s))
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for DType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}
