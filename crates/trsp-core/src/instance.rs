use crate::Error;
use serde::{Serialize, Serializer};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InstanceKind {
    #[default]
    Cpu,
    Gpu,
}

impl InstanceKind {
    pub fn name(&self) -> &'static str {
        match self {
            InstanceKind::Cpu => "cpu",
            InstanceKind::Gpu => "gpu",
        }
    }

    pub fn triton_token(&self) -> &'static str {
        match self {
            InstanceKind::Cpu => "KIND_CPU",
            InstanceKind::Gpu => "KIND_GPU",
        }
    }
}

impl FromStr for InstanceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(InstanceKind::Cpu),
            "gpu" => Ok(InstanceKind::Gpu),
            _ => Err(Error::unsupported("instance kind", s)),
        }
    }
}

impl Serialize for InstanceKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Where the runtime places execution instances of a model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstancePlacement {
    pub kind: InstanceKind,
    /// Only meaningful for [`InstanceKind::Gpu`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpus: Option<Vec<u32>>,
}

impl InstancePlacement {
    pub fn cpu() -> Self {
        Self::default()
    }

    pub fn gpu(count: Option<u32>) -> Self {
        Self {
            kind: InstanceKind::Gpu,
            count,
            gpus: None,
        }
    }

    pub fn with_gpus(mut self, gpus: Vec<u32>) -> Self {
        self.gpus = Some(gpus);
        self
    }
}
