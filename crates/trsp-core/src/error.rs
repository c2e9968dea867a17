use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Missing `{0}` in configuration document")]
    MissingKey(&'static str),

    #[error("Invalid configuration for model `{model}`: `{field}` {reason}")]
    Validation {
        model: String,
        field: String,
        reason: String,
    },

    #[error("Unsupported {kind}: {value}")]
    UnsupportedType { kind: &'static str, value: String },

    #[error("Failed to load artifact {}: {reason}", .path.display())]
    ArtifactLoad { path: PathBuf, reason: String },

    #[error("Filesystem error at {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration document: {0}")]
    Parse(String),
}

impl Error {
    pub fn validation(
        model: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Validation {
            model: model.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(model: impl Into<String>, field: impl Into<String>) -> Self {
        Self::validation(model, field, "is missing")
    }

    pub fn unsupported(kind: &'static str, value: impl Into<String>) -> Self {
        Error::UnsupportedType {
            kind,
            value: value.into(),
        }
    }

    pub fn artifact(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::ArtifactLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
