//! Repository configuration documents for trsp
//!
//! This crate reads a configuration document (YAML, JSON or TOML), validates
//! it into a [`RepositoryConfig`] and can write a configuration back out as
//! YAML. Validation is fail-fast and never touches the filesystem beyond
//! reading the document itself.

#![warn(missing_docs)]

mod validate;

use serde_yaml::Value;
use std::path::Path;
use tracing::{debug, info};
use trsp_core::{Error, RepositoryConfig, Result};

/// Serialization format of a configuration document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// YAML, the default
    Yaml,
    /// JSON
    Json,
    /// TOML
    Toml,
}

impl DocumentFormat {
    /// Pick the format from a file extension; anything unrecognised is read as YAML
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => DocumentFormat::Json,
            Some("toml") => DocumentFormat::Toml,
            _ => DocumentFormat::Yaml,
        }
    }

    /// Parse `content` into the loosely typed document tree
    pub fn parse(&self, content: &str) -> Result<Value> {
        match self {
            DocumentFormat::Yaml => {
                serde_yaml::from_str(content).map_err(|e| Error::Parse(e.to_string()))
            }
            DocumentFormat::Json => {
                serde_json::from_str(content).map_err(|e| Error::Parse(e.to_string()))
            }
            DocumentFormat::Toml => {
                let table: toml::Value =
                    toml::from_str(content).map_err(|e| Error::Parse(e.to_string()))?;
                serde_yaml::to_value(table).map_err(|e| Error::Parse(e.to_string()))
            }
        }
    }
}

/// Read a document from disk without validating it
pub fn read_document(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| Error::fs(path, e))?;
    let format = DocumentFormat::from_path(path);
    debug!(path = %path.display(), ?format, "read configuration document");
    format.parse(&content)
}

/// Load and validate a configuration file
pub fn load(path: impl AsRef<Path>) -> Result<RepositoryConfig> {
    let path = path.as_ref();
    let config = from_value(&read_document(path)?)?;
    info!(
        path = %path.display(),
        models = config.models.len(),
        "loaded repository configuration"
    );
    Ok(config)
}

/// Validate a YAML document held in memory
pub fn from_yaml_str(content: &str) -> Result<RepositoryConfig> {
    from_value(&DocumentFormat::Yaml.parse(content)?)
}

/// Validate an already parsed document tree
pub fn from_value(document: &Value) -> Result<RepositoryConfig> {
    validate::validate(document)
}

/// Serialize a configuration back into the document schema it was loaded from
pub fn to_yaml_string(config: &RepositoryConfig) -> Result<String> {
    serde_yaml::to_string(config).map_err(|e| Error::Parse(e.to_string()))
}

/// Write a configuration to `path` as YAML
pub fn export(config: &RepositoryConfig, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, to_yaml_string(config)?).map_err(|e| Error::fs(path, e))?;
    info!(path = %path.display(), "exported repository configuration");
    Ok(())
}
