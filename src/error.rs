//! Error types for vsphere-instance-rs

use std::path::PathBuf;
use thiserror::Error;

use crate::provider::ObjectKind;

/// Main error type for instance planning and creation
#[derive(Error, Debug)]
pub enum InstanceError {
    #[error("{kind} '{name}' not found")]
    LookupNotFound { kind: ObjectKind, name: String },

    #[error("Cannot read {}: {source}", path.display())]
    MissingFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Template render error: {0}")]
    TemplateRender(String),

    #[error("Cannot parse userdata override {}: {message}", path.display())]
    OverrideParse { path: PathBuf, message: String },

    #[error("Virtual machine create failed: {0}")]
    CreateFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl InstanceError {
    /// Create a lookup error
    pub fn not_found(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self::LookupNotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create a missing file error
    pub fn missing_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::MissingFile {
            path: path.into(),
            source,
        }
    }

    /// Create an override parse error
    pub fn override_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::OverrideParse {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<minijinja::Error> for InstanceError {
    fn from(err: minijinja::Error) -> Self {
        Self::TemplateRender(err.to_string())
    }
}
