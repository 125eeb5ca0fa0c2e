//! Error types for the summaflow pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// The single error type every pipeline failure is wrapped into.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Content error: {0}")]
    Content(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid remote URI: {0}")]
    InvalidUri(String),

    #[error("File not found: '{}'", .0.display())]
    FileNotFound(PathBuf),

    #[error("Directory not found: '{}'", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Download of '{url}' failed after {attempts} attempt(s): {source}")]
    Download {
        url: String,
        attempts: u32,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Array encode error: {0}")]
    NpyWrite(#[from] ndarray_npy::WriteNpyError),

    #[error("Array decode error: {0}")]
    NpyRead(#[from] ndarray_npy::ReadNpyError),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn content(msg: impl Into<String>) -> Self {
        Self::Content(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn invalid_uri(msg: impl Into<String>) -> Self {
        Self::InvalidUri(msg.into())
    }

    pub fn tokenizer(msg: impl Into<String>) -> Self {
        Self::Tokenizer(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Re-wrap a failure with the name of the pipeline stage it escaped from.
    pub fn stage(stage: &'static str, source: PipelineError) -> Self {
        Self::Stage {
            stage,
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through stage and download wrappers.
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            Self::Stage { source, .. } | Self::Download { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
