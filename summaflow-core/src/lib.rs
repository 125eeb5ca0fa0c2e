//! # Summaflow Core
//!
//! Foundation library for the summaflow training-data pipeline.
//! Provides the run context, configuration manager and stage configs,
//! stage artifacts, the in-memory table, local persistence helpers,
//! the retrying downloader and the storage handler abstraction.

pub mod artifact;
pub mod config;
pub mod download;
pub mod error;
pub mod persistence;
pub mod run;
pub mod storage;
pub mod table;

// Re-export commonly used types at the crate root.
pub use artifact::{DataIngestionArtifact, DataTransformationArtifact};
pub use config::{
    ConfigurationManager, DataIngestionConfig, DataTransformationConfig, ProjectLayout,
    S3HandlerConfig, SplitRatios,
};
pub use download::{DownloadOutcome, DownloadPolicy, download_file, resolve_source_url};
pub use error::{PipelineError, Result};
pub use run::RunContext;
pub use storage::{HandlerScope, ObjectStoreHandler, RemoteUri, StorageHandler};
pub use table::Table;
