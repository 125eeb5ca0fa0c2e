//! Stage outputs. A `None` field means the leg that would have produced it
//! was disabled for the run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataIngestionArtifact {
    pub raw_filepath: Option<PathBuf>,
    pub dvc_raw_filepath: Option<PathBuf>,
    pub ingested_filepath: Option<PathBuf>,
    pub raw_s3_uri: Option<String>,
    pub dvc_raw_s3_uri: Option<String>,
    pub ingested_s3_uri: Option<String>,
}

impl DataIngestionArtifact {
    /// Whether the transformation stage has anything to load.
    pub fn has_ingested_data(&self) -> bool {
        self.ingested_filepath.is_some() || self.ingested_s3_uri.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataTransformationArtifact {
    pub train_filepath: Option<PathBuf>,
    pub val_filepath: Option<PathBuf>,
    pub test_filepath: Option<PathBuf>,
    pub train_s3_uri: Option<String>,
    pub val_s3_uri: Option<String>,
    pub test_s3_uri: Option<String>,
}

fn write_path(f: &mut fmt::Formatter<'_>, label: &str, value: &Option<PathBuf>) -> fmt::Result {
    match value {
        Some(p) => writeln!(f, "  {label:<20} {}", p.display()),
        None => writeln!(f, "  {label:<20} -"),
    }
}

fn write_uri(f: &mut fmt::Formatter<'_>, label: &str, value: &Option<String>) -> fmt::Result {
    writeln!(f, "  {label:<20} {}", value.as_deref().unwrap_or("-"))
}

impl fmt::Display for DataIngestionArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Data ingestion artifact:")?;
        write_path(f, "raw file", &self.raw_filepath)?;
        write_path(f, "DVC raw file", &self.dvc_raw_filepath)?;
        write_path(f, "ingested file", &self.ingested_filepath)?;
        write_uri(f, "raw S3 URI", &self.raw_s3_uri)?;
        write_uri(f, "DVC raw S3 URI", &self.dvc_raw_s3_uri)?;
        write_uri(f, "ingested S3 URI", &self.ingested_s3_uri)
    }
}

impl fmt::Display for DataTransformationArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Data transformation artifact:")?;
        write_path(f, "train file", &self.train_filepath)?;
        write_path(f, "val file", &self.val_filepath)?;
        write_path(f, "test file", &self.test_filepath)?;
        write_uri(f, "train S3 URI", &self.train_s3_uri)?;
        write_uri(f, "val S3 URI", &self.val_s3_uri)?;
        write_uri(f, "test S3 URI", &self.test_s3_uri)
    }
}
