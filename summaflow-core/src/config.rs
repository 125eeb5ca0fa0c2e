//! Configuration management for the summaflow pipeline.
//!
//! Two YAML documents drive a run: `config.yaml` (locations, backup legs,
//! object storage) and `params.yaml` (tokenizer and split parameters). Each is
//! layered with environment overrides through `figment`, then turned into one
//! immutable config per stage, rooted under `artifacts/<run timestamp>/`.

use crate::download::DownloadPolicy;
use crate::error::{PipelineError, Result};
use crate::persistence::object_key;
use crate::run::RunContext;
use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.yaml";
pub const PARAMS_FILE: &str = "params.yaml";

/// Environment prefix overriding `config.yaml` keys, e.g.
/// `SUMMAFLOW_CONFIG_DATA_BACKUP__S3_ENABLED=true`.
pub const CONFIG_ENV_PREFIX: &str = "SUMMAFLOW_CONFIG_";
/// Environment prefix overriding `params.yaml` keys.
pub const PARAMS_ENV_PREFIX: &str = "SUMMAFLOW_PARAMS_";

const RATIO_TOLERANCE: f64 = 1e-6;

/// Top-level directories of a project checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectLayout {
    /// Directory everything else is joined onto. Object keys are relative to it.
    pub base: PathBuf,
    pub config_dir: PathBuf,
    pub artifacts_root: PathBuf,
    pub dvc_root: PathBuf,
    pub logs_root: PathBuf,
}

impl Default for ProjectLayout {
    fn default() -> Self {
        Self {
            base: PathBuf::new(),
            config_dir: PathBuf::from("config"),
            artifacts_root: PathBuf::from("artifacts"),
            dvc_root: PathBuf::from("data"),
            logs_root: PathBuf::from("logs"),
        }
    }
}

impl ProjectLayout {
    /// The default layout re-rooted under `base`.
    pub fn rooted_at(base: &Path) -> Self {
        let default = Self::default();
        Self {
            base: base.to_path_buf(),
            config_dir: base.join(default.config_dir),
            artifacts_root: base.join(default.artifacts_root),
            dvc_root: base.join(default.dvc_root),
            logs_root: base.join(default.logs_root),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    pub fn params_path(&self) -> PathBuf {
        self.config_dir.join(PARAMS_FILE)
    }

    pub fn run_artifacts_dir(&self, run: &RunContext) -> PathBuf {
        self.artifacts_root.join(run.timestamp())
    }

    pub fn run_logs_dir(&self, run: &RunContext) -> PathBuf {
        self.logs_root.join(run.timestamp())
    }
}

// ---------------------------------------------------------------------------
// config.yaml
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub data_ingestion: IngestionSection,
    pub data_backup: BackupSection,
    #[serde(default)]
    pub s3_handler: Option<S3Section>,
    pub data_transformation: TransformationFilesSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionSection {
    #[serde(rename = "source_URL", alias = "source_url")]
    pub source_url: String,
    pub raw_data_filename: String,
    pub ingested_data_filename: String,
    #[serde(default)]
    pub download: DownloadPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSection {
    pub local_enabled: bool,
    pub s3_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Section {
    #[serde(alias = "s3_bucket")]
    pub bucket_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationFilesSection {
    pub train_filename: String,
    pub val_filename: String,
    pub test_filename: String,
}

// ---------------------------------------------------------------------------
// params.yaml
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamsDocument {
    pub data_transformation: TransformationParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationParams {
    pub tokenizer: TokenizerParams,
    #[serde(default)]
    pub columns: ColumnParams,
    pub data_split: SplitRatios,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizerParams {
    pub pretrained_model_name: String,
    pub max_input_length: usize,
    pub max_target_length: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    1000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnParams {
    #[serde(default = "default_text_column")]
    pub text: String,
    #[serde(default = "default_summary_column")]
    pub summary: String,
}

impl Default for ColumnParams {
    fn default() -> Self {
        Self {
            text: default_text_column(),
            summary: default_summary_column(),
        }
    }
}

fn default_text_column() -> String {
    "dialogue".into()
}

fn default_summary_column() -> String {
    "summary".into()
}

/// Fractions for the three-way split plus the shuffle seed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    pub train_size: f64,
    pub val_size: f64,
    pub test_size: f64,
    pub random_state: u64,
}

impl SplitRatios {
    /// Each fraction must lie in (0, 1) and the three must sum to one.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("train_size", self.train_size),
            ("val_size", self.val_size),
            ("test_size", self.test_size),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(PipelineError::config(format!(
                    "{name} must be in (0, 1), got {value}"
                )));
            }
        }
        let sum = self.train_size + self.val_size + self.test_size;
        if (sum - 1.0).abs() > RATIO_TOLERANCE {
            return Err(PipelineError::config(format!(
                "split ratios must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }

    /// Fraction of the held-out part that goes to the test partition.
    pub fn test_share_of_holdout(&self) -> f64 {
        self.test_size / (self.test_size + self.val_size)
    }
}

/// Load one YAML document, layered with `<env_prefix>*` overrides.
///
/// Missing, unparseable and empty (blank or `null`) documents are all
/// configuration errors.
pub fn load_document<T: DeserializeOwned>(path: &Path, env_prefix: &str) -> Result<T> {
    if !path.is_file() {
        return Err(PipelineError::config(format!(
            "YAML file not found: '{}'",
            path.display()
        )));
    }
    let text = std::fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return Err(PipelineError::config(format!(
            "YAML file is empty: '{}'",
            path.display()
        )));
    }
    let mut value: serde_yaml::Value = serde_yaml::from_str(&text).map_err(|e| {
        PipelineError::config(format!("invalid YAML in '{}': {e}", path.display()))
    })?;
    if value.is_null() {
        return Err(PipelineError::config(format!(
            "YAML file is empty: '{}'",
            path.display()
        )));
    }

    // Env keys arrive lowercased, so the file's keys must be too or an
    // override of `source_URL` would land beside it instead of over it.
    lowercase_keys(&mut value);
    let normalized = serde_yaml::to_string(&value)?;

    let document = Figment::from(Yaml::string(&normalized))
        .merge(Env::prefixed(env_prefix).split("__"))
        .extract()
        .map_err(|e| PipelineError::config(format!("'{}': {e}", path.display())))?;
    tracing::info!(path = %path.display(), "YAML file loaded");
    Ok(document)
}

fn lowercase_keys(value: &mut serde_yaml::Value) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            let entries = std::mem::take(map);
            for (key, mut inner) in entries {
                lowercase_keys(&mut inner);
                let key = match key {
                    serde_yaml::Value::String(k) => serde_yaml::Value::String(k.to_lowercase()),
                    other => other,
                };
                map.insert(key, inner);
            }
        }
        serde_yaml::Value::Sequence(items) => items.iter_mut().for_each(lowercase_keys),
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Stage configs
// ---------------------------------------------------------------------------

/// Everything the ingestion stage needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataIngestionConfig {
    pub project_root: PathBuf,
    pub root_dir: PathBuf,
    pub source_url: String,
    pub raw_filepath: PathBuf,
    pub dvc_raw_filepath: PathBuf,
    pub ingested_filepath: PathBuf,
    pub dvc_ingested_filepath: PathBuf,
    pub local_enabled: bool,
    pub s3_enabled: bool,
    pub download: DownloadPolicy,
}

impl DataIngestionConfig {
    pub fn raw_s3_key(&self) -> String {
        object_key(&self.project_root, &self.raw_filepath)
    }

    pub fn dvc_raw_s3_key(&self) -> String {
        object_key(&self.project_root, &self.dvc_raw_filepath)
    }

    pub fn ingested_s3_key(&self) -> String {
        object_key(&self.project_root, &self.ingested_filepath)
    }

    pub fn dvc_ingested_s3_key(&self) -> String {
        object_key(&self.project_root, &self.dvc_ingested_filepath)
    }
}

/// Everything the transformation stage needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTransformationConfig {
    pub project_root: PathBuf,
    pub root_dir: PathBuf,
    pub train_filepath: PathBuf,
    pub val_filepath: PathBuf,
    pub test_filepath: PathBuf,
    pub tokenizer_name: String,
    pub max_input_length: usize,
    pub max_target_length: usize,
    pub batch_size: usize,
    pub text_column: String,
    pub summary_column: String,
    pub split: SplitRatios,
    pub local_enabled: bool,
    pub s3_enabled: bool,
}

impl DataTransformationConfig {
    pub fn train_s3_key(&self) -> String {
        object_key(&self.project_root, &self.train_filepath)
    }

    pub fn val_s3_key(&self) -> String {
        object_key(&self.project_root, &self.val_filepath)
    }

    pub fn test_s3_key(&self) -> String {
        object_key(&self.project_root, &self.test_filepath)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3HandlerConfig {
    pub root_dir: PathBuf,
    pub bucket_name: String,
    pub aws_region: Option<String>,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Reads both documents once and derives per-stage configs from them.
#[derive(Debug, Clone)]
pub struct ConfigurationManager {
    run: RunContext,
    layout: ProjectLayout,
    config: ConfigDocument,
    params: ParamsDocument,
}

impl ConfigurationManager {
    pub fn new(run: RunContext, layout: ProjectLayout) -> Result<Self> {
        let run_dir = layout.run_artifacts_dir(&run);
        std::fs::create_dir_all(&run_dir).inspect_err(|e| {
            tracing::error!(dir = %run_dir.display(), error = %e, "Failed to create run directory")
        })?;

        let config = load_document(&layout.config_path(), CONFIG_ENV_PREFIX)
            .inspect_err(|e| tracing::error!(error = %e, "Failed to load config.yaml"))?;
        let params = load_document(&layout.params_path(), PARAMS_ENV_PREFIX)
            .inspect_err(|e| tracing::error!(error = %e, "Failed to load params.yaml"))?;

        tracing::info!(run = %run, artifacts = %run_dir.display(), "Configuration loaded");
        Ok(Self {
            run,
            layout,
            config,
            params,
        })
    }

    pub fn run(&self) -> &RunContext {
        &self.run
    }

    pub fn config_document(&self) -> &ConfigDocument {
        &self.config
    }

    pub fn run_artifacts_dir(&self) -> PathBuf {
        self.layout.run_artifacts_dir(&self.run)
    }

    pub fn run_logs_dir(&self) -> PathBuf {
        self.layout.run_logs_dir(&self.run)
    }

    pub fn data_ingestion_config(&self) -> Result<DataIngestionConfig> {
        let section = &self.config.data_ingestion;
        let root_dir = self.run_artifacts_dir().join("data_ingestion");
        std::fs::create_dir_all(&root_dir)?;

        let config = DataIngestionConfig {
            raw_filepath: root_dir.join("raw_data").join(&section.raw_data_filename),
            dvc_raw_filepath: self.layout.dvc_root.join("raw").join(&section.raw_data_filename),
            ingested_filepath: root_dir
                .join("ingested_data")
                .join(&section.ingested_data_filename),
            dvc_ingested_filepath: self
                .layout
                .dvc_root
                .join("ingested_data")
                .join(&section.ingested_data_filename),
            project_root: self.layout.base.clone(),
            root_dir,
            source_url: section.source_url.clone(),
            local_enabled: self.config.data_backup.local_enabled,
            s3_enabled: self.config.data_backup.s3_enabled,
            download: section.download.clone(),
        };
        tracing::info!(?config, "Data ingestion config created");
        Ok(config)
    }

    pub fn data_transformation_config(&self) -> Result<DataTransformationConfig> {
        let files = &self.config.data_transformation;
        let params = &self.params.data_transformation;
        params.data_split.validate()?;
        if params.tokenizer.batch_size == 0 {
            return Err(PipelineError::config("tokenizer batch_size must be positive"));
        }
        if params.tokenizer.max_input_length == 0 || params.tokenizer.max_target_length == 0 {
            return Err(PipelineError::config(
                "tokenizer max_input_length and max_target_length must be positive",
            ));
        }

        let root_dir = self.run_artifacts_dir().join("data_transformation");
        std::fs::create_dir_all(&root_dir)?;

        let config = DataTransformationConfig {
            train_filepath: root_dir.join(&files.train_filename),
            val_filepath: root_dir.join(&files.val_filename),
            test_filepath: root_dir.join(&files.test_filename),
            project_root: self.layout.base.clone(),
            root_dir,
            tokenizer_name: params.tokenizer.pretrained_model_name.clone(),
            max_input_length: params.tokenizer.max_input_length,
            max_target_length: params.tokenizer.max_target_length,
            batch_size: params.tokenizer.batch_size,
            text_column: params.columns.text.clone(),
            summary_column: params.columns.summary.clone(),
            split: params.data_split,
            local_enabled: self.config.data_backup.local_enabled,
            s3_enabled: self.config.data_backup.s3_enabled,
        };
        tracing::info!(?config, "Data transformation config created");
        Ok(config)
    }

    pub fn s3_handler_config(&self) -> Result<S3HandlerConfig> {
        let section = self
            .config
            .s3_handler
            .as_ref()
            .ok_or_else(|| PipelineError::config("config.yaml has no s3_handler section"))?;
        let root_dir = self.run_artifacts_dir().join("s3_handler");
        std::fs::create_dir_all(&root_dir)?;

        let config = S3HandlerConfig {
            root_dir,
            bucket_name: section.bucket_name.clone(),
            aws_region: std::env::var("AWS_REGION").ok().filter(|r| !r.is_empty()),
        };
        tracing::info!(?config, "S3 handler config created");
        Ok(config)
    }
}
