//! End-to-end orchestration: ingestion, then transformation.

use crate::ingestion::DataIngestion;
use crate::tokenize::SummaryTokenizer;
use crate::transformation::DataTransformation;
use serde::Serialize;
use summaflow_core::persistence::save_yaml;
use summaflow_core::{
    ConfigurationManager, DataIngestionArtifact, DataIngestionConfig,
    DataTransformationArtifact, DataTransformationConfig, ObjectStoreHandler, PipelineError,
    ProjectLayout, Result, RunContext,
};

pub const STAGE_INITIALIZATION: &str = "initialization";
pub const STAGE_INGESTION: &str = "data_ingestion";
pub const STAGE_TRANSFORMATION: &str = "data_transformation";

pub const RUN_MANIFEST_FILE: &str = "run_manifest.yaml";

/// Artifacts of one pipeline run. `transformation` is `None` when ingestion
/// produced nothing to transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutcome {
    pub ingestion: DataIngestionArtifact,
    pub transformation: Option<DataTransformationArtifact>,
}

/// Snapshot written next to the run's artifacts.
#[derive(Serialize)]
struct RunManifest<'a> {
    run: &'a RunContext,
    data_ingestion: &'a DataIngestionConfig,
    data_transformation: Option<&'a DataTransformationConfig>,
    outcome: &'a PipelineOutcome,
}

pub struct TrainingPipeline {
    manager: ConfigurationManager,
    client: reqwest::Client,
    handler: Option<ObjectStoreHandler>,
    tokenizer: Option<SummaryTokenizer>,
}

impl TrainingPipeline {
    pub fn new(run: RunContext, layout: ProjectLayout) -> Result<Self> {
        let manager = ConfigurationManager::new(run, layout)
            .map_err(|e| PipelineError::stage(STAGE_INITIALIZATION, e))
            .inspect_err(|e| tracing::error!(error = %e, "Pipeline initialization failed"))?;
        Ok(Self {
            manager,
            client: reqwest::Client::new(),
            handler: None,
            tokenizer: None,
        })
    }

    /// Use this storage handler instead of building an S3 client from the
    /// environment.
    pub fn with_handler(mut self, handler: ObjectStoreHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: SummaryTokenizer) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    fn s3_enabled(&self) -> bool {
        self.manager.config_document().data_backup.s3_enabled
    }

    fn build_handler(&self) -> Result<Option<ObjectStoreHandler>> {
        if !self.s3_enabled() || self.handler.is_some() {
            return Ok(None);
        }
        let config = self.manager.s3_handler_config()?;
        ObjectStoreHandler::from_config(&config).map(Some)
    }

    async fn ingest_with(
        &self,
        handler: Option<&ObjectStoreHandler>,
    ) -> Result<(DataIngestionConfig, DataIngestionArtifact)> {
        let config = self.manager.data_ingestion_config()?;
        let artifact = DataIngestion::new(config.clone(), handler)
            .with_client(self.client.clone())
            .run()
            .await?;
        Ok((config, artifact))
    }

    async fn transform_with(
        &self,
        handler: Option<&ObjectStoreHandler>,
        ingestion: &DataIngestionArtifact,
    ) -> Result<(DataTransformationConfig, DataTransformationArtifact)> {
        let config = self.manager.data_transformation_config()?;
        let mut stage = DataTransformation::new(config.clone(), ingestion.clone(), handler);
        if let Some(tokenizer) = &self.tokenizer {
            stage = stage.with_tokenizer(tokenizer.clone());
        }
        let artifact = stage.run().await?;
        Ok((config, artifact))
    }

    /// Run only the ingestion stage.
    pub async fn ingest(&self) -> Result<DataIngestionArtifact> {
        let built = self
            .build_handler()
            .map_err(|e| PipelineError::stage(STAGE_INITIALIZATION, e))?;
        let handler = self.active_handler(built.as_ref());
        let (_, artifact) = self
            .ingest_with(handler)
            .await
            .map_err(|e| PipelineError::stage(STAGE_INGESTION, e))?;
        Ok(artifact)
    }

    fn active_handler<'a>(
        &'a self,
        built: Option<&'a ObjectStoreHandler>,
    ) -> Option<&'a ObjectStoreHandler> {
        if !self.s3_enabled() {
            return None;
        }
        self.handler.as_ref().or(built)
    }

    /// Run ingestion and, if it produced data, transformation.
    ///
    /// With object storage enabled the run's log directory is mirrored
    /// whether the stages succeed or fail.
    pub async fn run(&self) -> Result<PipelineOutcome> {
        tracing::info!(run = %self.manager.run(), "Training pipeline started");
        let built = self
            .build_handler()
            .map_err(|e| PipelineError::stage(STAGE_INITIALIZATION, e))
            .inspect_err(|e| tracing::error!(error = %e, "Storage handler setup failed"))?;
        let handler = self.active_handler(built.as_ref());

        let result = self.run_stages(handler).await;
        if let Some(handler) = handler {
            self.sync_logs(handler).await;
        }
        result
    }

    async fn run_stages(&self, handler: Option<&ObjectStoreHandler>) -> Result<PipelineOutcome> {
        let (ingestion_config, ingestion) = self
            .ingest_with(handler)
            .await
            .map_err(|e| PipelineError::stage(STAGE_INGESTION, e))
            .inspect_err(|e| tracing::error!(error = %e, "Data ingestion failed"))?;

        if !ingestion.has_ingested_data() {
            tracing::warn!("Ingestion produced no ingested data location, skipping transformation");
            let outcome = PipelineOutcome {
                ingestion,
                transformation: None,
            };
            self.write_manifest(&ingestion_config, None, &outcome)?;
            return Ok(outcome);
        }

        let (transformation_config, transformation) = self
            .transform_with(handler, &ingestion)
            .await
            .map_err(|e| PipelineError::stage(STAGE_TRANSFORMATION, e))
            .inspect_err(|e| tracing::error!(error = %e, "Data transformation failed"))?;

        let outcome = PipelineOutcome {
            ingestion,
            transformation: Some(transformation),
        };
        self.write_manifest(&ingestion_config, Some(&transformation_config), &outcome)?;
        tracing::info!("Training pipeline completed");
        Ok(outcome)
    }

    fn write_manifest(
        &self,
        data_ingestion: &DataIngestionConfig,
        data_transformation: Option<&DataTransformationConfig>,
        outcome: &PipelineOutcome,
    ) -> Result<()> {
        let manifest = RunManifest {
            run: self.manager.run(),
            data_ingestion,
            data_transformation,
            outcome,
        };
        let path = self.manager.run_artifacts_dir().join(RUN_MANIFEST_FILE);
        save_yaml(&manifest, &[&path], "Run manifest")
    }

    /// Mirror this run's log directory to `logs/<timestamp>`. A failed upload
    /// is logged, never fatal.
    async fn sync_logs(&self, handler: &ObjectStoreHandler) {
        let logs_dir = self.manager.run_logs_dir();
        if !logs_dir.is_dir() {
            tracing::debug!(dir = %logs_dir.display(), "No log directory for this run, skipping log sync");
            return;
        }
        let prefix = format!("logs/{}", self.manager.run().timestamp());
        match handler.sync_directory(&logs_dir, &prefix).await {
            Ok(_) => tracing::info!(bucket = handler.bucket(), %prefix, "Run logs mirrored"),
            Err(e) => tracing::warn!(error = %e, "Failed to mirror run logs to object storage"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use std::path::Path;
    use std::sync::Arc;

    fn write_config(root: &Path, config: &str) -> ProjectLayout {
        let layout = ProjectLayout::rooted_at(root);
        std::fs::create_dir_all(&layout.config_dir).unwrap();
        std::fs::write(layout.config_path(), config).unwrap();
        std::fs::write(
            layout.params_path(),
            "data_transformation:\n  tokenizer:\n    pretrained_model_name: t\n    max_input_length: 8\n    max_target_length: 4\n  data_split:\n    train_size: 0.8\n    val_size: 0.1\n    test_size: 0.1\n    random_state: 42\n",
        )
        .unwrap();
        layout
    }

    #[test]
    fn test_missing_config_is_initialization_failure() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::rooted_at(dir.path());
        let err = TrainingPipeline::new(RunContext::new(), layout).err().unwrap();
        assert!(matches!(
            err,
            PipelineError::Stage {
                stage: STAGE_INITIALIZATION,
                ..
            }
        ));
        assert!(matches!(err.root_cause(), PipelineError::Config(_)));
    }

    #[tokio::test]
    async fn test_download_failure_is_wrapped_as_ingestion_stage() {
        let dir = tempfile::tempdir().unwrap();
        let layout = write_config(
            dir.path(),
            "data_ingestion:\n  source_URL: http://127.0.0.1:9/unreachable.zip\n  raw_data_filename: d.zip\n  ingested_data_filename: d.csv\n  download:\n    retries: 1\n    delay_secs: 0.0\ndata_backup:\n  local_enabled: true\n  s3_enabled: false\ndata_transformation:\n  train_filename: train.csv\n  val_filename: val.csv\n  test_filename: test.csv\n",
        );
        let pipeline = TrainingPipeline::new(RunContext::new(), layout).unwrap();
        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Stage {
                stage: STAGE_INGESTION,
                ..
            }
        ));
        assert!(matches!(err.root_cause(), PipelineError::Http(_)));
    }

    #[tokio::test]
    async fn test_failed_run_still_mirrors_logs() {
        let dir = tempfile::tempdir().unwrap();
        let layout = write_config(
            dir.path(),
            "data_ingestion:\n  source_URL: http://127.0.0.1:9/unreachable.zip\n  raw_data_filename: d.zip\n  ingested_data_filename: d.csv\n  download:\n    retries: 1\n    delay_secs: 0.0\ndata_backup:\n  local_enabled: false\n  s3_enabled: true\ndata_transformation:\n  train_filename: train.csv\n  val_filename: val.csv\n  test_filename: test.csv\n",
        );
        let run = RunContext::new();
        let logs = layout.run_logs_dir(&run);
        std::fs::create_dir_all(&logs).unwrap();
        std::fs::write(logs.join(format!("{run}.log")), "{\"msg\":\"download failed\"}\n").unwrap();

        let store = Arc::new(InMemory::new());
        let pipeline = TrainingPipeline::new(run.clone(), layout)
            .unwrap()
            .with_handler(ObjectStoreHandler::with_store("bucket", store.clone()));
        assert!(pipeline.run().await.is_err());

        let reader = ObjectStoreHandler::with_store("bucket", store);
        let mirrored: serde_json::Value = reader
            .load_object(&format!("s3://bucket/logs/{run}/{run}.log"))
            .await
            .unwrap();
        assert_eq!(mirrored["msg"], "download failed");
    }
}
