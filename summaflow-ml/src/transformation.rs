//! Data transformation stage: split the ingested table, tokenize each
//! partition and persist the results.

use crate::split::{Partitions, three_way_split};
use crate::tokenize::SummaryTokenizer;
use std::path::PathBuf;
use summaflow_core::persistence::save_csv;
use summaflow_core::{
    DataIngestionArtifact, DataTransformationArtifact, DataTransformationConfig,
    ObjectStoreHandler, PipelineError, Result, StorageHandler, Table,
};

pub struct DataTransformation<'a> {
    config: DataTransformationConfig,
    ingestion: DataIngestionArtifact,
    handler: Option<&'a ObjectStoreHandler>,
    tokenizer: Option<SummaryTokenizer>,
}

impl<'a> DataTransformation<'a> {
    pub fn new(
        config: DataTransformationConfig,
        ingestion: DataIngestionArtifact,
        handler: Option<&'a ObjectStoreHandler>,
    ) -> Self {
        Self {
            config,
            ingestion,
            handler,
            tokenizer: None,
        }
    }

    /// Use an already-configured tokenizer instead of loading
    /// `tokenizer_name` when the stage runs.
    pub fn with_tokenizer(mut self, tokenizer: SummaryTokenizer) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    pub fn config(&self) -> &DataTransformationConfig {
        &self.config
    }

    /// Load the ingested table, preferring the local copy.
    pub async fn load(&self) -> Result<Table> {
        if let Some(path) = &self.ingestion.ingested_filepath {
            tracing::info!(path = %path.display(), "Loading ingested data from local file");
            return Table::read_csv(path);
        }
        match (&self.ingestion.ingested_s3_uri, self.handler) {
            (Some(uri), Some(handler)) => {
                tracing::info!(%uri, "Loading ingested data from object storage");
                let scope = handler.scope();
                let table = scope.load_csv(uri).await?;
                scope.close()?;
                Ok(table)
            }
            (Some(uri), None) => Err(PipelineError::content(format!(
                "ingested data only exists at '{uri}' but no storage handler was supplied"
            ))),
            (None, _) => {
                tracing::error!("No ingested data location available");
                Err(PipelineError::content(
                    "ingestion artifact has neither a local path nor a remote URI",
                ))
            }
        }
    }

    fn save_local(&self, partitions: &Partitions) -> Result<(PathBuf, PathBuf, PathBuf)> {
        save_csv(&partitions.train, &[&self.config.train_filepath], "Train split")?;
        save_csv(&partitions.val, &[&self.config.val_filepath], "Validation split")?;
        save_csv(&partitions.test, &[&self.config.test_filepath], "Test split")?;
        Ok((
            self.config.train_filepath.clone(),
            self.config.val_filepath.clone(),
            self.config.test_filepath.clone(),
        ))
    }

    async fn save_remote(
        &self,
        handler: &ObjectStoreHandler,
        partitions: &Partitions,
    ) -> Result<(String, String, String)> {
        let scope = handler.scope();
        let train = scope
            .stream_csv(&partitions.train, &self.config.train_s3_key())
            .await?;
        let val = scope
            .stream_csv(&partitions.val, &self.config.val_s3_key())
            .await?;
        let test = scope
            .stream_csv(&partitions.test, &self.config.test_s3_key())
            .await?;
        scope.close()?;
        Ok((train, val, test))
    }

    fn tokenize(&self, tokenizer: &SummaryTokenizer, split: Partitions) -> Result<Partitions> {
        let (text, summary) = (&self.config.text_column, &self.config.summary_column);
        Ok(Partitions {
            train: tokenizer.tokenize_table(&split.train, text, summary)?,
            val: tokenizer.tokenize_table(&split.val, text, summary)?,
            test: tokenizer.tokenize_table(&split.test, text, summary)?,
        })
    }

    /// Run the whole stage.
    pub async fn run(&self) -> Result<DataTransformationArtifact> {
        tracing::info!("Data transformation started");
        let table = self.load().await?;
        let split = three_way_split(&table, &self.config.split)?;

        let loaded;
        let tokenizer = match &self.tokenizer {
            Some(t) => t,
            None => {
                loaded = SummaryTokenizer::from_config(&self.config)?;
                &loaded
            }
        };
        let partitions = self.tokenize(tokenizer, split)?;

        let mut artifact = DataTransformationArtifact::default();
        if self.config.local_enabled {
            let (train, val, test) = self.save_local(&partitions)?;
            artifact.train_filepath = Some(train);
            artifact.val_filepath = Some(val);
            artifact.test_filepath = Some(test);
        } else {
            tracing::info!("Local backup disabled, skipping local persistence");
        }

        match (self.config.s3_enabled, self.handler) {
            (true, Some(handler)) => {
                let (train, val, test) = self.save_remote(handler, &partitions).await?;
                artifact.train_s3_uri = Some(train);
                artifact.val_s3_uri = Some(val);
                artifact.test_s3_uri = Some(test);
            }
            (true, None) => {
                tracing::warn!("S3 backup enabled but no handler supplied, skipping remote persistence");
            }
            (false, _) => tracing::info!("S3 backup disabled, skipping remote persistence"),
        }

        tracing::info!(
            train = partitions.train.row_count(),
            val = partitions.val.row_count(),
            test = partitions.test.row_count(),
            "Data transformation completed"
        );
        tracing::debug!("{artifact}");
        Ok(artifact)
    }
}
