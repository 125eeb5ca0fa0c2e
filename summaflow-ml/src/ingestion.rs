//! Data ingestion stage: download the dataset archive, extract its CSV and
//! persist the raw and ingested copies.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use summaflow_core::persistence::{copy_file, save_csv};
use summaflow_core::{
    DataIngestionArtifact, DataIngestionConfig, DownloadOutcome, ObjectStoreHandler,
    PipelineError, Result, StorageHandler, Table, download_file,
};

/// Resource-fork entries macOS adds to archives; never real data.
const MACOS_METADATA_DIR: &str = "__MACOSX/";

/// Upper bound on the buffer reserved from an entry's declared size. The
/// header is untrusted, so anything larger grows as data actually arrives.
const MAX_PREALLOCATION: u64 = 8 * 1024 * 1024;

fn read_entry(entry: &mut impl Read, declared_size: u64) -> std::io::Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(declared_size.min(MAX_PREALLOCATION) as usize);
    entry.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Read the first CSV entry of a zip archive, in central-directory order.
pub fn extract_first_csv(archive_path: &Path) -> Result<Table> {
    if !archive_path.is_file() {
        return Err(PipelineError::FileNotFound(archive_path.to_path_buf()));
    }
    let mut archive = zip::ZipArchive::new(BufReader::new(File::open(archive_path)?))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if !entry.is_file() || !name.ends_with(".csv") || name.starts_with(MACOS_METADATA_DIR) {
            continue;
        }
        let declared = entry.size();
        let bytes = read_entry(&mut entry, declared)?;
        let table = Table::from_csv_bytes(&bytes)?;
        if table.is_empty() {
            tracing::warn!(entry = %name, "CSV entry has a header but no rows");
        }
        tracing::info!(
            archive = %archive_path.display(),
            entry = %name,
            rows = table.row_count(),
            columns = table.column_count(),
            "CSV extracted from archive"
        );
        return Ok(table);
    }

    tracing::error!(archive = %archive_path.display(), "No CSV file found in ZIP archive");
    Err(PipelineError::content(format!(
        "no CSV file found in ZIP archive '{}'",
        archive_path.display()
    )))
}

/// Remote URIs produced by [`DataIngestion::save_remote`].
#[derive(Debug, Clone, PartialEq, Eq)]
struct RemoteCopies {
    raw: String,
    dvc_raw: String,
    ingested: String,
}

pub struct DataIngestion<'a> {
    config: DataIngestionConfig,
    handler: Option<&'a ObjectStoreHandler>,
    client: reqwest::Client,
}

impl<'a> DataIngestion<'a> {
    pub fn new(config: DataIngestionConfig, handler: Option<&'a ObjectStoreHandler>) -> Self {
        Self {
            config,
            handler,
            client: reqwest::Client::new(),
        }
    }

    /// Use a preconfigured HTTP client (proxies, timeouts).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn config(&self) -> &DataIngestionConfig {
        &self.config
    }

    pub async fn download(&self) -> Result<DownloadOutcome> {
        download_file(
            &self.client,
            &self.config.source_url,
            &self.config.raw_filepath,
            &self.config.download,
        )
        .await
    }

    pub fn extract(&self) -> Result<Table> {
        extract_first_csv(&self.config.raw_filepath)
    }

    /// Mirror the raw archive into the DVC tree and write the ingested table
    /// to both its artifact path and its DVC path.
    pub fn save_local(&self, table: &Table) -> Result<()> {
        copy_file(&self.config.raw_filepath, &self.config.dvc_raw_filepath)?;
        save_csv(
            table,
            &[
                &self.config.ingested_filepath,
                &self.config.dvc_ingested_filepath,
            ],
            "Ingested data",
        )
    }

    async fn save_remote(
        &self,
        handler: &ObjectStoreHandler,
        table: &Table,
    ) -> Result<RemoteCopies> {
        let scope = handler.scope();

        let raw = scope
            .upload_file(&self.config.raw_filepath, &self.config.raw_s3_key())
            .await?;
        // The DVC copy is byte-identical to the raw archive; fall back to it
        // when the local leg did not produce one.
        let dvc_source = if self.config.dvc_raw_filepath.is_file() {
            self.config.dvc_raw_filepath.as_path()
        } else {
            self.config.raw_filepath.as_path()
        };
        let dvc_raw = scope
            .upload_file(dvc_source, &self.config.dvc_raw_s3_key())
            .await?;
        let ingested = scope
            .stream_csv(table, &self.config.ingested_s3_key())
            .await?;

        scope.close()?;
        Ok(RemoteCopies {
            raw,
            dvc_raw,
            ingested,
        })
    }

    /// Run the whole stage.
    pub async fn run(&self) -> Result<DataIngestionArtifact> {
        tracing::info!(source = %self.config.source_url, "Data ingestion started");
        self.download().await?;
        let table = self.extract()?;

        let mut artifact = DataIngestionArtifact::default();

        if self.config.local_enabled {
            self.save_local(&table)?;
            artifact.raw_filepath = Some(self.config.raw_filepath.clone());
            artifact.dvc_raw_filepath = Some(self.config.dvc_raw_filepath.clone());
            artifact.ingested_filepath = Some(self.config.ingested_filepath.clone());
        } else {
            tracing::info!("Local backup disabled, skipping local persistence");
        }

        match (self.config.s3_enabled, self.handler) {
            (true, Some(handler)) => {
                let remote = self.save_remote(handler, &table).await?;
                artifact.raw_s3_uri = Some(remote.raw);
                artifact.dvc_raw_s3_uri = Some(remote.dvc_raw);
                artifact.ingested_s3_uri = Some(remote.ingested);
            }
            (true, None) => {
                tracing::warn!("S3 backup enabled but no handler supplied, skipping remote persistence");
            }
            (false, _) => tracing::info!("S3 backup disabled, skipping remote persistence"),
        }

        tracing::info!(rows = table.row_count(), "Data ingestion completed");
        tracing::debug!("{artifact}");
        Ok(artifact)
    }
}
