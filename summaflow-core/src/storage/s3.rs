//! Object-storage backend (S3 and anything else `object_store` speaks).

use super::{RemoteUri, StorageHandler};
use crate::config::S3HandlerConfig;
use crate::error::{PipelineError, Result};
use crate::persistence::posix_string;
use crate::table::Table;
use async_trait::async_trait;
use bytes::Bytes;
use ndarray::{Array, ArrayBase, Data, Dimension};
use ndarray_npy::{ReadNpyExt, ReadableElement, WritableElement, WriteNpyExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Uploads, syncs and streams pipeline artifacts to one bucket.
pub struct ObjectStoreHandler {
    bucket: String,
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreHandler {
    /// Build an S3 client from the environment (`AWS_*` variables) and config.
    pub fn from_config(config: &S3HandlerConfig) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&config.bucket_name);
        if let Some(region) = &config.aws_region {
            builder = builder.with_region(region);
        }
        let store = builder.build().inspect_err(|e| {
            tracing::error!(error = %e, "Failed to initialize S3 client")
        })?;
        tracing::info!(
            bucket = %config.bucket_name,
            region = config.aws_region.as_deref().unwrap_or("default"),
            "S3 handler initialized"
        );
        Ok(Self::with_store(config.bucket_name.clone(), Arc::new(store)))
    }

    /// Wrap an already-constructed store.
    pub fn with_store(bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            bucket: bucket.into(),
            store,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<String> {
        let location = ObjectPath::from(key);
        self.store
            .put(&location, PutPayload::from(body))
            .await
            .inspect_err(|e| tracing::error!(key, error = %e, "Object upload failed"))?;
        Ok(RemoteUri::new(&self.bucket, location.to_string()).to_string())
    }

    async fn get(&self, uri: &str) -> Result<Bytes> {
        let uri: RemoteUri = uri.parse()?;
        if uri.bucket != self.bucket {
            return Err(PipelineError::invalid_input(format!(
                "'{uri}' is outside handler bucket '{}'",
                self.bucket
            )));
        }
        let location = ObjectPath::from(uri.key.as_str());
        let bytes = self
            .store
            .get(&location)
            .await
            .inspect_err(|e| tracing::error!(%uri, error = %e, "Object download failed"))?
            .bytes()
            .await?;
        Ok(bytes)
    }

    /// Upload a single local file to `key`.
    pub async fn upload_file(&self, local_path: &Path, key: &str) -> Result<String> {
        if !local_path.is_file() {
            return Err(PipelineError::FileNotFound(local_path.to_path_buf()));
        }
        let body = tokio::fs::read(local_path).await?;
        let uri = self.put(key, body).await?;
        tracing::info!(local = %local_path.display(), %uri, "Uploaded file");
        Ok(uri)
    }

    /// Recursively upload `local_dir`, keying each file as `prefix/relative/path`.
    pub async fn sync_directory(&self, local_dir: &Path, prefix: &str) -> Result<Vec<String>> {
        if !local_dir.is_dir() {
            return Err(PipelineError::DirectoryNotFound(local_dir.to_path_buf()));
        }
        let prefix = prefix.trim_end_matches('/');
        tracing::info!(
            local = %local_dir.display(),
            bucket = %self.bucket,
            prefix,
            "Starting directory sync"
        );

        let mut uris = Vec::new();
        for entry in walkdir::WalkDir::new(local_dir).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(local_dir)
                .map_err(|e| PipelineError::invalid_input(e.to_string()))?;
            let key = format!("{prefix}/{}", posix_string(relative));
            uris.push(self.upload_file(entry.path(), &key).await?);
        }

        tracing::info!(files = uris.len(), prefix, "Directory synced");
        Ok(uris)
    }

    /// Stream a table as CSV without touching local disk.
    pub async fn stream_csv(&self, table: &Table, key: &str) -> Result<String> {
        let uri = self.put(key, table.to_csv_bytes()?).await?;
        tracing::info!(%uri, rows = table.row_count(), "Streamed CSV");
        Ok(uri)
    }

    /// Stream any serializable structure as a YAML document.
    pub async fn stream_yaml<T: Serialize + ?Sized + Sync>(
        &self,
        data: &T,
        key: &str,
    ) -> Result<String> {
        let body = serde_yaml::to_string(data)?.into_bytes();
        let uri = self.put(key, body).await?;
        tracing::info!(%uri, "Streamed YAML");
        Ok(uri)
    }

    /// Stream a serializable object (JSON-encoded).
    pub async fn stream_object<T: Serialize + ?Sized + Sync>(
        &self,
        object: &T,
        key: &str,
    ) -> Result<String> {
        let uri = self.put(key, serde_json::to_vec(object)?).await?;
        tracing::info!(%uri, "Streamed object");
        Ok(uri)
    }

    /// Stream a numeric array in `.npy` format.
    pub async fn stream_npy<S, A, D>(&self, array: &ArrayBase<S, D>, key: &str) -> Result<String>
    where
        S: Data<Elem = A> + Sync,
        A: WritableElement,
        D: Dimension,
    {
        let mut body = Vec::new();
        array.write_npy(&mut body)?;
        let uri = self.put(key, body).await?;
        tracing::info!(%uri, shape = ?array.shape(), "Streamed .npy");
        Ok(uri)
    }

    pub async fn load_csv(&self, uri: &str) -> Result<Table> {
        let bytes = self.get(uri).await?;
        let table = Table::from_csv_bytes(&bytes)?;
        tracing::info!(uri, rows = table.row_count(), "Loaded CSV from object storage");
        Ok(table)
    }

    pub async fn load_npy<A, D>(&self, uri: &str) -> Result<Array<A, D>>
    where
        A: ReadableElement,
        D: Dimension,
    {
        let bytes = self.get(uri).await?;
        let array = Array::<A, D>::read_npy(bytes.as_ref())?;
        tracing::info!(uri, "Loaded .npy from object storage");
        Ok(array)
    }

    pub async fn load_object<T: DeserializeOwned>(&self, uri: &str) -> Result<T> {
        let bytes = self.get(uri).await?;
        let object = serde_json::from_slice(&bytes)?;
        tracing::info!(uri, "Loaded object from object storage");
        Ok(object)
    }
}

#[async_trait]
impl StorageHandler for ObjectStoreHandler {
    fn close(&self) -> Result<()> {
        tracing::debug!(bucket = %self.bucket, "Object store handler closed (no persistent connection)");
        Ok(())
    }

    async fn load_from_source(&self) -> Result<Table> {
        Err(PipelineError::unsupported(
            "object store handler has no primary source; use load_csv with a URI",
        ))
    }
}
