//! Storage handler abstraction.
//!
//! Every backend implements [`StorageHandler`]. Callers acquire a backend for
//! the duration of one persistence step through [`StorageHandler::scope`];
//! the returned guard closes the handler on every exit path.

pub mod s3;

pub use s3::ObjectStoreHandler;

use crate::error::{PipelineError, Result};
use crate::table::Table;
use async_trait::async_trait;
use std::fmt;
use std::ops::Deref;
use std::path::Path;
use std::str::FromStr;

/// Capabilities shared by all storage backends.
#[async_trait]
pub trait StorageHandler: Send + Sync {
    /// Release any held connections or resources.
    fn close(&self) -> Result<()>;

    /// Load the backend's primary table (a database table, a fixed object, ...).
    async fn load_from_source(&self) -> Result<Table>;

    /// Load a table from a local CSV file.
    fn load_from_csv(&self, source: &Path) -> Result<Table> {
        let table = Table::read_csv(source).inspect_err(|e| {
            tracing::error!(path = %source.display(), error = %e, "Failed to load table from CSV")
        })?;
        tracing::info!(path = %source.display(), rows = table.row_count(), "Table loaded from CSV");
        Ok(table)
    }

    /// Enter a usage scope. Entering does nothing; leaving closes the handler.
    fn scope(&self) -> HandlerScope<'_, Self>
    where
        Self: Sized,
    {
        HandlerScope::new(self)
    }
}

/// Guard returned by [`StorageHandler::scope`].
///
/// Call [`HandlerScope::close`] on the success path to surface close errors.
/// If the guard is dropped instead (early return, `?`, panic unwinding) the
/// handler is still closed and any failure is logged.
pub struct HandlerScope<'a, H: StorageHandler> {
    handler: &'a H,
    closed: bool,
}

impl<'a, H: StorageHandler> HandlerScope<'a, H> {
    fn new(handler: &'a H) -> Self {
        tracing::debug!("Storage handler scope entered");
        Self {
            handler,
            closed: false,
        }
    }

    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        tracing::debug!("Storage handler scope exited");
        self.handler.close()
    }
}

impl<H: StorageHandler> Deref for HandlerScope<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        self.handler
    }
}

impl<H: StorageHandler> Drop for HandlerScope<'_, H> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        tracing::debug!("Storage handler scope dropped");
        if let Err(e) = self.handler.close() {
            tracing::error!(error = %e, "Failed to close storage handler");
        }
    }
}

/// A parsed `s3://bucket/key` location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUri {
    pub bucket: String,
    pub key: String,
}

impl RemoteUri {
    pub const SCHEME: &'static str = "s3";

    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl FromStr for RemoteUri {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("s3://")
            .ok_or_else(|| PipelineError::invalid_uri(format!("'{s}' lacks the s3:// prefix")))?;
        let (bucket, key) = rest.split_once('/').ok_or_else(|| {
            PipelineError::invalid_uri(format!("'{s}' has no '/' between bucket and key"))
        })?;
        if bucket.is_empty() || key.is_empty() {
            return Err(PipelineError::invalid_uri(format!(
                "'{s}' has an empty bucket or key"
            )));
        }
        Ok(Self::new(bucket, key))
    }
}

impl fmt::Display for RemoteUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", Self::SCHEME, self.bucket, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHandler {
        closes: AtomicUsize,
        fail_close: bool,
    }

    #[async_trait]
    impl StorageHandler for CountingHandler {
        fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(PipelineError::unsupported("close failed"));
            }
            Ok(())
        }

        async fn load_from_source(&self) -> Result<Table> {
            Ok(Table::default())
        }
    }

    fn early_exit(handler: &CountingHandler) -> Result<()> {
        let _scope = handler.scope();
        Err(PipelineError::content("boom"))
    }

    #[test]
    fn test_scope_closes_on_explicit_close() {
        let handler = CountingHandler::default();
        let scope = handler.scope();
        scope.close().unwrap();
        assert_eq!(handler.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scope_closes_on_error_path() {
        let handler = CountingHandler::default();
        assert!(early_exit(&handler).is_err());
        assert_eq!(handler.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scope_close_error_is_surfaced() {
        let handler = CountingHandler {
            fail_close: true,
            ..Default::default()
        };
        assert!(handler.scope().close().is_err());
        assert_eq!(handler.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_load_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        let handler = CountingHandler::default();
        let table = handler.load_from_csv(&path).unwrap();
        assert_eq!(table.row_count(), 1);
        assert!(matches!(
            handler.load_from_csv(&dir.path().join("missing.csv")),
            Err(PipelineError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_remote_uri_parse_and_display() {
        let uri: RemoteUri = "s3://my-bucket/artifacts/run/train.csv".parse().unwrap();
        assert_eq!(uri.bucket, "my-bucket");
        assert_eq!(uri.key, "artifacts/run/train.csv");
        assert_eq!(uri.to_string(), "s3://my-bucket/artifacts/run/train.csv");
    }

    #[test]
    fn test_remote_uri_format_errors() {
        for bad in [
            "my-bucket/key",
            "gs://my-bucket/key",
            "s3://my-bucket",
            "s3:///key",
            "s3://bucket/",
        ] {
            let err = bad.parse::<RemoteUri>().unwrap_err();
            assert!(matches!(err, PipelineError::InvalidUri(_)), "{bad}: {err}");
        }
    }
}
