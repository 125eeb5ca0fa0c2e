//! Local persistence helpers: atomic writes, CSV and YAML saves, object keys.
//!
//! Every save creates missing parent directories and writes through a `.tmp`
//! sibling that is renamed into place, so a crash never leaves a truncated
//! artifact behind.

use crate::error::{PipelineError, Result};
use crate::table::Table;
use std::io;
use std::path::{Component, Path};

/// Atomically write raw bytes to a file.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    ensure_parent(path)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::debug!(dir = %parent.display(), "Created directory");
        }
    }
    Ok(())
}

/// Write a table as CSV to each of `paths`.
pub fn save_csv(table: &Table, paths: &[&Path], label: &str) -> Result<()> {
    let bytes = table.to_csv_bytes()?;
    for path in paths {
        atomic_write(path, &bytes).inspect_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to save {label}")
        })?;
        tracing::info!(path = %path.display(), rows = table.row_count(), "{label} saved");
    }
    Ok(())
}

/// Serialize `data` as YAML to each of `paths`.
pub fn save_yaml<T: serde::Serialize>(data: &T, paths: &[&Path], label: &str) -> Result<()> {
    let yaml = serde_yaml::to_string(data)?;
    for path in paths {
        atomic_write(path, yaml.as_bytes())?;
        tracing::info!(path = %path.display(), "{label} saved");
    }
    Ok(())
}

/// Copy a file, creating the destination's parent directories.
pub fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if !from.is_file() {
        return Err(PipelineError::FileNotFound(from.to_path_buf()));
    }
    ensure_parent(to)?;
    std::fs::copy(from, to)?;
    tracing::info!(from = %from.display(), to = %to.display(), "File copied");
    Ok(())
}

/// Render a path as a relative, forward-slash separated string, whatever the
/// platform. Root and prefix components are dropped so the result is usable
/// as an object key.
pub fn posix_string(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            Component::ParentDir => Some("..".into()),
            Component::RootDir | Component::Prefix(_) | Component::CurDir => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Object key for `path`, relative to the project `root` it lives under.
/// Paths outside `root` keep their full [`posix_string`] form.
pub fn object_key(root: &Path, path: &Path) -> String {
    posix_string(path.strip_prefix(root).unwrap_or(path))
}
