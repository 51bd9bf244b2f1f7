//! Directory snapshots: the full record set as pretty-printed JSON.

use meridian_directory::{DirectoryRecord, MemoryDirectory};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Snapshot errors
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Reading or writing the file failed
    #[error("snapshot I/O on {}: {source}", .path.display())]
    Io {
        /// Snapshot path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The file is not a record list
    #[error("snapshot {} is malformed: {source}", .path.display())]
    Format {
        /// Snapshot path
        path: PathBuf,
        /// Underlying (de)serialization error
        source: serde_json::Error,
    },
}

/// Load a directory from the snapshot at `path`. A missing file is an empty
/// directory.
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<MemoryDirectory, SnapshotError> {
    let path = path.as_ref();
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(MemoryDirectory::new());
        }
        Err(source) => {
            return Err(SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let records: Vec<DirectoryRecord> =
        serde_json::from_str(&raw).map_err(|source| SnapshotError::Format {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::debug!(records = records.len(), path = %path.display(), "snapshot loaded");
    Ok(MemoryDirectory::from_records(records))
}

/// Write every record of `directory` to `path`, ordered by identity.
///
/// The records go to a temporary file next to `path` which is then renamed
/// over it, so readers see either the previous snapshot or the new one.
pub async fn write_snapshot(
    directory: &MemoryDirectory,
    path: impl AsRef<Path>,
) -> Result<usize, SnapshotError> {
    let path = path.as_ref();
    let records = directory.records().await;
    let json = serde_json::to_string_pretty(&records).map_err(|source| SnapshotError::Format {
        path: path.to_path_buf(),
        source,
    })?;
    let io_err = |source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    staged.write_all(json.as_bytes()).map_err(io_err)?;
    staged.as_file().sync_all().map_err(io_err)?;
    staged.persist(path).map_err(|err| io_err(err.error))?;
    tracing::debug!(records = records.len(), path = %path.display(), "snapshot written");
    Ok(records.len())
}
