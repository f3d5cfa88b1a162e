pub mod downloader;
pub mod downloads;
pub mod extensions;
pub mod library;
pub mod mangadex;
pub mod settings;

#[cfg(test)]
mod test_server;

use serde::Serialize;
use std::path::Path;

use crate::error::PersistenceError;

/// Pretty-prints `value` over `path`, creating parent directories first.
pub(crate) async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let content = serde_json::to_string_pretty(value)?;
    let io_err = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    tokio::fs::write(path, content).await.map_err(io_err)
}
