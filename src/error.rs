use std::path::PathBuf;

use thiserror::Error;

/// Failure while downloading a page image to disk.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("gave up after {hops} redirects, last target {url}")]
    TooManyRedirects { hops: usize, url: String },

    #[error("invalid URL '{0}'")]
    InvalidUrl(String),
}

/// Failure while writing one of the local JSON documents.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure while talking to the remote catalog API.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    #[error("catalog returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("malformed catalog response: {0}")]
    Parse(#[from] serde_json::Error),
}
