//! Offline core of the Machiyomi manga reader: MangaDex catalog access, the
//! local library with read progress, page downloads and the downloaded-content
//! index, and the extension registry.

pub mod backend;
pub mod config;
pub mod error;

pub use backend::downloader::PageDownloader;
pub use backend::downloads::{DownloadIndex, DownloadedManga};
pub use backend::extensions::{Extension, ExtensionFilter, ExtensionRegistry};
pub use backend::library::{LibraryData, LibraryEntry, LibraryStore, ReadProgress};
pub use backend::mangadex::{Chapter, Manga, MangaDex, PageData};
pub use backend::settings::{Language, Settings};
pub use config::Config;
pub use error::{FetchError, PersistenceError, TransferError};
