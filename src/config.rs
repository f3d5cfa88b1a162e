use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.mangadex.org";
pub const DEFAULT_EXTENSIONS_URL: &str =
    "https://raw.githubusercontent.com/keiyoushi/extensions/repo/index.min.json";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Offline manga library and downloader backed by MangaDex.
#[derive(Parser, Debug, Clone)]
#[command(name = "machiyomi")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding library.json, settings.json and downloads/.
    #[arg(long, env = "MACHIYOMI_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Catalog API base URL.
    #[arg(long, env = "MACHIYOMI_API_URL", global = true, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Extension index URL.
    #[arg(long, env = "MACHIYOMI_EXTENSIONS_URL", global = true, default_value = DEFAULT_EXTENSIONS_URL)]
    pub extensions_url: String,

    /// Timeout in seconds for catalog and extension index requests.
    #[arg(long, global = true, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Search the catalog by title.
    Search {
        query: String,
        #[arg(short, long, default_value = "all")]
        lang: String,
    },

    /// Most followed titles.
    Popular {
        #[arg(short, long, default_value = "all")]
        lang: String,
    },

    /// Recently updated titles.
    Latest {
        #[arg(short, long, default_value = "all")]
        lang: String,
    },

    /// Show a title and its chapters.
    Show {
        manga_id: String,
        /// Chapter languages to list.
        #[arg(short, long, default_values_t = vec!["en".to_string()])]
        lang: Vec<String>,
    },

    /// Library management.
    Library {
        #[command(subcommand)]
        action: LibraryCommand,
    },

    /// Offline downloads.
    Downloads {
        #[command(subcommand)]
        action: DownloadCommand,
    },

    /// Extension index.
    Extensions {
        #[command(subcommand)]
        action: ExtensionCommand,
    },

    /// Print or change the interface language (en, tr, ru).
    Language { code: Option<String> },
}

#[derive(Subcommand, Debug, Clone)]
pub enum LibraryCommand {
    /// List saved titles with read progress.
    List,
    /// Save a title to the library.
    Add { manga_id: String },
    /// Remove a title from the library.
    Remove { manga_id: String },
    /// Record a chapter as read.
    Read { manga_id: String, chapter_id: String },
    /// Replace the library with a JSON document.
    Import { file: PathBuf },
}

#[derive(Subcommand, Debug, Clone)]
pub enum DownloadCommand {
    /// Print the download root.
    Path,
    /// List titles with downloaded chapters.
    List,
    /// Download every page of a chapter.
    Chapter {
        manga_id: String,
        chapter_id: String,
        /// Use the compressed page set.
        #[arg(long)]
        data_saver: bool,
    },
    /// Download a single page image.
    Page {
        url: String,
        manga_id: String,
        chapter_id: String,
        index: usize,
    },
    /// List the local page files of a chapter.
    Pages { manga_id: String, chapter_id: String },
    /// Delete a downloaded chapter.
    Delete { manga_id: String, chapter_id: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ExtensionCommand {
    /// List extensions from the index.
    List {
        #[arg(short, long, default_value = "")]
        search: String,
        #[arg(short, long, default_value = "all")]
        lang: String,
        #[arg(long)]
        installed: bool,
        #[arg(long)]
        hide_nsfw: bool,
    },
    /// Mark an extension package as installed.
    Install { pkg: String },
    /// Mark an extension package as not installed.
    Uninstall { pkg: String },
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub api_url: String,
    pub extensions_url: String,
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            api_url: DEFAULT_API_URL.to_string(),
            extensions_url: DEFAULT_EXTENSIONS_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            data_dir: cli.data_dir.clone().unwrap_or_else(default_data_dir),
            api_url: cli.api_url.trim_end_matches('/').to_string(),
            extensions_url: cli.extensions_url.clone(),
            timeout: Duration::from_secs(cli.timeout),
        }
    }

    /// Config rooted at an arbitrary directory, everything else default.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn library_path(&self) -> PathBuf {
        self.data_dir.join("library.json")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    pub fn download_root(&self) -> PathBuf {
        self.data_dir.join("downloads")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("machiyomi")
}
