use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use super::settings::Settings;
use crate::config::Config;
use crate::error::{FetchError, PersistenceError};

const INSTALLED_KEY: &str = "installed-extensions";
pub const ALL_LANGUAGES: &str = "all";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extension {
    pub name: String,
    pub pkg: String,
    #[serde(default)]
    pub apk: String,
    #[serde(default)]
    pub lang: String,
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub nsfw: u8,
    #[serde(default)]
    pub has_readme: u8,
    #[serde(default)]
    pub has_changelog: u8,
    #[serde(default)]
    pub sources: Vec<ExtensionSource>,
}

impl Extension {
    pub fn is_nsfw(&self) -> bool {
        self.nsfw != 0
    }

    fn matches(&self, query: &str) -> bool {
        let hit = |field: &str| field.to_lowercase().contains(query);
        hit(&self.name)
            || hit(&self.pkg)
            || self
                .sources
                .iter()
                .any(|source| hit(&source.name) || hit(&source.base_url))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionSource {
    pub name: String,
    #[serde(default)]
    pub lang: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    pub search: String,
    /// Language code, or [`ALL_LANGUAGES`].
    pub lang: String,
    pub installed_only: bool,
    pub hide_nsfw: bool,
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        Self {
            search: String::new(),
            lang: ALL_LANGUAGES.to_string(),
            installed_only: false,
            hide_nsfw: false,
        }
    }
}

/// Applies the filters in order: NSFW, language, installed, free-text search.
pub fn filter_extensions(
    catalog: &[Extension],
    filter: &ExtensionFilter,
    installed: &HashSet<String>,
) -> Vec<Extension> {
    let query = filter.search.to_lowercase();
    catalog
        .iter()
        .filter(|ext| !(filter.hide_nsfw && ext.is_nsfw()))
        .filter(|ext| filter.lang == ALL_LANGUAGES || filter.lang.is_empty() || ext.lang == filter.lang)
        .filter(|ext| !filter.installed_only || installed.contains(&ext.pkg))
        .filter(|ext| query.is_empty() || ext.matches(&query))
        .cloned()
        .collect()
}

/// Sorted, de-duplicated language codes present in the catalog.
pub fn languages(catalog: &[Extension]) -> Vec<String> {
    catalog
        .iter()
        .filter(|ext| !ext.lang.is_empty())
        .map(|ext| ext.lang.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("all", "All"),
    ("en", "English"),
    ("tr", "Türkçe"),
    ("ru", "Русский"),
    ("ja", "日本語"),
    ("ko", "한국어"),
    ("zh", "中文"),
    ("zh-Hans", "简体中文"),
    ("zh-Hant", "繁體中文"),
    ("fr", "Français"),
    ("de", "Deutsch"),
    ("es", "Español"),
    ("es-419", "Español (LA)"),
    ("pt", "Português"),
    ("pt-BR", "Português (BR)"),
    ("it", "Italiano"),
    ("ar", "العربية"),
    ("hi", "हिन्दी"),
    ("id", "Indonesia"),
    ("th", "ไทย"),
    ("vi", "Tiếng Việt"),
    ("pl", "Polski"),
    ("uk", "Українська"),
    ("nl", "Nederlands"),
    ("fil", "Filipino"),
    ("ms", "Melayu"),
    ("my", "မြန်မာ"),
    ("bn", "বাংলা"),
];

/// Display name for a language code, or the code itself when unknown.
pub fn language_name(code: &str) -> &str {
    LANGUAGE_NAMES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, name)| *name)
        .unwrap_or(code)
}

/// Remote extension index plus the locally installed package ids.
pub struct ExtensionRegistry {
    client: reqwest::Client,
    index_url: String,
    settings: Settings,
    catalog: Option<Vec<Extension>>,
}

impl ExtensionRegistry {
    pub fn new(config: &Config, settings: Settings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            index_url: config.extensions_url.clone(),
            settings,
            catalog: None,
        })
    }

    /// The index, fetched on first use. A failed fetch yields an empty list
    /// and is retried on the next call.
    pub async fn fetch_catalog(&mut self) -> Vec<Extension> {
        if let Some(catalog) = &self.catalog {
            return catalog.clone();
        }
        match self.download_index().await {
            Ok(catalog) => {
                info!("loaded {} extensions from {}", catalog.len(), self.index_url);
                self.catalog = Some(catalog.clone());
                catalog
            }
            Err(e) => {
                warn!("failed to fetch extensions: {}", e);
                Vec::new()
            }
        }
    }

    async fn download_index(&self) -> Result<Vec<Extension>, FetchError> {
        let response = self.client.get(&self.index_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: self.index_url.clone(),
            });
        }
        Ok(serde_json::from_slice(&response.bytes().await?)?)
    }

    pub fn invalidate_cache(&mut self) {
        self.catalog = None;
    }

    async fn installed_list(&self) -> Vec<String> {
        self.settings
            .get::<Vec<String>>(INSTALLED_KEY)
            .await
            .unwrap_or_default()
    }

    pub async fn installed(&self) -> HashSet<String> {
        self.installed_list().await.into_iter().collect()
    }

    pub async fn is_installed(&self, pkg: &str) -> bool {
        self.installed_list().await.iter().any(|p| p == pkg)
    }

    pub async fn install(&self, pkg: &str) -> Result<(), PersistenceError> {
        let mut installed = self.installed_list().await;
        if installed.iter().any(|p| p == pkg) {
            return Ok(());
        }
        installed.push(pkg.to_string());
        self.settings.set(INSTALLED_KEY, &installed).await
    }

    pub async fn uninstall(&self, pkg: &str) -> Result<(), PersistenceError> {
        let mut installed = self.installed_list().await;
        installed.retain(|p| p != pkg);
        self.settings.set(INSTALLED_KEY, &installed).await
    }

    pub async fn filter(&self, catalog: &[Extension], filter: &ExtensionFilter) -> Vec<Extension> {
        let installed = if filter.installed_only {
            self.installed().await
        } else {
            HashSet::new()
        };
        filter_extensions(catalog, filter, &installed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_server::{json, serve};
    use tempfile::TempDir;

    fn catalog() -> Vec<Extension> {
        serde_json::from_value(serde_json::json!([
            {
                "name": "Tachiyomi: MangaDex",
                "pkg": "eu.kanade.tachiyomi.extension.all.mangadex",
                "apk": "tachiyomi-all.mangadex-v1.4.apk",
                "lang": "all",
                "code": 190,
                "version": "1.4.190",
                "nsfw": 0,
                "hasReadme": 1,
                "hasChangelog": 0,
                "sources": [
                    { "name": "MangaDex", "lang": "en", "id": "2499283573021220255", "baseUrl": "https://mangadex.org" }
                ]
            },
            {
                "name": "Tachiyomi: Hentai Site",
                "pkg": "eu.kanade.tachiyomi.extension.en.hsite",
                "lang": "en",
                "nsfw": 1,
                "sources": [{ "name": "HSite", "baseUrl": "https://hsite.example" }]
            },
            {
                "name": "Tachiyomi: Manga Oku",
                "pkg": "eu.kanade.tachiyomi.extension.tr.mangaoku",
                "lang": "tr",
                "nsfw": 0,
                "sources": [{ "name": "Oku", "baseUrl": "https://mangaoku.example" }]
            }
        ]))
        .unwrap()
    }

    fn names(extensions: &[Extension]) -> Vec<&str> {
        extensions.iter().map(|e| e.name.as_str()).collect()
    }

    fn registry(index_url: &str) -> (TempDir, ExtensionRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            extensions_url: index_url.to_string(),
            ..Config::with_data_dir(dir.path())
        };
        let settings = Settings::new(config.settings_path());
        let registry = ExtensionRegistry::new(&config, settings).unwrap();
        (dir, registry)
    }

    #[test]
    fn hides_nsfw() {
        let filter = ExtensionFilter {
            hide_nsfw: true,
            ..ExtensionFilter::default()
        };
        let result = filter_extensions(&catalog(), &filter, &HashSet::new());
        assert_eq!(names(&result), vec!["Tachiyomi: MangaDex", "Tachiyomi: Manga Oku"]);
    }

    #[test]
    fn filters_by_language() {
        let filter = ExtensionFilter {
            lang: "tr".to_string(),
            ..ExtensionFilter::default()
        };
        let result = filter_extensions(&catalog(), &filter, &HashSet::new());
        assert_eq!(names(&result), vec!["Tachiyomi: Manga Oku"]);
    }

    #[test]
    fn searches_sources_case_insensitively() {
        let filter = ExtensionFilter {
            search: "MANGAOKU.example".to_string(),
            ..ExtensionFilter::default()
        };
        let result = filter_extensions(&catalog(), &filter, &HashSet::new());
        assert_eq!(names(&result), vec!["Tachiyomi: Manga Oku"]);

        let filter = ExtensionFilter {
            search: "mangadex".to_string(),
            hide_nsfw: true,
            ..ExtensionFilter::default()
        };
        let result = filter_extensions(&catalog(), &filter, &HashSet::new());
        assert_eq!(names(&result), vec!["Tachiyomi: MangaDex"]);
    }

    #[test]
    fn installed_only_intersects() {
        let installed: HashSet<String> =
            ["eu.kanade.tachiyomi.extension.en.hsite".to_string()].into();
        let filter = ExtensionFilter {
            installed_only: true,
            hide_nsfw: true,
            ..ExtensionFilter::default()
        };
        assert!(filter_extensions(&catalog(), &filter, &installed).is_empty());
    }

    #[test]
    fn lists_languages() {
        assert_eq!(languages(&catalog()), vec!["all", "en", "tr"]);
    }

    #[test]
    fn names_known_languages() {
        assert_eq!(language_name("tr"), "Türkçe");
        assert_eq!(language_name("pt-BR"), "Português (BR)");
        assert_eq!(language_name("all"), "All");
        assert_eq!(language_name("xx"), "xx");
        assert_eq!(language_name(""), "");
    }

    #[tokio::test]
    async fn install_and_uninstall_are_idempotent() {
        let (_dir, registry) = registry("http://127.0.0.1:9/index.json");
        registry.install("pkg.a").await.unwrap();
        registry.install("pkg.a").await.unwrap();
        registry.install("pkg.b").await.unwrap();
        assert_eq!(registry.installed_list().await, vec!["pkg.a", "pkg.b"]);

        registry.uninstall("pkg.a").await.unwrap();
        registry.uninstall("pkg.a").await.unwrap();
        assert!(!registry.is_installed("pkg.a").await);
        assert!(registry.is_installed("pkg.b").await);
    }

    #[tokio::test]
    async fn registry_filter_reads_installed_set() {
        let (_dir, registry) = registry("http://127.0.0.1:9/index.json");
        registry
            .install("eu.kanade.tachiyomi.extension.tr.mangaoku")
            .await
            .unwrap();
        let filter = ExtensionFilter {
            installed_only: true,
            ..ExtensionFilter::default()
        };
        let result = registry.filter(&catalog(), &filter).await;
        assert_eq!(names(&result), vec!["Tachiyomi: Manga Oku"]);
    }

    #[tokio::test]
    async fn catalog_is_fetched_once() {
        let index = serde_json::to_string(&catalog()).unwrap();
        let server = serve(vec![("/index.min.json", json(&index))]).await;
        let (_dir, mut registry) = registry(&format!("{}/index.min.json", server.base));

        let first = registry.fetch_catalog().await;
        let second = registry.fetch_catalog().await;
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert_eq!(server.hits(), 1);

        registry.invalidate_cache();
        registry.fetch_catalog().await;
        assert_eq!(server.hits(), 2);
    }

    #[tokio::test]
    async fn malformed_index_yields_empty_catalog() {
        let server = serve(vec![("/index.min.json", json("{\"not\": \"a list\"}"))]).await;
        let (_dir, mut registry) = registry(&format!("{}/index.min.json", server.base));
        assert!(registry.fetch_catalog().await.is_empty());
    }

    #[tokio::test]
    async fn unreachable_index_yields_empty_catalog() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (_dir, mut registry) = registry(&format!("http://{}/index.min.json", addr));
        assert!(registry.fetch_catalog().await.is_empty());
        assert!(registry.catalog.is_none());
    }
}
