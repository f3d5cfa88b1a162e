use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::mangadex::Manga;
use super::write_json;
use crate::error::PersistenceError;

/// Root document of `library.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryData {
    #[serde(default)]
    pub mangas: Vec<LibraryEntry>,
    #[serde(default)]
    pub read_progress: HashMap<String, ReadProgress>,
}

impl LibraryData {
    pub fn entry(&self, manga_id: &str) -> Option<&LibraryEntry> {
        self.mangas.iter().find(|m| m.id == manga_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryEntry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub cover_url: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub status: String,
    pub added_at: DateTime<Utc>,
}

impl LibraryEntry {
    pub fn new(manga: &Manga, added_at: DateTime<Utc>) -> Self {
        LibraryEntry {
            id: manga.id.clone(),
            title: manga.title.clone(),
            cover_url: manga.cover_url.clone(),
            author: manga.author.clone(),
            status: manga.status.clone(),
            added_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadProgress {
    #[serde(default)]
    pub read_chapters: Vec<String>,
    #[serde(default)]
    pub last_read_chapter: String,
    /// Never written by read tracking; kept so older documents round-trip.
    #[serde(default)]
    pub last_read_page: u32,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub last_read_at: Option<DateTime<Utc>>,
}

impl ReadProgress {
    pub fn is_read(&self, chapter_id: &str) -> bool {
        self.read_chapters.iter().any(|c| c == chapter_id)
    }
}

// A progress record created but never read has an empty timestamp.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
    }
}

/// Saved manga and read progress, persisted as one JSON document.
///
/// The document is read at most once per store and kept in memory; every
/// mutation rewrites the whole file before returning.
#[derive(Debug)]
pub struct LibraryStore {
    path: PathBuf,
    cache: Option<LibraryData>,
}

impl LibraryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&mut self) -> &LibraryData {
        if self.cache.is_none() {
            let data = read_library(&self.path).await;
            self.cache = Some(data);
        }
        self.cache.get_or_insert_with(LibraryData::default)
    }

    /// Overwrites the backing file. The cache only changes once the write
    /// succeeded.
    pub async fn save(&mut self, data: LibraryData) -> Result<(), PersistenceError> {
        write_json(&self.path, &data).await?;
        debug!(
            "saved library ({} mangas) to {}",
            data.mangas.len(),
            self.path.display()
        );
        self.cache = Some(data);
        Ok(())
    }

    pub fn invalidate_cache(&mut self) {
        self.cache = None;
    }

    pub async fn mangas(&mut self) -> Vec<LibraryEntry> {
        self.load().await.mangas.clone()
    }

    pub async fn add_manga(&mut self, manga: &Manga) -> Result<(), PersistenceError> {
        let mut data = self.load().await.clone();
        if data.entry(&manga.id).is_some() {
            return Ok(());
        }
        data.mangas.push(LibraryEntry::new(manga, Utc::now()));
        self.save(data).await
    }

    /// Read progress for the manga is kept so it survives re-adding.
    pub async fn remove_manga(&mut self, manga_id: &str) -> Result<(), PersistenceError> {
        let mut data = self.load().await.clone();
        data.mangas.retain(|m| m.id != manga_id);
        self.save(data).await
    }

    pub async fn is_in_library(&mut self, manga_id: &str) -> bool {
        self.load().await.entry(manga_id).is_some()
    }

    /// Adds the manga when absent, removes it otherwise. Returns whether it is
    /// in the library afterwards.
    pub async fn toggle(&mut self, manga: &Manga) -> Result<bool, PersistenceError> {
        if self.is_in_library(&manga.id).await {
            self.remove_manga(&manga.id).await?;
            Ok(false)
        } else {
            self.add_manga(manga).await?;
            Ok(true)
        }
    }

    pub async fn mark_chapter_read(
        &mut self,
        manga_id: &str,
        chapter_id: &str,
    ) -> Result<(), PersistenceError> {
        let mut data = self.load().await.clone();
        let progress = data.read_progress.entry(manga_id.to_string()).or_default();
        if !progress.is_read(chapter_id) {
            progress.read_chapters.push(chapter_id.to_string());
        }
        progress.last_read_chapter = chapter_id.to_string();
        progress.last_read_at = Some(Utc::now());
        self.save(data).await
    }

    pub async fn read_progress(&mut self, manga_id: &str) -> Option<ReadProgress> {
        self.load().await.read_progress.get(manga_id).cloned()
    }
}

async fn read_library(path: &Path) -> LibraryData {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!("library at {} is malformed, starting empty: {}", path.display(), e);
            LibraryData::default()
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => LibraryData::default(),
        Err(e) => {
            warn!("could not read library at {}: {}", path.display(), e);
            LibraryData::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manga(id: &str, title: &str) -> Manga {
        Manga {
            id: id.to_string(),
            title: title.to_string(),
            author: "Oda Eiichiro".to_string(),
            status: "ongoing".to_string(),
            ..Manga::default()
        }
    }

    fn store() -> (TempDir, LibraryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LibraryStore::new(dir.path().join("library.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn starts_empty_without_a_file() {
        let (_dir, mut store) = store();
        assert_eq!(store.load().await, &LibraryData::default());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn adding_twice_keeps_one_entry() {
        let (_dir, mut store) = store();
        let m = manga("m1", "One Piece");
        store.add_manga(&m).await.unwrap();
        let added_at = store.mangas().await[0].added_at;
        store.add_manga(&m).await.unwrap();

        let mangas = store.mangas().await;
        assert_eq!(mangas.len(), 1);
        assert_eq!(mangas[0].added_at, added_at);
        assert!(store.is_in_library("m1").await);
    }

    #[tokio::test]
    async fn keeps_insertion_order() {
        let (_dir, mut store) = store();
        for id in ["b", "a", "c"] {
            store.add_manga(&manga(id, id)).await.unwrap();
        }
        let ids: Vec<_> = store.mangas().await.into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn removing_unknown_id_is_a_noop() {
        let (_dir, mut store) = store();
        store.add_manga(&manga("m1", "One Piece")).await.unwrap();
        store.remove_manga("missing").await.unwrap();
        assert_eq!(store.mangas().await.len(), 1);
    }

    #[tokio::test]
    async fn removal_leaves_read_progress_behind() {
        let (_dir, mut store) = store();
        store.add_manga(&manga("m1", "One Piece")).await.unwrap();
        store.mark_chapter_read("m1", "c1").await.unwrap();
        store.remove_manga("m1").await.unwrap();

        assert!(!store.is_in_library("m1").await);
        assert!(store.read_progress("m1").await.is_some());
    }

    #[tokio::test]
    async fn toggle_flips_membership() {
        let (_dir, mut store) = store();
        let m = manga("m1", "One Piece");
        assert!(store.toggle(&m).await.unwrap());
        assert!(!store.toggle(&m).await.unwrap());
        assert!(store.mangas().await.is_empty());
    }

    #[tokio::test]
    async fn marking_read_repeatedly_records_chapter_once() {
        let (_dir, mut store) = store();
        for _ in 0..3 {
            store.mark_chapter_read("m1", "c1").await.unwrap();
        }
        store.mark_chapter_read("m1", "c2").await.unwrap();
        store.mark_chapter_read("m1", "c1").await.unwrap();

        let progress = store.read_progress("m1").await.unwrap();
        assert_eq!(progress.read_chapters, vec!["c1", "c2"]);
        assert_eq!(progress.last_read_chapter, "c1");
        assert_eq!(progress.last_read_page, 0);
        assert!(progress.last_read_at.is_some());
        assert!(store.read_progress("m2").await.is_none());
    }

    #[tokio::test]
    async fn save_then_reload_round_trips() {
        let (_dir, mut store) = store();
        store.add_manga(&manga("m1", "One Piece")).await.unwrap();
        store.mark_chapter_read("m1", "c1").await.unwrap();
        let saved = store.load().await.clone();

        store.save(saved.clone()).await.unwrap();
        store.invalidate_cache();
        assert_eq!(store.load().await, &saved);

        let mut other = LibraryStore::new(store.path());
        assert_eq!(other.load().await, &saved);
    }

    #[tokio::test]
    async fn invalidate_picks_up_external_edits() {
        let (_dir, mut store) = store();
        store.add_manga(&manga("m1", "One Piece")).await.unwrap();

        let mut other = LibraryStore::new(store.path());
        other.remove_manga("m1").await.unwrap();

        assert!(store.is_in_library("m1").await);
        store.invalidate_cache();
        assert!(!store.is_in_library("m1").await);
    }

    #[tokio::test]
    async fn malformed_file_loads_empty() {
        let (_dir, mut store) = store();
        std::fs::write(store.path(), "{ \"mangas\": [ oops").unwrap();
        assert_eq!(store.load().await, &LibraryData::default());
    }

    #[tokio::test]
    async fn reads_camel_case_document_with_blank_timestamp() {
        let (_dir, mut store) = store();
        let doc = r#"{
            "mangas": [{
                "id": "m1",
                "title": "Berserk",
                "coverUrl": "",
                "author": "Miura Kentaro",
                "status": "hiatus",
                "addedAt": "2024-03-01T10:00:00.000Z"
            }],
            "readProgress": {
                "m1": { "readChapters": [], "lastReadChapter": "", "lastReadPage": 0, "lastReadAt": "" }
            }
        }"#;
        std::fs::write(store.path(), doc).unwrap();

        let data = store.load().await;
        assert_eq!(data.mangas[0].title, "Berserk");
        assert_eq!(data.read_progress["m1"].last_read_at, None);
    }

    #[tokio::test]
    async fn failed_save_keeps_previous_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");
        std::fs::create_dir(&path).unwrap();
        let mut store = LibraryStore::new(&path);

        let result = store.add_manga(&manga("m1", "One Piece")).await;
        assert!(matches!(result, Err(PersistenceError::Io { .. })));
        assert!(!store.is_in_library("m1").await);
    }
}
