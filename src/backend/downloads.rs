use image::ImageFormat;
use log::{debug, warn};
use serde::Serialize;
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};

use super::library::LibraryData;

/// A manga with at least one chapter on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadedManga {
    pub id: String,
    pub title: String,
    pub cover_url: String,
    pub chapter_count: usize,
}

/// Offline copies laid out as `<root>/<manga>/<chapter>/<NNN>.<ext>`.
///
/// Nothing about downloads is persisted separately; every query walks the
/// directory tree so the answer matches what is actually on disk.
#[derive(Debug, Clone)]
pub struct DownloadIndex {
    root: PathBuf,
}

impl DownloadIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> io::Result<&Path> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(&self.root)
    }

    /// Fails with `InvalidInput` unless `manga_id` is a single plain path
    /// segment, so every derived path stays under the root.
    pub fn manga_dir(&self, manga_id: &str) -> io::Result<PathBuf> {
        Ok(self.root.join(checked_id("manga", manga_id)?))
    }

    pub fn chapter_dir(&self, manga_id: &str, chapter_id: &str) -> io::Result<PathBuf> {
        Ok(self.manga_dir(manga_id)?.join(checked_id("chapter", chapter_id)?))
    }

    /// Zero-padded page file, `.png` when the source URL mentions png.
    pub fn page_path(
        &self,
        manga_id: &str,
        chapter_id: &str,
        page_index: usize,
        page_url: &str,
    ) -> io::Result<PathBuf> {
        let ext = if page_url.contains(".png") { "png" } else { "jpg" };
        Ok(self
            .chapter_dir(manga_id, chapter_id)?
            .join(format!("{:03}.{}", page_index, ext)))
    }

    pub async fn is_chapter_downloaded(&self, manga_id: &str, chapter_id: &str) -> bool {
        match self.chapter_dir(manga_id, chapter_id) {
            Ok(dir) => has_entries(&dir).await,
            Err(_) => false,
        }
    }

    /// Page images of a chapter ordered by file name.
    pub async fn downloaded_pages(&self, manga_id: &str, chapter_id: &str) -> Vec<PathBuf> {
        let Ok(dir) = self.chapter_dir(manga_id, chapter_id) else {
            return Vec::new();
        };
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut pages = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if is_page_image(&path) {
                pages.push(path);
            }
        }
        pages.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        pages
    }

    pub async fn downloaded_page_urls(&self, manga_id: &str, chapter_id: &str) -> Vec<String> {
        self.downloaded_pages(manga_id, chapter_id)
            .await
            .into_iter()
            .filter_map(|path| reqwest::Url::from_file_path(&path).ok())
            .map(String::from)
            .collect()
    }

    /// Removes the chapter directory, and the manga directory once it holds
    /// no chapters.
    pub async fn delete_chapter(&self, manga_id: &str, chapter_id: &str) -> io::Result<()> {
        let dir = self.chapter_dir(manga_id, chapter_id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!("deleted {}", dir.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        }

        let manga_dir = self.manga_dir(manga_id)?;
        if !has_entries(&manga_dir).await {
            if let Err(e) = tokio::fs::remove_dir(&manga_dir).await {
                warn!("could not remove {}: {}", manga_dir.display(), e);
            }
        }
        Ok(())
    }

    /// Every manga directory with at least one non-empty chapter directory,
    /// titled from the library where possible.
    pub async fn downloaded_mangas(&self, library: &LibraryData) -> Vec<DownloadedManga> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut mangas = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !is_dir(&path).await {
                continue;
            }
            let chapter_count = count_chapters(&path).await;
            if chapter_count == 0 {
                continue;
            }

            let id = entry.file_name().to_string_lossy().into_owned();
            let saved = library.entry(&id);
            let title = saved
                .map(|m| m.title.clone())
                .filter(|title| !title.is_empty())
                .unwrap_or_else(|| id.clone());
            let cover_url = saved.map(|m| m.cover_url.clone()).unwrap_or_default();

            mangas.push(DownloadedManga {
                id,
                title,
                cover_url,
                chapter_count,
            });
        }
        mangas.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        mangas
    }
}

fn checked_id<'a>(kind: &str, id: &'a str) -> io::Result<&'a str> {
    let mut parts = Path::new(id).components();
    match (parts.next(), parts.next()) {
        (Some(Component::Normal(_)), None) => Ok(id),
        _ => Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("invalid {} id '{}'", kind, id),
        )),
    }
}

fn is_page_image(path: &Path) -> bool {
    matches!(
        path.extension().and_then(ImageFormat::from_extension),
        Some(ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP | ImageFormat::Gif)
    )
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

async fn has_entries(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

async fn count_chapters(manga_dir: &Path) -> usize {
    let mut entries = match tokio::fs::read_dir(manga_dir).await {
        Ok(entries) => entries,
        Err(_) => return 0,
    };
    let mut count = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if is_dir(&path).await && has_entries(&path).await {
            count += 1;
        }
    }
    count
}
