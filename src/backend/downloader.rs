use futures::StreamExt;
use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderValue, LOCATION, REFERER};
use reqwest::{StatusCode, Url, redirect};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::downloads::DownloadIndex;
use crate::error::TransferError;

const USER_AGENT: &str = "Machiyomi/1.0";
// The image host rejects requests that do not come from the site.
const REFERER_URL: &str = "https://mangadex.org";
pub const MAX_REDIRECTS: usize = 5;

enum Hop {
    Done,
    Redirect(Url),
}

/// Fetches page images into the download tree.
#[derive(Clone)]
pub struct PageDownloader {
    client: reqwest::Client,
    index: DownloadIndex,
}

impl PageDownloader {
    pub fn new(index: DownloadIndex) -> Result<Self, TransferError> {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, HeaderValue::from_static(REFERER_URL));
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { client, index })
    }

    pub fn index(&self) -> &DownloadIndex {
        &self.index
    }

    /// Downloads one page unless its file already exists. Returns the local
    /// path either way.
    pub async fn download_page(
        &self,
        page_url: &str,
        manga_id: &str,
        chapter_id: &str,
        page_index: usize,
    ) -> Result<PathBuf, TransferError> {
        let dest = self.index.page_path(manga_id, chapter_id, page_index, page_url)?;
        if tokio::fs::try_exists(&dest).await? {
            debug!("{} already downloaded", dest.display());
            return Ok(dest);
        }
        self.fetch_and_store(page_url, &dest).await?;
        Ok(dest)
    }

    /// Downloads the pages one after another, stopping at the first failure.
    pub async fn download_chapter(
        &self,
        page_urls: &[String],
        manga_id: &str,
        chapter_id: &str,
    ) -> Result<Vec<PathBuf>, TransferError> {
        self.index.chapter_dir(manga_id, chapter_id)?;
        let mut paths = Vec::with_capacity(page_urls.len());
        for (i, url) in page_urls.iter().enumerate() {
            paths.push(self.download_page(url, manga_id, chapter_id, i).await?);
            debug!("chapter {}: page {}/{}", chapter_id, i + 1, page_urls.len());
        }
        info!("downloaded {} pages of chapter {}", paths.len(), chapter_id);
        Ok(paths)
    }

    /// Streams `source_url` into `dest`, following up to [`MAX_REDIRECTS`]
    /// 301/302 hops. A failed transfer leaves no file behind.
    pub async fn fetch_and_store(&self, source_url: &str, dest: &Path) -> Result<(), TransferError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut url = Url::parse(source_url)
            .map_err(|_| TransferError::InvalidUrl(source_url.to_string()))?;
        let mut hops = 0;
        loop {
            match self.transfer(&url, dest).await {
                Ok(Hop::Done) => return Ok(()),
                Ok(Hop::Redirect(next)) => {
                    hops += 1;
                    if hops > MAX_REDIRECTS {
                        return Err(TransferError::TooManyRedirects {
                            hops: MAX_REDIRECTS,
                            url: next.to_string(),
                        });
                    }
                    debug!("{} redirected to {}", url, next);
                    url = next;
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(dest).await;
                    return Err(e);
                }
            }
        }
    }

    async fn transfer(&self, url: &Url, dest: &Path) -> Result<Hop, TransferError> {
        let mut file = tokio::fs::File::create(dest).await?;
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if status == StatusCode::MOVED_PERMANENTLY || status == StatusCode::FOUND {
            if let Some(location) = response.headers().get(LOCATION) {
                let target = location
                    .to_str()
                    .ok()
                    .and_then(|loc| url.join(loc).ok())
                    .ok_or_else(|| TransferError::InvalidUrl(format!("{:?}", location)))?;
                drop(file);
                tokio::fs::remove_file(dest).await?;
                return Ok(Hop::Redirect(target));
            }
        }
        if !status.is_success() {
            return Err(TransferError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(Hop::Done)
    }
}
