use log::debug;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashSet};

use crate::config::Config;
use crate::error::FetchError;

const USER_AGENT: &str = "Machiyomi/1.0";
const COVER_BASE_URL: &str = "https://uploads.mangadex.org/covers";
const TITLE_LANGS: [&str; 4] = ["en", "ja", "ja-ro", "ko"];
const DESCRIPTION_LANGS: [&str; 3] = ["en", "tr", "ja"];
const RATINGS: &str = "contentRating[]=safe&contentRating[]=suggestive";
const INCLUDES: &str = "includes[]=cover_art&includes[]=author&includes[]=artist";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manga {
    pub id: String,
    pub title: String,
    pub alt_titles: Vec<String>,
    pub description: String,
    pub status: String,
    pub year: Option<u32>,
    pub tags: Vec<String>,
    pub cover_url: String,
    pub author: String,
    pub artist: String,
    pub content_rating: String,
    pub last_chapter: String,
    pub demographic: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub chapter: String,
    pub volume: String,
    pub pages: u32,
    pub language: String,
    pub publish_at: String,
    pub scanlation_group: String,
}

/// Page locations for one chapter as handed out by the at-home server.
#[derive(Debug, Clone, PartialEq)]
pub struct PageData {
    pub base_url: String,
    pub hash: String,
    pub data: Vec<String>,
    pub data_saver: Vec<String>,
}

impl PageData {
    pub fn page_url(&self, index: usize, data_saver: bool) -> Option<String> {
        let (quality, files) = if data_saver {
            ("data-saver", &self.data_saver)
        } else {
            ("data", &self.data)
        };
        files
            .get(index)
            .map(|file| format!("{}/{}/{}/{}", self.base_url, quality, self.hash, file))
    }

    pub fn page_urls(&self, data_saver: bool) -> Vec<String> {
        let count = if data_saver {
            self.data_saver.len()
        } else {
            self.data.len()
        };
        (0..count)
            .filter_map(|i| self.page_url(i, data_saver))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MangaList {
    pub mangas: Vec<Manga>,
    pub total: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ChapterList {
    pub chapters: Vec<Chapter>,
    pub total: u32,
}

#[derive(Debug, Deserialize)]
struct MangaListResponse {
    data: Vec<MangaData>,
    #[serde(default)]
    total: u32,
}

#[derive(Debug, Deserialize)]
struct MangaEntityResponse {
    data: MangaData,
}

#[derive(Debug, Deserialize)]
struct MangaData {
    id: String,
    attributes: MangaAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MangaAttributes {
    title: BTreeMap<String, String>,
    #[serde(default)]
    alt_titles: Vec<BTreeMap<String, String>>,
    description: Option<Localized>,
    status: Option<String>,
    year: Option<u32>,
    #[serde(default)]
    tags: Vec<Tag>,
    content_rating: Option<String>,
    last_chapter: Option<String>,
    publication_demographic: Option<String>,
}

// An empty localized string comes back as `[]` instead of `{}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Localized {
    Map(BTreeMap<String, String>),
    Empty(Vec<serde_json::Value>),
}

#[derive(Debug, Deserialize)]
struct Tag {
    attributes: TagAttributes,
}

#[derive(Debug, Deserialize)]
struct TagAttributes {
    name: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    #[serde(rename = "type")]
    rel_type: String,
    attributes: Option<RelationshipAttributes>,
}

#[derive(Debug, Deserialize)]
struct RelationshipAttributes {
    name: Option<String>,
    #[serde(rename = "fileName")]
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChapterListResponse {
    data: Vec<ChapterData>,
    #[serde(default)]
    total: u32,
}

#[derive(Debug, Deserialize)]
struct ChapterData {
    id: String,
    attributes: ChapterAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChapterAttributes {
    chapter: Option<String>,
    title: Option<String>,
    volume: Option<String>,
    #[serde(default)]
    pages: u32,
    translated_language: Option<String>,
    publish_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtHomeResponse {
    #[serde(rename = "baseUrl")]
    base_url: String,
    chapter: AtHomeChapter,
}

#[derive(Debug, Deserialize)]
struct AtHomeChapter {
    hash: String,
    data: Vec<String>,
    #[serde(rename = "dataSaver")]
    data_saver: Vec<String>,
}

/// First non-empty value among the preferred languages, then any language.
fn pick(map: &BTreeMap<String, String>, prefs: &[&str]) -> Option<String> {
    prefs
        .iter()
        .filter_map(|lang| map.get(*lang))
        .chain(map.values())
        .find(|value| !value.is_empty())
        .cloned()
}

fn relationship<'a>(relationships: &'a [Relationship], kind: &str) -> Option<&'a RelationshipAttributes> {
    relationships
        .iter()
        .find(|rel| rel.rel_type == kind)
        .and_then(|rel| rel.attributes.as_ref())
}

fn parse_manga(m: MangaData, full_cover: bool) -> Manga {
    let rels = &m.relationships;
    let name_of = |kind: &str| {
        relationship(rels, kind)
            .and_then(|attrs| attrs.name.clone())
            .unwrap_or_default()
    };
    let author = name_of("author");
    let artist = name_of("artist");

    let cover_url = relationship(rels, "cover_art")
        .and_then(|attrs| attrs.file_name.as_deref())
        .filter(|file| !file.is_empty())
        .map(|file| {
            if full_cover {
                format!("{}/{}/{}", COVER_BASE_URL, m.id, file)
            } else {
                // 256px thumbnail for list views
                format!("{}/{}/{}.256.jpg", COVER_BASE_URL, m.id, file)
            }
        })
        .unwrap_or_default();

    let attrs = m.attributes;
    let description = match &attrs.description {
        Some(Localized::Map(map)) => pick(map, &DESCRIPTION_LANGS).unwrap_or_default(),
        Some(Localized::Empty(_)) | None => String::new(),
    };

    Manga {
        title: pick(&attrs.title, &TITLE_LANGS).unwrap_or_else(|| "Unknown".to_string()),
        alt_titles: attrs
            .alt_titles
            .iter()
            .filter_map(|alt| alt.values().next().cloned())
            .collect(),
        description,
        status: attrs.status.unwrap_or_default(),
        year: attrs.year,
        tags: attrs
            .tags
            .into_iter()
            .filter_map(|tag| tag.attributes.name.get("en").cloned())
            .filter(|name| !name.is_empty())
            .collect(),
        cover_url,
        author,
        artist,
        content_rating: attrs.content_rating.unwrap_or_default(),
        last_chapter: attrs.last_chapter.unwrap_or_default(),
        demographic: attrs.publication_demographic.unwrap_or_default(),
        id: m.id,
    }
}

fn parse_chapter(c: ChapterData) -> Chapter {
    let scanlation_group = relationship(&c.relationships, "scanlation_group")
        .and_then(|attrs| attrs.name.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    let attrs = c.attributes;

    Chapter {
        id: c.id,
        title: attrs.title.unwrap_or_default(),
        chapter: attrs
            .chapter
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "0".to_string()),
        volume: attrs.volume.unwrap_or_default(),
        pages: attrs.pages,
        language: attrs.translated_language.unwrap_or_default(),
        publish_at: attrs.publish_at.unwrap_or_default(),
        scanlation_group,
    }
}

/// Keeps the first upload of every chapter number.
fn dedupe_chapters(chapters: Vec<Chapter>) -> Vec<Chapter> {
    let mut seen = HashSet::new();
    chapters
        .into_iter()
        .filter(|ch| seen.insert(ch.chapter.clone()))
        .collect()
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, FetchError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub fn parse_manga_list(bytes: &[u8]) -> Result<MangaList, FetchError> {
    let response: MangaListResponse = decode(bytes)?;
    Ok(MangaList {
        mangas: response
            .data
            .into_iter()
            .map(|m| parse_manga(m, false))
            .collect(),
        total: response.total,
    })
}

pub fn parse_manga_detail(bytes: &[u8]) -> Result<Manga, FetchError> {
    let response: MangaEntityResponse = decode(bytes)?;
    Ok(parse_manga(response.data, true))
}

pub fn parse_chapter_list(bytes: &[u8]) -> Result<ChapterList, FetchError> {
    let response: ChapterListResponse = decode(bytes)?;
    let chapters = response.data.into_iter().map(parse_chapter).collect();
    Ok(ChapterList {
        chapters: dedupe_chapters(chapters),
        total: response.total,
    })
}

pub fn parse_page_data(bytes: &[u8]) -> Result<PageData, FetchError> {
    let response: AtHomeResponse = decode(bytes)?;
    Ok(PageData {
        base_url: response.base_url,
        hash: response.chapter.hash,
        data: response.chapter.data,
        data_saver: response.chapter.data_saver,
    })
}

fn language_filter(lang: Option<&str>) -> String {
    match lang {
        Some(lang) if lang != "all" => {
            format!("&availableTranslatedLanguage[]={}", urlencoding::encode(lang))
        }
        _ => String::new(),
    }
}

/// Client for the MangaDex REST API.
#[derive(Clone)]
pub struct MangaDex {
    client: reqwest::Client,
    base_url: String,
}

impl MangaDex {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_url.clone(),
        })
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn manga_list(&self, query: String) -> Result<MangaList, FetchError> {
        let url = format!("{}/manga?{}&{}&{}", self.base_url, query, INCLUDES, RATINGS);
        parse_manga_list(&self.get_bytes(&url).await?)
    }

    pub async fn search(
        &self,
        query: &str,
        offset: u32,
        limit: u32,
        lang: Option<&str>,
    ) -> Result<MangaList, FetchError> {
        let mut params = format!("limit={}&offset={}&order[relevance]=desc", limit, offset);
        if !query.trim().is_empty() {
            params.push_str(&format!("&title={}", urlencoding::encode(query)));
        }
        params.push_str(&language_filter(lang));
        self.manga_list(params).await
    }

    pub async fn popular(
        &self,
        offset: u32,
        limit: u32,
        lang: Option<&str>,
    ) -> Result<MangaList, FetchError> {
        let params = format!(
            "limit={}&offset={}&order[followedCount]=desc&hasAvailableChapters=true{}",
            limit,
            offset,
            language_filter(lang)
        );
        self.manga_list(params).await
    }

    pub async fn latest(
        &self,
        offset: u32,
        limit: u32,
        lang: Option<&str>,
    ) -> Result<MangaList, FetchError> {
        let params = format!(
            "limit={}&offset={}&order[latestUploadedChapter]=desc&hasAvailableChapters=true{}",
            limit,
            offset,
            language_filter(lang)
        );
        self.manga_list(params).await
    }

    pub async fn by_tag(&self, tag_id: &str, offset: u32, limit: u32) -> Result<MangaList, FetchError> {
        let params = format!(
            "limit={}&offset={}&includedTags[]={}&order[followedCount]=desc",
            limit,
            offset,
            urlencoding::encode(tag_id)
        );
        self.manga_list(params).await
    }

    pub async fn manga_detail(&self, manga_id: &str) -> Result<Manga, FetchError> {
        let url = format!(
            "{}/manga/{}?{}",
            self.base_url,
            urlencoding::encode(manga_id),
            INCLUDES
        );
        parse_manga_detail(&self.get_bytes(&url).await?)
    }

    pub async fn chapters(
        &self,
        manga_id: &str,
        languages: &[String],
        offset: u32,
        limit: u32,
    ) -> Result<ChapterList, FetchError> {
        let langs: String = languages
            .iter()
            .map(|lang| format!("&translatedLanguage[]={}", urlencoding::encode(lang)))
            .collect();
        let url = format!(
            "{}/manga/{}/feed?limit={}&offset={}{}&order[chapter]=asc&order[volume]=asc&includes[]=scanlation_group",
            self.base_url,
            urlencoding::encode(manga_id),
            limit,
            offset,
            langs
        );
        parse_chapter_list(&self.get_bytes(&url).await?)
    }

    pub async fn chapter_pages(&self, chapter_id: &str) -> Result<PageData, FetchError> {
        let url = format!(
            "{}/at-home/server/{}",
            self.base_url,
            urlencoding::encode(chapter_id)
        );
        parse_page_data(&self.get_bytes(&url).await?)
    }
}
