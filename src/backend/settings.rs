use log::warn;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::PathBuf;

use super::write_json;
use crate::error::PersistenceError;

const LANGUAGE_KEY: &str = "language";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Tr,
    #[default]
    Ru,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Tr => "tr",
            Language::Ru => "ru",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "en" => Some(Language::En),
            "tr" => Some(Language::Tr),
            "ru" => Some(Language::Ru),
            _ => None,
        }
    }
}

/// Small key/value store kept in `settings.json`.
#[derive(Debug, Clone)]
pub struct Settings {
    path: PathBuf,
}

impl Settings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_all(&self) -> Map<String, Value> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Map::new(),
            Err(e) => {
                warn!("could not read {}: {}", self.path.display(), e);
                return Map::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!("ignoring malformed settings in {}", self.path.display());
                Map::new()
            }
        }
    }

    /// `None` when the key is missing or its value has the wrong shape.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.read_all().await.remove(key)?;
        serde_json::from_value(value)
            .map_err(|e| warn!("ignoring malformed setting '{}': {}", key, e))
            .ok()
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), PersistenceError> {
        let mut all = self.read_all().await;
        all.insert(key.to_string(), serde_json::to_value(value)?);
        write_json(&self.path, &all).await
    }

    pub async fn language(&self) -> Language {
        self.get::<String>(LANGUAGE_KEY)
            .await
            .and_then(|code| Language::from_code(&code))
            .unwrap_or_default()
    }

    pub async fn set_language(&self, language: Language) -> Result<(), PersistenceError> {
        self.set(LANGUAGE_KEY, &language).await
    }
}
