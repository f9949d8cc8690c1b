//! Art Institute of Chicago public API client
//!
//! Used twice per artwork: once to find the IIIF image behind an artwork
//! page, once to collect descriptive fields. Every request goes through the
//! shared [`RateLimiter`].
//!
//! # API Reference
//! - Artwork: `GET {base}/artworks/{id}`
//! - Artist:  `GET {base}/artists/{id}`
//! - Image:   `{config.iiif_url}/{data.image_id}/info.json`

use crate::models::metadata::scalar_to_string;
use crate::types::{ExtractionContext, MetadataError, MetadataExtractor, RawFields};
use crate::utils::RateLimiter;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{debug, warn};

pub const MUSEUM_API_BASE: &str = "https://api.artic.edu/api/v1";

#[derive(Debug, Error)]
pub enum MuseumError {
    #[error("No artwork id in URL {0}")]
    NoArtworkId(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Response is missing {0}")]
    MissingField(&'static str),
}

impl From<MuseumError> for MetadataError {
    fn from(e: MuseumError) -> Self {
        match e {
            MuseumError::Network(msg) => MetadataError::Network(msg),
            MuseumError::Api(status, msg) => MetadataError::Api(status, msg),
            other => MetadataError::Parse(other.to_string()),
        }
    }
}

/// API envelope: record fields plus service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub data: Map<String, Value>,
    #[serde(default)]
    pub config: Option<ApiConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub iiif_url: Option<String>,
}

impl ApiResponse {
    fn text(&self, key: &str) -> Option<String> {
        self.data.get(key).and_then(scalar_to_string)
    }
}

/// Where to fetch an artwork's image and what to call the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub info_url: String,
    pub file_name: String,
}

pub struct MuseumClient {
    http: reqwest::Client,
    api_base: String,
    throttle: Arc<RateLimiter>,
}

impl MuseumClient {
    pub fn new(http: reqwest::Client, throttle: Arc<RateLimiter>) -> Self {
        Self {
            http,
            api_base: MUSEUM_API_BASE.to_string(),
            throttle,
        }
    }

    /// Point the client at another API root (used by tests)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn throttle(&self) -> &Arc<RateLimiter> {
        &self.throttle
    }

    async fn get_json(&self, url: &str) -> Result<ApiResponse, MuseumError> {
        self.throttle
            .throttled(|| async {
                debug!(url = %url, "Querying museum API");

                let response = self
                    .http
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| MuseumError::Network(e.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    let error_text = response.text().await.unwrap_or_default();
                    return Err(MuseumError::Api(status.as_u16(), error_text));
                }

                response
                    .json::<ApiResponse>()
                    .await
                    .map_err(|e| MuseumError::Parse(e.to_string()))
            })
            .await
    }

    pub async fn artwork(&self, artwork_id: &str) -> Result<ApiResponse, MuseumError> {
        self.get_json(&format!("{}/artworks/{}", self.api_base, artwork_id))
            .await
    }

    pub async fn artist(&self, artist_id: &str) -> Result<ApiResponse, MuseumError> {
        self.get_json(&format!("{}/artists/{}", self.api_base, artist_id))
            .await
    }

    /// Resolve an artwork page URL to its IIIF image description
    pub async fn image_source(&self, page_url: &str) -> Result<ImageSource, MuseumError> {
        let id = artwork_id(page_url).ok_or_else(|| MuseumError::NoArtworkId(page_url.to_string()))?;
        let artwork = self.artwork(&id).await?;

        let image_id = artwork
            .text("image_id")
            .ok_or(MuseumError::MissingField("data.image_id"))?;
        let iiif_url = artwork
            .config
            .as_ref()
            .and_then(|c| c.iiif_url.clone())
            .ok_or(MuseumError::MissingField("config.iiif_url"))?;

        let artist = artwork.text("artist_title").unwrap_or_else(|| "Unknown".to_string());
        let title = artwork.text("title").unwrap_or_else(|| id.clone());

        Ok(ImageSource {
            info_url: format!("{}/{}/info.json", iiif_url.trim_end_matches('/'), image_id),
            file_name: image_file_name(&artist, &title),
        })
    }

    /// Raw descriptive fields for an artwork page.
    ///
    /// Artist-record fields come last so they override artwork fields once
    /// normalized onto the same key.
    pub async fn metadata_fields(&self, page_url: &str) -> Result<RawFields, MuseumError> {
        let id = artwork_id(page_url).ok_or_else(|| MuseumError::NoArtworkId(page_url.to_string()))?;
        let artwork = self.artwork(&id).await?;

        let mut fields: RawFields = artwork
            .data
            .iter()
            .filter_map(|(k, v)| scalar_to_string(v).map(|s| (k.clone(), clean_value(k, &s))))
            .collect();

        if let Some(display) = artwork.text("artist_display") {
            if let Some(details) = display.lines().nth(1) {
                fields.extend(parse_artist_details(details));
            }
        }

        let artist_id = artwork
            .data
            .get("artist_ids")
            .and_then(Value::as_array)
            .and_then(|ids| ids.first())
            .and_then(scalar_to_string);

        if let Some(artist_id) = artist_id {
            match self.artist(&artist_id).await {
                Ok(artist) => {
                    if let Some(name) = artist.text("title") {
                        fields.push(("artist".to_string(), name));
                    }
                    for key in ["birth_date", "death_date"] {
                        if let Some(v) = artist.text(key) {
                            fields.push((key.to_string(), v));
                        }
                    }
                }
                Err(e) => warn!(artist_id = %artist_id, error = %e, "Artist lookup failed"),
            }
        }

        Ok(fields)
    }
}

fn artwork_id_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").ok()).as_ref()
}

/// First run of digits in the URL path
pub fn artwork_id(page_url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(page_url).ok()?;
    artwork_id_regex()?
        .find(parsed.path())
        .map(|m| m.as_str().to_string())
}

/// `"<artist> - <title>.jpg"` restricted to alphanumerics and ` ._-`
pub fn image_file_name(artist: &str, title: &str) -> String {
    let raw = format!("{} - {}", artist, title);
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-'))
        .collect();
    format!("{}.jpg", cleaned.trim())
}

// Descriptions come back as HTML fragments
fn clean_value(key: &str, value: &str) -> String {
    if key == "description" || value.contains('<') {
        crate::extractors::gallery_page::clean_text(value)
    } else {
        value.to_string()
    }
}

fn details_regexes() -> Option<&'static [Regex; 3]> {
    static RE: OnceLock<Option<[Regex; 3]>> = OnceLock::new();
    RE.get_or_init(|| {
        Some([
            Regex::new(r"^\s*([A-Za-z][A-Za-z\s()/,-]*?)\s*(?:,\s*(?:b\.|born|d\.|died|active|c\.|\d)|$)").ok()?,
            Regex::new(r"(?:\b(?:b\.|born)\s*(\d{4}))|(?:(\d{4})\s*[-–]\s*\d{4})").ok()?,
            Regex::new(r"(?:\b(?:d\.|died)\s*(\d{4}))|(?:\d{4}\s*[-–]\s*(\d{4}))").ok()?,
        ])
    })
    .as_ref()
}

/// Nationality, birth year and death year from a line such as
/// `"Dutch, 1853–1890"` or `"French, born 1947"`.
pub fn parse_artist_details(line: &str) -> RawFields {
    let Some([nationality_re, born_re, died_re]) = details_regexes() else {
        return Vec::new();
    };
    let mut fields = Vec::new();

    if let Some(caps) = nationality_re.captures(line) {
        let nationality = caps[1].trim().trim_end_matches(',').trim();
        if !nationality.is_empty() {
            fields.push(("artist_nationality".to_string(), nationality.to_string()));
        }
    }

    if let Some(year) = born_re
        .captures(line)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
    {
        fields.push(("birth_year".to_string(), year.as_str().to_string()));
    }

    if let Some(year) = died_re
        .captures(line)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
    {
        fields.push(("death_year".to_string(), year.as_str().to_string()));
    }

    fields
}

/// Metadata extractor backed by the museum API
pub struct MuseumApiExtractor {
    client: Arc<MuseumClient>,
}

impl MuseumApiExtractor {
    pub fn new(client: Arc<MuseumClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MetadataExtractor for MuseumApiExtractor {
    fn name(&self) -> &'static str {
        "museum-api"
    }

    async fn extract(&self, ctx: &ExtractionContext) -> Result<RawFields, MetadataError> {
        Ok(self.client.metadata_fields(&ctx.url).await?)
    }
}
