//! Gallery page scraping
//!
//! Gallery asset pages list their details as `<dt>`/`<dd>` pairs or as
//! `<li><span>Key:</span> value</li>` items.

use crate::types::{ExtractionContext, MetadataError, MetadataExtractor, RawFields};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

pub struct GalleryPageExtractor {
    http: reqwest::Client,
}

impl GalleryPageExtractor {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn fetch_html(&self, url: &str) -> Result<String, MetadataError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| MetadataError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Api(
                status.as_u16(),
                status.canonical_reason().unwrap_or_default().to_string(),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| MetadataError::Network(e.to_string()))
    }
}

#[async_trait]
impl MetadataExtractor for GalleryPageExtractor {
    fn name(&self) -> &'static str {
        "gallery-page"
    }

    async fn extract(&self, ctx: &ExtractionContext) -> Result<RawFields, MetadataError> {
        let html = self.fetch_html(&ctx.url).await?;
        let fields = parse_pairs(&html);
        debug!(url = %ctx.url, fields = fields.len(), "Scraped gallery page");
        Ok(fields)
    }
}

struct PageRegexes {
    definition: Regex,
    list_item: Regex,
    tag: Regex,
    space: Regex,
    numeric_entity: Regex,
}

fn regexes() -> Option<&'static PageRegexes> {
    static RE: OnceLock<Option<PageRegexes>> = OnceLock::new();
    RE.get_or_init(|| {
        Some(PageRegexes {
            definition: Regex::new(r"(?is)<dt[^>]*>(.*?)</dt>\s*<dd[^>]*>(.*?)</dd>").ok()?,
            list_item: Regex::new(r"(?is)<li[^>]*>\s*<span[^>]*>(.*?)</span>(.*?)</li>").ok()?,
            tag: Regex::new(r"(?s)<[^>]*>").ok()?,
            space: Regex::new(r"\s+").ok()?,
            numeric_entity: Regex::new(r"&#(x?)([0-9A-Fa-f]+);").ok()?,
        })
    })
    .as_ref()
}

/// Key/value pairs found in the page, in document order per pattern
pub fn parse_pairs(html: &str) -> RawFields {
    let Some(re) = regexes() else {
        return Vec::new();
    };

    let mut fields = Vec::new();
    for pattern in [&re.definition, &re.list_item] {
        for caps in pattern.captures_iter(html) {
            let key = clean_text(&caps[1]);
            let key = key.trim_end_matches(':').trim().to_string();
            let value = clean_text(&caps[2]);
            if !key.is_empty() && !value.is_empty() {
                fields.push((key, value));
            }
        }
    }
    fields
}

/// Strip tags, decode common entities and collapse whitespace
pub fn clean_text(fragment: &str) -> String {
    let Some(re) = regexes() else {
        return fragment.trim().to_string();
    };

    let stripped = re.tag.replace_all(fragment, " ");
    let decoded = re.numeric_entity.replace_all(&stripped, |caps: &regex::Captures| {
        let radix = if caps[1].is_empty() { 10 } else { 16 };
        u32::from_str_radix(&caps[2], radix)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    let decoded = decoded
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");

    re.space.replace_all(decoded.trim(), " ").into_owned()
}
