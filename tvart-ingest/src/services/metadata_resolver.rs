//! Metadata resolution and key normalization
//!
//! Extraction is per source kind; normalization maps the many field names
//! sources use onto one canonical key each. Fields with no canonical key
//! are dropped.

use crate::extractors::{FileTagExtractor, GalleryPageExtractor, MuseumApiExtractor, MuseumClient};
use crate::models::Metadata;
use crate::services::source_resolver::SourceKind;
use crate::types::{ExtractionContext, MetadataError, MetadataExtractor};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Canonical key and the raw names (lowercase) that map onto it
pub const SYNONYMS: &[(&str, &[&str])] = &[
    (
        "artist",
        &[
            "creator",
            "artist",
            "created by",
            "by",
            "artist_title",
            "author",
            "dc:creator",
        ],
    ),
    ("date_created", &["date created", "date", "date_display"]),
    ("title", &["title", "name", "dc:title"]),
    ("medium", &["medium", "media", "medium_display"]),
    (
        "artist_nationality",
        &["creator nationality", "artist_nationality", "creator_nationality"],
    ),
    ("dimensions", &["dimensions", "size", "physical dimensions"]),
    (
        "creator_lived",
        &["creator_lived", "creator lifespan", "artist_lifespan"],
    ),
    ("creator_born", &["creator_born", "birth_year", "birth_date"]),
    ("creator_died", &["creator_died", "death_year", "death_date"]),
    (
        "rights",
        &["rights", "usage rights", "dc:rights", "copyright"],
    ),
    ("description", &["description", "caption", "dc:description"]),
    ("artist_details", &["artist details", "artist_display"]),
];

/// Canonical key for a raw field name, case-insensitive
pub fn canonical_key(raw: &str) -> Option<&'static str> {
    let lowered = raw.trim().to_lowercase();
    SYNONYMS
        .iter()
        .find(|(_, names)| names.contains(&lowered.as_str()))
        .map(|(canonical, _)| *canonical)
}

/// Normalize raw fields. Later fields win over earlier ones for the same key.
pub fn normalize<I, K, V>(fields: I) -> Metadata
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let mut metadata = Metadata::new();
    for (key, value) in fields {
        if let Some(canonical) = canonical_key(key.as_ref()) {
            metadata.insert(canonical, value);
        }
    }
    metadata
}

pub struct MetadataResolver {
    gallery: Arc<dyn MetadataExtractor>,
    museum: Arc<dyn MetadataExtractor>,
    file_tags: Arc<dyn MetadataExtractor>,
}

impl MetadataResolver {
    pub fn new(http: reqwest::Client, museum: Arc<MuseumClient>) -> Self {
        Self {
            gallery: Arc::new(GalleryPageExtractor::new(http)),
            museum: Arc::new(MuseumApiExtractor::new(museum)),
            file_tags: Arc::new(FileTagExtractor),
        }
    }

    fn extractor_for(&self, kind: SourceKind) -> &Arc<dyn MetadataExtractor> {
        match kind {
            SourceKind::DeepZoomGallery => &self.gallery,
            SourceKind::MuseumApi => &self.museum,
            SourceKind::DirectHttp => &self.file_tags,
        }
    }

    /// Extract and normalize metadata for one source
    pub async fn resolve(
        &self,
        url: &str,
        source_kind: SourceKind,
        raw_path: Option<&Path>,
    ) -> Result<Metadata, MetadataError> {
        let extractor = self.extractor_for(source_kind);
        let ctx = ExtractionContext {
            url: url.to_string(),
            source_kind,
            raw_path: raw_path.map(Path::to_path_buf),
        };

        let fields = extractor.extract(&ctx).await?;
        let metadata = normalize(fields);
        debug!(
            url = %url,
            extractor = extractor.name(),
            keys = metadata.len(),
            "Resolved metadata"
        );
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_key_case_insensitive() {
        assert_eq!(canonical_key("Creator"), Some("artist"));
        assert_eq!(canonical_key("CREATED BY"), Some("artist"));
        assert_eq!(canonical_key("artist_title"), Some("artist"));
        assert_eq!(canonical_key("Date Created"), Some("date_created"));
        assert_eq!(canonical_key("dc:rights"), Some("rights"));
        assert_eq!(canonical_key("Physical Dimensions"), Some("dimensions"));
        assert_eq!(canonical_key("image_id"), None);
    }

    #[test]
    fn test_normalize_drops_unmapped_and_later_wins() {
        let m = normalize(vec![
            ("title", "Water Lilies"),
            ("image_id", "abc"),
            ("artist_title", "Monet"),
            ("artist", "Claude Monet"),
        ]);
        assert_eq!(m.get("title"), Some("Water Lilies"));
        assert_eq!(m.get("artist"), Some("Claude Monet"));
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn test_synonym_names_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for (_, names) in SYNONYMS {
            for name in *names {
                assert!(seen.insert(*name), "{name} maps to two keys");
                assert_eq!(*name, name.to_lowercase());
            }
        }
    }
}
