//! Source-specific metadata extractors
//!
//! One extractor per source kind, each producing raw fields for the
//! metadata resolver to normalize:
//! - **gallery_page**: scraped key/value pairs from a gallery asset page
//! - **museum_api**: artwork and artist records from the museum API
//! - **file_tags**: PNG text chunks and XMP embedded in the raw file

pub mod file_tags;
pub mod gallery_page;
pub mod museum_api;

pub use file_tags::FileTagExtractor;
pub use gallery_page::GalleryPageExtractor;
pub use museum_api::{MuseumApiExtractor, MuseumClient, MuseumError};
