//! Persisted data model: artworks, sets and their manifest format

pub mod art_file;
pub mod art_set;
pub mod mat_color;
pub mod metadata;
pub mod resize_policy;

pub use art_file::{label_file_name, ready_file_name, ArtFile};
pub use art_set::{parse_url_list, ArtSet, ManifestError};
pub use mat_color::MatColor;
pub use metadata::Metadata;
pub use resize_policy::ResizePolicy;
