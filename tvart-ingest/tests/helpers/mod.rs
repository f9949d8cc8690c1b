//! Shared test utilities for tvart-ingest

pub mod fixtures;
pub mod http_server;
pub mod memory_store;

pub use fixtures::{gradient_image, png_bytes, png_with_text, solid_image, test_layout};
pub use http_server::{Route, TestServer};
pub use memory_store::{MemoryArtStore, UploadFault};
