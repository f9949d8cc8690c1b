//! # tvart Common Library
//!
//! Shared code for the tvart crates:
//! - Error type
//! - Bootstrap configuration (TOML) and root folder resolution
//! - Folder layout under the root folder
//! - Atomic file writes

pub mod config;
pub mod error;
pub mod fs;

pub use config::{ConfigSource, FolderLayout, TomlConfig};
pub use error::{Error, Result};
