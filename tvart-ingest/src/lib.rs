//! tvart ingest library
//!
//! Turns manifests of artwork URLs into display-ready images and keeps a
//! television's art store in step with them.

pub mod color;
pub mod device;
pub mod error;
pub mod extractors;
pub mod models;
pub mod oracle;
pub mod services;
pub mod types;
pub mod utils;
pub mod workflow;

pub use crate::error::{PipelineError, PipelineResult};
