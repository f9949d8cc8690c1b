//! Artwork processing workflow
//!
//! [`Pipeline`] brings each artwork of a set from URL to ready file;
//! synchronization with the device happens afterwards in
//! [`crate::services::Reconciler`].

pub mod pipeline;

pub use pipeline::{
    build_http_client, load_sets, ItemFailure, Pipeline, ProcessOptions, ProcessReport,
};
