//! Per-set processing
//!
//! Every artwork in a set walks the same stages, each skipped when its
//! output is already recorded and still valid:
//!
//! 1. Purge a zero-byte raw file left by an interrupted download
//! 2. Acquire the raw image
//! 3. Measure its dimensions
//! 4. Choose a mat color (`Scale` only)
//! 5. Render the ready file
//! 6. Resolve metadata
//! 7. Render a label, when a renderer is configured
//!
//! A failing artwork is logged and counted; the rest of the set continues.
//! The manifest is saved after every artwork.

use crate::error::PipelineError;
use crate::extractors::museum_api::MuseumClient;
use crate::models::art_file::{label_file_name, ready_file_name};
use crate::models::{ArtFile, ArtSet, ManifestError, ResizePolicy};
use crate::oracle::{ColorOracle, OpenAiColorOracle};
use crate::services::color_engine::ColorSource;
use crate::services::matte::{self, ComposeError};
use crate::services::{
    classify, Acquirer, ColorEngine, DeepZoomFetcher, LabelRenderer, MetadataResolver,
};
use crate::utils::RateLimiter;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tvart_common::config::{get_user_agent, TomlConfig};
use tvart_common::FolderLayout;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Force flags; each one redoes its stage even when the output is current
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    pub always_download: bool,
    pub always_generate: bool,
    pub always_mat: bool,
    pub always_metadata: bool,
    pub always_labels: bool,
}

/// One artwork that did not reach a ready file
#[derive(Debug, Clone)]
pub struct ItemFailure {
    pub url: String,
    pub cause: String,
}

#[derive(Debug, Default, Clone)]
pub struct ProcessReport {
    /// Artworks with a current ready file after this run
    pub processed: usize,
    pub failed: Vec<ItemFailure>,
    /// URLs whose mat fell back to the neutral default
    pub color_fallbacks: Vec<String>,
    pub cancelled: bool,
}

impl ProcessReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    pub fn absorb(&mut self, other: ProcessReport) {
        self.processed += other.processed;
        self.failed.extend(other.failed);
        self.color_fallbacks.extend(other.color_fallbacks);
        self.cancelled |= other.cancelled;
    }
}

/// Shared HTTP client for every outbound request
pub fn build_http_client() -> Result<reqwest::Client, PipelineError> {
    reqwest::Client::builder()
        .user_agent(get_user_agent())
        .timeout(HTTP_TIMEOUT)
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .build()
        .map_err(|e| PipelineError::HttpClient(e.to_string()))
}

pub struct Pipeline {
    layout: FolderLayout,
    display: (u32, u32),
    label_size: (u32, u32),
    acquirer: Acquirer,
    metadata: MetadataResolver,
    colors: ColorEngine,
    labels: Option<Arc<dyn LabelRenderer>>,
}

impl Pipeline {
    /// Wire every service from configuration.
    ///
    /// The museum API and the deep-zoom fetches it triggers share one
    /// rate limiter. The color oracle is enabled only when a key is set.
    pub fn from_config(config: &TomlConfig, layout: FolderLayout) -> Result<Self, PipelineError> {
        let http = build_http_client()?;
        let throttle = Arc::new(RateLimiter::from_millis(config.museum.min_interval_ms));
        let museum = Arc::new(MuseumClient::new(http.clone(), throttle));

        let deep_zoom =
            DeepZoomFetcher::new(&config.deep_zoom, layout.tile_cache.clone(), get_user_agent());

        let oracle: Option<Arc<dyn ColorOracle>> = match config.oracle_api_key() {
            Some(key) => {
                info!(model = %config.oracle.model, "Color oracle enabled");
                Some(Arc::new(OpenAiColorOracle::new(
                    http.clone(),
                    key,
                    config.oracle.model.clone(),
                )))
            }
            None => {
                info!("No oracle key configured, mat colors come from clustering");
                None
            }
        };

        Ok(Self {
            display: (config.display.width, config.display.height),
            label_size: (config.label.width, config.label.height),
            acquirer: Acquirer::new(http.clone(), deep_zoom, museum.clone()),
            metadata: MetadataResolver::new(http, museum),
            colors: ColorEngine::new(oracle),
            labels: None,
            layout,
        })
    }

    pub fn with_color_engine(mut self, colors: ColorEngine) -> Self {
        self.colors = colors;
        self
    }

    pub fn with_label_renderer(mut self, renderer: Arc<dyn LabelRenderer>) -> Self {
        self.labels = Some(renderer);
        self
    }

    pub fn layout(&self) -> &FolderLayout {
        &self.layout
    }

    /// Bring every artwork in `set` up to date.
    ///
    /// Only manifest persistence errors abort; artwork failures are
    /// collected in the report.
    pub async fn process_set(
        &self,
        set: &mut ArtSet,
        options: &ProcessOptions,
        cancel: &CancellationToken,
    ) -> Result<ProcessReport, ManifestError> {
        info!(set = %set.display_name(), artworks = set.len(), "Processing set");
        let mut report = ProcessReport::default();
        let default_policy = set.default_resize_policy;

        for index in 0..set.art.len() {
            if cancel.is_cancelled() {
                info!(set = %set.display_name(), "Processing cancelled");
                report.cancelled = true;
                break;
            }

            let art = &mut set.art[index];
            match self
                .process_item(art, default_policy, options, &mut report)
                .await
            {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    warn!(url = %art.url, error = %e, "Artwork failed");
                    report.failed.push(ItemFailure {
                        url: art.url.clone(),
                        cause: e.to_string(),
                    });
                }
            }

            set.save()?;
        }

        info!(
            set = %set.display_name(),
            processed = report.processed,
            failed = report.failed.len(),
            fallbacks = report.color_fallbacks.len(),
            "Set processed"
        );
        Ok(report)
    }

    async fn process_item(
        &self,
        art: &mut ArtFile,
        default_policy: ResizePolicy,
        options: &ProcessOptions,
        report: &mut ProcessReport,
    ) -> Result<(), PipelineError> {
        let kind = classify(&art.url)?;

        if let Some(raw) = art.raw_path(&self.layout) {
            match tvart_common::fs::file_len(&raw) {
                Some(0) => {
                    warn!(path = %raw.display(), "Purging zero-byte raw file");
                    if let Err(e) = std::fs::remove_file(&raw) {
                        debug!(path = %raw.display(), error = %e, "Purge failed");
                    }
                    art.clear_raw();
                }
                None => {
                    debug!(path = %raw.display(), "Recorded raw file is missing");
                    art.clear_raw();
                }
                Some(_) => {}
            }
        }

        if art.raw_file.is_none() || options.always_download {
            let path = self.acquirer.acquire(&art.url, &self.layout.raw).await?;
            let name = file_name(&path).ok_or_else(|| PipelineError::MissingRaw {
                url: art.url.clone(),
            })?;
            art.set_raw_file(name);
            if options.always_download {
                art.raw_width = None;
                art.raw_height = None;
            }
        }

        let raw_path = art
            .raw_path(&self.layout)
            .ok_or_else(|| PipelineError::MissingRaw {
                url: art.url.clone(),
            })?;
        let raw_name = art.raw_file.clone().unwrap_or_default();

        if art.raw_dimensions().is_none() {
            let (width, height) = matte::measure(&raw_path).map_err(|e| compose_error(art, e))?;
            debug!(url = %art.url, width, height, "Measured raw image");
            art.raw_width = Some(width);
            art.raw_height = Some(height);
        }

        let policy = art.effective_policy(default_policy);
        let mut decoded: Option<DynamicImage> = None;

        if policy.needs_mat() && (art.mat_color.is_none() || options.always_mat) {
            let image = matte::decode(&raw_path).map_err(|e| compose_error(art, e))?;
            let decision = self.colors.choose_mat_color(&image).await;
            if decision.source == ColorSource::Fallback {
                report.color_fallbacks.push(art.url.clone());
            }
            info!(url = %art.url, color = %decision.color, source = ?decision.source, "Mat color chosen");
            art.mat_color = Some(decision.color);
            art.mat_reason = Some(decision.reason);
            decoded = Some(image);
        }

        let mat = if policy.needs_mat() { art.mat_color } else { None };
        let ready_name = ready_file_name(&raw_name, policy, mat);
        let current = art.ready_file.as_deref() == Some(ready_name.as_str())
            && art.is_ready_current(&self.layout, policy);

        if options.always_generate || !current {
            let ready_path = self.layout.ready.join(&ready_name);
            let image = match decoded.take() {
                Some(image) => image,
                None => matte::decode(&raw_path).map_err(|e| compose_error(art, e))?,
            };
            matte::write_ready(&image, &raw_path, &ready_path, self.display, policy, mat)
                .map_err(|e| compose_error(art, e))?;
            info!(url = %art.url, ready = %ready_name, policy = %policy, "Ready file written");
            art.set_ready_file(ready_name);
        }

        if art.metadata.is_empty() || options.always_metadata {
            match self.metadata.resolve(&art.url, kind, Some(&raw_path)).await {
                Ok(fresh) => {
                    let added = art.metadata.merge_missing(fresh);
                    debug!(url = %art.url, added, "Metadata merged");
                }
                Err(e) => warn!(url = %art.url, error = %e, "Metadata unavailable"),
            }
        }

        if let Some(renderer) = &self.labels {
            self.refresh_label(renderer.as_ref(), art, options);
        }

        Ok(())
    }

    /// Label failures never fail the artwork
    fn refresh_label(&self, renderer: &dyn LabelRenderer, art: &mut ArtFile, options: &ProcessOptions) {
        if art.metadata.is_empty() {
            return;
        }
        let (width, height) = self.label_size;
        let name = label_file_name(&art.metadata, width, height);
        let path = self.layout.label.join(&name);
        if !options.always_labels && art.label_file.as_deref() == Some(name.as_str()) && path.is_file() {
            return;
        }

        let written = renderer
            .render(&art.metadata, width, height)
            .map_err(|e| e.to_string())
            .and_then(|raster| {
                let mut buf = Vec::new();
                raster
                    .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
                    .map_err(|e| e.to_string())?;
                tvart_common::fs::write_atomic(&path, &buf).map_err(|e| e.to_string())
            });

        match written {
            Ok(()) => {
                debug!(url = %art.url, label = %name, "Label written");
                art.label_file = Some(name);
            }
            Err(e) => warn!(url = %art.url, error = %e, "Label rendering failed"),
        }
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

fn compose_error(art: &ArtFile, source: ComposeError) -> PipelineError {
    PipelineError::Compose {
        url: art.url.clone(),
        source,
    }
}

/// Load every manifest, keeping the ones that parse.
///
/// Unreadable manifests are reported alongside so the caller can decide
/// whether the run still counts as successful.
pub fn load_sets(paths: &[PathBuf]) -> (Vec<ArtSet>, Vec<(PathBuf, ManifestError)>) {
    let mut sets = Vec::new();
    let mut errors = Vec::new();
    for path in paths {
        match ArtSet::load(path) {
            Ok(set) => {
                debug!(path = %path.display(), artworks = set.len(), "Loaded set");
                sets.push(set);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping set");
                errors.push((path.clone(), e));
            }
        }
    }
    (sets, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_absorb() {
        let mut total = ProcessReport {
            processed: 2,
            ..Default::default()
        };
        total.absorb(ProcessReport {
            processed: 1,
            failed: vec![ItemFailure {
                url: "https://example.com/a.jpg".to_string(),
                cause: "HTTP status 404".to_string(),
            }],
            color_fallbacks: vec!["https://example.com/b.jpg".to_string()],
            cancelled: false,
        });
        assert_eq!(total.processed, 3);
        assert_eq!(total.failed.len(), 1);
        assert_eq!(total.color_fallbacks.len(), 1);
        assert!(!total.is_complete());
    }

    #[test]
    fn test_load_sets_separates_failures() {
        let dir = tempfile::TempDir::new().unwrap();
        let good = dir.path().join("good.json");
        std::fs::write(&good, r#"{"art": [{"url": "https://example.com/a.jpg"}]}"#).unwrap();
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();

        let (sets, errors) = load_sets(&[good, bad.clone(), dir.path().join("missing.json")]);
        assert_eq!(sets.len(), 1);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].0, bad);
    }
}
