//! Deep-zoom tile fetcher subprocess
//!
//! Tiled viewers (gallery pages, IIIF `info.json` endpoints) are assembled
//! into a single raster by an external tool. Tiles are cached on disk across
//! runs, so a failed attempt resumes from whatever tiles already arrived.
//!
//! Exit status contract of the tool:
//! - `0`: image fully assembled; its path is printed between single quotes
//! - `1`: some tiles failed, a partial image may still have been written
//! - anything else: failure

use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use thiserror::Error;
use tokio::process::Command;
use tvart_common::config::DeepZoomConfig;

const PARTIAL_EXIT_CODE: i32 = 1;

#[derive(Debug, Error)]
pub enum DeepZoomError {
    #[error("Failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Only {downloaded} of {total} tiles could be downloaded")]
    Partial { downloaded: u32, total: u32 },

    #[error("Tile fetcher exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("Tile fetcher reported success but no output file was found")]
    NoOutput,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One fetch: source URL, where to run, and optional naming/referer
#[derive(Debug, Clone)]
pub struct DeepZoomRequest<'a> {
    pub url: &'a str,
    pub dest_dir: &'a Path,
    pub output_name: Option<&'a str>,
    pub referer: Option<&'a str>,
}

pub struct DeepZoomFetcher {
    command: String,
    parallelism: u32,
    min_interval_ms: u64,
    max_dimension: u32,
    tile_cache: PathBuf,
    user_agent: String,
}

impl DeepZoomFetcher {
    pub fn new(config: &DeepZoomConfig, tile_cache: PathBuf, user_agent: String) -> Self {
        Self {
            command: config.command.clone(),
            parallelism: config.parallelism.max(1),
            min_interval_ms: config.min_interval_ms,
            max_dimension: config.max_dimension,
            tile_cache,
            user_agent,
        }
    }

    pub fn build_args(&self, request: &DeepZoomRequest<'_>) -> Vec<String> {
        let mut args = vec![
            "--max-width".to_string(),
            self.max_dimension.to_string(),
            "--max-height".to_string(),
            self.max_dimension.to_string(),
            "--compression".to_string(),
            "0".to_string(),
            "--parallelism".to_string(),
            self.parallelism.to_string(),
            "--min-interval".to_string(),
            format!("{}ms", self.min_interval_ms),
            "--tile-cache".to_string(),
            self.tile_cache.to_string_lossy().into_owned(),
            "--header".to_string(),
            format!("User-Agent: {}", self.user_agent),
        ];

        if let Some(referer) = request.referer {
            args.push("--header".to_string());
            args.push(format!("Referer: {}", referer));
        }

        args.push(request.url.to_string());
        if let Some(name) = request.output_name {
            args.push(name.to_string());
        }
        args
    }

    /// Run the tool and return the assembled image path.
    ///
    /// A partial result is deleted and reported as [`DeepZoomError::Partial`].
    pub async fn fetch(&self, request: DeepZoomRequest<'_>) -> Result<PathBuf, DeepZoomError> {
        let expected = request.output_name.map(|n| request.dest_dir.join(n));

        // The tool refuses to overwrite an existing output
        if let Some(path) = &expected {
            if path.exists() {
                tokio::fs::remove_file(path).await?;
            }
        }

        let args = self.build_args(&request);
        tracing::info!(url = %request.url, command = %self.command, "Fetching deep-zoom image");
        tracing::debug!(?args, "Tile fetcher arguments");

        let output = Command::new(&self.command)
            .args(&args)
            .current_dir(request.dest_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DeepZoomError::Spawn {
                command: self.command.clone(),
                source: e,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let written = expected
            .clone()
            .or_else(|| parse_saved_path(&stdout).map(|p| request.dest_dir.join(p)));

        match output.status.code() {
            Some(0) => match written {
                Some(path) if path.is_file() => Ok(path),
                _ => Err(DeepZoomError::NoOutput),
            },
            code => {
                if let Some(path) = &written {
                    if path.exists() {
                        tracing::warn!(path = %path.display(), "Deleting incomplete image");
                        if let Err(e) = tokio::fs::remove_file(path).await {
                            tracing::error!(path = %path.display(), error = %e, "Incomplete image not deleted");
                        }
                    }
                }

                if code == Some(PARTIAL_EXIT_CODE) {
                    let combined = format!("{}\n{}", stdout, stderr);
                    if let Some((downloaded, total)) = parse_partial_counts(&combined) {
                        return Err(DeepZoomError::Partial { downloaded, total });
                    }
                }

                Err(DeepZoomError::Failed {
                    code,
                    stderr: stderr.trim().to_string(),
                })
            }
        }
    }
}

fn saved_path_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"'([^']+)'").ok()).as_ref()
}

fn partial_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Only (\d+) tiles out of (\d+) could be downloaded").ok())
        .as_ref()
}

/// Output path reported by the tool (first single-quoted string)
pub fn parse_saved_path(stdout: &str) -> Option<String> {
    saved_path_regex()?
        .captures(stdout)
        .map(|c| c[1].to_string())
}

/// `(downloaded, total)` from the tool's partial-download message
pub fn parse_partial_counts(output: &str) -> Option<(u32, u32)> {
    let caps = partial_regex()?.captures(output)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}
