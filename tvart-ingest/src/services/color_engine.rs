//! Mat color decision
//!
//! 1. Ask the optional oracle, retrying malformed replies a bounded number
//!    of times.
//! 2. Otherwise cluster the pixels in Lab with k-means and take the most
//!    populated centroid as the dominant color.
//! 3. Damp the dominant color's luminance so the mat reads darker than the
//!    artwork.
//!
//! If everything fails, a neutral dark grey is used and reported as a
//! fallback.

use crate::color::Lab;
use crate::models::MatColor;
use crate::oracle::{ColorOracle, OracleError, OracleSuggestion};
use crate::utils::retry_transient;
use image::{DynamicImage, ImageFormat};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const CLUSTER_COUNT: usize = 5;
pub const MAX_ITERATIONS: usize = 200;
/// Stop once no centroid moves farther than this (Lab units)
pub const CONVERGENCE_EPSILON: f32 = 0.1;
pub const DAMPING_FACTOR: f32 = 0.66;
/// Longest side of the clustering working image
pub const WORKING_SIZE: u32 = 256;
/// Longest side of the oracle preview
pub const PREVIEW_SIZE: u32 = 1024;
pub const ORACLE_ATTEMPTS: u32 = 5;

const KMEANS_SEED: u64 = 0x7476_6172_7431;

#[derive(Debug, Error)]
pub enum ColorError {
    #[error("Image has no pixels")]
    EmptyImage,

    #[error("Preview encoding failed: {0}")]
    Preview(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSource {
    Oracle,
    Clustering,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorDecision {
    pub color: MatColor,
    pub reason: String,
    pub source: ColorSource,
}

impl ColorDecision {
    pub fn is_fallback(&self) -> bool {
        self.source == ColorSource::Fallback
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cluster {
    pub centroid: Lab,
    pub size: usize,
}

pub struct ColorEngine {
    oracle: Option<Arc<dyn ColorOracle>>,
    oracle_attempts: u32,
    damping: f32,
}

impl ColorEngine {
    pub fn new(oracle: Option<Arc<dyn ColorOracle>>) -> Self {
        Self {
            oracle,
            oracle_attempts: ORACLE_ATTEMPTS,
            damping: DAMPING_FACTOR,
        }
    }

    pub fn has_oracle(&self) -> bool {
        self.oracle.is_some()
    }

    /// Choose a mat color. Never fails; see [`ColorSource::Fallback`].
    pub async fn choose_mat_color(&self, image: &DynamicImage) -> ColorDecision {
        if let Some(oracle) = &self.oracle {
            match self.ask_oracle(oracle.as_ref(), image).await {
                Ok(suggestion) => {
                    debug!(color = %suggestion.color, "Oracle chose mat color");
                    return ColorDecision {
                        color: suggestion.color,
                        reason: suggestion.reason,
                        source: ColorSource::Oracle,
                    };
                }
                Err(e) => warn!(error = %e, "Color oracle unavailable, clustering instead"),
            }
        }

        match dominant_color(image) {
            Ok(cluster) => {
                let mat = mat_lab(cluster.centroid, self.damping);
                let color = MatColor::from_lab(mat);
                debug!(color = %color, "Clustering chose mat color");
                ColorDecision {
                    color,
                    reason: format!(
                        "Dominant color {} ({} px) darkened to {:.0}% luminance",
                        MatColor::from_lab(cluster.centroid),
                        cluster.size,
                        self.damping * 100.0
                    ),
                    source: ColorSource::Clustering,
                }
            }
            Err(e) => {
                warn!(error = %e, fallback = %MatColor::FALLBACK, "Color decision failed, using fallback");
                ColorDecision {
                    color: MatColor::FALLBACK,
                    reason: format!("Fallback: {}", e),
                    source: ColorSource::Fallback,
                }
            }
        }
    }

    async fn ask_oracle(
        &self,
        oracle: &dyn ColorOracle,
        image: &DynamicImage,
    ) -> Result<OracleSuggestion, OracleError> {
        let preview = preview_png(image).map_err(|e| OracleError::Malformed(e.to_string()))?;
        retry_transient(
            "color oracle",
            self.oracle_attempts,
            Duration::ZERO,
            OracleError::is_retryable,
            || oracle.suggest(&preview),
        )
        .await
    }
}

/// Luminance-damped mat color for a dominant color
pub fn mat_lab(dominant: Lab, damping: f32) -> Lab {
    dominant.darken(damping)
}

/// PNG of the image downscaled to at most [`PREVIEW_SIZE`] on its long side
pub fn preview_png(image: &DynamicImage) -> Result<Vec<u8>, ColorError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(ColorError::EmptyImage);
    }
    let preview = if image.width() > PREVIEW_SIZE || image.height() > PREVIEW_SIZE {
        image.thumbnail(PREVIEW_SIZE, PREVIEW_SIZE)
    } else {
        image.clone()
    };

    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(preview.to_rgb8()).write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// Most populated Lab cluster of the downscaled image
pub fn dominant_color(image: &DynamicImage) -> Result<Cluster, ColorError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(ColorError::EmptyImage);
    }
    let working = if image.width() > WORKING_SIZE || image.height() > WORKING_SIZE {
        image.thumbnail(WORKING_SIZE, WORKING_SIZE)
    } else {
        image.clone()
    };

    let points: Vec<Lab> = working
        .to_rgb8()
        .pixels()
        .map(|p| Lab::from_rgb(p.0))
        .collect();

    let clusters = kmeans(&points, CLUSTER_COUNT, MAX_ITERATIONS, CONVERGENCE_EPSILON, KMEANS_SEED)?;

    // Largest cluster, first one on ties
    clusters
        .into_iter()
        .fold(None, |best: Option<Cluster>, c| match best {
            Some(b) if b.size >= c.size => Some(b),
            _ => Some(c),
        })
        .ok_or(ColorError::EmptyImage)
}

/// k-means with k-means++ seeding.
///
/// Returns at most `k` clusters; fewer when the input has fewer distinct
/// points. Deterministic for a given `seed`.
pub fn kmeans(
    points: &[Lab],
    k: usize,
    max_iterations: usize,
    epsilon: f32,
    seed: u64,
) -> Result<Vec<Cluster>, ColorError> {
    if points.is_empty() || k == 0 {
        return Err(ColorError::EmptyImage);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = seed_centroids(points, k, &mut rng);
    let mut assignment = vec![0usize; points.len()];

    for _ in 0..max_iterations {
        for (slot, p) in assignment.iter_mut().zip(points) {
            *slot = nearest(&centroids, p);
        }

        let mut sums = vec![(0.0f64, 0.0f64, 0.0f64, 0usize); centroids.len()];
        for (&c, p) in assignment.iter().zip(points) {
            let s = &mut sums[c];
            s.0 += p.l as f64;
            s.1 += p.a as f64;
            s.2 += p.b as f64;
            s.3 += 1;
        }

        let mut max_shift = 0.0f32;
        for (centroid, (l, a, b, n)) in centroids.iter_mut().zip(sums) {
            if n == 0 {
                continue;
            }
            let n = n as f64;
            let updated = Lab::new((l / n) as f32, (a / n) as f32, (b / n) as f32);
            max_shift = max_shift.max(centroid.distance_sq(&updated).sqrt());
            *centroid = updated;
        }

        if max_shift < epsilon {
            break;
        }
    }

    let mut sizes = vec![0usize; centroids.len()];
    for p in points {
        sizes[nearest(&centroids, p)] += 1;
    }

    Ok(centroids
        .into_iter()
        .zip(sizes)
        .map(|(centroid, size)| Cluster { centroid, size })
        .collect())
}

fn nearest(centroids: &[Lab], p: &Lab) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = c.distance_sq(p);
        if d < best_distance {
            best_distance = d;
            best = i;
        }
    }
    best
}

fn seed_centroids(points: &[Lab], k: usize, rng: &mut StdRng) -> Vec<Lab> {
    let mut centroids = vec![points[rng.gen_range(0..points.len())]];
    let mut distances: Vec<f32> = points.iter().map(|p| p.distance_sq(&centroids[0])).collect();

    while centroids.len() < k {
        let total: f64 = distances.iter().map(|&d| d as f64).sum();
        if total <= 0.0 {
            break;
        }

        let mut target = rng.gen::<f64>() * total;
        let mut chosen = points.len() - 1;
        for (i, &d) in distances.iter().enumerate() {
            target -= d as f64;
            if target <= 0.0 && d > 0.0 {
                chosen = i;
                break;
            }
        }

        let next = points[chosen];
        centroids.push(next);
        for (d, p) in distances.iter_mut().zip(points) {
            *d = d.min(p.distance_sq(&next));
        }
    }
    centroids
}
