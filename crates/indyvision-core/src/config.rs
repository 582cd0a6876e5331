//! Tunable constants for the pipeline, viewport and reference backend.
//!
//! Every struct deserializes from a partial document: missing keys fall back
//! to the defaults below, so a presentation layer only sends what it changes.

use serde::{Deserialize, Serialize};

/// Overlay geometry and model definition settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pixels added on every side of a blob bounding box
    pub box_padding: u32,
    /// Radius of the filled dot drawn at a blob centroid
    pub centroid_radius: i32,
    /// Half length of the crosshair arms drawn at a match
    pub marker_half_length: i32,
    /// Border trimmed from a model image before definition
    pub model_inset: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            box_padding: 5,
            centroid_radius: 3,
            marker_half_length: 20,
            model_inset: 1,
        }
    }
}

/// Zoom and fit behaviour of the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Scale factor of one wheel notch
    pub zoom_step: f64,
    /// Fraction of the viewport the fitted image may occupy
    pub fit_margin: f64,
    /// Upper bound on the fitted scale before the margin is applied
    pub max_fit_scale: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            zoom_step: 1.2,
            fit_margin: 0.95,
            max_fit_scale: 1.0,
        }
    }
}

impl ViewportConfig {
    /// `max_fit_scale` limited to `(0, 1]`; anything else means 1.0.
    pub fn fit_scale_cap(&self) -> f64 {
        if self.max_fit_scale > 0.0 {
            self.max_fit_scale.min(1.0)
        } else {
            1.0
        }
    }

    /// `fit_margin` limited to `(0, 1]`; anything else means 1.0.
    pub fn fit_margin_factor(&self) -> f64 {
        if self.fit_margin > 0.0 {
            self.fit_margin.min(1.0)
        } else {
            1.0
        }
    }
}

/// Pixel neighbourhood used when labelling connected components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Four,
    #[default]
    Eight,
}

/// Settings of the reference imaging backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub connectivity: Connectivity,
    /// Gaussian sigma applied to a model is `smoothness / smoothing_divisor`
    pub smoothing_divisor: f32,
    /// Quality (1-100) for JPEG exports
    pub jpeg_quality: u8,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::Eight,
            smoothing_divisor: 25.0,
            jpeg_quality: 90,
        }
    }
}

impl BackendConfig {
    /// Largest Gaussian sigma a model is smoothed with.
    pub const MAX_SMOOTHING_SIGMA: f32 = 32.0;

    /// Gaussian sigma for a model smoothness value, or `None` for no blur.
    ///
    /// Smoothness is a percentage and is clamped to `0..=100` first.
    pub fn smoothing_sigma(&self, smoothness: f64) -> Option<f32> {
        if self.smoothing_divisor <= 0.0 || smoothness.is_nan() {
            return None;
        }
        let sigma = smoothness.clamp(0.0, 100.0) as f32 / self.smoothing_divisor;
        (sigma.is_finite() && sigma > 0.0).then_some(sigma.min(Self::MAX_SMOOTHING_SIGMA))
    }
}
