//! Imaging primitives the pipeline delegates to.
//!
//! The pipeline never touches pixels for binarization, morphology, edge
//! filtering, labelling or pattern search itself. It calls an
//! [`ImagingBackend`], passed explicitly to each operation, so tests can
//! substitute a fake and hosts can plug in a different engine.
//!
//! # Conventions
//!
//! - Masks are `GrayImage`s with foreground `255` and background `0`
//! - Label images use `0` for background and positive ids for components
//! - Regions are validated by the backend; out of bounds is an error here,
//!   the pipeline filters invalid regions before calling

mod imageproc_backend;

use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, ImageFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::display::{DisplayBuffer, ProcessedImage};
use crate::params::{EdgeMethod, MorphMode, Polarity};
use crate::region::RegionRect;
use crate::LabelImage;

pub use imageproc_backend::ImageprocBackend;

/// Smallest side, in pixels, a model template may have.
pub const MIN_MODEL_SIDE: u32 = 3;

/// Errors raised by backend primitives.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Reading or writing a file failed.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The codec could not decode or encode the image.
    #[error("Image codec error: {0}")]
    Codec(#[from] image::ImageError),

    /// A region does not fit inside the image it refers to.
    #[error("Region {rect:?} lies outside the {width}x{height} image")]
    RegionOutOfBounds {
        rect: RegionRect,
        width: u32,
        height: u32,
    },

    /// The model image is too small to define a model from.
    #[error("Model image {width}x{height} is too small (minimum {min}x{min})", min = MIN_MODEL_SIDE)]
    ModelTooSmall { width: u32, height: u32 },

    /// The input image has no pixels.
    #[error("Image has no pixels")]
    EmptyImage,
}

/// How to turn a grayscale image into a binary mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinarizeMode {
    /// Foreground where `lo <= p <= hi`
    InRange { lo: u8, hi: u8 },
    /// Foreground where `p > level`
    Greater(u8),
    /// Automatic global level for bimodal histograms
    Bimodal,
    /// Compare each pixel with the mean of its `window x window` neighbourhood.
    /// Bright: `p > mean + offset`. Dark: `p < mean - offset`.
    Adaptive {
        window: u32,
        offset: i32,
        polarity: Polarity,
    },
}

/// A trained pattern ready for searching.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometricModel {
    /// Smoothed template pixels
    pub template: GrayImage,
    /// Smoothness the template was prepared with; searches smooth alike
    pub smoothness: f64,
}

impl GeometricModel {
    pub fn width(&self) -> u32 {
        self.template.width()
    }

    pub fn height(&self) -> u32 {
        self.template.height()
    }
}

/// One search hit, positioned at the center of the matched area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x: f64,
    pub y: f64,
    /// Match score in percent (0 to 100)
    pub score: f64,
}

/// Narrow interface over an imaging engine.
///
/// Implementations must not retain the images they are given; every call is
/// a pure function of its arguments and the backend's configuration.
pub trait ImagingBackend {
    /// Decode an encoded image (PNG, JPEG, BMP, ...).
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, BackendError>;

    /// Read and decode an image file.
    fn load_image(&self, path: &Path) -> Result<DynamicImage, BackendError> {
        let bytes = std::fs::read(path).map_err(|source| BackendError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.decode(&bytes)
    }

    /// Collapse any channel layout to one 8-bit luminance band.
    fn to_grayscale(&self, image: &DynamicImage) -> GrayImage {
        image.to_luma8()
    }

    fn binarize(&self, image: &GrayImage, mode: BinarizeMode) -> Result<GrayImage, BackendError>;

    /// Apply a morphological operation with a 3x3 structuring element,
    /// `iterations` times.
    fn morph(
        &self,
        image: &GrayImage,
        mode: MorphMode,
        iterations: u32,
    ) -> Result<GrayImage, BackendError>;

    /// Gradient magnitude (or Laplacian response) scaled to 8 bits.
    fn edge_filter(&self, image: &GrayImage, method: EdgeMethod)
        -> Result<GrayImage, BackendError>;

    /// Label the connected foreground components of a mask.
    fn label(&self, mask: &GrayImage) -> Result<LabelImage, BackendError>;

    fn define_model(&self, image: &GrayImage, smoothness: f64)
        -> Result<GeometricModel, BackendError>;

    /// Find occurrences of `model` in `image` scoring at least `min_score`
    /// percent.
    fn geometric_search(
        &self,
        model: &GeometricModel,
        image: &GrayImage,
        min_score: f64,
    ) -> Result<Vec<Detection>, BackendError>;

    /// Write a sub-region of `image` to `path`, format chosen by extension.
    fn export_region(
        &self,
        image: &GrayImage,
        rect: RegionRect,
        path: &Path,
    ) -> Result<(), BackendError>;

    /// Encode a sub-region of `image` in memory.
    fn encode_region(
        &self,
        image: &GrayImage,
        rect: RegionRect,
        format: ImageFormat,
    ) -> Result<Vec<u8>, BackendError>;

    /// Convert to a 4-byte aligned display buffer.
    fn to_display_buffer(&self, image: &ProcessedImage) -> DisplayBuffer {
        image.to_display_buffer()
    }
}
