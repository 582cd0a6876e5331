//! Reference backend built on the `image` and `imageproc` crates.

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, GrayImage, ImageEncoder, ImageFormat, Luma};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::filter::{box_filter, gaussian_blur_f32, laplacian_filter};
use imageproc::gradients::{prewitt_gradients, sobel_gradients};
use imageproc::morphology;
use imageproc::region_labelling::{connected_components, Connectivity as LabelConnectivity};
use imageproc::template_matching::{match_template, MatchTemplateMethod};

use super::{
    BackendError, BinarizeMode, Detection, GeometricModel, ImagingBackend, MIN_MODEL_SIDE,
};
use crate::config::{BackendConfig, Connectivity};
use crate::params::{EdgeMethod, MorphMode, Polarity};
use crate::region::{RegionRect, RegionView};
use crate::LabelImage;

const FOREGROUND: Luma<u8> = Luma([255]);
const BACKGROUND: Luma<u8> = Luma([0]);

/// Largest chessboard radius `imageproc::morphology` applies exactly; its
/// distance transform saturates at 255.
const MAX_MORPH_STEP: u32 = 254;

/// [`ImagingBackend`] implemented with `imageproc` primitives.
#[derive(Debug, Clone, Default)]
pub struct ImageprocBackend {
    config: BackendConfig,
}

impl ImageprocBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn smooth(&self, image: &GrayImage, smoothness: f64) -> GrayImage {
        match self.config.smoothing_sigma(smoothness) {
            Some(sigma) => gaussian_blur_f32(image, sigma),
            None => image.clone(),
        }
    }
}

fn ensure_nonempty(image: &GrayImage) -> Result<(), BackendError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(BackendError::EmptyImage);
    }
    Ok(())
}

fn mask_where(image: &GrayImage, keep: impl Fn(u8) -> bool) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if keep(image.get_pixel(x, y)[0]) {
            FOREGROUND
        } else {
            BACKGROUND
        }
    })
}

fn adaptive_mask(image: &GrayImage, window: u32, offset: i32, polarity: Polarity) -> GrayImage {
    // a radius past the longer side already averages the whole image
    let radius = (window / 2).min(image.width().max(image.height()));
    let mean = box_filter(image, radius, radius);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y)[0] as i32;
        let m = mean.get_pixel(x, y)[0] as i32;
        let hit = match polarity {
            Polarity::Bright => p > m + offset,
            Polarity::Dark => p < m - offset,
        };
        if hit {
            FOREGROUND
        } else {
            BACKGROUND
        }
    })
}

/// Apply a unit-radius operation `passes` times at chessboard distance.
///
/// L-infinity erosion and dilation compose additively, so the passes run in
/// steps of at most [`MAX_MORPH_STEP`]. Passes beyond the longer image side
/// change nothing and are skipped.
fn repeated(
    image: &GrayImage,
    passes: u32,
    op: fn(&GrayImage, Norm, u8) -> GrayImage,
) -> GrayImage {
    let mut remaining = passes.min(image.width().max(image.height()));
    let mut out = image.clone();
    while remaining > 0 {
        let step = remaining.min(MAX_MORPH_STEP);
        out = op(&out, Norm::LInf, step as u8);
        remaining -= step;
    }
    out
}

/// Greedy non-maximum suppression: strongest first, drop anything whose
/// template footprint overlaps an accepted hit.
fn suppress_overlaps(
    mut candidates: Vec<(u32, u32, f32)>,
    width: u32,
    height: u32,
) -> Vec<(u32, u32, f32)> {
    candidates.sort_by(|a, b| b.2.total_cmp(&a.2));
    let mut accepted: Vec<(u32, u32, f32)> = Vec::new();
    for candidate in candidates {
        let overlaps = accepted.iter().any(|a| {
            a.0.abs_diff(candidate.0) < width && a.1.abs_diff(candidate.1) < height
        });
        if !overlaps {
            accepted.push(candidate);
        }
    }
    accepted
}

impl ImagingBackend for ImageprocBackend {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, BackendError> {
        let image = image::load_from_memory(bytes)?;
        log::debug!(
            "decoded {}x{} image ({:?})",
            image.width(),
            image.height(),
            image.color()
        );
        Ok(image)
    }

    fn binarize(&self, image: &GrayImage, mode: BinarizeMode) -> Result<GrayImage, BackendError> {
        ensure_nonempty(image)?;
        log::debug!("binarize {:?}", mode);
        let mask = match mode {
            BinarizeMode::InRange { lo, hi } => mask_where(image, |p| p >= lo && p <= hi),
            BinarizeMode::Greater(level) => mask_where(image, |p| p > level),
            BinarizeMode::Bimodal => {
                let level = otsu_level(image);
                log::debug!("bimodal level {}", level);
                mask_where(image, |p| p > level)
            }
            BinarizeMode::Adaptive {
                window,
                offset,
                polarity,
            } => adaptive_mask(image, window, offset, polarity),
        };
        Ok(mask)
    }

    fn morph(
        &self,
        image: &GrayImage,
        mode: MorphMode,
        iterations: u32,
    ) -> Result<GrayImage, BackendError> {
        ensure_nonempty(image)?;
        // n passes of a 3x3 square equal one pass at chessboard distance n
        log::debug!("morph {:?} x{}", mode, iterations);
        let (erode, dilate) = (morphology::erode, morphology::dilate);
        let out = match mode {
            MorphMode::Erode => repeated(image, iterations, erode),
            MorphMode::Dilate => repeated(image, iterations, dilate),
            MorphMode::Open => repeated(&repeated(image, iterations, erode), iterations, dilate),
            MorphMode::Close => repeated(&repeated(image, iterations, dilate), iterations, erode),
        };
        Ok(out)
    }

    fn edge_filter(
        &self,
        image: &GrayImage,
        method: EdgeMethod,
    ) -> Result<GrayImage, BackendError> {
        ensure_nonempty(image)?;
        log::debug!("edge filter {:?}", method);
        let (w, h) = image.dimensions();
        let out = match method {
            EdgeMethod::Sobel | EdgeMethod::Prewitt => {
                let gradients = if method == EdgeMethod::Sobel {
                    sobel_gradients(image)
                } else {
                    prewitt_gradients(image)
                };
                GrayImage::from_fn(w, h, |x, y| {
                    Luma([gradients.get_pixel(x, y)[0].min(255) as u8])
                })
            }
            EdgeMethod::Laplacian => {
                let response = laplacian_filter(image);
                GrayImage::from_fn(w, h, |x, y| {
                    Luma([response.get_pixel(x, y)[0].unsigned_abs().min(255) as u8])
                })
            }
        };
        Ok(out)
    }

    fn label(&self, mask: &GrayImage) -> Result<LabelImage, BackendError> {
        ensure_nonempty(mask)?;
        let connectivity = match self.config.connectivity {
            Connectivity::Four => LabelConnectivity::Four,
            Connectivity::Eight => LabelConnectivity::Eight,
        };
        Ok(connected_components(mask, connectivity, BACKGROUND))
    }

    fn define_model(
        &self,
        image: &GrayImage,
        smoothness: f64,
    ) -> Result<GeometricModel, BackendError> {
        ensure_nonempty(image)?;
        let (width, height) = image.dimensions();
        if width < MIN_MODEL_SIDE || height < MIN_MODEL_SIDE {
            return Err(BackendError::ModelTooSmall { width, height });
        }
        log::debug!(
            "define model {}x{} smoothness {}",
            width,
            height,
            smoothness
        );
        Ok(GeometricModel {
            template: self.smooth(image, smoothness),
            smoothness,
        })
    }

    fn geometric_search(
        &self,
        model: &GeometricModel,
        image: &GrayImage,
        min_score: f64,
    ) -> Result<Vec<Detection>, BackendError> {
        ensure_nonempty(image)?;
        let (tw, th) = model.template.dimensions();
        if tw > image.width() || th > image.height() {
            log::debug!("model larger than image, nothing to search");
            return Ok(Vec::new());
        }

        let target = self.smooth(image, model.smoothness);
        let scores = match_template(
            &target,
            &model.template,
            MatchTemplateMethod::CrossCorrelationNormalized,
        );

        let candidates: Vec<(u32, u32, f32)> = scores
            .enumerate_pixels()
            .filter_map(|(x, y, s)| {
                let score = s[0];
                (score.is_finite() && score as f64 * 100.0 >= min_score).then_some((x, y, score))
            })
            .collect();
        log::debug!("{} positions at or above {}%", candidates.len(), min_score);

        let detections = suppress_overlaps(candidates, tw, th)
            .into_iter()
            .map(|(x, y, score)| Detection {
                x: x as f64 + tw as f64 / 2.0,
                y: y as f64 + th as f64 / 2.0,
                score: (score as f64 * 100.0).min(100.0),
            })
            .collect();
        Ok(detections)
    }

    fn export_region(
        &self,
        image: &GrayImage,
        rect: RegionRect,
        path: &Path,
    ) -> Result<(), BackendError> {
        let format = ImageFormat::from_path(path)?;
        let bytes = self.encode_region(image, rect, format)?;
        std::fs::write(path, bytes).map_err(|source| BackendError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("exported region {:?} to {:?}", rect, path);
        Ok(())
    }

    fn encode_region(
        &self,
        image: &GrayImage,
        rect: RegionRect,
        format: ImageFormat,
    ) -> Result<Vec<u8>, BackendError> {
        let view = RegionView::new(image, rect).ok_or(BackendError::RegionOutOfBounds {
            rect,
            width: image.width(),
            height: image.height(),
        })?;
        let region = view.materialize();
        let (width, height) = region.dimensions();

        let mut buffer = Cursor::new(Vec::new());
        if format == ImageFormat::Jpeg {
            let quality = self.config.jpeg_quality.clamp(1, 100);
            JpegEncoder::new_with_quality(&mut buffer, quality).write_image(
                region.as_raw(),
                width,
                height,
                ExtendedColorType::L8,
            )?;
        } else {
            DynamicImage::ImageLuma8(region).write_to(&mut buffer, format)?;
        }
        Ok(buffer.into_inner())
    }
}
