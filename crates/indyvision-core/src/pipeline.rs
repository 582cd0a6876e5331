//! Operation dispatch over a pristine source image.
//!
//! The pipeline owns two images: the `source` loaded by the user and the
//! `working` copy operations write into. Every apply starts by resetting
//! `working` from `source`, so applying the same operation twice gives the
//! same result and operations never compound. A failed apply changes
//! nothing.
//!
//! ```text
//! load -> source ──reset──> working ──backend primitives──> processed
//!                                         │
//!                                         └─ (blob) analyzer / (match) search
//! ```
//!
//! Pixel work is delegated to an [`ImagingBackend`] passed to each call.

use std::borrow::Cow;
use std::path::Path;

use image::{DynamicImage, GrayImage, ImageFormat};
use thiserror::Error;

use crate::backend::{BackendError, BinarizeMode, Detection, GeometricModel, ImagingBackend};
use crate::blob::{analyze_label_image, Blob, BlobAnalysis, BlobOverlay};
use crate::config::PipelineConfig;
use crate::display::{DisplayBuffer, ProcessedImage};
use crate::overlay::{draw_blobs, draw_detections};
use crate::params::{BlobParams, EdgeParams, GeometricMatchParams, Operation, ParameterSet};
use crate::region::{RegionRect, RegionView};

/// Status returned by operations without a result summary.
pub const STATUS_COMPLETE: &str = "Processing complete";
/// Status of a match request while a model is still being defined.
pub const STATUS_DEFINING_MODEL: &str =
    "Model definition in progress; train the model to start searching";
/// Status of a match request before any model was trained.
pub const STATUS_NO_MODEL: &str = "No model defined";
/// Status of a search that found nothing.
pub const STATUS_NO_MATCHES: &str = "No matches found";

/// Errors returned by pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An operation needs a source image and none is loaded.
    #[error("No image loaded")]
    NoImageLoaded,

    /// A backend primitive failed. The source image is unaffected.
    #[error("{operation} failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: BackendError,
    },
}

fn failed(operation: &'static str) -> impl FnOnce(BackendError) -> PipelineError {
    move |source| {
        log::warn!("{} failed: {}", operation, source);
        PipelineError::Backend { operation, source }
    }
}

#[derive(Debug, Clone, Default)]
enum ModelState {
    #[default]
    Empty,
    /// A model image is loaded; the model is being tuned.
    Defining {
        image: GrayImage,
        preview: Option<GeometricModel>,
    },
    Trained(GeometricModel),
}

/// What one dispatch produced, committed to the pipeline on success.
struct Outcome {
    working: GrayImage,
    display: ProcessedImage,
    status: String,
    blobs: Option<BlobAnalysis>,
    overlays: Vec<BlobOverlay>,
    detections: Vec<Detection>,
}

impl Outcome {
    fn plain(working: GrayImage) -> Self {
        Self::with_status(working, STATUS_COMPLETE.to_string())
    }

    fn with_status(working: GrayImage, status: String) -> Self {
        Self {
            display: ProcessedImage::Gray(working.clone()),
            working,
            status,
            blobs: None,
            overlays: Vec::new(),
            detections: Vec::new(),
        }
    }
}

/// The inspection pipeline.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
    source: Option<GrayImage>,
    working: Option<GrayImage>,
    processed: Option<ProcessedImage>,
    show_original: bool,
    blobs: Option<BlobAnalysis>,
    overlays: Vec<BlobOverlay>,
    detections: Vec<Detection>,
    model: ModelState,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn has_image(&self) -> bool {
        self.source.is_some()
    }

    /// Source dimensions, if an image is loaded.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.source.as_ref().map(|s| s.dimensions())
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Replace the source with an already decoded image.
    ///
    /// Any channel layout is accepted and collapsed to grayscale. Results of
    /// earlier applies are discarded; a trained model is kept.
    pub fn load_raw<B: ImagingBackend + ?Sized>(
        &mut self,
        backend: &B,
        image: &DynamicImage,
    ) -> (u32, u32) {
        let gray = backend.to_grayscale(image);
        let dims = gray.dimensions();
        log::info!(
            "loaded {}x{} source ({:?} converted to gray)",
            dims.0,
            dims.1,
            image.color()
        );

        self.processed = Some(ProcessedImage::Gray(gray.clone()));
        self.working = Some(gray.clone());
        self.source = Some(gray);
        self.clear_results();
        dims
    }

    /// Decode `bytes` and make them the source.
    pub fn load_bytes<B: ImagingBackend + ?Sized>(
        &mut self,
        backend: &B,
        bytes: &[u8],
    ) -> Result<(u32, u32), PipelineError> {
        let image = backend.decode(bytes).map_err(failed("load"))?;
        Ok(self.load_raw(backend, &image))
    }

    /// Read the image at `path` and make it the source.
    pub fn load_path<B: ImagingBackend + ?Sized>(
        &mut self,
        backend: &B,
        path: &Path,
    ) -> Result<(u32, u32), PipelineError> {
        let image = backend.load_image(path).map_err(failed("load"))?;
        Ok(self.load_raw(backend, &image))
    }

    // ------------------------------------------------------------------
    // Apply
    // ------------------------------------------------------------------

    /// Run the operation called `name` with `params`.
    ///
    /// Every apply starts from a fresh copy of `source`. When `name` is
    /// unknown, `params` is missing, or `params` belongs to another operation,
    /// nothing else runs and that copy becomes the result. A failed run leaves
    /// the previous result untouched.
    pub fn apply<B: ImagingBackend + ?Sized>(
        &mut self,
        backend: &B,
        name: &str,
        params: Option<&ParameterSet>,
    ) -> Result<String, PipelineError> {
        match (Operation::from_name(name), params) {
            (Some(op), Some(params)) if params.operation() == op => {
                self.apply_params(backend, params)
            }
            _ => {
                log::debug!("no operation for {:?}, resetting only", name);
                let working = self.source_copy()?;
                self.commit(Outcome::plain(working));
                Ok(STATUS_COMPLETE.to_string())
            }
        }
    }

    /// Run the operation `params` belongs to.
    pub fn apply_params<B: ImagingBackend + ?Sized>(
        &mut self,
        backend: &B,
        params: &ParameterSet,
    ) -> Result<String, PipelineError> {
        let working = self.source_copy()?;
        let outcome = self.run(backend, &working, params)?;
        log::info!("{}: {}", params.operation(), outcome.status);
        let status = outcome.status.clone();
        self.commit(outcome);
        Ok(status)
    }

    fn source_copy(&self) -> Result<GrayImage, PipelineError> {
        self.source.clone().ok_or(PipelineError::NoImageLoaded)
    }

    /// Replace the result of the previous apply as a whole.
    fn commit(&mut self, outcome: Outcome) {
        self.working = Some(outcome.working);
        self.processed = Some(outcome.display);
        self.blobs = outcome.blobs;
        self.overlays = outcome.overlays;
        self.detections = outcome.detections;
    }

    fn run<B: ImagingBackend + ?Sized>(
        &self,
        backend: &B,
        working: &GrayImage,
        params: &ParameterSet,
    ) -> Result<Outcome, PipelineError> {
        let op = params.operation().name();
        let outcome = match params {
            ParameterSet::Threshold(p) => {
                let mode = BinarizeMode::InRange {
                    lo: p.threshold_min(),
                    hi: p.threshold_max(),
                };
                Outcome::plain(backend.binarize(working, mode).map_err(failed(op))?)
            }
            ParameterSet::Morphology(p) => {
                let mask = backend
                    .binarize(working, BinarizeMode::Bimodal)
                    .map_err(failed(op))?;
                let out = backend
                    .morph(&mask, p.mode(), p.effective_iterations())
                    .map_err(failed(op))?;
                Outcome::plain(out)
            }
            ParameterSet::EdgeDetection(p) => Outcome::plain(self.run_edges(backend, working, p)?),
            ParameterSet::AdaptiveThreshold(p) => {
                let mode = BinarizeMode::Adaptive {
                    window: p.window_size(),
                    offset: p.offset(),
                    polarity: p.mode(),
                };
                Outcome::plain(backend.binarize(working, mode).map_err(failed(op))?)
            }
            ParameterSet::Blob(p) => self.run_blobs(backend, working, p)?,
            ParameterSet::GeometricMatch(p) => self.run_search(backend, working, p)?,
            ParameterSet::Roi(_) => Outcome::plain(working.clone()),
        };
        Ok(outcome)
    }

    fn run_edges<B: ImagingBackend + ?Sized>(
        &self,
        backend: &B,
        working: &GrayImage,
        p: &EdgeParams,
    ) -> Result<GrayImage, PipelineError> {
        let op = Operation::EdgeDetection.name();
        let edges = backend
            .edge_filter(working, p.method())
            .map_err(failed(op))?;
        if p.strength() == 0 {
            return Ok(edges);
        }
        backend
            .binarize(&edges, BinarizeMode::Greater(p.strength()))
            .map_err(failed(op))
    }

    fn run_blobs<B: ImagingBackend + ?Sized>(
        &self,
        backend: &B,
        working: &GrayImage,
        p: &BlobParams,
    ) -> Result<Outcome, PipelineError> {
        let op = Operation::Blob.name();
        let mask = backend
            .binarize(
                working,
                BinarizeMode::InRange {
                    lo: p.threshold_min(),
                    hi: p.threshold_max(),
                },
            )
            .map_err(failed(op))?;
        let labels = backend.label(&mask).map_err(failed(op))?;

        let analysis = analyze_label_image(&labels, p.min_area() as u64);
        let (width, height) = mask.dimensions();
        let overlays = analysis.overlays(self.config.box_padding, width, height);
        let status = format!(
            "Detected {} blobs ({} total)",
            analysis.blobs.len(),
            analysis.total
        );

        let display = if p.draw_box() {
            ProcessedImage::Rgb(draw_blobs(&mask, &overlays, &self.config))
        } else {
            ProcessedImage::Gray(mask.clone())
        };

        Ok(Outcome {
            working: mask,
            display,
            status,
            blobs: Some(analysis),
            overlays,
            detections: Vec::new(),
        })
    }

    fn run_search<B: ImagingBackend + ?Sized>(
        &self,
        backend: &B,
        working: &GrayImage,
        p: &GeometricMatchParams,
    ) -> Result<Outcome, PipelineError> {
        let model = match &self.model {
            ModelState::Defining { .. } => {
                return Ok(Outcome::with_status(
                    working.clone(),
                    STATUS_DEFINING_MODEL.to_string(),
                ))
            }
            ModelState::Empty => {
                return Ok(Outcome::with_status(
                    working.clone(),
                    STATUS_NO_MODEL.to_string(),
                ))
            }
            ModelState::Trained(model) => model,
        };

        let detections = backend
            .geometric_search(model, working, p.min_score())
            .map_err(failed(Operation::GeometricMatch.name()))?;
        if detections.is_empty() {
            return Ok(Outcome::with_status(
                working.clone(),
                STATUS_NO_MATCHES.to_string(),
            ));
        }

        let canvas = draw_detections(
            working,
            &detections,
            model.width(),
            model.height(),
            &self.config,
        );
        Ok(Outcome {
            working: working.clone(),
            display: ProcessedImage::Rgb(canvas),
            status: format!(
                "Found {} matches (min score {}%)",
                detections.len(),
                p.min_score()
            ),
            blobs: None,
            overlays: Vec::new(),
            detections,
        })
    }

    fn clear_results(&mut self) {
        self.blobs = None;
        self.overlays.clear();
        self.detections.clear();
    }

    // ------------------------------------------------------------------
    // Display
    // ------------------------------------------------------------------

    /// Choose between the source and the processed result for display.
    /// Toggling never recomputes anything.
    pub fn set_show_original(&mut self, show: bool) {
        self.show_original = show;
    }

    pub fn show_original(&self) -> bool {
        self.show_original
    }

    pub fn get_original(&self) -> Option<&GrayImage> {
        self.source.as_ref()
    }

    pub fn get_processed(&self) -> Option<&ProcessedImage> {
        self.processed.as_ref()
    }

    /// The working image as left by the last apply.
    pub fn working(&self) -> Option<&GrayImage> {
        self.working.as_ref()
    }

    /// The image selected by the display mode.
    pub fn current_image(&self) -> Option<Cow<'_, ProcessedImage>> {
        if self.show_original {
            self.source
                .as_ref()
                .map(|s| Cow::Owned(ProcessedImage::Gray(s.clone())))
        } else {
            self.processed.as_ref().map(Cow::Borrowed)
        }
    }

    /// [`current_image`](Pipeline::current_image) as a stride-aligned buffer.
    pub fn current_display<B: ImagingBackend + ?Sized>(&self, backend: &B) -> Option<DisplayBuffer> {
        self.current_image()
            .map(|image| backend.to_display_buffer(&image))
    }

    // ------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------

    /// Qualifying blobs of the last apply (empty unless it was a blob analysis).
    pub fn blobs(&self) -> &[Blob] {
        self.blobs.as_ref().map_or(&[], |a| a.blobs.as_slice())
    }

    /// Full blob analysis of the last apply, including the unfiltered count.
    pub fn blob_analysis(&self) -> Option<&BlobAnalysis> {
        self.blobs.as_ref()
    }

    pub fn blob_overlays(&self) -> &[BlobOverlay] {
        &self.overlays
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    // ------------------------------------------------------------------
    // Crop and export
    // ------------------------------------------------------------------

    /// Replace the source with `rect` of itself.
    ///
    /// Returns `Ok(false)` and leaves everything untouched when the region is
    /// empty or does not fit inside the source.
    pub fn crop(&mut self, rect: RegionRect) -> Result<bool, PipelineError> {
        let source = self.source.as_ref().ok_or(PipelineError::NoImageLoaded)?;
        let Some(view) = RegionView::new(source, rect) else {
            log::debug!("ignoring crop to invalid region {:?}", rect);
            return Ok(false);
        };
        let cropped = view.materialize();
        log::info!(
            "cropped source to {}x{} at {:?}",
            cropped.width(),
            cropped.height(),
            view.offset()
        );

        self.processed = Some(ProcessedImage::Gray(cropped.clone()));
        self.working = Some(cropped.clone());
        self.source = Some(cropped);
        self.clear_results();
        Ok(true)
    }

    /// Write `rect` of the source to `path`. Invalid regions are skipped.
    pub fn save_region<B: ImagingBackend + ?Sized>(
        &self,
        backend: &B,
        path: &Path,
        rect: RegionRect,
    ) -> Result<bool, PipelineError> {
        let source = self.source.as_ref().ok_or(PipelineError::NoImageLoaded)?;
        if rect.within(source.width(), source.height()).is_none() {
            log::debug!("ignoring save of invalid region {:?}", rect);
            return Ok(false);
        }
        backend
            .export_region(source, rect, path)
            .map_err(failed("save region"))?;
        Ok(true)
    }

    /// Encode `rect` of the source in memory. Invalid regions give `None`.
    pub fn encode_region<B: ImagingBackend + ?Sized>(
        &self,
        backend: &B,
        rect: RegionRect,
        format: ImageFormat,
    ) -> Result<Option<Vec<u8>>, PipelineError> {
        let source = self.source.as_ref().ok_or(PipelineError::NoImageLoaded)?;
        if rect.within(source.width(), source.height()).is_none() {
            return Ok(None);
        }
        backend
            .encode_region(source, rect, format)
            .map(Some)
            .map_err(failed("encode region"))
    }

    // ------------------------------------------------------------------
    // Model definition
    // ------------------------------------------------------------------

    pub fn is_defining_model(&self) -> bool {
        matches!(self.model, ModelState::Defining { .. })
    }

    /// The trained model, if any.
    pub fn model(&self) -> Option<&GeometricModel> {
        match &self.model {
            ModelState::Trained(model) => Some(model),
            _ => None,
        }
    }

    /// Start defining a model from `image`. The model image is shown as the
    /// processed result until training finishes.
    pub fn load_model_raw<B: ImagingBackend + ?Sized>(
        &mut self,
        backend: &B,
        image: &DynamicImage,
    ) -> (u32, u32) {
        let gray = backend.to_grayscale(image);
        let dims = gray.dimensions();
        log::info!("model definition started with {}x{} image", dims.0, dims.1);
        self.processed = Some(ProcessedImage::Gray(gray.clone()));
        self.model = ModelState::Defining {
            image: gray,
            preview: None,
        };
        dims
    }

    pub fn load_model_bytes<B: ImagingBackend + ?Sized>(
        &mut self,
        backend: &B,
        bytes: &[u8],
    ) -> Result<(u32, u32), PipelineError> {
        let image = backend.decode(bytes).map_err(failed("load model"))?;
        Ok(self.load_model_raw(backend, &image))
    }

    pub fn load_model_path<B: ImagingBackend + ?Sized>(
        &mut self,
        backend: &B,
        path: &Path,
    ) -> Result<(u32, u32), PipelineError> {
        let image = backend.load_image(path).map_err(failed("load model"))?;
        Ok(self.load_model_raw(backend, &image))
    }

    /// Model image with its border trimmed, when it is large enough.
    fn model_region(&self, image: &GrayImage) -> GrayImage {
        let inset = self.config.model_inset;
        let (w, h) = image.dimensions();
        let min_side = inset.saturating_mul(2).saturating_add(2);
        if inset == 0 || w <= min_side || h <= min_side {
            return image.clone();
        }
        let rect = RegionRect::new(
            inset as i32,
            inset as i32,
            (w - 2 * inset) as i32,
            (h - 2 * inset) as i32,
        );
        RegionView::new(image, rect)
            .map(|view| view.materialize())
            .unwrap_or_else(|| image.clone())
    }

    /// Define a model from the loaded model image with the current
    /// smoothness, and show it. Returns `Ok(false)` when no model image is
    /// being defined.
    pub fn preview_model<B: ImagingBackend + ?Sized>(
        &mut self,
        backend: &B,
        params: &GeometricMatchParams,
    ) -> Result<bool, PipelineError> {
        let ModelState::Defining { image, .. } = &self.model else {
            return Ok(false);
        };
        let region = self.model_region(image);
        let model = backend
            .define_model(&region, params.smoothness())
            .map_err(failed("define model"))?;

        self.processed = Some(ProcessedImage::Gray(model.template.clone()));
        if let ModelState::Defining { preview, .. } = &mut self.model {
            *preview = Some(model);
        }
        Ok(true)
    }

    /// Finish the model and leave definition mode.
    ///
    /// Reuses the preview when its smoothness matches `params`, otherwise
    /// defines the model afresh. `working` and the display are reset from the
    /// source. Returns `Ok(false)` when no model image is being defined.
    pub fn train_model<B: ImagingBackend + ?Sized>(
        &mut self,
        backend: &B,
        params: &GeometricMatchParams,
    ) -> Result<bool, PipelineError> {
        let model = match &self.model {
            ModelState::Defining {
                preview: Some(model),
                ..
            } if model.smoothness == params.smoothness() => model.clone(),
            ModelState::Defining { image, .. } => {
                let region = self.model_region(image);
                backend
                    .define_model(&region, params.smoothness())
                    .map_err(failed("train model"))?
            }
            _ => return Ok(false),
        };
        log::info!("model trained ({}x{})", model.width(), model.height());
        self.model = ModelState::Trained(model);

        if let Some(source) = &self.source {
            self.working = Some(source.clone());
            self.processed = Some(ProcessedImage::Gray(source.clone()));
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ImageprocBackend;
    use crate::params::{select_operation, AdaptiveThresholdParams, FieldValue};
    use image::Luma;

    fn backend() -> ImageprocBackend {
        ImageprocBackend::default()
    }

    /// Backend whose every pixel primitive fails.
    struct BrokenBackend;

    impl ImagingBackend for BrokenBackend {
        fn decode(&self, _bytes: &[u8]) -> Result<DynamicImage, BackendError> {
            Err(BackendError::EmptyImage)
        }

        fn binarize(&self, _: &GrayImage, _: BinarizeMode) -> Result<GrayImage, BackendError> {
            Err(BackendError::EmptyImage)
        }

        fn morph(
            &self,
            _: &GrayImage,
            _: crate::params::MorphMode,
            _: u32,
        ) -> Result<GrayImage, BackendError> {
            Err(BackendError::EmptyImage)
        }

        fn edge_filter(
            &self,
            _: &GrayImage,
            _: crate::params::EdgeMethod,
        ) -> Result<GrayImage, BackendError> {
            Err(BackendError::EmptyImage)
        }

        fn label(&self, _: &GrayImage) -> Result<crate::LabelImage, BackendError> {
            Err(BackendError::EmptyImage)
        }

        fn define_model(&self, _: &GrayImage, _: f64) -> Result<GeometricModel, BackendError> {
            Err(BackendError::EmptyImage)
        }

        fn geometric_search(
            &self,
            _: &GeometricModel,
            _: &GrayImage,
            _: f64,
        ) -> Result<Vec<Detection>, BackendError> {
            Err(BackendError::EmptyImage)
        }

        fn export_region(&self, _: &GrayImage, _: RegionRect, _: &Path) -> Result<(), BackendError> {
            Err(BackendError::EmptyImage)
        }

        fn encode_region(
            &self,
            _: &GrayImage,
            _: RegionRect,
            _: ImageFormat,
        ) -> Result<Vec<u8>, BackendError> {
            Err(BackendError::EmptyImage)
        }
    }

    fn params(name: &str, fields: &[(&str, FieldValue)]) -> ParameterSet {
        let mut params = select_operation(name).unwrap();
        for (field, value) in fields {
            params.set_field(field, value).unwrap();
        }
        params
    }

    /// 40x40 gradient-free scene: dark background, a 12x12 square at (4, 4)
    /// and a 5x5 square at (28, 28), both at level 120.
    fn two_squares() -> GrayImage {
        GrayImage::from_fn(40, 40, |x, y| {
            let big = (4..16).contains(&x) && (4..16).contains(&y);
            let small = (28..33).contains(&x) && (28..33).contains(&y);
            Luma([if big || small { 120 } else { 10 }])
        })
    }

    fn loaded(image: GrayImage) -> Pipeline {
        let mut pipeline = Pipeline::default();
        pipeline.load_raw(&backend(), &DynamicImage::ImageLuma8(image));
        pipeline
    }

    fn processed_gray(pipeline: &Pipeline) -> GrayImage {
        match pipeline.get_processed() {
            Some(ProcessedImage::Gray(img)) => img.clone(),
            other => panic!("expected gray result, got {:?}", other.map(|p| p.channels())),
        }
    }

    #[test]
    fn test_apply_without_image() {
        let mut pipeline = Pipeline::default();
        let p = params("Threshold", &[]);
        let err = pipeline.apply(&backend(), "Threshold", Some(&p)).unwrap_err();
        assert!(matches!(err, PipelineError::NoImageLoaded));
        assert!(pipeline.working().is_none());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut pipeline = loaded(two_squares());
        let p = params("Threshold", &[("threshold_min", FieldValue::Number(100.0))]);

        pipeline.apply(&backend(), "Threshold", Some(&p)).unwrap();
        let first = processed_gray(&pipeline);
        pipeline.apply(&backend(), "Threshold", Some(&p)).unwrap();
        let second = processed_gray(&pipeline);

        assert_eq!(first, second);
        assert_eq!(first.get_pixel(5, 5)[0], 255);
        assert_eq!(first.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_operations_do_not_compound() {
        let backend = backend();
        let morph = params("Morphology", &[("mode", FieldValue::from("Dilate"))]);

        let mut fresh = loaded(two_squares());
        fresh.apply(&backend, "Morphology", Some(&morph)).unwrap();

        let mut reused = loaded(two_squares());
        let threshold = params("Threshold", &[]);
        reused.apply(&backend, "Threshold", Some(&threshold)).unwrap();
        reused.apply(&backend, "Morphology", Some(&morph)).unwrap();

        assert_eq!(processed_gray(&fresh), processed_gray(&reused));
        assert_eq!(reused.get_original(), Some(&two_squares()));
    }

    #[test]
    fn test_mismatched_name_only_resets() {
        let mut pipeline = loaded(two_squares());
        let p = params("Threshold", &[]);

        let status = pipeline.apply(&backend(), "Morphology", Some(&p)).unwrap();
        assert_eq!(status, STATUS_COMPLETE);
        assert_eq!(processed_gray(&pipeline), two_squares());

        let status = pipeline.apply(&backend(), "Sharpen", None).unwrap();
        assert_eq!(status, STATUS_COMPLETE);
        assert_eq!(pipeline.working(), Some(&two_squares()));
    }

    #[test]
    fn test_roi_apply_is_reset() {
        let mut pipeline = loaded(two_squares());
        let p = params("ROI", &[]);
        assert_eq!(pipeline.apply(&backend(), "ROI", Some(&p)).unwrap(), STATUS_COMPLETE);
        assert_eq!(processed_gray(&pipeline), two_squares());
    }

    #[test]
    fn test_backend_failure_keeps_source() {
        let mut pipeline = loaded(two_squares());
        let p = params("Threshold", &[]);

        let err = pipeline.apply(&BrokenBackend, "Threshold", Some(&p)).unwrap_err();
        match err {
            PipelineError::Backend { operation, .. } => assert_eq!(operation, "Threshold"),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(pipeline.get_original(), Some(&two_squares()));

        let status = pipeline.apply(&backend(), "Threshold", Some(&p)).unwrap();
        assert_eq!(status, STATUS_COMPLETE);
    }

    #[test]
    fn test_backend_failure_keeps_previous_result() {
        let mut pipeline = loaded(two_squares());
        let blob = params("Blob", &[]);
        pipeline.apply(&backend(), "Blob", Some(&blob)).unwrap();

        let processed = pipeline.get_processed().cloned();
        let working = pipeline.working().cloned();
        let blobs = pipeline.blobs().to_vec();
        let overlays = pipeline.blob_overlays().to_vec();
        assert_eq!(blobs.len(), 1);

        let threshold = params("Threshold", &[]);
        assert!(pipeline.apply(&BrokenBackend, "Threshold", Some(&threshold)).is_err());

        assert_eq!(pipeline.get_processed().cloned(), processed);
        assert_eq!(pipeline.working().cloned(), working);
        assert_eq!(pipeline.blobs(), blobs.as_slice());
        assert_eq!(pipeline.blob_overlays(), overlays.as_slice());
        assert!(matches!(pipeline.get_processed(), Some(ProcessedImage::Rgb(_))));
    }

    #[test]
    fn test_adaptive_widest_window_applies() {
        let mut pipeline = loaded(two_squares());
        let p = params(
            "Adaptive Threshold",
            &[(
                "window_size",
                FieldValue::Number(AdaptiveThresholdParams::MAX_WINDOW_SIZE as f64),
            )],
        );
        let status = pipeline.apply(&backend(), "Adaptive Threshold", Some(&p)).unwrap();
        assert_eq!(status, STATUS_COMPLETE);
        assert_eq!(processed_gray(&pipeline).dimensions(), (40, 40));
    }

    #[test]
    fn test_edge_strength_binarizes() {
        let step = GrayImage::from_fn(20, 20, |x, _| Luma([if x < 10 { 0 } else { 200 }]));
        let mut pipeline = loaded(step);

        let p = params("Edge Detection", &[("strength", FieldValue::Number(25.0))]);
        pipeline.apply(&backend(), "Edge Detection", Some(&p)).unwrap();
        let out = processed_gray(&pipeline);
        assert!(out.pixels().all(|px| px[0] == 0 || px[0] == 255));
        assert_eq!(out.get_pixel(10, 10)[0], 255);

        let raw = params("Edge Detection", &[("strength", FieldValue::Number(0.0))]);
        pipeline.apply(&backend(), "Edge Detection", Some(&raw)).unwrap();
        let out = processed_gray(&pipeline);
        assert!(out.get_pixel(10, 10)[0] > 0);
    }

    #[test]
    fn test_blob_analysis_filters_by_area() {
        let mut pipeline = loaded(two_squares());
        let p = params("Blob", &[]);

        let status = pipeline.apply(&backend(), "Blob", Some(&p)).unwrap();
        assert_eq!(status, "Detected 1 blobs (2 total)");

        let blobs = pipeline.blobs();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].area, 144);
        assert_eq!(blobs[0].centroid(), (9, 9));

        let overlays = pipeline.blob_overlays();
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays[0].label, "(9, 9, 144)");
        assert_eq!(overlays[0].bbox.min_x, 0);
        assert_eq!(overlays[0].bbox.max_x, 20);

        assert!(matches!(pipeline.get_processed(), Some(ProcessedImage::Rgb(_))));
    }

    #[test]
    fn test_blob_without_boxes_stays_gray() {
        let mut pipeline = loaded(two_squares());
        let p = params(
            "Blob",
            &[
                ("draw_box", FieldValue::Bool(false)),
                ("min_area", FieldValue::Number(1.0)),
            ],
        );
        let status = pipeline.apply(&backend(), "Blob", Some(&p)).unwrap();
        assert_eq!(status, "Detected 2 blobs (2 total)");
        assert!(matches!(pipeline.get_processed(), Some(ProcessedImage::Gray(_))));
    }

    #[test]
    fn test_results_cleared_on_next_apply() {
        let mut pipeline = loaded(two_squares());
        let blob = params("Blob", &[]);
        pipeline.apply(&backend(), "Blob", Some(&blob)).unwrap();
        assert!(!pipeline.blobs().is_empty());

        let threshold = params("Threshold", &[]);
        pipeline.apply(&backend(), "Threshold", Some(&threshold)).unwrap();
        assert!(pipeline.blobs().is_empty());
        assert!(pipeline.blob_overlays().is_empty());
        assert!(pipeline.blob_analysis().is_none());
    }

    #[test]
    fn test_show_original_toggle() {
        let mut pipeline = loaded(two_squares());
        let p = params("Threshold", &[]);
        pipeline.apply(&backend(), "Threshold", Some(&p)).unwrap();
        let processed = pipeline.get_processed().cloned();

        pipeline.set_show_original(true);
        let current = pipeline.current_image().map(Cow::into_owned);
        assert_eq!(current, Some(ProcessedImage::Gray(two_squares())));

        pipeline.set_show_original(false);
        let current = pipeline.current_image().map(Cow::into_owned);
        assert_eq!(current, processed);
    }

    #[test]
    fn test_current_display_is_aligned() {
        let mut pipeline = loaded(GrayImage::new(5, 3));
        pipeline.set_show_original(true);
        let buf = pipeline.current_display(&backend()).unwrap();
        assert_eq!(buf.stride, 8);
        assert_eq!(buf.pixels.len(), 24);
    }

    #[test]
    fn test_crop_replaces_source() {
        let mut pipeline = loaded(two_squares());
        assert!(pipeline.crop(RegionRect::new(4, 4, 12, 12)).unwrap());
        assert_eq!(pipeline.dimensions(), Some((12, 12)));
        assert!(pipeline
            .get_original()
            .unwrap()
            .pixels()
            .all(|p| p[0] == 120));
        assert_eq!(pipeline.working(), pipeline.get_original());
    }

    #[test]
    fn test_crop_invalid_region_is_noop() {
        let mut pipeline = loaded(two_squares());
        for rect in [
            RegionRect::new(0, 0, 0, 10),
            RegionRect::new(0, 0, 10, -3),
            RegionRect::new(35, 35, 10, 10),
            RegionRect::new(-1, 0, 5, 5),
        ] {
            assert!(!pipeline.crop(rect).unwrap());
        }
        assert_eq!(pipeline.get_original(), Some(&two_squares()));
    }

    #[test]
    fn test_crop_without_image() {
        let mut pipeline = Pipeline::default();
        let err = pipeline.crop(RegionRect::new(0, 0, 1, 1)).unwrap_err();
        assert!(matches!(err, PipelineError::NoImageLoaded));
    }

    #[test]
    fn test_encode_and_save_region() {
        let pipeline = loaded(two_squares());
        let bytes = pipeline
            .encode_region(&backend(), RegionRect::new(4, 4, 12, 12), ImageFormat::Png)
            .unwrap()
            .unwrap();
        let decoded = backend().decode(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (12, 12));

        let skipped = pipeline
            .encode_region(&backend(), RegionRect::new(30, 30, 20, 20), ImageFormat::Png)
            .unwrap();
        assert!(skipped.is_none());

        let saved = pipeline
            .save_region(&backend(), Path::new("unused.png"), RegionRect::new(0, 0, 0, 0))
            .unwrap();
        assert!(!saved);
    }

    #[test]
    fn test_load_bytes_round_trip_and_failure() {
        let mut pipeline = Pipeline::default();
        let png = backend()
            .encode_region(&two_squares(), RegionRect::new(0, 0, 40, 40), ImageFormat::Png)
            .unwrap();
        assert_eq!(pipeline.load_bytes(&backend(), &png).unwrap(), (40, 40));
        assert_eq!(pipeline.get_original(), Some(&two_squares()));

        let err = pipeline.load_bytes(&backend(), b"not an image").unwrap_err();
        assert!(matches!(err, PipelineError::Backend { operation: "load", .. }));
        // failed load keeps the previous source
        assert_eq!(pipeline.dimensions(), Some((40, 40)));
    }

    #[test]
    fn test_load_converts_color_to_gray() {
        let rgb = image::RgbImage::from_pixel(4, 2, image::Rgb([200, 200, 200]));
        let mut pipeline = Pipeline::default();
        pipeline.load_raw(&backend(), &DynamicImage::ImageRgb8(rgb));
        assert!(pipeline.get_original().unwrap().pixels().all(|p| p[0] == 200));
    }

    fn checker() -> GrayImage {
        GrayImage::from_fn(8, 8, |x, y| {
            Luma([if (x / 2 + y / 2) % 2 == 0 { 250 } else { 5 }])
        })
    }

    fn scene_with_checker() -> GrayImage {
        let mut scene = GrayImage::from_fn(60, 40, |x, y| Luma([((x * 7 + y * 13) % 40) as u8]));
        for (x, y, p) in checker().enumerate_pixels() {
            scene.put_pixel(30 + x, 12 + y, *p);
        }
        scene
    }

    #[test]
    fn test_match_without_model() {
        let mut pipeline = loaded(scene_with_checker());
        let p = params("Geometric Match", &[]);
        let status = pipeline.apply(&backend(), "Geometric Match", Some(&p)).unwrap();
        assert_eq!(status, STATUS_NO_MODEL);
    }

    #[test]
    fn test_model_definition_workflow() {
        let backend = backend();
        let mut pipeline = loaded(scene_with_checker());
        let p = params(
            "Geometric Match",
            &[
                ("smoothness", FieldValue::Number(0.0)),
                ("min_score", FieldValue::Number(99.0)),
            ],
        );
        let ParameterSet::GeometricMatch(gmf) = &p else {
            panic!("expected match parameters");
        };

        pipeline.load_model_raw(&backend, &DynamicImage::ImageLuma8(checker()));
        assert!(pipeline.is_defining_model());
        let status = pipeline.apply(&backend, "Geometric Match", Some(&p)).unwrap();
        assert_eq!(status, STATUS_DEFINING_MODEL);

        assert!(pipeline.preview_model(&backend, gmf).unwrap());
        // inset by one pixel on every side
        assert_eq!(processed_gray(&pipeline).dimensions(), (6, 6));

        assert!(pipeline.train_model(&backend, gmf).unwrap());
        assert!(!pipeline.is_defining_model());
        assert_eq!(pipeline.model().map(|m| (m.width(), m.height())), Some((6, 6)));
        assert_eq!(processed_gray(&pipeline), scene_with_checker());

        let status = pipeline.apply(&backend, "Geometric Match", Some(&p)).unwrap();
        assert!(status.starts_with("Found "), "status was {:?}", status);
        let best = pipeline.detections()[0];
        assert_eq!((best.x, best.y), (34.0, 16.0));
        assert!(matches!(pipeline.get_processed(), Some(ProcessedImage::Rgb(_))));
    }

    #[test]
    fn test_match_reports_no_matches() {
        let backend = backend();
        let mut pipeline = loaded(GrayImage::from_fn(40, 40, |x, y| {
            Luma([((x * 7 + y * 13) % 40) as u8])
        }));
        let p = params(
            "Geometric Match",
            &[
                ("smoothness", FieldValue::Number(0.0)),
                ("min_score", FieldValue::Number(99.0)),
            ],
        );
        let ParameterSet::GeometricMatch(gmf) = &p else {
            panic!("expected match parameters");
        };
        pipeline.load_model_raw(&backend, &DynamicImage::ImageLuma8(checker()));
        pipeline.train_model(&backend, gmf).unwrap();

        let status = pipeline.apply(&backend, "Geometric Match", Some(&p)).unwrap();
        assert_eq!(status, STATUS_NO_MATCHES);
        assert!(pipeline.detections().is_empty());
    }

    #[test]
    fn test_preview_and_train_need_model_image() {
        let mut pipeline = loaded(two_squares());
        let gmf = GeometricMatchParams::default();
        assert!(!pipeline.preview_model(&backend(), &gmf).unwrap());
        assert!(!pipeline.train_model(&backend(), &gmf).unwrap());
    }

    #[test]
    fn test_train_failure_stays_in_definition() {
        let mut pipeline = loaded(two_squares());
        pipeline.load_model_raw(&backend(), &DynamicImage::ImageLuma8(GrayImage::new(2, 2)));
        let err = pipeline
            .train_model(&backend(), &GeometricMatchParams::default())
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Backend {
                source: BackendError::ModelTooSmall { .. },
                ..
            }
        ));
        assert!(pipeline.is_defining_model());
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::backend::ImageprocBackend;
    use crate::params::{select_operation, FieldValue};
    use proptest::prelude::*;

    fn image_strategy() -> impl Strategy<Value = GrayImage> {
        (1u32..=12, 1u32..=12).prop_flat_map(|(w, h)| {
            prop::collection::vec(any::<u8>(), (w * h) as usize).prop_map(move |pixels| {
                GrayImage::from_raw(w, h, pixels).unwrap_or_else(|| GrayImage::new(w, h))
            })
        })
    }

    proptest! {
        /// Property: applying the same operation twice yields the same result.
        #[test]
        fn prop_apply_idempotent(
            image in image_strategy(),
            name in prop::sample::select(vec!["Threshold", "Morphology", "Edge Detection", "Adaptive Threshold", "Blob"]),
            lo in any::<u8>(),
        ) {
            let backend = ImageprocBackend::default();
            let mut params = select_operation(name).unwrap();
            if matches!(params, ParameterSet::Threshold(_) | ParameterSet::Blob(_)) {
                params.set_field("threshold_min", &FieldValue::Number(lo as f64)).unwrap();
            }

            let mut pipeline = Pipeline::default();
            pipeline.load_raw(&backend, &DynamicImage::ImageLuma8(image.clone()));

            let first_status = pipeline.apply(&backend, name, Some(&params)).unwrap();
            let first = pipeline.get_processed().cloned();
            let second_status = pipeline.apply(&backend, name, Some(&params)).unwrap();
            let second = pipeline.get_processed().cloned();

            prop_assert_eq!(first_status, second_status);
            prop_assert_eq!(first, second);
            prop_assert_eq!(pipeline.get_original(), Some(&image));
        }

        /// Property: invalid crops never change the source.
        #[test]
        fn prop_invalid_crop_is_noop(
            image in image_strategy(),
            x in -5i32..20,
            y in -5i32..20,
            w in -5i32..20,
            h in -5i32..20,
        ) {
            let backend = ImageprocBackend::default();
            let mut pipeline = Pipeline::default();
            pipeline.load_raw(&backend, &DynamicImage::ImageLuma8(image.clone()));

            let rect = RegionRect::new(x, y, w, h);
            let valid = rect.within(image.width(), image.height()).is_some();
            let cropped = pipeline.crop(rect).unwrap();

            prop_assert_eq!(cropped, valid);
            if valid {
                prop_assert_eq!(pipeline.dimensions(), Some((w as u32, h as u32)));
            } else {
                prop_assert_eq!(pipeline.get_original(), Some(&image));
            }
        }
    }
}
