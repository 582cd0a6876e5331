//! IndyVision Core - Image inspection library
//!
//! This crate provides the core of the IndyVision inspection tool: typed
//! operation parameters, a pipeline that applies them to a pristine source
//! image, connected-component (blob) statistics, and the viewport math used
//! to display images and draw regions of interest.

pub mod backend;
pub mod blob;
pub mod config;
pub mod display;
pub mod overlay;
pub mod params;
pub mod pipeline;
pub mod region;
pub mod viewport;

pub use backend::{
    BackendError, BinarizeMode, Detection, GeometricModel, ImagingBackend, ImageprocBackend,
};
pub use blob::{analyze, extract_blobs, Blob, BlobAnalysis, BlobBox, BlobOverlay};
pub use config::{BackendConfig, Connectivity, PipelineConfig, ViewportConfig};
pub use display::{DisplayBuffer, ProcessedImage};
pub use params::{
    select_operation, EdgeMethod, FieldChange, FieldValue, MorphMode, Operation, ParamError,
    ParameterSet, Polarity, SubscriptionId,
};
pub use pipeline::{Pipeline, PipelineError};
pub use region::{RegionRect, RegionView};
pub use viewport::{Point, RoiRect, ViewportState, ViewportTransform};

/// Per-pixel component labels; `0` is background.
pub type LabelImage = image::ImageBuffer<image::Luma<u32>, Vec<u32>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_to_end_blob_count() {
        let backend = ImageprocBackend::default();
        let mut pipeline = Pipeline::default();
        let image = image::GrayImage::from_fn(30, 30, |x, y| {
            let on = (x / 10 + y / 10) % 2 == 0 && x % 10 < 8 && y % 10 < 8;
            image::Luma([if on { 100 } else { 0 }])
        });
        pipeline.load_raw(&backend, &image::DynamicImage::ImageLuma8(image));

        let mut params = select_operation("Blob Analysis").unwrap();
        params.set_field("min_area", &FieldValue::Number(10.0)).unwrap();
        let status = pipeline.apply(&backend, "Blob Analysis", Some(&params)).unwrap();

        assert_eq!(status, "Detected 5 blobs (5 total)");
        assert!(pipeline.blobs().iter().all(|b| b.area == 64));
    }

    #[test]
    fn test_viewport_roi_drives_crop() {
        let backend = ImageprocBackend::default();
        let mut pipeline = Pipeline::default();
        pipeline.load_raw(
            &backend,
            &image::DynamicImage::ImageLuma8(image::GrayImage::new(400, 300)),
        );

        let mut viewport = ViewportTransform::default();
        viewport.fit_to_screen(400.0, 300.0, 800.0, 600.0);
        assert!(viewport.begin_roi(Point::new(220.0, 170.0), 400.0, 300.0));
        viewport.update_roi(Point::new(315.0, 265.0));
        viewport.end_roi();

        let roi = viewport.take_roi().unwrap();
        assert!(pipeline.crop(RegionRect::from_roi(&roi)).unwrap());
        let (w, h) = pipeline.dimensions().unwrap();
        assert!((99..=101).contains(&w) && (99..=101).contains(&h));
    }
}
