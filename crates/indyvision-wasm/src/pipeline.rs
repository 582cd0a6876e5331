//! Pipeline bindings.
//!
//! `JsPipeline` owns the source image, the processing state and an imaging
//! backend. Every `apply` restarts from the source, so the shell can re-run
//! an operation whenever a parameter changes.
//!
//! # Example
//!
//! ```typescript
//! import { JsPipeline, JsParameters } from '@indyvision/wasm';
//!
//! const pipeline = new JsPipeline();
//! pipeline.load_image(new Uint8Array(await file.arrayBuffer()));
//!
//! const params = new JsParameters('Blob Analysis');
//! params.subscribe(() => {
//!   const status = pipeline.apply('Blob Analysis', params);
//!   draw(pipeline.current_image());
//! });
//! ```

use crate::params::JsParameters;
use crate::types::JsDisplayImage;
use crate::viewport::JsViewport;
use image::ImageFormat;
use indyvision_core::params::GeometricMatchParams;
use indyvision_core::{
    BackendConfig, ImageprocBackend, ParameterSet, Pipeline, PipelineConfig, ProcessedImage,
    RegionRect,
};
use wasm_bindgen::prelude::*;

fn to_js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn config_or_default<T>(value: JsValue) -> Result<T, JsValue>
where
    T: Default + serde::de::DeserializeOwned,
{
    if value.is_undefined() || value.is_null() {
        Ok(T::default())
    } else {
        serde_wasm_bindgen::from_value(value).map_err(to_js_error)
    }
}

/// Match settings from `params`, or defaults for any other operation.
fn match_params(params: &JsParameters) -> GeometricMatchParams {
    match params.inner() {
        Some(ParameterSet::GeometricMatch(p)) => p.clone(),
        _ => GeometricMatchParams::default(),
    }
}

/// An inspection session over one source image.
#[wasm_bindgen]
pub struct JsPipeline {
    inner: Pipeline,
    backend: ImageprocBackend,
}

impl Default for JsPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl JsPipeline {
    #[wasm_bindgen(constructor)]
    pub fn new() -> JsPipeline {
        JsPipeline {
            inner: Pipeline::default(),
            backend: ImageprocBackend::default(),
        }
    }

    /// Create a pipeline with explicit settings.
    ///
    /// Either argument may be `undefined`; missing settings take defaults.
    pub fn with_config(pipeline: JsValue, backend: JsValue) -> Result<JsPipeline, JsValue> {
        let pipeline: PipelineConfig = config_or_default(pipeline)?;
        let backend: BackendConfig = config_or_default(backend)?;
        Ok(JsPipeline {
            inner: Pipeline::new(pipeline),
            backend: ImageprocBackend::new(backend),
        })
    }

    #[wasm_bindgen(getter)]
    pub fn has_image(&self) -> bool {
        self.inner.has_image()
    }

    #[wasm_bindgen(getter)]
    pub fn width(&self) -> u32 {
        self.inner.dimensions().map_or(0, |(w, _)| w)
    }

    #[wasm_bindgen(getter)]
    pub fn height(&self) -> u32 {
        self.inner.dimensions().map_or(0, |(_, h)| h)
    }

    /// Decode an encoded image (JPEG, PNG or BMP) and make it the source.
    ///
    /// The display switches to the original. On error the previous source
    /// is kept.
    pub fn load_image(&mut self, bytes: &[u8]) -> Result<(), JsValue> {
        self.inner
            .load_bytes(&self.backend, bytes)
            .map_err(to_js_error)?;
        self.inner.set_show_original(true);
        Ok(())
    }

    /// Run the operation called `name` and show its result.
    ///
    /// Returns the status line, e.g. `"Detected 3 blobs (7 total)"`.
    pub fn apply(&mut self, name: &str, params: &JsParameters) -> Result<String, JsValue> {
        let status = self
            .inner
            .apply(&self.backend, name, params.inner())
            .map_err(to_js_error)?;
        self.inner.set_show_original(false);
        Ok(status)
    }

    /// Switch between the source and the processed result.
    pub fn set_show_original(&mut self, show: bool) {
        self.inner.set_show_original(show);
    }

    #[wasm_bindgen(getter)]
    pub fn show_original(&self) -> bool {
        self.inner.show_original()
    }

    /// The image selected by the display mode, if any.
    pub fn current_image(&self) -> Option<JsDisplayImage> {
        self.inner
            .current_display(&self.backend)
            .map(JsDisplayImage::from)
    }

    pub fn original_image(&self) -> Option<JsDisplayImage> {
        self.inner
            .get_original()
            .map(|s| JsDisplayImage::from(ProcessedImage::Gray(s.clone()).to_display_buffer()))
    }

    pub fn processed_image(&self) -> Option<JsDisplayImage> {
        self.inner
            .get_processed()
            .map(|p| JsDisplayImage::from(p.to_display_buffer()))
    }

    /// Blobs found by the last blob analysis.
    pub fn blobs(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.inner.blobs()).map_err(to_js_error)
    }

    /// Boxes, centroids and labels for the last blob analysis.
    pub fn blob_overlays(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.inner.blob_overlays()).map_err(to_js_error)
    }

    /// Matches found by the last geometric search.
    pub fn detections(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.inner.detections()).map_err(to_js_error)
    }

    /// Replace the source with a region of itself.
    ///
    /// Returns `false` and changes nothing when the region does not fit.
    pub fn crop(&mut self, x: i32, y: i32, width: i32, height: i32) -> Result<bool, JsValue> {
        self.inner
            .crop(RegionRect::new(x, y, width, height))
            .map_err(to_js_error)
    }

    /// Crop to the region drawn on `viewport`, consuming it.
    pub fn crop_roi(&mut self, viewport: &mut JsViewport) -> Result<bool, JsValue> {
        let Some(roi) = viewport.take_roi() else {
            return Ok(false);
        };
        self.crop(
            roi.x as i32,
            roi.y as i32,
            roi.width as i32,
            roi.height as i32,
        )
    }

    /// Encode a region of the source for download.
    ///
    /// `format` is a file extension such as `"png"` or `"jpg"`. Returns
    /// `undefined` when the region does not fit.
    pub fn encode_region(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: &str,
    ) -> Result<Option<Vec<u8>>, JsValue> {
        let format = ImageFormat::from_extension(format)
            .ok_or_else(|| JsValue::from_str(&format!("Unknown image format '{}'", format)))?;
        self.inner
            .encode_region(&self.backend, RegionRect::new(x, y, width, height), format)
            .map_err(to_js_error)
    }

    // Model definition

    /// Start defining a match model from an encoded image.
    pub fn load_model(&mut self, bytes: &[u8]) -> Result<(), JsValue> {
        self.inner
            .load_model_bytes(&self.backend, bytes)
            .map_err(to_js_error)?;
        self.inner.set_show_original(false);
        Ok(())
    }

    /// Show the model as it would be trained with the current smoothness.
    pub fn preview_model(&mut self, params: &JsParameters) -> Result<bool, JsValue> {
        let params = match_params(params);
        self.inner
            .preview_model(&self.backend, &params)
            .map_err(to_js_error)
    }

    /// Finish the model and return to the source image.
    pub fn train_model(&mut self, params: &JsParameters) -> Result<bool, JsValue> {
        let params = match_params(params);
        self.inner
            .train_model(&self.backend, &params)
            .map_err(to_js_error)
    }

    #[wasm_bindgen(getter)]
    pub fn is_defining_model(&self) -> bool {
        self.inner.is_defining_model()
    }

    #[wasm_bindgen(getter)]
    pub fn has_model(&self) -> bool {
        self.inner.model().is_some()
    }
}


/// WASM-specific tests that require JsValue.
#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_apply_without_image_errors() {
        let mut pipeline = JsPipeline::new();
        let err = pipeline
            .apply("Threshold", &JsParameters::new("Threshold"))
            .unwrap_err();
        assert_eq!(err.as_string().unwrap(), "No image loaded");
    }

    #[wasm_bindgen_test]
    fn test_load_garbage_errors() {
        let mut pipeline = JsPipeline::new();
        assert!(pipeline.load_image(&[1, 2, 3]).is_err());
        assert!(!pipeline.has_image());
    }

    #[wasm_bindgen_test]
    fn test_unknown_export_format() {
        let pipeline = JsPipeline::new();
        assert!(pipeline.encode_region(0, 0, 1, 1, "xyz").is_err());
    }

    #[wasm_bindgen_test]
    fn test_with_config_and_results() {
        let pipeline = JsPipeline::with_config(JsValue::UNDEFINED, JsValue::NULL).unwrap();
        assert!(js_sys::Array::is_array(&pipeline.blobs().unwrap()));
        assert!(js_sys::Array::is_array(&pipeline.detections().unwrap()));
    }
}
