//! Viewport bindings for the display surface.
//!
//! The shell forwards pointer events in display coordinates. Which mouse
//! button pans and which draws is decided by the shell, not here.
//!
//! Rectangles are returned as `[x, y, width, height]` arrays, points as
//! `[x, y]`.

use indyvision_core::viewport::GestureKind;
use indyvision_core::{Point, RoiRect, ViewportConfig, ViewportTransform};
use wasm_bindgen::prelude::*;

fn rect_to_vec(rect: RoiRect) -> Vec<f64> {
    vec![rect.x, rect.y, rect.width, rect.height]
}

/// Pan/zoom state and ROI drawing for one display surface.
#[wasm_bindgen]
pub struct JsViewport {
    inner: ViewportTransform,
}

impl Default for JsViewport {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl JsViewport {
    #[wasm_bindgen(constructor)]
    pub fn new() -> JsViewport {
        JsViewport {
            inner: ViewportTransform::default(),
        }
    }

    /// Create a viewport with settings such as `{ zoom_step: 1.5 }`.
    /// Missing settings take their defaults.
    pub fn with_config(config: JsValue) -> Result<JsViewport, JsValue> {
        let config: ViewportConfig = if config.is_undefined() || config.is_null() {
            ViewportConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config).map_err(|e| JsValue::from_str(&e.to_string()))?
        };
        Ok(JsViewport {
            inner: ViewportTransform::new(config),
        })
    }

    #[wasm_bindgen(getter)]
    pub fn scale_x(&self) -> f64 {
        self.inner.state().scale_x
    }

    #[wasm_bindgen(getter)]
    pub fn scale_y(&self) -> f64 {
        self.inner.state().scale_y
    }

    #[wasm_bindgen(getter)]
    pub fn translate_x(&self) -> f64 {
        self.inner.state().translate_x
    }

    #[wasm_bindgen(getter)]
    pub fn translate_y(&self) -> f64 {
        self.inner.state().translate_y
    }

    /// `"idle"`, `"panning"` or `"drawing"`.
    #[wasm_bindgen(getter)]
    pub fn gesture(&self) -> String {
        match self.inner.gesture() {
            GestureKind::Idle => "idle",
            GestureKind::Panning => "panning",
            GestureKind::Drawing => "drawing",
        }
        .to_string()
    }

    /// Scale and center the image inside the display area.
    pub fn fit_to_screen(
        &mut self,
        image_width: f64,
        image_height: f64,
        view_width: f64,
        view_height: f64,
    ) -> bool {
        self.inner
            .fit_to_screen(image_width, image_height, view_width, view_height)
    }

    pub fn zoom_at_point(&mut self, x: f64, y: f64, factor: f64) -> bool {
        self.inner.zoom_at_point(Point::new(x, y), factor)
    }

    /// Zoom one step in (positive `delta`) or out, anchored at the cursor.
    pub fn wheel(&mut self, x: f64, y: f64, delta: f64) -> bool {
        self.inner.wheel(Point::new(x, y), delta)
    }

    pub fn begin_pan(&mut self, x: f64, y: f64) -> bool {
        self.inner.begin_pan(Point::new(x, y))
    }

    /// Move the pan to the current pointer position.
    pub fn pan_to(&mut self, x: f64, y: f64) -> bool {
        self.inner.pan_to(Point::new(x, y))
    }

    pub fn end_pan(&mut self) -> bool {
        self.inner.end_pan()
    }

    pub fn screen_to_image(&self, x: f64, y: f64) -> Vec<f64> {
        let p = self.inner.screen_to_image(Point::new(x, y));
        vec![p.x, p.y]
    }

    pub fn image_to_screen(&self, x: f64, y: f64) -> Vec<f64> {
        let p = self.inner.image_to_screen(Point::new(x, y));
        vec![p.x, p.y]
    }

    /// Start drawing a region at a display-space pointer position.
    ///
    /// Refused while panning or when the pointer is outside the image.
    pub fn begin_roi(&mut self, x: f64, y: f64, image_width: f64, image_height: f64) -> bool {
        self.inner
            .begin_roi(Point::new(x, y), image_width, image_height)
    }

    /// Rubber-band rectangle in image space, clamped to the image.
    pub fn update_roi(&mut self, x: f64, y: f64) -> Option<Vec<f64>> {
        self.inner.update_roi(Point::new(x, y)).map(rect_to_vec)
    }

    pub fn end_roi(&mut self) -> Option<Vec<f64>> {
        self.inner.end_roi().map(rect_to_vec)
    }

    /// The finished (or in-progress) region in image space.
    pub fn roi(&self) -> Option<Vec<f64>> {
        self.inner.roi().map(rect_to_vec)
    }

    /// The region in display space, for drawing the rubber band.
    pub fn roi_on_screen(&self) -> Option<Vec<f64>> {
        self.inner.roi_on_screen().map(rect_to_vec)
    }

    pub fn clear_roi(&mut self) {
        self.inner.clear_roi();
    }

    /// `"(X: x, Y: y)"` for the pixel under the pointer.
    pub fn pixel_readout(&self, x: f64, y: f64, image_width: u32, image_height: u32) -> String {
        self.inner
            .pixel_readout(Point::new(x, y), image_width, image_height)
    }
}

impl JsViewport {
    /// Hand the region over to a consumer such as crop, clearing it.
    pub(crate) fn take_roi(&mut self) -> Option<RoiRect> {
        self.inner.take_roi()
    }
}
