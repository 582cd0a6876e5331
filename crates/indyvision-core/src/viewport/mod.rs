//! Mapping between image pixel space and the on-screen display surface.
//!
//! # Coordinate System
//!
//! - Image pixel `(x, y)` maps to display `(x * scale_x + tx, y * scale_y + ty)`
//! - Origin is the top-left corner in both spaces
//! - Scale is uniform in practice but tracked per axis
//!
//! # Gestures
//!
//! Two pointer gestures mutate the view: panning and ROI drawing. Only one
//! may be active at a time; starting one while the other runs is refused.
//! Zoom and fit are instantaneous and allowed at any time.

mod roi;

pub use roi::RoiRect;

use serde::{Deserialize, Serialize};

use crate::config::ViewportConfig;

/// A 2D point, in either image or display space depending on context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Scale and translation of the image on the display surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    pub scale_x: f64,
    pub scale_y: f64,
    pub translate_x: f64,
    pub translate_y: f64,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            translate_x: 0.0,
            translate_y: 0.0,
        }
    }
}

/// Which pointer gesture is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GestureKind {
    Idle,
    Panning,
    Drawing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Gesture {
    Idle,
    Panning {
        /// Pointer position (display space) when the pan started
        start: Point,
        /// Translation when the pan started
        origin: Point,
    },
    Drawing {
        /// Anchor corner in image space
        start: Point,
        image_width: f64,
        image_height: f64,
    },
}

/// Viewport transform with pan, zoom, fit and ROI drawing.
#[derive(Debug, Clone)]
pub struct ViewportTransform {
    config: ViewportConfig,
    state: ViewportState,
    gesture: Gesture,
    roi: Option<RoiRect>,
}

impl Default for ViewportTransform {
    fn default() -> Self {
        Self::new(ViewportConfig::default())
    }
}

impl ViewportTransform {
    pub fn new(config: ViewportConfig) -> Self {
        Self {
            config,
            state: ViewportState::default(),
            gesture: Gesture::Idle,
            roi: None,
        }
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    pub fn state(&self) -> ViewportState {
        self.state
    }

    /// Horizontal scale (equal to the vertical scale unless set otherwise).
    pub fn scale(&self) -> f64 {
        self.state.scale_x
    }

    pub fn translation(&self) -> Point {
        Point::new(self.state.translate_x, self.state.translate_y)
    }

    /// Replace the whole state, e.g. when restoring a saved view.
    pub fn set_state(&mut self, state: ViewportState) {
        self.state = state;
    }

    pub fn gesture(&self) -> GestureKind {
        match self.gesture {
            Gesture::Idle => GestureKind::Idle,
            Gesture::Panning { .. } => GestureKind::Panning,
            Gesture::Drawing { .. } => GestureKind::Drawing,
        }
    }

    /// Shrink (never enlarge) and center the image in the viewport.
    ///
    /// The scale is `min(vw / iw, vh / ih)`, capped at the configured maximum
    /// (1.0 by default), then multiplied by the fit margin (0.95 by default).
    /// Both settings are limited to `(0, 1]`, so the fitted scale never
    /// exceeds 1.0 whatever the configuration says.
    /// Returns `false` without touching the state when either the image or the
    /// viewport has zero extent.
    pub fn fit_to_screen(
        &mut self,
        image_width: f64,
        image_height: f64,
        viewport_width: f64,
        viewport_height: f64,
    ) -> bool {
        if !(image_width > 0.0 && image_height > 0.0 && viewport_width > 0.0 && viewport_height > 0.0)
        {
            return false;
        }

        let scale = (viewport_width / image_width)
            .min(viewport_height / image_height)
            .min(self.config.fit_scale_cap())
            * self.config.fit_margin_factor();

        self.state = ViewportState {
            scale_x: scale,
            scale_y: scale,
            translate_x: (viewport_width - image_width * scale) / 2.0,
            translate_y: (viewport_height - image_height * scale) / 2.0,
        };
        log::debug!(
            "fit {}x{} into {}x{}: scale {:.4}",
            image_width,
            image_height,
            viewport_width,
            viewport_height,
            scale
        );
        true
    }

    /// Multiply the scale by `factor`, keeping the image point under `cursor`
    /// fixed on screen.
    ///
    /// Non-positive or non-finite factors are ignored.
    pub fn zoom_at_point(&mut self, cursor: Point, factor: f64) -> bool {
        if !(factor.is_finite() && factor > 0.0) {
            log::warn!("ignoring zoom factor {}", factor);
            return false;
        }
        let s = &mut self.state;
        s.scale_x *= factor;
        s.scale_y *= factor;
        s.translate_x = cursor.x - (cursor.x - s.translate_x) * factor;
        s.translate_y = cursor.y - (cursor.y - s.translate_y) * factor;
        true
    }

    /// One wheel notch: zoom in by the configured step for positive deltas,
    /// out otherwise.
    pub fn wheel(&mut self, cursor: Point, delta: f64) -> bool {
        let factor = if delta > 0.0 {
            self.config.zoom_step
        } else {
            1.0 / self.config.zoom_step
        };
        self.zoom_at_point(cursor, factor)
    }

    /// Start a pan gesture at a display-space pointer position.
    pub fn begin_pan(&mut self, pointer: Point) -> bool {
        if self.gesture != Gesture::Idle {
            return false;
        }
        self.gesture = Gesture::Panning {
            start: pointer,
            origin: self.translation(),
        };
        true
    }

    /// Set the translation to the gesture-start translation plus `delta`.
    ///
    /// `delta` is the total pointer movement since [`begin_pan`], so repeated
    /// calls do not accumulate drift.
    ///
    /// [`begin_pan`]: ViewportTransform::begin_pan
    pub fn pan(&mut self, delta: Point) -> bool {
        let Gesture::Panning { origin, .. } = self.gesture else {
            return false;
        };
        self.state.translate_x = origin.x + delta.x;
        self.state.translate_y = origin.y + delta.y;
        true
    }

    /// [`pan`](ViewportTransform::pan) with the delta taken from the current
    /// pointer position.
    pub fn pan_to(&mut self, pointer: Point) -> bool {
        let Gesture::Panning { start, .. } = self.gesture else {
            return false;
        };
        self.pan(Point::new(pointer.x - start.x, pointer.y - start.y))
    }

    pub fn end_pan(&mut self) -> bool {
        if !matches!(self.gesture, Gesture::Panning { .. }) {
            return false;
        }
        self.gesture = Gesture::Idle;
        true
    }

    /// Display space to image space.
    pub fn screen_to_image(&self, p: Point) -> Point {
        let s = &self.state;
        Point::new(
            (p.x - s.translate_x) / s.scale_x,
            (p.y - s.translate_y) / s.scale_y,
        )
    }

    /// Image space to display space.
    pub fn image_to_screen(&self, p: Point) -> Point {
        let s = &self.state;
        Point::new(
            p.x * s.scale_x + s.translate_x,
            p.y * s.scale_y + s.translate_y,
        )
    }

    /// Start drawing an ROI at a display-space pointer position.
    ///
    /// Refused unless idle and the pointer maps inside
    /// `[0, image_width) x [0, image_height)`. On success the ROI is reset to
    /// an empty rectangle at the anchor.
    pub fn begin_roi(&mut self, pointer: Point, image_width: f64, image_height: f64) -> bool {
        if self.gesture != Gesture::Idle {
            return false;
        }
        let start = self.screen_to_image(pointer);
        let inside = start.x >= 0.0
            && start.x < image_width
            && start.y >= 0.0
            && start.y < image_height;
        if !inside {
            return false;
        }

        self.gesture = Gesture::Drawing {
            start,
            image_width,
            image_height,
        };
        self.roi = Some(RoiRect::from_corners(start, start));
        true
    }

    /// Update the ROI from the current pointer position, clamped to the image.
    pub fn update_roi(&mut self, pointer: Point) -> Option<RoiRect> {
        let Gesture::Drawing {
            start,
            image_width,
            image_height,
        } = self.gesture
        else {
            return None;
        };
        let current = self.screen_to_image(pointer);
        let clamped = Point::new(
            current.x.clamp(0.0, image_width),
            current.y.clamp(0.0, image_height),
        );
        let rect = RoiRect::from_corners(start, clamped);
        self.roi = Some(rect);
        Some(rect)
    }

    /// Finish drawing. The last computed ROI stays available.
    pub fn end_roi(&mut self) -> Option<RoiRect> {
        if !matches!(self.gesture, Gesture::Drawing { .. }) {
            return None;
        }
        self.gesture = Gesture::Idle;
        self.roi
    }

    /// The current ROI in image space, if one has been drawn.
    pub fn roi(&self) -> Option<RoiRect> {
        self.roi
    }

    /// Hand the ROI to a consumer (crop or save) and clear it.
    pub fn take_roi(&mut self) -> Option<RoiRect> {
        self.roi.take()
    }

    pub fn clear_roi(&mut self) {
        self.roi = None;
    }

    /// The current ROI mapped into display space, for drawing its outline.
    pub fn roi_on_screen(&self) -> Option<RoiRect> {
        let roi = self.roi?;
        let origin = self.image_to_screen(Point::new(roi.x, roi.y));
        Some(RoiRect {
            x: origin.x,
            y: origin.y,
            width: roi.width * self.state.scale_x,
            height: roi.height * self.state.scale_y,
        })
    }

    /// Integer pixel readout for a pointer position, `"(X: x, Y: y)"`.
    ///
    /// Positions outside the image read `"(X: 0, Y: 0)"`.
    pub fn pixel_readout(&self, pointer: Point, image_width: u32, image_height: u32) -> String {
        let p = self.screen_to_image(pointer);
        // truncation toward zero, like an integer cast of the pointer position
        let (x, y) = (p.x.trunc(), p.y.trunc());
        if x >= 0.0 && x < image_width as f64 && y >= 0.0 && y < image_height as f64 {
            format!("(X: {}, Y: {})", x as u32, y as u32)
        } else {
            "(X: 0, Y: 0)".to_string()
        }
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================
