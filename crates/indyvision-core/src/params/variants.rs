//! Per-operation parameter records.
//!
//! Fields are private so every write goes through a setter, and every setter
//! goes through the record's [`ChangeNotifier`].

use serde::{Deserialize, Serialize};

use super::{
    ChangeNotifier, EdgeMethod, FieldChange, FieldValue, MorphMode, Operation, ParamError,
    Polarity, SubscriptionId,
};

/// Fixed range binarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdParams {
    threshold_min: u8,
    threshold_max: u8,
    #[serde(skip)]
    pub(super) notifier: ChangeNotifier,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self {
            threshold_min: 128,
            threshold_max: 255,
            notifier: ChangeNotifier::new(),
        }
    }
}

impl ThresholdParams {
    pub const FIELDS: &'static [&'static str] = &["threshold_min", "threshold_max"];

    /// Lower bound of the foreground range (inclusive)
    pub fn threshold_min(&self) -> u8 {
        self.threshold_min
    }

    /// Upper bound of the foreground range (inclusive)
    pub fn threshold_max(&self) -> u8 {
        self.threshold_max
    }

    pub fn set_threshold_min(&mut self, value: u8) -> bool {
        self.notifier.update(
            &mut self.threshold_min,
            value,
            Operation::Threshold,
            "threshold_min",
        )
    }

    pub fn set_threshold_max(&mut self, value: u8) -> bool {
        self.notifier.update(
            &mut self.threshold_max,
            value,
            Operation::Threshold,
            "threshold_max",
        )
    }

    pub fn subscribe<F: FnMut(&FieldChange) + 'static>(&mut self, callback: F) -> SubscriptionId {
        self.notifier.subscribe(callback)
    }

    pub(super) fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "threshold_min" => Some(FieldValue::Number(self.threshold_min.into())),
            "threshold_max" => Some(FieldValue::Number(self.threshold_max.into())),
            _ => None,
        }
    }

    pub(super) fn set_field(
        &mut self,
        name: &str,
        value: &FieldValue,
    ) -> Option<Result<bool, ParamError>> {
        let result = match name {
            "threshold_min" => value
                .to_u8("threshold_min")
                .map(|v| self.set_threshold_min(v)),
            "threshold_max" => value
                .to_u8("threshold_max")
                .map(|v| self.set_threshold_max(v)),
            _ => return None,
        };
        Some(result)
    }
}

/// Binary morphology after automatic (bimodal) binarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphologyParams {
    iterations: u32,
    kernel_size: u32,
    mode: MorphMode,
    #[serde(skip)]
    pub(super) notifier: ChangeNotifier,
}

impl Default for MorphologyParams {
    fn default() -> Self {
        Self {
            iterations: 1,
            kernel_size: 3,
            mode: MorphMode::Erode,
            notifier: ChangeNotifier::new(),
        }
    }
}

impl MorphologyParams {
    pub const FIELDS: &'static [&'static str] = &["iterations", "kernel_size", "mode"];

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Side of the square structuring element, in pixels
    pub fn kernel_size(&self) -> u32 {
        self.kernel_size
    }

    pub fn mode(&self) -> MorphMode {
        self.mode
    }

    /// Number of unit (3x3) passes the backend performs.
    ///
    /// A kernel of size `k` is emulated with `(k - 1) / 2` unit passes, at
    /// least one, per requested iteration.
    pub fn effective_iterations(&self) -> u32 {
        let kernel_loops = (self.kernel_size.saturating_sub(1) / 2).max(1);
        self.iterations.saturating_mul(kernel_loops)
    }

    pub fn set_iterations(&mut self, value: u32) -> bool {
        self.notifier.update(
            &mut self.iterations,
            value,
            Operation::Morphology,
            "iterations",
        )
    }

    pub fn set_kernel_size(&mut self, value: u32) -> bool {
        self.notifier.update(
            &mut self.kernel_size,
            value,
            Operation::Morphology,
            "kernel_size",
        )
    }

    pub fn set_mode(&mut self, value: MorphMode) -> bool {
        self.notifier
            .update(&mut self.mode, value, Operation::Morphology, "mode")
    }

    pub fn subscribe<F: FnMut(&FieldChange) + 'static>(&mut self, callback: F) -> SubscriptionId {
        self.notifier.subscribe(callback)
    }

    pub(super) fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "iterations" => Some(FieldValue::Number(self.iterations.into())),
            "kernel_size" => Some(FieldValue::Number(self.kernel_size.into())),
            "mode" => Some(FieldValue::Text(self.mode.name().to_string())),
            _ => None,
        }
    }

    pub(super) fn set_field(
        &mut self,
        name: &str,
        value: &FieldValue,
    ) -> Option<Result<bool, ParamError>> {
        let result = match name {
            "iterations" => value.to_u32("iterations").map(|v| self.set_iterations(v)),
            "kernel_size" => value.to_u32("kernel_size").map(|v| self.set_kernel_size(v)),
            "mode" => value.to_variant("mode").map(|v| self.set_mode(v)),
            _ => return None,
        };
        Some(result)
    }
}

/// Edge filtering with an optional binarization cutoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeParams {
    method: EdgeMethod,
    strength: u8,
    #[serde(skip)]
    pub(super) notifier: ChangeNotifier,
}

impl Default for EdgeParams {
    fn default() -> Self {
        Self {
            method: EdgeMethod::Sobel,
            strength: 25,
            notifier: ChangeNotifier::new(),
        }
    }
}

impl EdgeParams {
    pub const FIELDS: &'static [&'static str] = &["method", "strength"];

    pub fn method(&self) -> EdgeMethod {
        self.method
    }

    /// Binarization cutoff for the edge response; 0 keeps the raw response
    pub fn strength(&self) -> u8 {
        self.strength
    }

    pub fn set_method(&mut self, value: EdgeMethod) -> bool {
        self.notifier
            .update(&mut self.method, value, Operation::EdgeDetection, "method")
    }

    pub fn set_strength(&mut self, value: u8) -> bool {
        self.notifier.update(
            &mut self.strength,
            value,
            Operation::EdgeDetection,
            "strength",
        )
    }

    pub fn subscribe<F: FnMut(&FieldChange) + 'static>(&mut self, callback: F) -> SubscriptionId {
        self.notifier.subscribe(callback)
    }

    pub(super) fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "method" => Some(FieldValue::Text(self.method.name().to_string())),
            "strength" => Some(FieldValue::Number(self.strength.into())),
            _ => None,
        }
    }

    pub(super) fn set_field(
        &mut self,
        name: &str,
        value: &FieldValue,
    ) -> Option<Result<bool, ParamError>> {
        let result = match name {
            "method" => value.to_variant("method").map(|v| self.set_method(v)),
            "strength" => value.to_u8("strength").map(|v| self.set_strength(v)),
            _ => return None,
        };
        Some(result)
    }
}

/// Local-mean adaptive binarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveThresholdParams {
    window_size: u32,
    offset: i32,
    mode: Polarity,
    #[serde(skip)]
    pub(super) notifier: ChangeNotifier,
}

impl Default for AdaptiveThresholdParams {
    fn default() -> Self {
        Self {
            window_size: 35,
            offset: 10,
            mode: Polarity::Bright,
            notifier: ChangeNotifier::new(),
        }
    }
}

impl AdaptiveThresholdParams {
    pub const FIELDS: &'static [&'static str] = &["window_size", "offset", "mode"];

    /// Largest accepted neighbourhood side
    pub const MAX_WINDOW_SIZE: u32 = 1023;

    /// Side of the neighbourhood used for the local mean, in pixels
    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    /// Margin a pixel must clear beyond the local mean
    pub fn offset(&self) -> i32 {
        self.offset
    }

    pub fn mode(&self) -> Polarity {
        self.mode
    }

    /// Clamped to `1..=MAX_WINDOW_SIZE`.
    pub fn set_window_size(&mut self, value: u32) -> bool {
        self.notifier.update(
            &mut self.window_size,
            value.clamp(1, Self::MAX_WINDOW_SIZE),
            Operation::AdaptiveThreshold,
            "window_size",
        )
    }

    pub fn set_offset(&mut self, value: i32) -> bool {
        self.notifier
            .update(&mut self.offset, value, Operation::AdaptiveThreshold, "offset")
    }

    pub fn set_mode(&mut self, value: Polarity) -> bool {
        self.notifier
            .update(&mut self.mode, value, Operation::AdaptiveThreshold, "mode")
    }

    pub fn subscribe<F: FnMut(&FieldChange) + 'static>(&mut self, callback: F) -> SubscriptionId {
        self.notifier.subscribe(callback)
    }

    pub(super) fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "window_size" => Some(FieldValue::Number(self.window_size.into())),
            "offset" => Some(FieldValue::Number(self.offset.into())),
            "mode" => Some(FieldValue::Text(self.mode.name().to_string())),
            _ => None,
        }
    }

    pub(super) fn set_field(
        &mut self,
        name: &str,
        value: &FieldValue,
    ) -> Option<Result<bool, ParamError>> {
        let result = match name {
            "window_size" => value
                .to_integer("window_size", 1.0, Self::MAX_WINDOW_SIZE as f64)
                .map(|v| self.set_window_size(v as u32)),
            "offset" => value.to_i32("offset").map(|v| self.set_offset(v)),
            "mode" => value.to_variant("mode").map(|v| self.set_mode(v)),
            _ => return None,
        };
        Some(result)
    }
}

/// Range binarization followed by connected-component analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobParams {
    threshold_min: u8,
    threshold_max: u8,
    min_area: u32,
    draw_box: bool,
    #[serde(skip)]
    pub(super) notifier: ChangeNotifier,
}

impl Default for BlobParams {
    fn default() -> Self {
        Self {
            threshold_min: 50,
            threshold_max: 200,
            min_area: 100,
            draw_box: true,
            notifier: ChangeNotifier::new(),
        }
    }
}

impl BlobParams {
    pub const FIELDS: &'static [&'static str] =
        &["threshold_min", "threshold_max", "min_area", "draw_box"];

    pub fn threshold_min(&self) -> u8 {
        self.threshold_min
    }

    pub fn threshold_max(&self) -> u8 {
        self.threshold_max
    }

    /// Smallest pixel count a component needs to be reported
    pub fn min_area(&self) -> u32 {
        self.min_area
    }

    /// Whether to render boxes and centroids onto the result
    pub fn draw_box(&self) -> bool {
        self.draw_box
    }

    pub fn set_threshold_min(&mut self, value: u8) -> bool {
        self.notifier
            .update(&mut self.threshold_min, value, Operation::Blob, "threshold_min")
    }

    pub fn set_threshold_max(&mut self, value: u8) -> bool {
        self.notifier
            .update(&mut self.threshold_max, value, Operation::Blob, "threshold_max")
    }

    pub fn set_min_area(&mut self, value: u32) -> bool {
        self.notifier
            .update(&mut self.min_area, value, Operation::Blob, "min_area")
    }

    pub fn set_draw_box(&mut self, value: bool) -> bool {
        self.notifier
            .update(&mut self.draw_box, value, Operation::Blob, "draw_box")
    }

    pub fn subscribe<F: FnMut(&FieldChange) + 'static>(&mut self, callback: F) -> SubscriptionId {
        self.notifier.subscribe(callback)
    }

    pub(super) fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "threshold_min" => Some(FieldValue::Number(self.threshold_min.into())),
            "threshold_max" => Some(FieldValue::Number(self.threshold_max.into())),
            "min_area" => Some(FieldValue::Number(self.min_area.into())),
            "draw_box" => Some(FieldValue::Bool(self.draw_box)),
            _ => None,
        }
    }

    pub(super) fn set_field(
        &mut self,
        name: &str,
        value: &FieldValue,
    ) -> Option<Result<bool, ParamError>> {
        let result = match name {
            "threshold_min" => value
                .to_u8("threshold_min")
                .map(|v| self.set_threshold_min(v)),
            "threshold_max" => value
                .to_u8("threshold_max")
                .map(|v| self.set_threshold_max(v)),
            "min_area" => value.to_u32("min_area").map(|v| self.set_min_area(v)),
            "draw_box" => value.to_bool("draw_box").map(|v| self.set_draw_box(v)),
            _ => return None,
        };
        Some(result)
    }
}

/// Geometric model definition and search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometricMatchParams {
    smoothness: f64,
    min_score: f64,
    #[serde(skip)]
    pub(super) notifier: ChangeNotifier,
}

impl Default for GeometricMatchParams {
    fn default() -> Self {
        Self {
            smoothness: 50.0,
            min_score: 60.0,
            notifier: ChangeNotifier::new(),
        }
    }
}

impl GeometricMatchParams {
    pub const FIELDS: &'static [&'static str] = &["smoothness", "min_score"];

    /// Both fields are percentages
    pub const MAX_PERCENT: f64 = 100.0;

    /// Model edge smoothing, 0 to 100; higher ignores finer edges
    pub fn smoothness(&self) -> f64 {
        self.smoothness
    }

    /// Minimum match score in percent, 0 to 100
    pub fn min_score(&self) -> f64 {
        self.min_score
    }

    /// Clamped to `0..=100`; NaN is ignored.
    pub fn set_smoothness(&mut self, value: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        self.notifier.update(
            &mut self.smoothness,
            value.clamp(0.0, Self::MAX_PERCENT),
            Operation::GeometricMatch,
            "smoothness",
        )
    }

    /// Clamped to `0..=100`; NaN is ignored.
    pub fn set_min_score(&mut self, value: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        self.notifier.update(
            &mut self.min_score,
            value.clamp(0.0, Self::MAX_PERCENT),
            Operation::GeometricMatch,
            "min_score",
        )
    }

    pub fn subscribe<F: FnMut(&FieldChange) + 'static>(&mut self, callback: F) -> SubscriptionId {
        self.notifier.subscribe(callback)
    }

    pub(super) fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "smoothness" => Some(FieldValue::Number(self.smoothness)),
            "min_score" => Some(FieldValue::Number(self.min_score)),
            _ => None,
        }
    }

    pub(super) fn set_field(
        &mut self,
        name: &str,
        value: &FieldValue,
    ) -> Option<Result<bool, ParamError>> {
        let result = match name {
            "smoothness" => value
                .to_f64_in("smoothness", 0.0, Self::MAX_PERCENT)
                .map(|v| self.set_smoothness(v)),
            "min_score" => value
                .to_f64_in("min_score", 0.0, Self::MAX_PERCENT)
                .map(|v| self.set_min_score(v)),
            _ => return None,
        };
        Some(result)
    }
}

/// ROI drawing mode. Carries no tunables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoiParams {
    #[serde(skip)]
    pub(super) notifier: ChangeNotifier,
}

impl RoiParams {
    pub const FIELDS: &'static [&'static str] = &[];
}
