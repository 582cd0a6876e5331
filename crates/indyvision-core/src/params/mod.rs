//! Operation parameters and operation selection.
//!
//! Each inspection operation has its own parameter record with defaults.
//! Selecting an operation always builds a fresh, fully defaulted record:
//! values never carry over from a previous selection.
//!
//! ## Change notification
//!
//! Parameter records are observable. Subscribers receive a [`FieldChange`]
//! whenever a setter stores a value that differs from the current one;
//! writing the same value again is silent.
//!
//! ## Field access by name
//!
//! Presentation layers that bind controls by name use
//! [`ParameterSet::field`] and [`ParameterSet::set_field`] with a loosely
//! typed [`FieldValue`]. Values are range checked against the field's type.

pub mod notify;
mod variants;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use notify::{ChangeNotifier, FieldChange, SubscriptionId};
pub use variants::{
    AdaptiveThresholdParams, BlobParams, EdgeParams, GeometricMatchParams, MorphologyParams,
    RoiParams, ThresholdParams,
};

/// The inspection operations known to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Threshold,
    Morphology,
    EdgeDetection,
    AdaptiveThreshold,
    Blob,
    GeometricMatch,
    Roi,
}

impl Operation {
    /// All operations in menu order.
    pub const ALL: [Operation; 7] = [
        Operation::Threshold,
        Operation::AdaptiveThreshold,
        Operation::Morphology,
        Operation::EdgeDetection,
        Operation::Blob,
        Operation::GeometricMatch,
        Operation::Roi,
    ];

    /// Resolve an operation from a user-facing name.
    ///
    /// Matching ignores case, spaces, underscores and hyphens, so
    /// `"Edge Detection"`, `"edge_detection"` and `"EdgeDetection"` are the
    /// same. Returns `None` for unknown names and for "no operation".
    pub fn from_name(name: &str) -> Option<Self> {
        let key: String = name
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();

        match key.as_str() {
            "threshold" => Some(Operation::Threshold),
            "morphology" => Some(Operation::Morphology),
            "edge" | "edgedetection" => Some(Operation::EdgeDetection),
            "adaptivethreshold" => Some(Operation::AdaptiveThreshold),
            "blob" | "blobanalysis" => Some(Operation::Blob),
            "geometricmatch" | "gmf" | "geometricmodelfinder" => Some(Operation::GeometricMatch),
            "roi" => Some(Operation::Roi),
            _ => None,
        }
    }

    /// Display name, suitable for a selection menu.
    pub fn name(self) -> &'static str {
        match self {
            Operation::Threshold => "Threshold",
            Operation::Morphology => "Morphology",
            Operation::EdgeDetection => "Edge Detection",
            Operation::AdaptiveThreshold => "Adaptive Threshold",
            Operation::Blob => "Blob Analysis",
            Operation::GeometricMatch => "Geometric Match",
            Operation::Roi => "ROI",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Morphological operation applied to a binarized image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MorphMode {
    #[default]
    Erode,
    Dilate,
    Open,
    Close,
}

/// Edge detection kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EdgeMethod {
    #[default]
    Sobel,
    Prewitt,
    Laplacian,
}

/// Which side of the local mean counts as foreground in adaptive thresholding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Polarity {
    /// Objects brighter than their surroundings
    #[default]
    Bright,
    /// Objects darker than their surroundings
    Dark,
}

impl MorphMode {
    pub fn name(self) -> &'static str {
        match self {
            MorphMode::Erode => "Erode",
            MorphMode::Dilate => "Dilate",
            MorphMode::Open => "Open",
            MorphMode::Close => "Close",
        }
    }
}

impl EdgeMethod {
    pub fn name(self) -> &'static str {
        match self {
            EdgeMethod::Sobel => "Sobel",
            EdgeMethod::Prewitt => "Prewitt",
            EdgeMethod::Laplacian => "Laplacian",
        }
    }
}

impl Polarity {
    pub fn name(self) -> &'static str {
        match self {
            Polarity::Bright => "Bright",
            Polarity::Dark => "Dark",
        }
    }
}

impl FromStr for MorphMode {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "erode" | "erosion" => Ok(MorphMode::Erode),
            "dilate" | "dilation" => Ok(MorphMode::Dilate),
            "open" | "opening" => Ok(MorphMode::Open),
            "close" | "closing" => Ok(MorphMode::Close),
            _ => Err(ParamError::UnknownVariant {
                field: "mode",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for EdgeMethod {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sobel" => Ok(EdgeMethod::Sobel),
            "prewitt" => Ok(EdgeMethod::Prewitt),
            "laplacian" => Ok(EdgeMethod::Laplacian),
            _ => Err(ParamError::UnknownVariant {
                field: "method",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for Polarity {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bright" => Ok(Polarity::Bright),
            "dark" => Ok(Polarity::Dark),
            _ => Err(ParamError::UnknownVariant {
                field: "mode",
                value: s.to_string(),
            }),
        }
    }
}

/// Errors from name-based field access.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    /// The parameter set has no field with this name
    #[error("{operation} has no field named '{field}'")]
    UnknownField { operation: Operation, field: String },

    /// The value has the wrong kind for the field
    #[error("field '{field}' expects {expected}")]
    TypeMismatch {
        field: &'static str,
        expected: &'static str,
    },

    /// A numeric value does not fit the field's type
    #[error("value {value} is out of range for field '{field}' ({min} to {max})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// A text value does not name a variant of the field's enum
    #[error("'{value}' is not a valid value for field '{field}'")]
    UnknownVariant { field: &'static str, value: String },
}

/// Loosely typed field value exchanged with presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub(crate) fn to_bool(&self, field: &'static str) -> Result<bool, ParamError> {
        match self {
            FieldValue::Bool(b) => Ok(*b),
            _ => Err(ParamError::TypeMismatch {
                field,
                expected: "a boolean",
            }),
        }
    }

    pub(crate) fn to_f64(&self, field: &'static str) -> Result<f64, ParamError> {
        match self {
            FieldValue::Number(n) if n.is_finite() => Ok(*n),
            _ => Err(ParamError::TypeMismatch {
                field,
                expected: "a finite number",
            }),
        }
    }

    /// Integral number within `[min, max]`.
    pub(crate) fn to_integer(
        &self,
        field: &'static str,
        min: f64,
        max: f64,
    ) -> Result<f64, ParamError> {
        let value = self.to_f64(field)?;
        if value.fract() != 0.0 {
            return Err(ParamError::TypeMismatch {
                field,
                expected: "an integer",
            });
        }
        if value < min || value > max {
            return Err(ParamError::OutOfRange {
                field,
                value,
                min,
                max,
            });
        }
        Ok(value)
    }

    /// Finite number within `[min, max]`.
    pub(crate) fn to_f64_in(
        &self,
        field: &'static str,
        min: f64,
        max: f64,
    ) -> Result<f64, ParamError> {
        let value = self.to_f64(field)?;
        if value < min || value > max {
            return Err(ParamError::OutOfRange {
                field,
                value,
                min,
                max,
            });
        }
        Ok(value)
    }

    pub(crate) fn to_u8(&self, field: &'static str) -> Result<u8, ParamError> {
        self.to_integer(field, 0.0, u8::MAX as f64).map(|v| v as u8)
    }

    pub(crate) fn to_u32(&self, field: &'static str) -> Result<u32, ParamError> {
        self.to_integer(field, 0.0, u32::MAX as f64).map(|v| v as u32)
    }

    pub(crate) fn to_i32(&self, field: &'static str) -> Result<i32, ParamError> {
        self.to_integer(field, i32::MIN as f64, i32::MAX as f64)
            .map(|v| v as i32)
    }

    pub(crate) fn to_variant<T>(&self, field: &'static str) -> Result<T, ParamError>
    where
        T: FromStr<Err = ParamError>,
    {
        match self {
            FieldValue::Text(s) => s.parse(),
            _ => Err(ParamError::TypeMismatch {
                field,
                expected: "a text value",
            }),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// Tagged parameter record, one variant per operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum ParameterSet {
    Threshold(ThresholdParams),
    Morphology(MorphologyParams),
    EdgeDetection(EdgeParams),
    AdaptiveThreshold(AdaptiveThresholdParams),
    Blob(BlobParams),
    GeometricMatch(GeometricMatchParams),
    Roi(RoiParams),
}

impl ParameterSet {
    /// Fully defaulted parameters for `operation`.
    pub fn defaults_for(operation: Operation) -> Self {
        match operation {
            Operation::Threshold => ParameterSet::Threshold(ThresholdParams::default()),
            Operation::Morphology => ParameterSet::Morphology(MorphologyParams::default()),
            Operation::EdgeDetection => ParameterSet::EdgeDetection(EdgeParams::default()),
            Operation::AdaptiveThreshold => {
                ParameterSet::AdaptiveThreshold(AdaptiveThresholdParams::default())
            }
            Operation::Blob => ParameterSet::Blob(BlobParams::default()),
            Operation::GeometricMatch => {
                ParameterSet::GeometricMatch(GeometricMatchParams::default())
            }
            Operation::Roi => ParameterSet::Roi(RoiParams::default()),
        }
    }

    /// The operation this record parameterizes.
    pub fn operation(&self) -> Operation {
        match self {
            ParameterSet::Threshold(_) => Operation::Threshold,
            ParameterSet::Morphology(_) => Operation::Morphology,
            ParameterSet::EdgeDetection(_) => Operation::EdgeDetection,
            ParameterSet::AdaptiveThreshold(_) => Operation::AdaptiveThreshold,
            ParameterSet::Blob(_) => Operation::Blob,
            ParameterSet::GeometricMatch(_) => Operation::GeometricMatch,
            ParameterSet::Roi(_) => Operation::Roi,
        }
    }

    fn notifier_mut(&mut self) -> &mut ChangeNotifier {
        match self {
            ParameterSet::Threshold(p) => &mut p.notifier,
            ParameterSet::Morphology(p) => &mut p.notifier,
            ParameterSet::EdgeDetection(p) => &mut p.notifier,
            ParameterSet::AdaptiveThreshold(p) => &mut p.notifier,
            ParameterSet::Blob(p) => &mut p.notifier,
            ParameterSet::GeometricMatch(p) => &mut p.notifier,
            ParameterSet::Roi(p) => &mut p.notifier,
        }
    }

    /// Subscribe to field changes on whichever variant this is.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&FieldChange) + 'static,
    {
        self.notifier_mut().subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier_mut().unsubscribe(id)
    }

    /// Names of the fields this variant exposes.
    pub fn field_names(&self) -> &'static [&'static str] {
        match self {
            ParameterSet::Threshold(_) => ThresholdParams::FIELDS,
            ParameterSet::Morphology(_) => MorphologyParams::FIELDS,
            ParameterSet::EdgeDetection(_) => EdgeParams::FIELDS,
            ParameterSet::AdaptiveThreshold(_) => AdaptiveThresholdParams::FIELDS,
            ParameterSet::Blob(_) => BlobParams::FIELDS,
            ParameterSet::GeometricMatch(_) => GeometricMatchParams::FIELDS,
            ParameterSet::Roi(_) => RoiParams::FIELDS,
        }
    }

    /// Read a field by name.
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        match self {
            ParameterSet::Threshold(p) => p.field(name),
            ParameterSet::Morphology(p) => p.field(name),
            ParameterSet::EdgeDetection(p) => p.field(name),
            ParameterSet::AdaptiveThreshold(p) => p.field(name),
            ParameterSet::Blob(p) => p.field(name),
            ParameterSet::GeometricMatch(p) => p.field(name),
            ParameterSet::Roi(_) => None,
        }
    }

    /// Write a field by name through its setter.
    ///
    /// Returns `Ok(true)` if the value changed (and subscribers were notified),
    /// `Ok(false)` if it was already equal.
    pub fn set_field(&mut self, name: &str, value: &FieldValue) -> Result<bool, ParamError> {
        let operation = self.operation();
        let result = match self {
            ParameterSet::Threshold(p) => p.set_field(name, value),
            ParameterSet::Morphology(p) => p.set_field(name, value),
            ParameterSet::EdgeDetection(p) => p.set_field(name, value),
            ParameterSet::AdaptiveThreshold(p) => p.set_field(name, value),
            ParameterSet::Blob(p) => p.set_field(name, value),
            ParameterSet::GeometricMatch(p) => p.set_field(name, value),
            ParameterSet::Roi(_) => None,
        };
        result.unwrap_or_else(|| {
            Err(ParamError::UnknownField {
                operation,
                field: name.to_string(),
            })
        })
    }
}

/// Build the default parameters for the operation called `name`.
///
/// Returns `None` when the name is unknown or means "no operation"; the
/// presentation layer then shows no parameter controls.
pub fn select_operation(name: &str) -> Option<ParameterSet> {
    let selected = Operation::from_name(name).map(ParameterSet::defaults_for);
    log::debug!(
        "selected operation {:?} -> {:?}",
        name,
        selected.as_ref().map(ParameterSet::operation)
    );
    selected
}
