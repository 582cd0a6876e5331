//! Operation parameter bindings.
//!
//! A `JsParameters` holds the parameter record for one operation. Controls
//! bind to fields by name and can subscribe to change notifications, which
//! arrive as `callback(operationName, fieldName)`.

use indyvision_core::params::{FieldValue, ParameterSet, SubscriptionId};
use indyvision_core::select_operation;
use wasm_bindgen::prelude::*;

/// Parameters for the selected operation, or none for "no operation".
#[wasm_bindgen]
pub struct JsParameters {
    inner: Option<ParameterSet>,
}

#[wasm_bindgen]
impl JsParameters {
    /// Fresh defaults for the operation called `name`.
    ///
    /// Unknown names give an empty parameter set.
    #[wasm_bindgen(constructor)]
    pub fn new(name: &str) -> JsParameters {
        JsParameters {
            inner: select_operation(name),
        }
    }

    /// True when no operation is selected.
    #[wasm_bindgen(getter)]
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Display name of the selected operation.
    #[wasm_bindgen(getter)]
    pub fn operation(&self) -> Option<String> {
        self.inner.as_ref().map(|p| p.operation().name().to_string())
    }

    /// Names of the editable fields.
    pub fn field_names(&self) -> Vec<String> {
        self.inner
            .as_ref()
            .map(|p| p.field_names().iter().map(|f| f.to_string()).collect())
            .unwrap_or_default()
    }

    /// Read a field; `undefined` when there is no such field.
    pub fn get(&self, field: &str) -> Result<JsValue, JsValue> {
        match self.inner.as_ref().and_then(|p| p.field(field)) {
            Some(value) => serde_wasm_bindgen::to_value(&value)
                .map_err(|e| JsValue::from_str(&e.to_string())),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    /// Write a field from a boolean, number or string.
    ///
    /// Returns `true` if the value changed. Subscribers are notified only then.
    pub fn set(&mut self, field: &str, value: JsValue) -> Result<bool, JsValue> {
        let value = if let Some(b) = value.as_bool() {
            FieldValue::Bool(b)
        } else if let Some(n) = value.as_f64() {
            FieldValue::Number(n)
        } else if let Some(s) = value.as_string() {
            FieldValue::Text(s)
        } else {
            return Err(JsValue::from_str(&format!(
                "Unsupported value for field '{}'",
                field
            )));
        };
        self.set_value(field, &value)
            .map_err(|e| JsValue::from_str(&e))
    }

    /// Register `callback(operation, field)` for value changes.
    ///
    /// Returns an id for `unsubscribe`, or `undefined` when no operation is
    /// selected. Ids are whole numbers, exact below 2^53.
    pub fn subscribe(&mut self, callback: js_sys::Function) -> Option<f64> {
        let params = self.inner.as_mut()?;
        let id = params.subscribe(move |change| {
            let operation = JsValue::from_str(change.operation.name());
            let field = JsValue::from_str(change.field);
            if let Err(e) = callback.call2(&JsValue::NULL, &operation, &field) {
                log::warn!("parameter change callback threw: {:?}", e);
            }
        });
        Some(id.as_u64() as f64)
    }

    /// Remove a subscription. Returns `false` for unknown ids.
    pub fn unsubscribe(&mut self, id: f64) -> bool {
        match subscription_id(id) {
            Some(id) => self.inner.as_mut().is_some_and(|p| p.unsubscribe(id)),
            None => false,
        }
    }

    /// Serialize all values, tagged with the operation.
    pub fn to_object(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.inner).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Rebuild parameters from `to_object` output. Missing fields take defaults.
    pub fn from_object(value: JsValue) -> Result<JsParameters, JsValue> {
        let inner: Option<ParameterSet> =
            serde_wasm_bindgen::from_value(value).map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(JsParameters { inner })
    }
}

/// Only whole numbers in `[0, 2^53)` name a subscription.
fn subscription_id(id: f64) -> Option<SubscriptionId> {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    (id.fract() == 0.0 && (0.0..MAX_EXACT).contains(&id))
        .then(|| SubscriptionId::from_u64(id as u64))
}

impl JsParameters {
    pub(crate) fn inner(&self) -> Option<&ParameterSet> {
        self.inner.as_ref()
    }

    pub(crate) fn set_value(&mut self, field: &str, value: &FieldValue) -> Result<bool, String> {
        let params = self
            .inner
            .as_mut()
            .ok_or_else(|| "No operation selected".to_string())?;
        params.set_field(field, value).map_err(|e| e.to_string())
    }
}
