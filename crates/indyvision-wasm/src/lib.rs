//! IndyVision WASM - WebAssembly bindings for IndyVision
//!
//! This crate exposes the indyvision-core inspection pipeline to a
//! JavaScript/TypeScript shell.
//!
//! # Module Structure
//!
//! - `params` - Operation parameters with change subscriptions
//! - `pipeline` - Load, apply, crop, export and model definition
//! - `viewport` - Pan/zoom transform and ROI drawing
//! - `types` - WASM-compatible wrapper types for display buffers
//!
//! # Usage
//!
//! ```typescript
//! import init, { JsPipeline, JsParameters, JsViewport } from '@indyvision/wasm';
//!
//! // Initialize WASM module (must call first)
//! await init();
//!
//! const pipeline = new JsPipeline();
//! pipeline.load_image(bytes);
//! const status = pipeline.apply('Threshold', new JsParameters('Threshold'));
//! console.log(status);
//! ```

use wasm_bindgen::prelude::*;

mod params;
mod pipeline;
mod types;
mod viewport;

// Re-export public types
pub use params::JsParameters;
pub use pipeline::JsPipeline;
pub use types::JsDisplayImage;
pub use viewport::JsViewport;

/// Initialize the WASM module (called automatically on load)
#[wasm_bindgen(start)]
pub fn init() {
    // A second init (e.g. hot reload) finds the logger already set
    let _ = console_log::init_with_level(log::Level::Info);
}

/// Get the version of the WASM module
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Names accepted by `JsParameters` and `JsPipeline.apply`, in menu order.
#[wasm_bindgen]
pub fn operation_names() -> Vec<String> {
    indyvision_core::Operation::ALL
        .iter()
        .map(|op| op.name().to_string())
        .collect()
}
