//! WASM-compatible wrapper types for image data.
//!
//! Images cross into JavaScript as stride-aligned display buffers, ready to be
//! copied into an `ImageData` or a texture.

use indyvision_core::DisplayBuffer;
use wasm_bindgen::prelude::*;

/// A displayable image for JavaScript.
///
/// Rows are padded to a 4-byte `stride`; `channels` is 1 for grayscale
/// results and 3 for results carrying color overlays.
///
/// # Memory Management
///
/// The pixel data is stored in WASM memory. `pixels()` and `rgba()` copy it
/// into JavaScript memory as a `Uint8Array`.
#[wasm_bindgen]
pub struct JsDisplayImage {
    buffer: DisplayBuffer,
}

#[wasm_bindgen]
impl JsDisplayImage {
    /// Image width in pixels
    #[wasm_bindgen(getter)]
    pub fn width(&self) -> u32 {
        self.buffer.width
    }

    /// Image height in pixels
    #[wasm_bindgen(getter)]
    pub fn height(&self) -> u32 {
        self.buffer.height
    }

    /// Samples per pixel (1 = gray, 3 = RGB)
    #[wasm_bindgen(getter)]
    pub fn channels(&self) -> u8 {
        self.buffer.channels
    }

    /// Bytes per row including padding
    #[wasm_bindgen(getter)]
    pub fn stride(&self) -> usize {
        self.buffer.stride
    }

    /// Number of bytes in the pixel buffer (`stride * height`)
    #[wasm_bindgen(getter)]
    pub fn byte_length(&self) -> usize {
        self.buffer.pixels.len()
    }

    /// Stride-aligned pixel data as Uint8Array (copied).
    pub fn pixels(&self) -> Vec<u8> {
        self.buffer.pixels.clone()
    }

    /// Tightly packed RGBA pixels (4 bytes per pixel), for `ImageData`.
    pub fn rgba(&self) -> Vec<u8> {
        let b = &self.buffer;
        let mut out = Vec::with_capacity(b.width as usize * b.height as usize * 4);
        for y in 0..b.height {
            let Some(row) = b.row(y) else { break };
            match b.channels {
                1 => row.iter().for_each(|&v| out.extend_from_slice(&[v, v, v, 255])),
                _ => row
                    .chunks_exact(b.channels as usize)
                    .for_each(|px| out.extend_from_slice(&[px[0], px[1], px[2], 255])),
            }
        }
        out
    }

    /// Explicitly free WASM memory.
    ///
    /// This is optional - wasm-bindgen's finalizer will handle cleanup automatically.
    pub fn free(self) {}
}

impl From<DisplayBuffer> for JsDisplayImage {
    fn from(buffer: DisplayBuffer) -> Self {
        Self { buffer }
    }
}
