//! Integer regions and zero-copy views over a parent image.
//!
//! Crop and export never copy the parent until asked to: a [`RegionView`]
//! records an offset and extent and only [`RegionView::materialize`] allocates.
//!
//! # Validity
//!
//! A region is usable when both sides are positive and it lies entirely
//! inside the parent. Anything else is rejected up front with `None`, which
//! callers treat as a silent no-op.

use image::{ImageBuffer, Pixel};
use serde::{Deserialize, Serialize};

use crate::viewport::RoiRect;

/// Pixel rectangle with signed fields, as handed over by a pointer gesture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl RegionRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Integer pixels of an image-space ROI, truncated toward zero.
    pub fn from_roi(roi: &RoiRect) -> Self {
        Self {
            x: roi.x as i32,
            y: roi.y as i32,
            width: roi.width as i32,
            height: roi.height as i32,
        }
    }

    /// The region as `(x, y, width, height)` in unsigned pixels, if it has a
    /// positive size and fits inside `parent_width x parent_height`.
    pub fn within(&self, parent_width: u32, parent_height: u32) -> Option<(u32, u32, u32, u32)> {
        if self.x < 0 || self.y < 0 || self.width <= 0 || self.height <= 0 {
            return None;
        }
        let (x, y) = (self.x as u32, self.y as u32);
        let (w, h) = (self.width as u32, self.height as u32);
        let right = x.checked_add(w)?;
        let bottom = y.checked_add(h)?;
        (right <= parent_width && bottom <= parent_height).then_some((x, y, w, h))
    }
}

/// Borrowed `(offset, extent)` window into a parent image.
#[derive(Clone, Copy)]
pub struct RegionView<'a, P: Pixel> {
    parent: &'a ImageBuffer<P, Vec<P::Subpixel>>,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl<'a, P: Pixel> RegionView<'a, P> {
    /// View `rect` of `parent`, or `None` when the rect is empty or out of bounds.
    pub fn new(parent: &'a ImageBuffer<P, Vec<P::Subpixel>>, rect: RegionRect) -> Option<Self> {
        let (x, y, width, height) = rect.within(parent.width(), parent.height())?;
        Some(Self {
            parent,
            x,
            y,
            width,
            height,
        })
    }

    pub fn offset(&self) -> (u32, u32) {
        (self.x, self.y)
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Copy the viewed pixels into a new, independent image.
    pub fn materialize(&self) -> ImageBuffer<P, Vec<P::Subpixel>> {
        let (x0, y0) = (self.x, self.y);
        ImageBuffer::from_fn(self.width, self.height, |x, y| {
            *self.parent.get_pixel(x0 + x, y0 + y)
        })
    }
}
