//! Connected-component statistics from a label image.
//!
//! Segmentation (assigning a label to every connected foreground pixel) is the
//! imaging backend's job. This module only aggregates: one raster pass over
//! the label buffer builds per-label bounding boxes, areas and coordinate sums,
//! then an area filter keeps the qualifying components.
//!
//! # Label convention
//!
//! - `0` is background
//! - every positive value identifies one component
//!
//! # Ordering
//!
//! Blobs are returned in ascending id order, but the statistics of each blob
//! do not depend on iteration order. Callers should compare results as sets.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::LabelImage;

/// Statistics for one connected component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    /// Label value in the source label image
    pub id: u32,
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
    /// Number of pixels carrying this label (always >= 1)
    pub area: u64,
    /// Sum of x coordinates over all pixels
    pub sum_x: u64,
    /// Sum of y coordinates over all pixels
    pub sum_y: u64,
}

impl Blob {
    fn seed(id: u32, x: u32, y: u32) -> Self {
        Self {
            id,
            min_x: x,
            max_x: x,
            min_y: y,
            max_y: y,
            area: 1,
            sum_x: x as u64,
            sum_y: y as u64,
        }
    }

    #[inline]
    fn accumulate(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
        self.area += 1;
        self.sum_x += x as u64;
        self.sum_y += y as u64;
    }

    /// Mean pixel position, floored to integer pixel coordinates.
    pub fn centroid(&self) -> (u32, u32) {
        // sum / area never exceeds the max coordinate, so the narrowing is lossless
        ((self.sum_x / self.area) as u32, (self.sum_y / self.area) as u32)
    }

    /// Width of the tight bounding box.
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    /// Height of the tight bounding box.
    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    /// Bounding box grown by `pad` pixels, clamped to the image.
    pub fn padded_box(&self, pad: u32, width: u32, height: u32) -> BlobBox {
        BlobBox {
            min_x: self.min_x.saturating_sub(pad),
            min_y: self.min_y.saturating_sub(pad),
            max_x: self
                .max_x
                .saturating_add(pad)
                .min(width.saturating_sub(1)),
            max_y: self
                .max_y
                .saturating_add(pad)
                .min(height.saturating_sub(1)),
        }
    }

    /// Text shown next to the centroid: `"(cx, cy, area)"`.
    pub fn label(&self) -> String {
        let (cx, cy) = self.centroid();
        format!("({}, {}, {})", cx, cy, self.area)
    }

    /// Drawing geometry for this blob.
    pub fn overlay(&self, pad: u32, width: u32, height: u32) -> BlobOverlay {
        BlobOverlay {
            id: self.id,
            bbox: self.padded_box(pad, width, height),
            centroid: self.centroid(),
            label: self.label(),
        }
    }
}

/// Inclusive pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

/// Geometry a renderer needs to annotate one blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobOverlay {
    pub id: u32,
    pub bbox: BlobBox,
    pub centroid: (u32, u32),
    pub label: String,
}

/// Result of a full analysis pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobAnalysis {
    /// Components with `area >= min_area`
    pub blobs: Vec<Blob>,
    /// Number of components found before filtering
    pub total: usize,
}

impl BlobAnalysis {
    /// Overlays for every qualifying blob.
    pub fn overlays(&self, pad: u32, width: u32, height: u32) -> Vec<BlobOverlay> {
        self.blobs
            .iter()
            .map(|b| b.overlay(pad, width, height))
            .collect()
    }
}

/// Aggregate per-label statistics and keep components with `area >= min_area`.
///
/// # Arguments
/// * `labels` - Label buffer in row-major order (`width * height` entries)
/// * `width` - Image width in pixels
/// * `height` - Image height in pixels
/// * `min_area` - Inclusive area threshold
///
/// # Performance
/// O(width * height) for the statistics pass plus O(components) for the
/// filter. Memory is one accumulator per distinct label.
pub fn analyze(labels: &[u32], width: u32, height: u32, min_area: u64) -> BlobAnalysis {
    let expected_len = (width as usize) * (height as usize);
    if expected_len == 0 || labels.is_empty() {
        return BlobAnalysis::default();
    }

    debug_assert!(
        labels.len() == expected_len,
        "Label buffer size mismatch. Expected {}, got {}",
        expected_len,
        labels.len()
    );

    let mut accumulators: HashMap<u32, Blob> = HashMap::new();

    for (y, row) in labels
        .chunks_exact(width as usize)
        .take(height as usize)
        .enumerate()
    {
        let y = y as u32;
        for (x, &label) in row.iter().enumerate() {
            if label == 0 {
                continue;
            }
            let x = x as u32;
            accumulators
                .entry(label)
                .and_modify(|blob| blob.accumulate(x, y))
                .or_insert_with(|| Blob::seed(label, x, y));
        }
    }

    let total = accumulators.len();
    let mut blobs: Vec<Blob> = accumulators
        .into_values()
        .filter(|blob| blob.area >= min_area)
        .collect();
    blobs.sort_unstable_by_key(|blob| blob.id);

    log::debug!(
        "blob analysis: {} of {} components have area >= {}",
        blobs.len(),
        total,
        min_area
    );

    BlobAnalysis { blobs, total }
}

/// Qualifying blobs only. See [`analyze`].
pub fn extract_blobs(labels: &[u32], width: u32, height: u32, min_area: u64) -> Vec<Blob> {
    analyze(labels, width, height, min_area).blobs
}

/// [`analyze`] over a backend label image.
pub fn analyze_label_image(labels: &LabelImage, min_area: u64) -> BlobAnalysis {
    let (width, height) = labels.dimensions();
    analyze(labels.as_raw(), width, height, min_area)
}


// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Random label images with a handful of distinct labels.
    fn label_image_strategy() -> impl Strategy<Value = (u32, u32, Vec<u32>)> {
        (1u32..=24, 1u32..=24).prop_flat_map(|(w, h)| {
            let len = (w * h) as usize;
            (Just(w), Just(h), prop::collection::vec(0u32..6, len))
        })
    }

    proptest! {
        /// Property: total area equals the number of labelled pixels.
        #[test]
        fn prop_area_sum_matches_foreground(
            (w, h, labels) in label_image_strategy(),
        ) {
            let analysis = analyze(&labels, w, h, 0);
            let total_area: u64 = analysis.blobs.iter().map(|b| b.area).sum();
            let foreground = labels.iter().filter(|&&l| l != 0).count() as u64;

            prop_assert_eq!(total_area, foreground);
            prop_assert!(total_area <= (w as u64) * (h as u64));
            prop_assert_eq!(analysis.total, analysis.blobs.len());
        }

        /// Property: the centroid lies inside the bounding box.
        #[test]
        fn prop_centroid_within_bbox(
            (w, h, labels) in label_image_strategy(),
        ) {
            for blob in extract_blobs(&labels, w, h, 0) {
                let (cx, cy) = blob.centroid();
                prop_assert!(blob.min_x <= cx && cx <= blob.max_x);
                prop_assert!(blob.min_y <= cy && cy <= blob.max_y);
            }
        }

        /// Property: area is positive and fits the bounding box.
        #[test]
        fn prop_area_bounded_by_bbox(
            (w, h, labels) in label_image_strategy(),
        ) {
            for blob in extract_blobs(&labels, w, h, 0) {
                prop_assert!(blob.area >= 1);
                prop_assert!(blob.min_x <= blob.max_x);
                prop_assert!(blob.min_y <= blob.max_y);
                prop_assert!(blob.area <= (blob.width() as u64) * (blob.height() as u64));
            }
        }

        /// Property: raising min_area never adds blobs.
        #[test]
        fn prop_filter_is_monotonic(
            (w, h, labels) in label_image_strategy(),
            low in 0u64..50,
            extra in 0u64..50,
        ) {
            let fewer = extract_blobs(&labels, w, h, low + extra).len();
            let more = extract_blobs(&labels, w, h, low).len();
            prop_assert!(fewer <= more);
        }

        /// Property: relabelling components does not change their statistics.
        #[test]
        fn prop_stats_independent_of_label_values(
            (w, h, labels) in label_image_strategy(),
        ) {
            // Reverse the label numbering: 1..=5 -> 5..=1
            let relabelled: Vec<u32> = labels
                .iter()
                .map(|&l| if l == 0 { 0 } else { 6 - l })
                .collect();

            let mut a: Vec<_> = extract_blobs(&labels, w, h, 0)
                .into_iter()
                .map(|b| (b.min_x, b.max_x, b.min_y, b.max_y, b.area, b.sum_x, b.sum_y))
                .collect();
            let mut b: Vec<_> = extract_blobs(&relabelled, w, h, 0)
                .into_iter()
                .map(|b| (b.min_x, b.max_x, b.min_y, b.max_y, b.area, b.sum_x, b.sum_y))
                .collect();
            a.sort_unstable();
            b.sort_unstable();
            prop_assert_eq!(a, b);
        }

        /// Property: padded boxes stay inside the image and contain the blob.
        #[test]
        fn prop_padded_box_in_bounds(
            (w, h, labels) in label_image_strategy(),
            pad in 0u32..10,
        ) {
            for blob in extract_blobs(&labels, w, h, 0) {
                let bbox = blob.padded_box(pad, w, h);
                prop_assert!(bbox.max_x < w && bbox.max_y < h);
                prop_assert!(bbox.min_x <= blob.min_x && bbox.max_x >= blob.max_x);
                prop_assert!(bbox.min_y <= blob.min_y && bbox.max_y >= blob.max_y);
            }
        }
    }
}
