//! Annotation rendering for blob and match results.
//!
//! Overlays are drawn on an RGB copy of the grayscale result so markers stand
//! out. Drawing clips at the image border.

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::backend::Detection;
use crate::blob::BlobOverlay;
use crate::config::PipelineConfig;

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const MARKER_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

fn to_canvas(image: &GrayImage) -> RgbImage {
    DynamicImage::ImageLuma8(image.clone()).to_rgb8()
}

/// Draw each blob's padded box and a dot at its centroid.
pub fn draw_blobs(image: &GrayImage, overlays: &[BlobOverlay], config: &PipelineConfig) -> RgbImage {
    let mut canvas = to_canvas(image);
    for overlay in overlays {
        let b = overlay.bbox;
        let rect = Rect::at(b.min_x as i32, b.min_y as i32)
            .of_size(b.max_x - b.min_x + 1, b.max_y - b.min_y + 1);
        draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);

        let (cx, cy) = overlay.centroid;
        draw_filled_circle_mut(
            &mut canvas,
            (cx as i32, cy as i32),
            config.centroid_radius,
            MARKER_COLOR,
        );
    }
    canvas
}

/// Draw a model-sized box and a crosshair at every detection.
pub fn draw_detections(
    image: &GrayImage,
    detections: &[Detection],
    model_width: u32,
    model_height: u32,
    config: &PipelineConfig,
) -> RgbImage {
    let mut canvas = to_canvas(image);
    let arm = config.marker_half_length as f32;

    for d in detections {
        let left = (d.x - model_width as f64 / 2.0).round() as i32;
        let top = (d.y - model_height as f64 / 2.0).round() as i32;
        if model_width > 0 && model_height > 0 {
            let rect = Rect::at(left, top).of_size(model_width, model_height);
            draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
        }

        let (x, y) = (d.x as f32, d.y as f32);
        draw_line_segment_mut(&mut canvas, (x - arm, y), (x + arm, y), MARKER_COLOR);
        draw_line_segment_mut(&mut canvas, (x, y - arm), (x, y + arm), MARKER_COLOR);
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::BlobBox;
    use image::Luma;

    #[test]
    fn test_blob_overlay_draws_box_and_dot() {
        let img = GrayImage::from_pixel(40, 40, Luma([0]));
        let overlay = BlobOverlay {
            id: 1,
            bbox: BlobBox {
                min_x: 5,
                min_y: 5,
                max_x: 30,
                max_y: 25,
            },
            centroid: (17, 15),
            label: "(17, 15, 100)".to_string(),
        };
        let canvas = draw_blobs(&img, &[overlay], &PipelineConfig::default());

        assert_eq!(*canvas.get_pixel(5, 5), BOX_COLOR);
        assert_eq!(*canvas.get_pixel(30, 25), BOX_COLOR);
        assert_eq!(*canvas.get_pixel(17, 15), MARKER_COLOR);
        assert_eq!(*canvas.get_pixel(17, 17), MARKER_COLOR);
        assert_eq!(*canvas.get_pixel(10, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_detection_overlay_draws_crosshair() {
        let img = GrayImage::from_pixel(100, 100, Luma([50]));
        let detection = Detection {
            x: 50.0,
            y: 50.0,
            score: 90.0,
        };
        let canvas = draw_detections(&img, &[detection], 10, 10, &PipelineConfig::default());

        assert_eq!(*canvas.get_pixel(69, 50), MARKER_COLOR);
        assert_eq!(*canvas.get_pixel(50, 31), MARKER_COLOR);
        assert_eq!(*canvas.get_pixel(45, 48), BOX_COLOR);
        assert_eq!(*canvas.get_pixel(0, 0), Rgb([50, 50, 50]));
    }

    #[test]
    fn test_overlays_clip_at_border() {
        let img = GrayImage::new(10, 10);
        let detection = Detection {
            x: 1.0,
            y: 1.0,
            score: 100.0,
        };
        let canvas = draw_detections(&img, &[detection], 8, 8, &PipelineConfig::default());
        assert_eq!(canvas.dimensions(), (10, 10));
    }
}
