//! Overlay renderer: detection boxes and landmarks on a transparent canvas
//! aligned to the video surface. Rendering only; no decisions.

use crate::types::{FaceDetection, Point};
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use std::ops::RangeInclusive;
use std::path::Path;

const BOX_COLOR: Rgba<u8> = Rgba([0, 170, 255, 255]);
const LANDMARK_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
const CAPTURE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: u32 = 2;
const CAPTURE_BOX_THICKNESS: u32 = 3;
const LANDMARK_RADIUS: i32 = 2;

/// Contours of the 68-point landmark layout, and whether each one closes.
const CONTOURS_68: [(RangeInclusive<usize>, bool); 9] = [
    (0..=16, false),  // jaw
    (17..=21, false), // right brow
    (22..=26, false), // left brow
    (27..=30, false), // nose bridge
    (30..=35, false), // nose base
    (36..=41, true),  // right eye
    (42..=47, true),  // left eye
    (48..=59, true),  // outer lip
    (60..=67, true),  // inner lip
];

pub struct OverlayRenderer {
    canvas: RgbaImage,
}

impl OverlayRenderer {
    /// Canvas sized to the display surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::new(width, height),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    /// Realign the canvas with a resized display surface. Drops any drawing.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.canvas.dimensions() != (width, height) {
            self.canvas = RgbaImage::new(width, height);
        }
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn clear(&mut self) {
        for px in self.canvas.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
    }

    /// Replace the canvas contents with `detections`, scaled from a frame of
    /// `frame_size` to the canvas.
    pub fn draw(&mut self, detections: &[FaceDetection], frame_size: (u32, u32)) {
        self.clear();
        let (cw, ch) = self.canvas.dimensions();
        if frame_size.0 == 0 || frame_size.1 == 0 || cw == 0 || ch == 0 {
            return;
        }
        let sx = cw as f32 / frame_size.0 as f32;
        let sy = ch as f32 / frame_size.1 as f32;

        for detection in detections {
            let bbox = detection.bounding_box.scaled(sx, sy);
            for t in 0..BOX_THICKNESS {
                if let Some(rect) = inset_rect(bbox.x, bbox.y, bbox.width, bbox.height, t) {
                    draw_hollow_rect_mut(&mut self.canvas, rect, BOX_COLOR);
                }
            }

            let points: Vec<Point> = detection
                .landmarks
                .iter()
                .map(|p| Point { x: p.x * sx, y: p.y * sy })
                .collect();
            if points.len() == 68 {
                for (range, closed) in CONTOURS_68 {
                    draw_contour(&mut self.canvas, &points[range], closed);
                }
            }
            for p in &points {
                draw_filled_circle_mut(
                    &mut self.canvas,
                    (p.x.round() as i32, p.y.round() as i32),
                    LANDMARK_RADIUS,
                    LANDMARK_COLOR,
                );
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), image::ImageError> {
        self.canvas.save(path)
    }
}

/// Still image of a captured face: the frame with the face box and
/// landmark dots on top.
pub fn render_capture(frame: &RgbImage, detection: &FaceDetection) -> RgbImage {
    let mut out = frame.clone();
    let b = &detection.bounding_box;
    for t in 0..CAPTURE_BOX_THICKNESS {
        if let Some(rect) = inset_rect(b.x, b.y, b.width, b.height, t) {
            draw_hollow_rect_mut(&mut out, rect, CAPTURE_COLOR);
        }
    }
    for p in &detection.landmarks {
        draw_filled_circle_mut(
            &mut out,
            (p.x.round() as i32, p.y.round() as i32),
            LANDMARK_RADIUS,
            CAPTURE_COLOR,
        );
    }
    out
}

fn inset_rect(x: f32, y: f32, w: f32, h: f32, inset: u32) -> Option<Rect> {
    let w = w.round() as i64 - 2 * inset as i64;
    let h = h.round() as i64 - 2 * inset as i64;
    if w <= 0 || h <= 0 {
        return None;
    }
    Some(
        Rect::at(x.round() as i32 + inset as i32, y.round() as i32 + inset as i32)
            .of_size(w as u32, h as u32),
    )
}

fn draw_contour(canvas: &mut RgbaImage, points: &[Point], closed: bool) {
    for pair in points.windows(2) {
        draw_line_segment_mut(canvas, (pair[0].x, pair[0].y), (pair[1].x, pair[1].y), LANDMARK_COLOR);
    }
    if closed && points.len() > 2 {
        let (first, last) = (points[0], points[points.len() - 1]);
        draw_line_segment_mut(canvas, (last.x, last.y), (first.x, first.y), LANDMARK_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Descriptor, DESCRIPTOR_LEN};

    fn detection(x: f32, y: f32, w: f32, h: f32, landmarks: Vec<Point>) -> FaceDetection {
        FaceDetection {
            bounding_box: BoundingBox { x, y, width: w, height: h, score: 0.9 },
            landmarks,
            descriptor: Descriptor::new(vec![0.0; DESCRIPTOR_LEN]).unwrap(),
        }
    }

    fn opaque_pixels(img: &RgbaImage) -> usize {
        img.pixels().filter(|p| p.0[3] > 0).count()
    }

    #[test]
    fn test_draw_box_outline_only() {
        let mut r = OverlayRenderer::new(100, 100);
        r.draw(&[detection(20.0, 20.0, 40.0, 40.0, vec![])], (100, 100));
        let c = r.canvas();
        assert_eq!(c.get_pixel(20, 20), &BOX_COLOR);
        assert_eq!(c.get_pixel(59, 40), &BOX_COLOR);
        // interior stays transparent
        assert_eq!(c.get_pixel(40, 40).0[3], 0);
    }

    #[test]
    fn test_draw_scales_to_canvas() {
        let mut r = OverlayRenderer::new(50, 50);
        r.draw(&[detection(20.0, 20.0, 40.0, 40.0, vec![])], (100, 100));
        assert_eq!(r.canvas().get_pixel(10, 10), &BOX_COLOR);
        assert_eq!(r.canvas().get_pixel(20, 20).0[3], 0);
    }

    #[test]
    fn test_draw_replaces_previous_pass() {
        let mut r = OverlayRenderer::new(100, 100);
        r.draw(&[detection(10.0, 10.0, 20.0, 20.0, vec![])], (100, 100));
        r.draw(&[detection(60.0, 60.0, 20.0, 20.0, vec![])], (100, 100));
        assert_eq!(r.canvas().get_pixel(10, 10).0[3], 0);
        assert_eq!(r.canvas().get_pixel(60, 60), &BOX_COLOR);
    }

    #[test]
    fn test_clear_empties_canvas() {
        let mut r = OverlayRenderer::new(64, 64);
        let landmarks = (0..68).map(|i| Point { x: 10.0 + (i % 10) as f32 * 4.0, y: 10.0 + (i / 10) as f32 * 4.0 }).collect();
        r.draw(&[detection(5.0, 5.0, 50.0, 50.0, landmarks)], (64, 64));
        assert!(opaque_pixels(r.canvas()) > 0);
        r.clear();
        assert_eq!(opaque_pixels(r.canvas()), 0);
    }

    #[test]
    fn test_resize_realigns_canvas() {
        let mut r = OverlayRenderer::new(64, 48);
        r.resize(128, 96);
        assert_eq!(r.dimensions(), (128, 96));
    }

    #[test]
    fn test_render_capture_keeps_background() {
        let frame = RgbImage::from_pixel(40, 40, Rgb([9, 9, 9]));
        let out = render_capture(&frame, &detection(10.0, 10.0, 20.0, 20.0, vec![Point { x: 20.0, y: 20.0 }]));
        assert_eq!(out.get_pixel(10, 10), &CAPTURE_COLOR);
        assert_eq!(out.get_pixel(20, 20), &CAPTURE_COLOR);
        assert_eq!(out.get_pixel(0, 0), &Rgb([9, 9, 9]));
    }
}
