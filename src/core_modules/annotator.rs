// THEORY:
// The `annotator` draws what the detector saw. Each detection becomes a hollow
// rectangle outline on a copy of the frame; the input frame is never
// touched, so workers can keep using it after annotation.
//
// Box colors are random-looking but come from a seeded RNG that is re-created on
// every call. The same seed and detections always give the same picture, which
// keeps tests deterministic while neighbouring boxes still get distinct colors.

use crate::core_modules::detection::Detection;
use crate::core_modules::source::Frame;
use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Darkest channel value a box color may use, so outlines stay visible.
const MIN_CHANNEL: u8 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameAnnotator {
    seed: u64,
    thickness: u32,
}

impl Default for FrameAnnotator {
    fn default() -> Self {
        Self::new(0x1a7e_c0de, 2)
    }
}

impl FrameAnnotator {
    pub fn new(seed: u64, thickness: u32) -> Self {
        Self {
            seed,
            thickness: thickness.max(1),
        }
    }

    /// Returns a copy of `frame` with one outline per detection.
    pub fn annotate(&self, frame: &Frame, detections: &[Detection]) -> Frame {
        let mut canvas = frame.clone();
        let mut rng = StdRng::seed_from_u64(self.seed);

        for detection in detections {
            let color = Rgb([
                rng.gen_range(MIN_CHANNEL..=u8::MAX),
                rng.gen_range(MIN_CHANNEL..=u8::MAX),
                rng.gen_range(MIN_CHANNEL..=u8::MAX),
            ]);
            let Some((x0, y0, x1, y1)) = self.clip(detection, canvas.width(), canvas.height()) else {
                continue;
            };
            // Outline includes both corner pixels and grows inwards.
            let width = x1 - x0 + 1;
            let height = y1 - y0 + 1;

            for inset in 0..self.thickness as i32 {
                let w = width - 2 * inset;
                let h = height - 2 * inset;
                if w <= 0 || h <= 0 {
                    break;
                }
                let rect = Rect::at(x0 + inset, y0 + inset).of_size(w as u32, h as u32);
                draw_hollow_rect_mut(&mut canvas, rect, color);
            }
        }

        canvas
    }

    /// Rounds the box to pixel corners and pulls far-away edges in to just
    /// past the frame border, so an edge that lies outside stays invisible at
    /// every inset while drawing never walks more than the visible area.
    ///
    /// Returns `None` for boxes that are non-finite or entirely off-frame.
    fn clip(&self, detection: &Detection, frame_width: u32, frame_height: u32) -> Option<(i32, i32, i32, i32)> {
        let bbox = &detection.bbox;
        let coords = [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max];
        if coords.iter().any(|c| !c.is_finite()) || frame_width == 0 || frame_height == 0 {
            return None;
        }

        let margin = self.thickness as f32;
        let (w, h) = (frame_width as f32, frame_height as f32);
        let (x_min, y_min) = (bbox.x_min.round(), bbox.y_min.round());
        let (x_max, y_max) = (bbox.x_max.round(), bbox.y_max.round());
        if x_max < 0.0 || y_max < 0.0 || x_min > w - 1.0 || y_min > h - 1.0 {
            return None;
        }

        let clamp_x = |x: f32| x.clamp(-margin, w - 1.0 + margin) as i32;
        let clamp_y = |y: f32| y.clamp(-margin, h - 1.0 + margin) as i32;
        Some((clamp_x(x_min), clamp_y(y_min), clamp_x(x_max), clamp_y(y_max)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::detection::BoundingBox;
    use image::RgbImage;
    use std::time::{Duration, Instant};

    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

    fn car(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Detection {
        Detection::new(BoundingBox::new(x_min, y_min, x_max, y_max), 0.9, "car")
    }

    #[test]
    fn draws_outline_at_box_coordinates() {
        let frame = RgbImage::new(64, 48);
        let annotated = FrameAnnotator::default().annotate(&frame, &[car(10.0, 10.0, 30.0, 20.0)]);

        // Corners and edges are painted.
        assert_ne!(*annotated.get_pixel(10, 10), BLACK);
        assert_ne!(*annotated.get_pixel(30, 20), BLACK);
        assert_ne!(*annotated.get_pixel(20, 10), BLACK);
        assert_ne!(*annotated.get_pixel(10, 15), BLACK);
        // Interior beyond the outline thickness and the outside stay untouched.
        assert_eq!(*annotated.get_pixel(20, 15), BLACK);
        assert_eq!(*annotated.get_pixel(5, 5), BLACK);
        assert_eq!(*annotated.get_pixel(40, 30), BLACK);
    }

    #[test]
    fn input_frame_is_not_mutated() {
        let frame = RgbImage::new(32, 32);
        let _ = FrameAnnotator::default().annotate(&frame, &[car(2.0, 2.0, 20.0, 20.0)]);
        assert!(frame.pixels().all(|p| *p == BLACK));
    }

    #[test]
    fn one_outline_per_detection() {
        let frame = RgbImage::new(100, 40);
        let detections = [car(5.0, 5.0, 25.0, 30.0), car(60.0, 5.0, 90.0, 30.0)];
        let annotated = FrameAnnotator::new(7, 1).annotate(&frame, &detections);

        assert_ne!(*annotated.get_pixel(5, 5), BLACK);
        assert_ne!(*annotated.get_pixel(60, 5), BLACK);
        // Nothing drawn in the gap between the two boxes.
        assert!((30..55).all(|x| *annotated.get_pixel(x, 5) == BLACK));
    }

    #[test]
    fn same_seed_gives_same_image() {
        let frame = RgbImage::new(50, 50);
        let detections = [car(1.0, 1.0, 20.0, 20.0), car(25.0, 25.0, 45.0, 45.0)];
        let a = FrameAnnotator::new(42, 2).annotate(&frame, &detections);
        let b = FrameAnnotator::new(42, 2).annotate(&frame, &detections);
        assert_eq!(a, b);
    }

    #[test]
    fn boxes_outside_the_frame_are_clipped() {
        let frame = RgbImage::new(20, 20);
        let annotated = FrameAnnotator::default().annotate(&frame, &[car(-10.0, -10.0, 100.0, 100.0)]);
        assert_eq!(annotated.dimensions(), (20, 20));
        // Every edge lies off-frame, so nothing is visible.
        assert!(annotated.pixels().all(|p| *p == BLACK));
    }

    #[test]
    fn huge_boxes_draw_only_their_visible_edges() {
        let frame = RgbImage::new(64, 48);
        let detections = [car(-3e9, 0.0, 3e9, 20.0), car(-5e8, -5e8, 5e8, 5e8)];

        let started = Instant::now();
        let annotated = FrameAnnotator::default().annotate(&frame, &detections);
        assert!(started.elapsed() < Duration::from_secs(1));

        // Top and bottom edges of the wide box span the whole frame.
        assert!((0..64).all(|x| *annotated.get_pixel(x, 0) != BLACK));
        assert!((0..64).all(|x| *annotated.get_pixel(x, 20) != BLACK));
        // Its side edges are off-frame, as is all of the second box.
        assert_eq!(*annotated.get_pixel(0, 10), BLACK);
        assert_eq!(*annotated.get_pixel(63, 10), BLACK);
        assert_eq!(*annotated.get_pixel(32, 40), BLACK);
    }

    #[test]
    fn off_frame_and_non_finite_boxes_are_skipped() {
        let frame = RgbImage::new(16, 16);
        let detections = [
            car(100.0, 100.0, 120.0, 120.0),
            car(-40.0, 2.0, -20.0, 8.0),
            car(f32::NAN, 0.0, 8.0, 8.0),
        ];
        assert_eq!(FrameAnnotator::default().annotate(&frame, &detections), frame);
    }

    #[test]
    fn no_detections_returns_identical_copy() {
        let frame = RgbImage::from_pixel(8, 8, Rgb([9, 9, 9]));
        assert_eq!(FrameAnnotator::default().annotate(&frame, &[]), frame);
    }
}
