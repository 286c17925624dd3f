// THEORY:
// The `lane_mapper` turns a detection's position into a lane. Lanes are
// `lane_count` equal-width vertical bands covering `[0, frame_width)`; a box
// belongs to the band containing its horizontal center. Bands are half-open, so
// a center sitting exactly on a boundary starts the next band, and anything at
// or past the right edge is clamped into the last lane.
//
// The classic four-lane layout with thresholds at 320/640/960 is just this rule
// applied to a 1280-pixel-wide frame.

use crate::core_modules::detection::BoundingBox;

/// Returns the lane index in `[0, lane_count)` for `bbox`.
///
/// A `lane_count` of zero is treated as a single lane.
pub fn lane_of(bbox: &BoundingBox, frame_width: u32, lane_count: usize) -> usize {
    let lanes = lane_count.max(1);
    if frame_width == 0 {
        return 0;
    }

    let center = f64::from(bbox.center_x());
    if !(center > 0.0) {
        // Negative centers and NaN land in the first lane.
        return 0;
    }

    let bucket = (center * lanes as f64 / f64::from(frame_width)).floor() as usize;
    bucket.min(lanes - 1)
}

/// Lane mapping policy for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneMapper {
    lane_count: usize,
    reference_width: Option<u32>,
}

impl LaneMapper {
    pub fn new(lane_count: usize) -> Self {
        Self {
            lane_count: lane_count.max(1),
            reference_width: None,
        }
    }

    /// Compute boundaries against a fixed width rather than the frame's own.
    pub fn with_reference_width(mut self, width: Option<u32>) -> Self {
        self.reference_width = width.filter(|w| *w > 0);
        self
    }

    pub fn lane_count(&self) -> usize {
        self.lane_count
    }

    pub fn lane_of(&self, bbox: &BoundingBox, frame_width: u32) -> usize {
        lane_of(bbox, self.reference_width.unwrap_or(frame_width), self.lane_count)
    }

    /// Pixel x positions separating adjacent lanes.
    pub fn boundaries(&self, frame_width: u32) -> Vec<f64> {
        let width = f64::from(self.reference_width.unwrap_or(frame_width));
        (1..self.lane_count)
            .map(|i| width * i as f64 / self.lane_count as f64)
            .collect()
    }
}
