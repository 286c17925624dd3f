// THEORY:
// The `detection` module defines the boundary between lanewatch and whatever
// object-detection model produces vehicle boxes. The model is a black box: given
// a frame it returns an ordered list of `Detection`s, or fails for that frame.
//
// The capability is an explicit object (`Arc<dyn Detector>`) handed to the
// controller rather than a process-wide handle. Its lifecycle is
// load → use → optionally replace before the next session starts; a running
// session keeps the detector it was started with.

use crate::core_modules::source::Frame;
use crate::error::{InferenceError, TrainingError};
use std::path::Path;
use std::sync::Arc;

/// Axis-aligned box in frame pixel coordinates (TLBR).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    #[inline]
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Create a box from its center point and dimensions.
    #[inline]
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(
            cx - width / 2.0,
            cy - height / 2.0,
            cx + width / 2.0,
            cy + height / 2.0,
        )
    }

    #[inline]
    pub fn center_x(&self) -> f32 {
        (self.x_min + self.x_max) / 2.0
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Intersection over Union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x_min.max(other.x_min);
        let y1 = self.y_min.max(other.y_min);
        let x2 = self.x_max.min(other.x_max);
        let y2 = self.y_max.min(other.y_max);

        let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union_area = self.area() + other.area() - inter_area;

        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }
}

/// One located object reported by the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    /// Class label as reported by the model, e.g. "car" or "truck".
    pub class: String,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32, class: impl Into<String>) -> Self {
        Self {
            bbox,
            confidence,
            class: class.into(),
        }
    }
}

/// Object detection capability shared by every stream worker of a session.
///
/// Implementations must be safe to call from several workers at once. A failure
/// only affects the frame it was called with.
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, InferenceError>;
}

/// Produces a fresh detector from a dataset descriptor (e.g. a YOLO
/// `dataset.yaml`). How training happens is up to the implementation.
pub trait DetectorTrainer {
    fn train(&self, dataset: &Path) -> Result<Arc<dyn Detector>, TrainingError>;
}
