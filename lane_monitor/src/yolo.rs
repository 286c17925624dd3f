// YOLOv8 vehicle detector running through OpenCV's DNN module.

use crate::capture::rgb_image_to_mat;
use crate::config::ModelConfig;
use anyhow::{Context, Result};
use lanewatch::{BoundingBox, Detection, Detector, Frame, InferenceError};
use opencv::{
    core::{self, Mat, Scalar, Size, Vector},
    dnn::{self, Net},
    prelude::*,
};
use std::sync::Mutex;
use tracing::{debug, info};

const COCO_VEHICLES: [(usize, &str); 4] = [(2, "car"), (3, "motorcycle"), (5, "bus"), (7, "truck")];

fn class_label(class_id: usize) -> String {
    COCO_VEHICLES
        .iter()
        .find(|(id, _)| *id == class_id)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("class_{class_id}"))
}

pub struct YoloDetector {
    // OpenCV's `Net::forward` needs `&mut`, workers share the detector.
    net: Mutex<Net>,
    params: ModelConfig,
}

impl YoloDetector {
    pub fn load(params: &ModelConfig) -> Result<Self> {
        info!("Loading YOLO model: {}", params.path.display());
        let path = params.path.to_str().context("Model path is not valid UTF-8")?;
        let net = dnn::read_net_from_onnx(path)
            .with_context(|| format!("Failed to load model {}", params.path.display()))?;
        info!("✓ YOLO detector initialized");
        Ok(Self {
            net: Mutex::new(net),
            params: params.clone(),
        })
    }

    fn infer(&self, frame: &Frame) -> opencv::Result<Vec<f32>> {
        let bgr = rgb_image_to_mat(frame)?;
        let size = self.params.input_size;
        let blob = dnn::blob_from_image(
            &bgr,
            1.0 / 255.0,
            Size::new(size, size),
            Scalar::default(),
            true,
            false,
            core::CV_32F,
        )?;

        let mut net = self
            .net
            .lock()
            .map_err(|_| opencv::Error::new(core::StsError, "detector lock poisoned"))?;
        net.set_input(&blob, "", 1.0, Scalar::default())?;
        let mut outputs = Vector::<Mat>::new();
        let names = net.get_unconnected_out_layers_names()?;
        net.forward(&mut outputs, &names)?;

        let output = outputs.get(0)?;
        Ok(output.data_typed::<f32>()?.to_vec())
    }
}

impl Detector for YoloDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, InferenceError> {
        let raw = self.infer(frame).map_err(|e| InferenceError(e.to_string()))?;
        let input = self.params.input_size as f32;
        let scale = (frame.width() as f32 / input, frame.height() as f32 / input);
        let candidates = decode_yolov8(
            &raw,
            scale,
            self.params.confidence_threshold,
            &self.params.vehicle_classes,
        );
        let detections = nms(candidates, self.params.iou_threshold);
        debug!("Detected {} vehicles", detections.len());
        Ok(detections)
    }
}

/// Decodes a `[4 + classes, anchors]` YOLOv8 output laid out attribute-major.
///
/// Boxes are `cx, cy, w, h` in model input pixels and are scaled back to frame
/// pixels by `scale`.
pub fn decode_yolov8(raw: &[f32], scale: (f32, f32), confidence_threshold: f32, keep: &[usize]) -> Vec<Detection> {
    const COCO_CLASSES: usize = 80;
    let attributes = 4 + COCO_CLASSES;
    let anchors = raw.len() / attributes;
    let at = |attr: usize, anchor: usize| raw[attr * anchors + anchor];

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let (class_id, score) = (0..COCO_CLASSES)
            .map(|c| (c, at(4 + c, anchor)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if score < confidence_threshold || (!keep.is_empty() && !keep.contains(&class_id)) {
            continue;
        }

        let bbox = BoundingBox::from_center(
            at(0, anchor) * scale.0,
            at(1, anchor) * scale.1,
            at(2, anchor) * scale.0,
            at(3, anchor) * scale.1,
        );
        detections.push(Detection::new(bbox, score, class_label(class_id)));
    }
    detections
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        if kept.iter().all(|k| k.bbox.iou(&candidate.bbox) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}
