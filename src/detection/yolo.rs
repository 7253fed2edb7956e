//! Bill detection with a YOLOv8 ONNX export.

use std::cmp::Ordering;
use std::path::Path;

use image::DynamicImage;

use crate::config::{DetectorSettings, TensorLayout};
use crate::detection::{BoundingBox, Detection};
use crate::error::{Error, Result};
use crate::labels::ClassLabels;
use crate::preprocess;
use crate::runtime::{self, ModelSource, OnnxPlan};

/// Candidates below this score are dropped while decoding, so that the
/// post-processor still sees (and reports) sub-threshold detections.
pub const DECODE_FLOOR: f32 = 0.25;

/// Geometry needed to map model coordinates back onto the source image.
#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    pub input_size: u32,
    pub image_width: u32,
    pub image_height: u32,
    pub min_confidence: f32,
}

/// Decode a YOLOv8 output of shape `[1, 4 + classes, candidates]`.
///
/// Rows 0..4 hold `cx, cy, w, h` in input pixels; the remaining rows hold
/// one score per class. Each candidate keeps its best class.
pub fn decode(
    output: &[f32],
    shape: &[usize],
    params: &DecodeParams,
    labels: &ClassLabels,
) -> Result<Vec<Detection>> {
    let (rows, candidates) = match shape {
        [1, rows, n] | [rows, n] => (*rows, *n),
        _ => {
            return Err(Error::Model(format!(
                "unexpected detector output shape {:?}",
                shape
            )));
        }
    };
    if rows < 5 {
        return Err(Error::Model(format!(
            "detector output has {} rows, expected 4 box rows plus class scores",
            rows
        )));
    }
    if output.len() != rows * candidates {
        return Err(Error::Model(format!(
            "detector output has {} values, shape {:?} needs {}",
            output.len(),
            shape,
            rows * candidates
        )));
    }

    let at = |row: usize, i: usize| output[row * candidates + i];
    let sx = params.image_width as f32 / params.input_size as f32;
    let sy = params.image_height as f32 / params.input_size as f32;

    let mut detections = Vec::new();
    for i in 0..candidates {
        let mut class_id = 0;
        let mut score = f32::NEG_INFINITY;
        for c in 0..rows - 4 {
            let s = at(4 + c, i);
            if s > score {
                score = s;
                class_id = c;
            }
        }
        if score < params.min_confidence {
            continue;
        }

        let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
        let bbox = BoundingBox::new(
            ((cx - w / 2.0) * sx).round() as i32,
            ((cy - h / 2.0) * sy).round() as i32,
            ((cx + w / 2.0) * sx).round() as i32,
            ((cy + h / 2.0) * sy).round() as i32,
        )
        .clamp(params.image_width, params.image_height);

        detections.push(Detection {
            bbox,
            confidence: score.clamp(0.0, 1.0),
            class_id,
            class_name: labels.name(class_id).to_string(),
        });
    }
    Ok(detections)
}

/// Per-class non-maximum suppression, highest confidence first.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::new();
    for det in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == det.class_id && k.bbox.iou(&det.bbox) > iou_threshold);
        if !suppressed {
            kept.push(det);
        }
    }
    kept
}

/// An opened detection model. Pass it to every [`Detector::detect`] call and
/// release it with [`Detector::close`].
pub struct Detector {
    plan: OnnxPlan,
    labels: ClassLabels,
    input_size: u32,
    iou_threshold: f32,
    max_detections: usize,
    min_confidence: f32,
}

impl Detector {
    pub fn open<P: AsRef<Path>>(
        model_path: P,
        labels: ClassLabels,
        settings: &DetectorSettings,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let shape = preprocess::input_shape(settings.input_size, TensorLayout::Nchw);
        let plan = runtime::load(ModelSource::Path(model_path), &shape)?;
        log::info!(
            "detector loaded from {} ({} classes, input {:?})",
            model_path.display(),
            labels.len(),
            shape
        );
        Ok(Self {
            plan,
            labels,
            input_size: settings.input_size,
            iou_threshold: settings.iou_threshold,
            max_detections: settings.max_detections,
            min_confidence: DECODE_FLOOR.min(settings.confidence_threshold),
        })
    }

    pub fn detect(&self, img: &DynamicImage) -> Result<Vec<Detection>> {
        let input = preprocess::to_tensor(img, self.input_size, TensorLayout::Nchw, 0.0, 1.0);
        let (output, shape) = runtime::run_first_output(&self.plan, input)?;
        log::debug!("detector output shape {:?}", shape);

        if let [_, rows, _] = shape.as_slice() {
            if rows.saturating_sub(4) != self.labels.len() {
                log::warn!(
                    "model emits {} classes but {} labels are loaded",
                    rows.saturating_sub(4),
                    self.labels.len()
                );
            }
        }

        let params = DecodeParams {
            input_size: self.input_size,
            image_width: img.width(),
            image_height: img.height(),
            min_confidence: self.min_confidence,
        };
        let candidates = decode(&output, &shape, &params, &self.labels)?;
        let mut detections = non_max_suppression(candidates, self.iou_threshold);
        detections.truncate(self.max_detections);
        Ok(detections)
    }

    pub fn close(self) {
        log::debug!("detector closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> ClassLabels {
        ClassLabels::new(vec!["One Dollar".into(), "Five Dollar".into()])
    }

    fn params() -> DecodeParams {
        DecodeParams {
            input_size: 100,
            image_width: 200,
            image_height: 100,
            min_confidence: 0.25,
        }
    }

    #[test]
    fn decodes_boxes_and_scales_to_image() {
        // two candidates, two classes: rows are cx, cy, w, h, s0, s1
        let output = vec![
            50.0, 10.0, // cx
            50.0, 10.0, // cy
            20.0, 4.0, // w
            10.0, 4.0, // h
            0.1, 0.05, // class 0
            0.9, 0.1, // class 1
        ];
        let dets = decode(&output, &[1, 6, 2], &params(), &labels()).unwrap();
        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert_eq!(d.class_id, 1);
        assert_eq!(d.class_name, "Five Dollar");
        assert_eq!(d.bbox, BoundingBox::new(80, 45, 120, 55));
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(decode(&[0.0; 4], &[1, 4, 1], &params(), &labels()).is_err());
        assert!(decode(&[0.0; 5], &[1, 6, 1], &params(), &labels()).is_err());
    }

    #[test]
    fn nms_keeps_best_of_overlapping_same_class() {
        let mk = |x: i32, conf: f32, class_id: usize| Detection {
            bbox: BoundingBox::new(x, 0, x + 10, 10),
            confidence: conf,
            class_id,
            class_name: String::new(),
        };
        let kept = non_max_suppression(vec![mk(0, 0.6, 0), mk(1, 0.9, 0), mk(1, 0.5, 1)], 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].class_id, 1);
    }
}
