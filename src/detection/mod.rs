pub mod render;
pub mod yolo;

use serde::Serialize;

/// Box corners in image pixels: top-left `(x1, y1)`, bottom-right `(x2, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        (self.x2 - self.x1).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y2 - self.y1).max(0) as u32
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Intersection over union; 0 when either box is empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = BoundingBox::new(ix1, iy1, ix2, iy2).area();
        let union = self.area() + other.area() - inter;
        if union == 0 {
            return 0.0;
        }
        inter as f32 / union as f32
    }

    /// Clamp to an image of `width` x `height`.
    pub fn clamp(&self, width: u32, height: u32) -> Self {
        let w = width as i32;
        let h = height as i32;
        Self {
            x1: self.x1.clamp(0, w),
            y1: self.y1.clamp(0, h),
            x2: self.x2.clamp(0, w),
            y2: self.y2.clamp(0, h),
        }
    }
}

/// One predicted object instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
}

impl Detection {
    /// Label drawn next to the box, e.g. `"Twenty Dollar: 0.87"`.
    pub fn label(&self) -> String {
        format!("{}: {:.2}", self.class_name, self.confidence)
    }
}

/// What gets drawn for an accepted detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub bbox: BoundingBox,
    pub label: String,
}

/// Detections split by a confidence threshold, input order kept.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub accepted: Vec<Detection>,
    pub rejected: Vec<Detection>,
}

impl Partition {
    pub fn annotations(&self) -> Vec<Annotation> {
        self.accepted.iter().map(annotate).collect()
    }
}

/// Split detections at `threshold`. The threshold is inclusive.
pub fn partition(detections: Vec<Detection>, threshold: f32) -> Partition {
    let (accepted, rejected) = detections
        .into_iter()
        .partition(|d| d.confidence >= threshold);
    Partition { accepted, rejected }
}

pub fn annotate(detection: &Detection) -> Annotation {
    Annotation {
        bbox: detection.bbox,
        label: detection.label(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(confidence: f32) -> Detection {
        Detection {
            bbox: BoundingBox::new(0, 0, 10, 10),
            confidence,
            class_id: 3,
            class_name: "Twenty Dollar".to_string(),
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        let p = partition(vec![det(0.5), det(0.49), det(0.9)], 0.5);
        assert_eq!(p.accepted.len(), 2);
        assert_eq!(p.rejected.len(), 1);
        assert_eq!(p.rejected[0].confidence, 0.49);
    }

    #[test]
    fn label_has_two_decimals() {
        assert_eq!(det(0.876).label(), "Twenty Dollar: 0.88");
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = BoundingBox::new(5, 5, 15, 25);
        assert!((b.iou(&b) - 1.0).abs() < f32::EPSILON);
        assert_eq!(b.iou(&BoundingBox::new(20, 20, 30, 30)), 0.0);
    }
}
