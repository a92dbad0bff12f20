use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates of the frame it was detected on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-union against another box, used by non-max
    /// suppression during postprocessing.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter_w = (x2 - x1).max(0.0);
        let inter_h = (y2 - y1).max(0.0);
        let inter = inter_w * inter_h;

        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// A single object detection, the output of an object-detection postprocessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Per-pixel class mask aligned to the source frame's dimensions, output of a
/// segmentation postprocessor. Encoded as a flat row-major byte buffer of
/// class ids to avoid a runtime dependency on an image crate in core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segmentation {
    pub width: u32,
    pub height: u32,
    pub class_ids: Vec<u8>,
}

/// A single 2D keypoint with a confidence score, used by [`Pose`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

/// Pose estimation output. Kept as a thin pass-through data shape: the
/// analysis pipeline plumbs these records end to end, but no concrete pose
/// postprocessor ships in this runtime (see the Engine Manager's registry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub keypoints: Vec<Keypoint>,
    pub confidence: f32,
}

/// The union of everything an inference task can produce for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnalysisResult {
    pub detections: Vec<Detection>,
    pub segmentations: Vec<Segmentation>,
    pub poses: Vec<Pose>,
    pub inference_time_ms: f32,
}

/// Greedy per-class non-max suppression: sorts by confidence descending and
/// drops later boxes whose IoU against a kept box of the same class exceeds
/// `threshold`.
pub fn non_max_suppression(mut detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());

    let mut keep = vec![true; detections.len()];
    for i in 0..detections.len() {
        if !keep[i] {
            continue;
        }
        for j in (i + 1)..detections.len() {
            if !keep[j] {
                continue;
            }
            if detections[i].class_id != detections[j].class_id {
                continue;
            }
            if detections[i].bbox.iou(&detections[j].bbox) > threshold {
                keep[j] = false;
            }
        }
    }

    detections
        .into_iter()
        .zip(keep)
        .filter_map(|(d, k)| k.then_some(d))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_id: u32, confidence: f32, x: f32) -> Detection {
        Detection {
            class_id,
            class_name: "person".into(),
            confidence,
            bbox: BoundingBox {
                x,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            },
        }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
        };
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn nms_drops_overlapping_lower_confidence_same_class() {
        let dets = vec![det(0, 0.9, 0.0), det(0, 0.8, 1.0), det(1, 0.95, 0.0)];
        let kept = non_max_suppression(dets, 0.3);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().any(|d| d.class_id == 1));
        assert!(kept.iter().any(|d| d.class_id == 0 && d.confidence == 0.9));
    }

    #[test]
    fn nms_keeps_non_overlapping_boxes() {
        let dets = vec![det(0, 0.9, 0.0), det(0, 0.8, 1000.0)];
        let kept = non_max_suppression(dets, 0.3);
        assert_eq!(kept.len(), 2);
    }
}
