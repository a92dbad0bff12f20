use vidanalyze_core::{
    non_max_suppression, AnalysisResult, BoundingBox, Detection, FilterConfig, LetterboxMeta,
    Postprocessor, Result,
};

/// Decodes a YOLOv8-style detection head output, shaped
/// `[1, 4 + num_classes, num_boxes]` (box centers/sizes in net-pixel space
/// followed by per-class scores), applies the confidence threshold and
/// class filter from [`FilterConfig`], maps boxes back to original frame
/// coordinates via the recorded [`LetterboxMeta`], and finishes with
/// per-class non-max suppression.
pub struct YoloPostprocessor {
    pub num_classes: usize,
    pub num_boxes: usize,
    pub class_names: Vec<String>,
}

impl Postprocessor for YoloPostprocessor {
    fn process(
        &self,
        raw_output: &[f32],
        meta: &LetterboxMeta,
        filter: &FilterConfig,
    ) -> Result<AnalysisResult> {
        let stride = self.num_boxes;
        let expected_len = (4 + self.num_classes) * self.num_boxes;
        if raw_output.len() < expected_len {
            return Ok(AnalysisResult::default());
        }

        let mut detections = Vec::new();
        for box_idx in 0..self.num_boxes {
            let cx = raw_output[box_idx];
            let cy = raw_output[stride + box_idx];
            let w = raw_output[2 * stride + box_idx];
            let h = raw_output[3 * stride + box_idx];

            let mut best_class = 0usize;
            let mut best_score = f32::MIN;
            for class_idx in 0..self.num_classes {
                let score = raw_output[(4 + class_idx) * stride + box_idx];
                if score > best_score {
                    best_score = score;
                    best_class = class_idx;
                }
            }

            if best_score < filter.confidence_threshold {
                continue;
            }
            if !filter.classes.is_empty() && !filter.classes.contains(&(best_class as u32)) {
                continue;
            }

            let (x, y, uw, uh) = meta.unletterbox(cx - w / 2.0, cy - h / 2.0, w, h);
            let class_name = self
                .class_names
                .get(best_class)
                .cloned()
                .unwrap_or_else(|| format!("class_{best_class}"));

            detections.push(Detection {
                class_id: best_class as u32,
                class_name,
                confidence: best_score,
                bbox: BoundingBox {
                    x,
                    y,
                    width: uw,
                    height: uh,
                },
            });
        }

        let detections = non_max_suppression(detections, filter.nms_threshold);

        Ok(AnalysisResult {
            detections,
            segmentations: Vec::new(),
            poses: Vec::new(),
            inference_time_ms: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn drops_detections_below_confidence_threshold() {
        let post = YoloPostprocessor {
            num_classes: 1,
            num_boxes: 1,
            class_names: vec!["person".into()],
        };
        let raw = vec![320.0, 320.0, 100.0, 100.0, 0.1];
        let meta = LetterboxMeta {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            net_width: 640,
            net_height: 640,
            orig_width: 640,
            orig_height: 640,
        };
        let filter = FilterConfig {
            task: "detect".into(),
            model_family: "yolo".into(),
            confidence_threshold: 0.5,
            nms_threshold: 0.45,
            classes: Vec::new(),
            draw_overlay: false,
            params: HashMap::new(),
        };
        let result = post.process(&raw, &meta, &filter).unwrap();
        assert!(result.detections.is_empty());
    }

    #[test]
    fn keeps_and_unletterboxes_confident_detection() {
        let post = YoloPostprocessor {
            num_classes: 1,
            num_boxes: 1,
            class_names: vec!["person".into()],
        };
        let raw = vec![320.0, 320.0, 100.0, 100.0, 0.9];
        let meta = LetterboxMeta {
            scale: 2.0,
            pad_x: 0.0,
            pad_y: 80.0,
            net_width: 640,
            net_height: 640,
            orig_width: 320,
            orig_height: 240,
        };
        let filter = FilterConfig {
            task: "detect".into(),
            model_family: "yolo".into(),
            confidence_threshold: 0.5,
            nms_threshold: 0.45,
            classes: Vec::new(),
            draw_overlay: false,
            params: HashMap::new(),
        };
        let result = post.process(&raw, &meta, &filter).unwrap();
        assert_eq!(result.detections.len(), 1);
        assert_eq!(result.detections[0].class_name, "person");
    }
}
