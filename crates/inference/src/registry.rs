use vidanalyze_core::{EngineDescriptor, Error, ModelSession, Preprocessor, Result};

use crate::preprocess::LetterboxPreprocessor;
use crate::session::OrtModelSession;

/// A concrete backing implementation for one model family: its
/// preprocessor and a loader for the `ModelSession`.
pub struct ModelFamily {
    pub preprocessor: Box<dyn Preprocessor>,
    pub class_names: Vec<String>,
    pub num_classes: usize,
    pub num_boxes: usize,
}

/// Resolves a model family name to its concrete implementation: exact match
/// against a known YOLO tag first, then a heuristic substring match against
/// the family/id/path text. Unlike `load_session`, there is currently only
/// one family this crate knows how to decode (YOLO-style detection heads);
/// a name that matches neither tier is a genuine resolution failure rather
/// than a silent fallback, so swapping to an unsupported family surfaces as
/// an error instead of quietly reusing the wrong postprocessor.
pub fn resolve_family(family: &str) -> Result<ModelFamily> {
    let lower = family.to_ascii_lowercase();
    let recognized = matches!(lower.as_str(), "yolo" | "yolov8" | "yolov8n" | "yolov8s" | "yolov8m" | "yolov8l" | "yolov8x")
        || lower.contains("yolo");
    if !recognized {
        return Err(Error::InferenceLoadFailed {
            model: family.to_string(),
            reason: format!("no registered model family matches '{family}'"),
        });
    }
    Ok(yolo_family())
}

fn yolo_family() -> ModelFamily {
    ModelFamily {
        preprocessor: Box::new(LetterboxPreprocessor::new(640)),
        class_names: COCO_CLASSES.iter().map(|s| s.to_string()).collect(),
        num_classes: COCO_CLASSES.len(),
        num_boxes: 8400,
    }
}

/// Loads a [`ModelSession`] for the given descriptor, using the descriptor's
/// `family` to pick the right input/output tensor naming convention.
pub fn load_session(descriptor: EngineDescriptor) -> Result<Box<dyn ModelSession>> {
    if descriptor.model_path.is_empty() {
        return Err(Error::InferenceLoadFailed {
            model: descriptor.model_path,
            reason: "empty model_path".into(),
        });
    }
    let session = OrtModelSession::load(descriptor, "images", "output0")?;
    Ok(Box::new(session))
}

const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_heuristic_family_names_resolve() {
        assert_eq!(resolve_family("yolo").unwrap().num_classes, 80);
        assert_eq!(resolve_family("yolov8-custom").unwrap().num_classes, 80);
    }

    #[test]
    fn unrecognized_family_is_a_resolution_error() {
        let err = resolve_family("efficientdet").unwrap_err();
        assert!(matches!(err, Error::InferenceLoadFailed { .. }));
    }

    #[test]
    fn loading_with_empty_path_is_rejected() {
        let err = load_session(EngineDescriptor::default()).unwrap_err();
        assert!(matches!(err, Error::InferenceLoadFailed { .. }));
    }
}
