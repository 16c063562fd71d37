//! facescan-vision — Face detection and identity vectors for image files.
//!
//! SCRFD finds faces and their five landmarks, each face is aligned to the
//! ArcFace template, and ArcFace turns the crop into a 512-d vector. Both
//! models run on ONNX Runtime (CPU). [`OnnxExtractor`] plugs the pair into
//! the scan pipeline.

pub mod alignment;
pub mod detector;
pub mod extractor;
pub mod recognizer;

pub use detector::{FaceBox, FaceDetector};
pub use extractor::{LoadError, OnnxExtractor};
pub use recognizer::FaceRecognizer;

use std::path::{Path, PathBuf};

/// SCRFD 10G detector file name inside the model directory.
pub const DETECTOR_MODEL: &str = "det_10g.onnx";
/// ArcFace ResNet-50 recognizer file name inside the model directory.
pub const RECOGNIZER_MODEL: &str = "w600k_r50.onnx";

/// Paths of the detector and recognizer models under `model_dir`.
pub fn model_paths(model_dir: &Path) -> (PathBuf, PathBuf) {
    (model_dir.join(DETECTOR_MODEL), model_dir.join(RECOGNIZER_MODEL))
}
