//! [`IdentityExtractor`] backed by the SCRFD + ArcFace ONNX models.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use facescan_core::{ExtractError, Face, IdentityExtractor, IdentityVector, Strictness};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Recognizer(#[from] RecognizerError),
}

fn backend(e: impl std::fmt::Display) -> ExtractError {
    ExtractError::Backend(e.to_string().into())
}

pub struct OnnxExtractor {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxExtractor {
    pub fn load(
        detector_model: &Path,
        recognizer_model: &Path,
        min_confidence: f32,
    ) -> Result<Self, LoadError> {
        Ok(Self {
            detector: FaceDetector::load(detector_model, min_confidence)?,
            recognizer: FaceRecognizer::load(recognizer_model)?,
        })
    }

    /// Load `det_10g.onnx` and `w600k_r50.onnx` from `model_dir`.
    pub fn from_model_dir(model_dir: &Path, min_confidence: f32) -> Result<Self, LoadError> {
        let (detector, recognizer) = crate::model_paths(model_dir);
        Self::load(&detector, &recognizer, min_confidence)
    }
}

impl IdentityExtractor for OnnxExtractor {
    fn extract(&mut self, path: &Path, strictness: Strictness) -> Result<Vec<Face>, ExtractError> {
        let rgb = image::open(path)
            .map_err(|e| ExtractError::Decode {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .to_rgb8();

        let boxes = self.detector.detect(&rgb).map_err(backend)?;
        let mut faces = Vec::with_capacity(boxes.len());
        for face in &boxes {
            if face.landmarks.is_none() {
                tracing::debug!(image = %path.display(), "skipping detection without landmarks");
                continue;
            }
            let values = match self.recognizer.embed(&rgb, face) {
                Ok(values) => values,
                Err(RecognizerError::DegenerateLandmarks) => {
                    tracing::debug!(image = %path.display(), "skipping degenerate landmarks");
                    continue;
                }
                Err(e) => return Err(backend(e)),
            };
            faces.push(Face {
                embedding: IdentityVector::new(values)?,
                confidence: face.confidence,
            });
        }

        tracing::debug!(image = %path.display(), faces = faces.len(), "extracted faces");
        strictness.apply(faces)
    }
}
