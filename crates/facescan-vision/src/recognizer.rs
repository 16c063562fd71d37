//! ArcFace recognizer: aligned 112×112 RGB crop in, unit-length 512-d
//! identity vector out.

use crate::alignment::{self, ALIGNED_SIZE};
use crate::detector::FaceBox;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use thiserror::Error;

const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric, unlike SCRFD
pub const ARCFACE_EMBEDDING_DIM: usize = 512;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("recognizer model not found: {}", .0.display())]
    ModelNotFound(PathBuf),
    #[error("face has no landmarks")]
    NoLandmarks,
    #[error("face landmarks are degenerate")]
    DegenerateLandmarks,
    #[error("expected 512-d embedding, got {0}")]
    UnexpectedDimension(usize),
    #[error("embedding output: {0}")]
    Output(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );
        Ok(Self { session })
    }

    /// Identity vector for one detected face of `image`.
    pub fn embed(&mut self, image: &RgbImage, face: &FaceBox) -> Result<Vec<f32>, RecognizerError> {
        let landmarks = face.landmarks.as_ref().ok_or(RecognizerError::NoLandmarks)?;
        let aligned =
            alignment::align_face(image, landmarks).ok_or(RecognizerError::DegenerateLandmarks)?;
        let input = to_tensor(&aligned);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::Output(e.to_string()))?;

        if raw.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::UnexpectedDimension(raw.len()));
        }
        Ok(l2_normalize(raw))
    }
}

/// NCHW float tensor of an aligned crop, RGB channel order.
fn to_tensor(aligned: &RgbImage) -> Array4<f32> {
    let side = ALIGNED_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in aligned.enumerate_pixels() {
        for (channel, &value) in pixel.0.iter().enumerate() {
            tensor[[0, channel, y as usize, x as usize]] = (value as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|v| v / norm).collect()
    } else {
        raw.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_tensor_shape_and_normalization() {
        let crop = RgbImage::from_pixel(ALIGNED_SIZE, ALIGNED_SIZE, Rgb([255, 0, 128]));
        let tensor = to_tensor(&crop);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
        assert_eq!(tensor[[0, 0, 7, 9]], 1.0);
        assert_eq!(tensor[[0, 1, 7, 9]], -1.0);
        assert!((tensor[[0, 2, 7, 9]] - 0.5 / 127.5).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(&[3.0, 4.0]);
        assert_eq!(v, vec![0.6, 0.8]);
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
