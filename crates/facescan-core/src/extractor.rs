//! The face extraction seam.
//!
//! The matching engine never looks at pixels. Anything that can turn an image
//! file into zero or more identity vectors implements [`IdentityExtractor`].

use crate::types::{Face, VectorError};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("no face detected")]
    NoFace,
    #[error("cannot decode image {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },
    #[error("invalid identity vector: {0}")]
    Vector(#[from] VectorError),
    #[error("extractor backend: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// How to treat an image with no detectable face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Zero faces is an error ([`ExtractError::NoFace`]). Used for reference images.
    Enforce,
    /// Zero faces is an empty result. Used for candidate images.
    Permissive,
}

impl Strictness {
    /// Apply the policy to a finished extraction.
    pub fn apply(self, faces: Vec<Face>) -> Result<Vec<Face>, ExtractError> {
        if faces.is_empty() && self == Strictness::Enforce {
            return Err(ExtractError::NoFace);
        }
        Ok(faces)
    }
}

/// Turns an image file into the identity vectors of the faces it contains.
///
/// Faces are returned in the extractor's preferred order (most confident
/// first for the ONNX backend); callers treat the first face as primary.
pub trait IdentityExtractor {
    fn extract(&mut self, image: &Path, strictness: Strictness) -> Result<Vec<Face>, ExtractError>;
}

impl<E: IdentityExtractor + ?Sized> IdentityExtractor for Box<E> {
    fn extract(&mut self, image: &Path, strictness: Strictness) -> Result<Vec<Face>, ExtractError> {
        (**self).extract(image, strictness)
    }
}
