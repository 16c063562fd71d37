//! Deterministic in-memory extractor for unit tests.

use crate::extractor::{ExtractError, IdentityExtractor, Strictness};
use crate::source::image_name;
use crate::types::{Face, IdentityVector};
use std::collections::HashMap;
use std::path::Path;

/// Faces keyed by image file name. Unknown names have no faces.
#[derive(Default)]
pub(crate) struct FakeExtractor {
    images: HashMap<String, Result<Vec<Vec<f32>>, String>>,
    pub calls: Vec<(String, Strictness)>,
}

impl FakeExtractor {
    pub fn with_faces(mut self, name: &str, faces: &[&[f32]]) -> Self {
        let faces = faces.iter().map(|f| f.to_vec()).collect();
        self.images.insert(name.to_string(), Ok(faces));
        self
    }

    pub fn with_failure(mut self, name: &str, reason: &str) -> Self {
        self.images.insert(name.to_string(), Err(reason.to_string()));
        self
    }
}

impl IdentityExtractor for FakeExtractor {
    fn extract(&mut self, image: &Path, strictness: Strictness) -> Result<Vec<Face>, ExtractError> {
        let name = image_name(image);
        self.calls.push((name.clone(), strictness));

        let faces = match self.images.get(&name) {
            Some(Ok(faces)) => faces
                .iter()
                .map(|values| {
                    Ok(Face {
                        embedding: IdentityVector::new(values.clone())?,
                        confidence: 1.0,
                    })
                })
                .collect::<Result<Vec<_>, ExtractError>>()?,
            Some(Err(reason)) => return Err(ExtractError::Backend(reason.clone().into())),
            None => Vec::new(),
        };
        strictness.apply(faces)
    }
}

/// Write a placeholder image file and return its path.
pub(crate) fn touch(dir: &Path, name: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("image bytes of {name}")).unwrap();
    path
}
